//! Live fan-out of progress events to connected viewers
//!
//! Every viewer holds one receiver on a single broadcast channel and keeps
//! the events whose audience includes one of its rooms. Room membership is
//! fixed when the viewer connects.
//!
//! ```text
//! ingest ──▶ Audience::Rooms{job} ──┬──▶ viewer in "job:<id>"
//!                                   └──▶ viewer in "authorized"
//! broadcast ──▶ Audience::Everyone ────▶ every viewer
//! ```

use std::fmt;

use taspa_common::events::LogPayload;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per viewer before the slowest one starts lagging
pub const HUB_CAPACITY: usize = 1024;

/// Named subscription scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// Viewers that presented a valid token with a recognized role
    Authorized,
    /// Viewers following one job
    Job(i64),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Authorized => f.write_str("authorized"),
            Room::Job(id) => write!(f, "job:{}", id),
        }
    }
}

/// Who an event is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The job's room and the authorized room
    Rooms { job_id: i64 },
    /// Every connected viewer
    Everyone,
}

impl Audience {
    pub fn includes(&self, room: Room) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::Rooms { job_id } => room == Room::Authorized || room == Room::Job(*job_id),
        }
    }
}

/// Event with its routing
#[derive(Debug, Clone)]
pub struct RoutedEvent {
    pub audience: Audience,
    pub payload: LogPayload,
}

/// Rooms one connected viewer belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    rooms: Vec<Room>,
}

impl Viewer {
    pub fn new(authorized: bool, job_id: Option<i64>) -> Self {
        let mut rooms = Vec::with_capacity(2);
        if authorized {
            rooms.push(Room::Authorized);
        }
        if let Some(id) = job_id {
            rooms.push(Room::Job(id));
        }
        Self { rooms }
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Whether the viewer gets this event; one answer per event, so one copy
    pub fn receives(&self, event: &RoutedEvent) -> bool {
        match event.audience {
            Audience::Everyone => true,
            audience => self.rooms.iter().any(|room| audience.includes(*room)),
        }
    }
}

/// In-process event hub
#[derive(Clone)]
pub struct LogHub {
    tx: broadcast::Sender<RoutedEvent>,
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Hand an event to every connected viewer; returns how many were connected
    pub fn publish(&self, event: RoutedEvent) -> usize {
        // No receivers is not an error: nobody is watching
        let viewers = self.tx.send(event).unwrap_or(0);
        debug!(viewers, "Published log event");
        viewers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoutedEvent> {
        self.tx.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new(HUB_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(audience: Audience, job_id: i64) -> RoutedEvent {
        RoutedEvent {
            audience,
            payload: LogPayload {
                job_id,
                level: "info".into(),
                message: "m".into(),
                created_at: taspa_common::time::now(),
            },
        }
    }

    #[test]
    fn test_room_names() {
        assert_eq!(Room::Authorized.to_string(), "authorized");
        assert_eq!(Room::Job(12).to_string(), "job:12");
    }

    #[test]
    fn test_room_scoped_delivery() {
        let job_viewer = Viewer::new(false, Some(1));
        let admin = Viewer::new(true, None);
        let anonymous = Viewer::new(false, None);

        let for_job_1 = event(Audience::Rooms { job_id: 1 }, 1);
        let for_job_2 = event(Audience::Rooms { job_id: 2 }, 2);

        assert!(job_viewer.receives(&for_job_1));
        assert!(!job_viewer.receives(&for_job_2));
        assert!(admin.receives(&for_job_1) && admin.receives(&for_job_2));
        assert!(!anonymous.receives(&for_job_1));
    }

    #[test]
    fn test_everyone_reaches_roomless_viewers() {
        let anonymous = Viewer::new(false, None);
        assert!(anonymous.rooms().is_empty());
        assert!(anonymous.receives(&event(Audience::Everyone, 5)));
    }

    #[tokio::test]
    async fn test_viewer_in_both_rooms_gets_one_copy() {
        let hub = LogHub::default();
        let viewer = Viewer::new(true, Some(3));
        let mut rx = hub.subscribe();

        assert_eq!(hub.publish(event(Audience::Rooms { job_id: 3 }, 3)), 1);
        drop(hub);

        let mut copies = 0;
        while let Ok(received) = rx.recv().await {
            if viewer.receives(&received) {
                copies += 1;
            }
        }
        assert_eq!(copies, 1);
    }

    #[test]
    fn test_publish_without_viewers() {
        let hub = LogHub::default();
        assert_eq!(hub.viewer_count(), 0);
        assert_eq!(hub.publish(event(Audience::Everyone, 1)), 0);
    }
}
