//! Platform field mappings
//!
//! Maps a raw record onto the parent entity and child row of its platform.
//! VK exports use either English or Russian column names; Instagram and
//! TikTok exports share one layout.

use chrono::{DateTime, Utc};
use taspa_common::db::entities::ParentDraft;
use taspa_common::time::parse_export_date;
use taspa_common::Platform;

use super::parse::RawRecord;

/// Attribute columns of `vk_members`, in bind order
const VK_MEMBER_COLUMNS: &[&str] = &[
    "full_name",
    "gender",
    "age",
    "city",
    "university",
    "school",
    "last_recently",
    "data_timestamp",
];

/// Attribute columns of `instagram_users` / `tiktok_users`, in bind order
const SOCIAL_USER_COLUMNS: &[&str] = &["url", "sex", "city", "data_timestamp"];

pub fn child_columns(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Vk => VK_MEMBER_COLUMNS,
        Platform::Instagram | Platform::Tiktok => SOCIAL_USER_COLUMNS,
    }
}

/// One bindable attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(Option<String>),
    Int(Option<i64>),
    Time(Option<DateTime<Utc>>),
}

/// Child row ready for the merge phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRow {
    pub natural_key: String,
    /// Values for `child_columns(platform)`, same order
    pub cells: Vec<Cell>,
}

/// A record that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRow {
    pub row: usize,
    pub parent: ParentDraft,
    pub child: ChildRow,
}

/// Map one record; `Err` carries the row-level error message
pub fn stage(
    platform: Platform,
    record: &RawRecord,
    scraped_at: DateTime<Utc>,
) -> Result<StagedRow, String> {
    match platform {
        Platform::Vk => stage_vk(record, scraped_at),
        Platform::Instagram | Platform::Tiktok => stage_social(record, scraped_at),
    }
}

fn text(value: Option<&str>) -> Cell {
    Cell::Text(value.map(str::to_string))
}

fn stage_vk(record: &RawRecord, scraped_at: DateTime<Utc>) -> Result<StagedRow, String> {
    let user_id = record
        .get(&["user_id", "VK_ID"])
        .ok_or_else(|| format!("Row {}: missing user_id", record.row))?;
    let group_name = record
        .get(&["group", "Группа"])
        .ok_or_else(|| format!("Row {}: missing group", record.row))?;
    let group_link = record.get(&["group_link"]);

    let parent = ParentDraft {
        natural_key: vk_group_key(group_name, group_link),
        name: Some(group_name.to_string()),
        url: group_link.map(str::to_string),
    };

    let cells = vec![
        text(record.get(&["name", "ФИО"])),
        Cell::Text(record.get(&["sex", "Пол"]).and_then(normalize_gender).map(str::to_string)),
        Cell::Int(record.get(&["age"]).and_then(parse_age)),
        text(record.get(&["city"])),
        text(record.get(&["univ"])),
        text(record.get(&["school"])),
        Cell::Time(record.get(&["last_recently"]).and_then(parse_export_date)),
        Cell::Time(Some(
            record
                .get(&["data_timestap"])
                .and_then(parse_export_date)
                .unwrap_or(scraped_at),
        )),
    ];

    Ok(StagedRow {
        row: record.row,
        parent,
        child: ChildRow { natural_key: user_id.to_string(), cells },
    })
}

fn stage_social(record: &RawRecord, scraped_at: DateTime<Utc>) -> Result<StagedRow, String> {
    let username = record
        .get(&["username"])
        .ok_or_else(|| format!("Row {}: missing username", record.row))?;
    let group_name = record.get(&["group_name"]);
    let link = record.get(&["link"]);

    let parent = ParentDraft {
        natural_key: group_name.unwrap_or(username).to_string(),
        name: group_name.map(str::to_string),
        url: link.map(str::to_string),
    };

    let cells = vec![
        text(link),
        text(record.get(&["sex"])),
        text(record.get(&["city"])),
        Cell::Time(Some(
            record
                .get(&["data_timestap"])
                .and_then(parse_export_date)
                .unwrap_or(scraped_at),
        )),
    ];

    Ok(StagedRow {
        row: record.row,
        parent,
        child: ChildRow { natural_key: username.to_string(), cells },
    })
}

/// Group natural key: last path segment of the link, else the group name
fn vk_group_key(group_name: &str, group_link: Option<&str>) -> String {
    match group_link {
        Some(link) if link.contains('/') => link.rsplit('/').next().unwrap_or(link).to_string(),
        _ => group_name.to_string(),
    }
}

fn normalize_gender(raw: &str) -> Option<&'static str> {
    match raw.to_lowercase().as_str() {
        "m" | "м" | "male" | "мужской" => Some("male"),
        "f" | "ж" | "female" | "женский" => Some("female"),
        _ => None,
    }
}

fn parse_age(raw: &str) -> Option<i64> {
    if raw.chars().all(|c| c.is_ascii_digit()) {
        raw.parse().ok()
    } else {
        None
    }
}
