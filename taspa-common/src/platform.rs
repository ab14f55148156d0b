//! Platform catalogue
//!
//! Every supported platform fixes the source type its workers scrape, and the
//! two-level entity hierarchy (parent group/account, child member/user) that
//! imports and workers write to. Table and column names are compile-time
//! constants, so they are safe to splice into SQL text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Supported scraping platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Vk,
    Instagram,
    Tiktok,
}

/// Storage layout of one platform's parent/child tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformSchema {
    /// Parent (group/account) table
    pub parent_table: &'static str,
    /// Parent natural key column, unique together with `direction_id`
    pub parent_key: &'static str,
    /// Child (member/user) table
    pub child_table: &'static str,
    /// Child column referencing the parent row id
    pub child_parent_fk: &'static str,
    /// Child natural key column, unique together with the parent fk
    pub child_key: &'static str,
}

const VK_SCHEMA: PlatformSchema = PlatformSchema {
    parent_table: "vk_groups",
    parent_key: "vk_group_id",
    child_table: "vk_members",
    child_parent_fk: "vk_group_id",
    child_key: "vk_user_id",
};

const INSTAGRAM_SCHEMA: PlatformSchema = PlatformSchema {
    parent_table: "instagram_accounts",
    parent_key: "username",
    child_table: "instagram_users",
    child_parent_fk: "instagram_account_id",
    child_key: "username",
};

const TIKTOK_SCHEMA: PlatformSchema = PlatformSchema {
    parent_table: "tiktok_accounts",
    parent_key: "username",
    child_table: "tiktok_users",
    child_parent_fk: "tiktok_account_id",
    child_key: "username",
};

impl Platform {
    /// All known platforms, in a stable order
    pub const ALL: [Platform; 3] = [Platform::Vk, Platform::Instagram, Platform::Tiktok];

    /// Wire tag (`service_name` in job announcements)
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Vk => "vk",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }

    /// Human-readable name used in progress messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Vk => "VK",
            Platform::Instagram => "Instagram",
            Platform::Tiktok => "TikTok",
        }
    }

    /// `direction_sources.source_type` scraped by this platform's workers
    pub fn source_type(&self) -> &'static str {
        match self {
            Platform::Vk => "vk_group",
            Platform::Instagram => "instagram_account",
            Platform::Tiktok => "tiktok_account",
        }
    }

    pub fn schema(&self) -> &'static PlatformSchema {
        match self {
            Platform::Vk => &VK_SCHEMA,
            Platform::Instagram => &INSTAGRAM_SCHEMA,
            Platform::Tiktok => &TIKTOK_SCHEMA,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vk" => Ok(Platform::Vk),
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::Tiktok),
            other => Err(Error::InvalidInput(format!("Unknown platform: {}", other))),
        }
    }
}
