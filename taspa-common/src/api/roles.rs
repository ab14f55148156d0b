//! Role-based request authorization
//!
//! The gateway in front of the services authenticates users and forwards
//! their roles in the comma-separated `X-Roles` header. A request is allowed
//! when the presented set intersects the required set. An empty or missing
//! role list is always treated as unauthenticated, never as unrestricted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Header carrying the caller's roles
pub const ROLES_HEADER: &str = "X-Roles";

/// Recognized roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Developer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Admin, Role::Developer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Developer => "developer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "developer" => Ok(Role::Developer),
            _ => Err(()),
        }
    }
}

/// Roles presented by a caller
///
/// Unrecognized names are kept out of `recognized` but still count as
/// "presented", so a caller with only unknown roles is forbidden rather
/// than unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet {
    presented: usize,
    recognized: BTreeSet<Role>,
}

impl RoleSet {
    /// Parse a comma-separated role list, ignoring blanks
    pub fn parse(header: &str) -> Self {
        Self::from_names(header.split(','))
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = RoleSet::default();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            set.presented += 1;
            if let Ok(role) = name.parse() {
                set.recognized.insert(role);
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.presented == 0
    }

    pub fn contains(&self, role: Role) -> bool {
        self.recognized.contains(&role)
    }

    pub fn has_recognized(&self) -> bool {
        !self.recognized.is_empty()
    }

    pub fn intersects(&self, required: &[Role]) -> bool {
        required.iter().any(|role| self.recognized.contains(role))
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.recognized.iter().copied()
    }
}

/// Authorization failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No roles presented (HTTP 401)
    #[error("Missing roles")]
    MissingRoles,

    /// Roles presented but none of the required ones (HTTP 403)
    #[error("Forbidden")]
    Forbidden,
}

/// Check a raw `X-Roles` header value against the required roles
pub fn require_any(header: Option<&str>, required: &[Role]) -> Result<RoleSet, AuthError> {
    let roles = RoleSet::parse(header.unwrap_or(""));
    if roles.is_empty() {
        return Err(AuthError::MissingRoles);
    }
    if !roles.intersects(required) {
        return Err(AuthError::Forbidden);
    }
    Ok(roles)
}
