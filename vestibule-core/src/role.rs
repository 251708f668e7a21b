// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The named permission levels which can be attached to a grant. Greater roles are assumed to
/// also contain all lower ones.
///
/// The rank order is fixed: `Reader < Speaker < Vip < Moderator < Owner`. An absent role ranks
/// below all of them, see [`level`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Permission to observe a resource.
    Reader,

    /// Permission to actively contribute to a resource.
    Speaker,

    /// Speaker permissions plus privileged participation.
    Vip,

    /// Permission to moderate other participants.
    Moderator,

    /// Full control over the resource, including its teardown.
    Owner,
}

impl Role {
    /// Integer rank of this role within the fixed total order.
    pub fn rank(&self) -> u8 {
        match self {
            Role::Reader => 1,
            Role::Speaker => 2,
            Role::Vip => 3,
            Role::Moderator => 4,
            Role::Owner => 5,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Reader => "reader",
            Role::Speaker => "speaker",
            Role::Vip => "vip",
            Role::Moderator => "moderator",
            Role::Owner => "owner",
        };

        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RoleError {
    #[error("unknown role name: {0}")]
    UnknownRole(String),
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" => Ok(Role::Reader),
            "speaker" => Ok(Role::Speaker),
            "vip" => Ok(Role::Vip),
            "moderator" => Ok(Role::Moderator),
            "owner" => Ok(Role::Owner),
            unknown => Err(RoleError::UnknownRole(unknown.to_string())),
        }
    }
}

/// Merges two role sources into the one that wins by rank.
///
/// Returns the non-null side when exactly one is present and `None` when both are absent. The
/// result of folding `combine` over any sequence of sources is the maximum rank among the present
/// ones, so the application order never changes the outcome.
pub fn combine(a: Option<Role>, b: Option<Role>) -> Option<Role> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Rank of a possibly-absent role. The absent role ranks zero, below every named role.
pub fn level(role: Option<Role>) -> u8 {
    role.map(|role| role.rank()).unwrap_or(0)
}
