// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record types persisted by the access-control stores.

use serde::{Deserialize, Serialize};

use crate::identity::{AccountId, SessionId};
use crate::presence::Timestamp;
use crate::resource::Resource;
use crate::role::Role;

/// Public access policy of one resource. At most one policy exists per resource.
///
/// Either role may be unset: a resource with neither set cannot be joined through the public
/// path at all, only through explicit grants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub resource: Resource,

    /// Baseline role of any visitor, including anonymous sessions.
    pub public_guest_role: Option<Role>,

    /// Baseline role of any authenticated account.
    pub public_user_role: Option<Role>,
}

/// A per-account grant. At most one membership exists per (account, resource) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub account: AccountId,
    pub resource: Resource,
    pub role: Role,
}

/// A per-anonymous-session grant. At most one exists per (session, resource) pair.
///
/// `public_info` references the session's [`PublicSessionInfo`] record, which is resolved or
/// created before the grant itself is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub session: SessionId,
    pub resource: Resource,
    pub role: Role,
    pub public_info: SessionId,
}

/// Publicly visible state of one session, independent of any resource.
///
/// Created lazily the first time a resource-scoped grant needs to reference the session and
/// never deleted afterwards, only mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSessionInfo {
    pub session: SessionId,

    /// Set once the session authenticates, cleared again on logout.
    pub account: Option<AccountId>,

    /// Display name chosen by the session, if any.
    pub name: Option<String>,

    pub online: bool,
    pub last_online: Option<Timestamp>,
}

impl PublicSessionInfo {
    /// A fresh record for a session which never reported presence.
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            account: None,
            name: None,
            online: false,
            last_online: None,
        }
    }
}
