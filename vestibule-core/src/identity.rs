// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::role::Role;

/// Opaque identifier of an authenticated account.
///
/// Authentication happens outside of this crate, account ids arrive as trusted inputs.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque identifier of a client session, anonymous until an account is linked to it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The subject a presence row is tracked for: an anonymous session or an account.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subject {
    Session(SessionId),
    Account(AccountId),
}

impl Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Session(session) => write!(f, "session:{}", session),
            Subject::Account(account) => write!(f, "account:{}", account),
        }
    }
}

/// The identity an inbound call acts as.
///
/// Every caller owns a session. Authenticated callers additionally carry their account and any
/// externally-asserted roles (for example global admin roles).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub session: SessionId,
    pub account: Option<AccountId>,
    pub asserted_roles: Vec<Role>,
}

impl Actor {
    /// An anonymous actor known only by its session.
    pub fn anonymous(session: SessionId) -> Self {
        Self {
            session,
            account: None,
            asserted_roles: Vec::new(),
        }
    }

    /// An authenticated actor.
    pub fn authenticated(session: SessionId, account: AccountId) -> Self {
        Self {
            session,
            account: Some(account),
            asserted_roles: Vec::new(),
        }
    }

    /// Attach externally-asserted roles to the actor.
    pub fn with_asserted_roles(mut self, roles: Vec<Role>) -> Self {
        self.asserted_roles = roles;
        self
    }

    /// The presence subject of this actor: the account when authenticated, the session otherwise.
    pub fn subject(&self) -> Subject {
        match &self.account {
            Some(account) => Subject::Account(account.clone()),
            None => Subject::Session(self.session.clone()),
        }
    }
}
