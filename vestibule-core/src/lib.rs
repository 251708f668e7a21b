// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod identity;
pub mod presence;
pub mod records;
pub mod resource;
pub mod role;
pub mod status;

pub use identity::{AccountId, Actor, SessionId, Subject};
pub use presence::{PresenceKey, PresenceShift, PresenceState, Timestamp};
pub use records::{AccessPolicy, Membership, PublicSessionInfo, SessionGrant};
pub use resource::Resource;
pub use role::{Role, RoleError, combine, level};
pub use status::{EffectiveStatus, effective_status};
