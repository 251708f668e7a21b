// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::identity::Actor;
use crate::records::{AccessPolicy, Membership, SessionGrant};
use crate::role::{Role, combine, level};

/// The computed, always-current summary of an actor's relationship to one resource.
///
/// Derived state: recomputed from the three source records whenever any of them changes, never
/// persisted as a source of truth. Compared structurally to suppress redundant downstream work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveStatus {
    /// The single effective role, the maximum rank over all present sources.
    pub role: Option<Role>,

    /// Rank of `role`, zero when no source grants anything.
    pub level: u8,

    /// Whether a membership or session grant exists for the actor.
    pub joined: bool,

    /// Whether the resource can be joined through its public policy at all.
    pub can_join: bool,
}

/// Combines the current source records into the actor's effective status.
///
/// Sources are applied in a fixed order: public guest role, session grant, public user role
/// (authenticated actors only), membership, then each externally-asserted role in list order.
/// Since [`combine`] always keeps the higher rank, this order matters for determinism only, not
/// for the result.
pub fn effective_status(
    policy: Option<&AccessPolicy>,
    membership: Option<&Membership>,
    session_grant: Option<&SessionGrant>,
    actor: &Actor,
) -> EffectiveStatus {
    let mut role = combine(
        policy.and_then(|policy| policy.public_guest_role),
        session_grant.map(|grant| grant.role),
    );
    if actor.account.is_some() {
        role = combine(role, policy.and_then(|policy| policy.public_user_role));
    }
    role = combine(role, membership.map(|membership| membership.role));
    for asserted in &actor.asserted_roles {
        role = combine(role, Some(*asserted));
    }

    EffectiveStatus {
        role,
        level: level(role),
        joined: membership.is_some() || session_grant.is_some(),
        can_join: policy
            .map(|policy| policy.public_guest_role.is_some() || policy.public_user_role.is_some())
            .unwrap_or(false),
    }
}
