// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for querying and mutating access-control and presence state.

use std::fmt::{Debug, Display};

use vestibule_core::{
    AccessPolicy, AccountId, Membership, PresenceKey, PresenceShift, PresenceState,
    PublicSessionInfo, Resource, Role, SessionGrant, SessionId, Subject, Timestamp,
};

use crate::watch::{ChangeReceiver, ResourceGrantChange};

/// Interface for storing and querying access policies, grants and public session records.
///
/// Implementations must apply each mutation as a read-modify-write serialized per primary key.
/// Two variants of the trait are provided: one which is thread-safe (implementing `Send`) and
/// one which is purely intended for single-threaded execution contexts.
#[trait_variant::make(AccessStore: Send)]
pub trait LocalAccessStore: Clone {
    type Error: Display + Debug;

    /// Insert an access policy.
    ///
    /// Returns `true` when the insert occurred, or `false` when a policy already existed for
    /// the resource and nothing was written.
    async fn insert_policy(&mut self, policy: &AccessPolicy) -> Result<bool, Self::Error>;

    /// Get the access policy of a resource.
    async fn policy(&self, resource: &Resource) -> Result<Option<AccessPolicy>, Self::Error>;

    /// Delete the access policy of a resource.
    ///
    /// Returns `true` when the removal occurred and `false` when no policy existed. Grants
    /// referencing the resource are not touched, cascading is the caller's responsibility.
    async fn delete_policy(&mut self, resource: &Resource) -> Result<bool, Self::Error>;

    /// Insert or replace a membership, returning the replaced record if one existed.
    async fn upsert_membership(
        &mut self,
        membership: &Membership,
    ) -> Result<Option<Membership>, Self::Error>;

    /// Get the membership of an account on a resource.
    async fn membership(
        &self,
        account: &AccountId,
        resource: &Resource,
    ) -> Result<Option<Membership>, Self::Error>;

    /// Delete a membership.
    ///
    /// Returns `true` when the removal occurred and `false` when none existed.
    async fn delete_membership(
        &mut self,
        account: &AccountId,
        resource: &Resource,
    ) -> Result<bool, Self::Error>;

    /// All memberships on a resource, by range over the resource prefix.
    async fn memberships_by_resource(
        &self,
        resource: &Resource,
    ) -> Result<Vec<Membership>, Self::Error>;

    /// All memberships held by an account.
    async fn memberships_by_account(
        &self,
        account: &AccountId,
    ) -> Result<Vec<Membership>, Self::Error>;

    /// Delete all memberships on a resource, returning how many were removed.
    async fn delete_memberships_by_resource(
        &mut self,
        resource: &Resource,
    ) -> Result<usize, Self::Error>;

    /// Insert a session grant.
    ///
    /// Returns `true` when the insert occurred, or `false` when a grant already existed for
    /// the (session, resource) pair and nothing was written.
    async fn insert_session_grant(&mut self, grant: &SessionGrant) -> Result<bool, Self::Error>;

    /// Get the grant of a session on a resource.
    async fn session_grant(
        &self,
        session: &SessionId,
        resource: &Resource,
    ) -> Result<Option<SessionGrant>, Self::Error>;

    /// Replace the role of an existing session grant.
    ///
    /// Returns `true` when the grant existed and was updated.
    async fn set_session_grant_role(
        &mut self,
        session: &SessionId,
        resource: &Resource,
        role: Role,
    ) -> Result<bool, Self::Error>;

    /// Delete a session grant.
    ///
    /// Returns `true` when the removal occurred and `false` when none existed.
    async fn delete_session_grant(
        &mut self,
        session: &SessionId,
        resource: &Resource,
    ) -> Result<bool, Self::Error>;

    /// All session grants on a resource, by range over the resource prefix.
    async fn session_grants_by_resource(
        &self,
        resource: &Resource,
    ) -> Result<Vec<SessionGrant>, Self::Error>;

    /// All session grants held by a session.
    async fn session_grants_by_session(
        &self,
        session: &SessionId,
    ) -> Result<Vec<SessionGrant>, Self::Error>;

    /// Delete all session grants on a resource, returning how many were removed.
    async fn delete_session_grants_by_resource(
        &mut self,
        resource: &Resource,
    ) -> Result<usize, Self::Error>;

    /// Every resource which still has at least one membership or session grant.
    ///
    /// Backs the orphan-reconciliation sweep, not a hot path.
    async fn granted_resources(&self) -> Result<Vec<Resource>, Self::Error>;

    /// Get the public record of a session, creating a fresh one when the session was never
    /// seen before. Records are never deleted once created.
    async fn get_or_create_session_info(
        &mut self,
        session: &SessionId,
    ) -> Result<PublicSessionInfo, Self::Error>;

    /// Get the public record of a session.
    async fn session_info(
        &self,
        session: &SessionId,
    ) -> Result<Option<PublicSessionInfo>, Self::Error>;

    /// Attach an account to the session's public record, creating the record if needed.
    async fn link_account(
        &mut self,
        session: &SessionId,
        account: &AccountId,
    ) -> Result<(), Self::Error>;

    /// Detach the account from the session's public record, if any.
    async fn unlink_account(&mut self, session: &SessionId) -> Result<(), Self::Error>;

    /// Set or clear the display name on the session's public record.
    async fn set_session_name(
        &mut self,
        session: &SessionId,
        name: Option<String>,
    ) -> Result<(), Self::Error>;
}

/// A row visited by the bulk-offline sweep.
#[derive(Clone, Debug, PartialEq)]
pub enum SweptRow {
    /// A (subject, resource) presence row.
    Resource { key: PresenceKey, shift: PresenceShift },

    /// A session-global public record.
    Session {
        session: SessionId,
        shift: PresenceShift,
    },
}

/// Interface for the guarded online/offline rows.
///
/// The transition itself is pure (see `vestibule_core::presence`); implementations apply it
/// atomically per key, re-reading the current `online` flag under the same guard as the write.
/// This is what keeps a bulk sweep racing individual signals from recording a transition twice.
#[trait_variant::make(PresenceStore: Send)]
pub trait LocalPresenceStore: Clone {
    type Error: Display + Debug;

    /// Get one presence row.
    async fn presence(&self, key: &PresenceKey) -> Result<Option<PresenceState>, Self::Error>;

    /// Transition one (subject, resource) row towards `target_online`.
    ///
    /// Returns the shift actually applied, or `None` when the row was already in the requested
    /// state (duplicate signal).
    async fn apply_presence(
        &mut self,
        key: &PresenceKey,
        target_online: bool,
        now: Timestamp,
    ) -> Result<Option<PresenceShift>, Self::Error>;

    /// Transition the session-global presence of a session's public record, creating the
    /// record lazily. Same duplicate-suppression contract as [`Self::apply_presence`].
    async fn apply_session_presence(
        &mut self,
        session: &SessionId,
        target_online: bool,
        now: Timestamp,
    ) -> Result<Option<PresenceShift>, Self::Error>;

    /// All subjects currently online on a resource, via the online-only index.
    async fn online_by_resource(&self, resource: &Resource) -> Result<Vec<Subject>, Self::Error>;

    /// Transition every currently-online row (resource-scoped and session-global) to offline.
    ///
    /// Each row is guarded individually: a row which already transitioned before the sweep
    /// reaches it is skipped, not double-recorded.
    async fn sweep_all_offline(&mut self, now: Timestamp) -> Result<Vec<SweptRow>, Self::Error>;
}

/// Interface for typed change-notification streams on access records.
///
/// Registering interest is synchronous; the returned receivers yield every subsequent change
/// in application order.
pub trait SubscribeStore {
    /// Watch the access policy of one resource.
    fn watch_policy(&self, resource: &Resource) -> ChangeReceiver<AccessPolicy>;

    /// Watch one (account, resource) membership.
    fn watch_membership(
        &self,
        account: &AccountId,
        resource: &Resource,
    ) -> ChangeReceiver<Membership>;

    /// Watch one (session, resource) grant.
    fn watch_session_grant(
        &self,
        session: &SessionId,
        resource: &Resource,
    ) -> ChangeReceiver<SessionGrant>;

    /// Watch all grant creation and removal on one resource.
    fn watch_resource_grants(
        &self,
        resource: &Resource,
    ) -> tokio::sync::mpsc::UnboundedReceiver<ResourceGrantChange>;
}
