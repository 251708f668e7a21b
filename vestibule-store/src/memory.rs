// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory persistence for vestibule access-control and presence state.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use vestibule_core::presence;
use vestibule_core::{
    AccessPolicy, AccountId, Membership, PresenceKey, PresenceShift, PresenceState,
    PublicSessionInfo, Resource, Role, SessionGrant, SessionId, Subject, Timestamp,
};

use crate::traits::{AccessStore, PresenceStore, SubscribeStore, SweptRow};
use crate::watch::{Change, ChangeReceiver, ResourceGrantChange, WatcherSet};

type MembershipKey = (AccountId, Resource);
type GrantKey = (Resource, SessionId);

/// An in-memory store for vestibule record types, with secondary indexes for resource-prefix
/// scans and an online-only index for bulk-offline sweeps.
#[derive(Debug)]
pub struct InnerMemoryStore {
    policies: BTreeMap<Resource, AccessPolicy>,

    memberships: BTreeMap<MembershipKey, Membership>,
    memberships_by_resource: BTreeSet<(Resource, AccountId)>,

    session_grants: BTreeMap<GrantKey, SessionGrant>,
    grants_by_session: BTreeSet<(SessionId, Resource)>,

    session_infos: HashMap<SessionId, PublicSessionInfo>,
    online_sessions: BTreeSet<SessionId>,

    presence: BTreeMap<PresenceKey, PresenceState>,
    online: BTreeSet<PresenceKey>,

    policy_watchers: WatcherSet<Resource, Change<AccessPolicy>>,
    membership_watchers: WatcherSet<MembershipKey, Change<Membership>>,
    grant_watchers: WatcherSet<(SessionId, Resource), Change<SessionGrant>>,
    resource_grant_watchers: WatcherSet<Resource, ResourceGrantChange>,
}

impl InnerMemoryStore {
    fn notify_policy(&mut self, resource: &Resource, change: Change<AccessPolicy>) {
        self.policy_watchers.notify(resource, change);
    }

    fn notify_membership(&mut self, key: &MembershipKey, change: Change<Membership>) {
        self.membership_watchers.notify(key, change.clone());
        self.resource_grant_watchers
            .notify(&key.1, ResourceGrantChange::Membership(change));
    }

    fn notify_session_grant(&mut self, key: &GrantKey, change: Change<SessionGrant>) {
        self.grant_watchers
            .notify(&(key.1.clone(), key.0.clone()), change.clone());
        self.resource_grant_watchers
            .notify(&key.0, ResourceGrantChange::SessionGrant(change));
    }

    fn remove_membership(&mut self, key: &MembershipKey) -> Option<Membership> {
        let removed = self.memberships.remove(key)?;
        self.memberships_by_resource
            .remove(&(key.1.clone(), key.0.clone()));
        self.notify_membership(
            key,
            Change {
                previous: Some(removed.clone()),
                current: None,
            },
        );
        Some(removed)
    }

    fn remove_session_grant(&mut self, key: &GrantKey) -> Option<SessionGrant> {
        let removed = self.session_grants.remove(key)?;
        self.grants_by_session
            .remove(&(key.1.clone(), key.0.clone()));
        self.notify_session_grant(
            key,
            Change {
                previous: Some(removed.clone()),
                current: None,
            },
        );
        Some(removed)
    }

    fn session_presence_state(&self, session: &SessionId) -> Option<PresenceState> {
        self.session_infos.get(session).map(|info| PresenceState {
            online: info.online,
            last_online: info.last_online,
        })
    }
}

/// An in-memory store implementing [`crate::AccessStore`], [`crate::PresenceStore`] and
/// [`SubscribeStore`].
///
/// `MemoryStore` supports usage in asynchronous and multi-threaded contexts by wrapping an
/// `InnerMemoryStore` with an `RwLock` and `Arc`. Every mutation holds the write lock for its
/// full read-modify-write, which serializes transitions per key; change notifications are sent
/// under the same lock, so subscribers observe them in application order.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<RwLock<InnerMemoryStore>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        let inner = InnerMemoryStore {
            policies: BTreeMap::new(),
            memberships: BTreeMap::new(),
            memberships_by_resource: BTreeSet::new(),
            session_grants: BTreeMap::new(),
            grants_by_session: BTreeSet::new(),
            session_infos: HashMap::new(),
            online_sessions: BTreeSet::new(),
            presence: BTreeMap::new(),
            online: BTreeSet::new(),
            policy_watchers: WatcherSet::new(),
            membership_watchers: WatcherSet::new(),
            grant_watchers: WatcherSet::new(),
            resource_grant_watchers: WatcherSet::new(),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Obtain a read-lock on the store.
    fn read_store(&self) -> RwLockReadGuard<'_, InnerMemoryStore> {
        self.inner
            .read()
            .expect("acquire shared read access on store")
    }

    /// Obtain a write-lock on the store.
    fn write_store(&self) -> RwLockWriteGuard<'_, InnerMemoryStore> {
        self.inner
            .write()
            .expect("acquire exclusive write access on store")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessStore for MemoryStore {
    type Error = Infallible;

    async fn insert_policy(&mut self, policy: &AccessPolicy) -> Result<bool, Self::Error> {
        let mut store = self.write_store();
        if store.policies.contains_key(&policy.resource) {
            return Ok(false);
        }

        store
            .policies
            .insert(policy.resource.clone(), policy.clone());
        store.notify_policy(
            &policy.resource,
            Change {
                previous: None,
                current: Some(policy.clone()),
            },
        );

        Ok(true)
    }

    async fn policy(&self, resource: &Resource) -> Result<Option<AccessPolicy>, Self::Error> {
        Ok(self.read_store().policies.get(resource).cloned())
    }

    async fn delete_policy(&mut self, resource: &Resource) -> Result<bool, Self::Error> {
        let mut store = self.write_store();
        let Some(removed) = store.policies.remove(resource) else {
            return Ok(false);
        };

        store.notify_policy(
            resource,
            Change {
                previous: Some(removed),
                current: None,
            },
        );

        Ok(true)
    }

    async fn upsert_membership(
        &mut self,
        membership: &Membership,
    ) -> Result<Option<Membership>, Self::Error> {
        let key = (membership.account.clone(), membership.resource.clone());
        let mut store = self.write_store();

        let previous = store.memberships.insert(key.clone(), membership.clone());
        store
            .memberships_by_resource
            .insert((key.1.clone(), key.0.clone()));
        store.notify_membership(
            &key,
            Change {
                previous: previous.clone(),
                current: Some(membership.clone()),
            },
        );

        Ok(previous)
    }

    async fn membership(
        &self,
        account: &AccountId,
        resource: &Resource,
    ) -> Result<Option<Membership>, Self::Error> {
        let key = (account.clone(), resource.clone());
        Ok(self.read_store().memberships.get(&key).cloned())
    }

    async fn delete_membership(
        &mut self,
        account: &AccountId,
        resource: &Resource,
    ) -> Result<bool, Self::Error> {
        let key = (account.clone(), resource.clone());
        Ok(self.write_store().remove_membership(&key).is_some())
    }

    async fn memberships_by_resource(
        &self,
        resource: &Resource,
    ) -> Result<Vec<Membership>, Self::Error> {
        let store = self.read_store();
        let start = (resource.clone(), AccountId::new(""));
        let memberships = store
            .memberships_by_resource
            .range(start..)
            .take_while(|(entry_resource, _)| entry_resource == resource)
            .filter_map(|(entry_resource, account)| {
                store
                    .memberships
                    .get(&(account.clone(), entry_resource.clone()))
                    .cloned()
            })
            .collect();
        Ok(memberships)
    }

    async fn memberships_by_account(
        &self,
        account: &AccountId,
    ) -> Result<Vec<Membership>, Self::Error> {
        let store = self.read_store();
        let start = (account.clone(), Resource::new("", ""));
        let memberships = store
            .memberships
            .range(start..)
            .take_while(|((entry_account, _), _)| entry_account == account)
            .map(|(_, membership)| membership.clone())
            .collect();
        Ok(memberships)
    }

    async fn delete_memberships_by_resource(
        &mut self,
        resource: &Resource,
    ) -> Result<usize, Self::Error> {
        let mut store = self.write_store();
        let start = (resource.clone(), AccountId::new(""));
        let keys: Vec<MembershipKey> = store
            .memberships_by_resource
            .range(start..)
            .take_while(|(entry_resource, _)| entry_resource == resource)
            .map(|(entry_resource, account)| (account.clone(), entry_resource.clone()))
            .collect();

        for key in &keys {
            let _ = store.remove_membership(key);
        }

        Ok(keys.len())
    }

    async fn insert_session_grant(&mut self, grant: &SessionGrant) -> Result<bool, Self::Error> {
        let key = (grant.resource.clone(), grant.session.clone());
        let mut store = self.write_store();
        if store.session_grants.contains_key(&key) {
            return Ok(false);
        }

        store.session_grants.insert(key.clone(), grant.clone());
        store
            .grants_by_session
            .insert((key.1.clone(), key.0.clone()));
        store.notify_session_grant(
            &key,
            Change {
                previous: None,
                current: Some(grant.clone()),
            },
        );

        Ok(true)
    }

    async fn session_grant(
        &self,
        session: &SessionId,
        resource: &Resource,
    ) -> Result<Option<SessionGrant>, Self::Error> {
        let key = (resource.clone(), session.clone());
        Ok(self.read_store().session_grants.get(&key).cloned())
    }

    async fn set_session_grant_role(
        &mut self,
        session: &SessionId,
        resource: &Resource,
        role: Role,
    ) -> Result<bool, Self::Error> {
        let key = (resource.clone(), session.clone());
        let mut store = self.write_store();
        let Some(previous) = store.session_grants.get(&key).cloned() else {
            return Ok(false);
        };

        let mut updated = previous.clone();
        updated.role = role;
        store.session_grants.insert(key.clone(), updated.clone());
        store.notify_session_grant(
            &key,
            Change {
                previous: Some(previous),
                current: Some(updated),
            },
        );

        Ok(true)
    }

    async fn delete_session_grant(
        &mut self,
        session: &SessionId,
        resource: &Resource,
    ) -> Result<bool, Self::Error> {
        let key = (resource.clone(), session.clone());
        Ok(self.write_store().remove_session_grant(&key).is_some())
    }

    async fn session_grants_by_resource(
        &self,
        resource: &Resource,
    ) -> Result<Vec<SessionGrant>, Self::Error> {
        let store = self.read_store();
        let start = (resource.clone(), SessionId::new(""));
        let grants = store
            .session_grants
            .range(start..)
            .take_while(|((entry_resource, _), _)| entry_resource == resource)
            .map(|(_, grant)| grant.clone())
            .collect();
        Ok(grants)
    }

    async fn session_grants_by_session(
        &self,
        session: &SessionId,
    ) -> Result<Vec<SessionGrant>, Self::Error> {
        let store = self.read_store();
        let start = (session.clone(), Resource::new("", ""));
        let grants = store
            .grants_by_session
            .range(start..)
            .take_while(|(entry_session, _)| entry_session == session)
            .filter_map(|(entry_session, resource)| {
                store
                    .session_grants
                    .get(&(resource.clone(), entry_session.clone()))
                    .cloned()
            })
            .collect();
        Ok(grants)
    }

    async fn delete_session_grants_by_resource(
        &mut self,
        resource: &Resource,
    ) -> Result<usize, Self::Error> {
        let mut store = self.write_store();
        let start = (resource.clone(), SessionId::new(""));
        let keys: Vec<GrantKey> = store
            .session_grants
            .range(start..)
            .take_while(|((entry_resource, _), _)| entry_resource == resource)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            let _ = store.remove_session_grant(key);
        }

        Ok(keys.len())
    }

    async fn granted_resources(&self) -> Result<Vec<Resource>, Self::Error> {
        let store = self.read_store();
        let mut resources: BTreeSet<Resource> = BTreeSet::new();
        resources.extend(
            store
                .memberships_by_resource
                .iter()
                .map(|(resource, _)| resource.clone()),
        );
        resources.extend(
            store
                .session_grants
                .keys()
                .map(|(resource, _)| resource.clone()),
        );
        Ok(resources.into_iter().collect())
    }

    async fn get_or_create_session_info(
        &mut self,
        session: &SessionId,
    ) -> Result<PublicSessionInfo, Self::Error> {
        let mut store = self.write_store();
        let info = store
            .session_infos
            .entry(session.clone())
            .or_insert_with(|| PublicSessionInfo::new(session.clone()));
        Ok(info.clone())
    }

    async fn session_info(
        &self,
        session: &SessionId,
    ) -> Result<Option<PublicSessionInfo>, Self::Error> {
        Ok(self.read_store().session_infos.get(session).cloned())
    }

    async fn link_account(
        &mut self,
        session: &SessionId,
        account: &AccountId,
    ) -> Result<(), Self::Error> {
        let mut store = self.write_store();
        let info = store
            .session_infos
            .entry(session.clone())
            .or_insert_with(|| PublicSessionInfo::new(session.clone()));
        info.account = Some(account.clone());
        Ok(())
    }

    async fn unlink_account(&mut self, session: &SessionId) -> Result<(), Self::Error> {
        let mut store = self.write_store();
        if let Some(info) = store.session_infos.get_mut(session) {
            info.account = None;
        }
        Ok(())
    }

    async fn set_session_name(
        &mut self,
        session: &SessionId,
        name: Option<String>,
    ) -> Result<(), Self::Error> {
        let mut store = self.write_store();
        let info = store
            .session_infos
            .entry(session.clone())
            .or_insert_with(|| PublicSessionInfo::new(session.clone()));
        info.name = name;
        Ok(())
    }
}

impl PresenceStore for MemoryStore {
    type Error = Infallible;

    async fn presence(&self, key: &PresenceKey) -> Result<Option<PresenceState>, Self::Error> {
        Ok(self.read_store().presence.get(key).cloned())
    }

    async fn apply_presence(
        &mut self,
        key: &PresenceKey,
        target_online: bool,
        now: Timestamp,
    ) -> Result<Option<PresenceShift>, Self::Error> {
        let mut store = self.write_store();

        // Guard read under the same lock as the write: a transition that already happened
        // elsewhere turns this call into a no-op instead of a duplicate record.
        let current = store.presence.get(key);
        let Some((next, shift)) = presence::transition(current, target_online, now) else {
            return Ok(None);
        };

        store.presence.insert(key.clone(), next);
        if target_online {
            store.online.insert(key.clone());
        } else {
            store.online.remove(key);
        }

        Ok(Some(shift))
    }

    async fn apply_session_presence(
        &mut self,
        session: &SessionId,
        target_online: bool,
        now: Timestamp,
    ) -> Result<Option<PresenceShift>, Self::Error> {
        let mut store = self.write_store();

        let current = store.session_presence_state(session);
        let Some((next, shift)) = presence::transition(current.as_ref(), target_online, now)
        else {
            return Ok(None);
        };

        let info = store
            .session_infos
            .entry(session.clone())
            .or_insert_with(|| PublicSessionInfo::new(session.clone()));
        info.online = next.online;
        info.last_online = next.last_online;

        if target_online {
            store.online_sessions.insert(session.clone());
        } else {
            store.online_sessions.remove(session);
        }

        Ok(Some(shift))
    }

    async fn online_by_resource(&self, resource: &Resource) -> Result<Vec<Subject>, Self::Error> {
        let store = self.read_store();
        let start = PresenceKey {
            resource: resource.clone(),
            subject: Subject::Session(SessionId::new("")),
        };
        let subjects = store
            .online
            .range(start..)
            .take_while(|key| &key.resource == resource)
            .map(|key| key.subject.clone())
            .collect();
        Ok(subjects)
    }

    async fn sweep_all_offline(&mut self, now: Timestamp) -> Result<Vec<SweptRow>, Self::Error> {
        let mut store = self.write_store();
        let mut swept = Vec::new();

        let keys: Vec<PresenceKey> = store.online.iter().cloned().collect();
        for key in keys {
            // Re-check each row before its write, it may have transitioned since the scan.
            let current = store.presence.get(&key);
            let Some((next, shift)) = presence::go_offline(current, now) else {
                continue;
            };
            store.presence.insert(key.clone(), next);
            store.online.remove(&key);
            swept.push(SweptRow::Resource { key, shift });
        }

        let sessions: Vec<SessionId> = store.online_sessions.iter().cloned().collect();
        for session in sessions {
            let current = store.session_presence_state(&session);
            let Some((next, shift)) = presence::go_offline(current.as_ref(), now) else {
                continue;
            };
            if let Some(info) = store.session_infos.get_mut(&session) {
                info.online = next.online;
                info.last_online = next.last_online;
            }
            store.online_sessions.remove(&session);
            swept.push(SweptRow::Session { session, shift });
        }

        Ok(swept)
    }
}

impl SubscribeStore for MemoryStore {
    fn watch_policy(&self, resource: &Resource) -> ChangeReceiver<AccessPolicy> {
        self.write_store().policy_watchers.subscribe(resource.clone())
    }

    fn watch_membership(
        &self,
        account: &AccountId,
        resource: &Resource,
    ) -> ChangeReceiver<Membership> {
        self.write_store()
            .membership_watchers
            .subscribe((account.clone(), resource.clone()))
    }

    fn watch_session_grant(
        &self,
        session: &SessionId,
        resource: &Resource,
    ) -> ChangeReceiver<SessionGrant> {
        self.write_store()
            .grant_watchers
            .subscribe((session.clone(), resource.clone()))
    }

    fn watch_resource_grants(
        &self,
        resource: &Resource,
    ) -> tokio::sync::mpsc::UnboundedReceiver<ResourceGrantChange> {
        self.write_store()
            .resource_grant_watchers
            .subscribe(resource.clone())
    }
}

#[cfg(test)]
mod tests {
    use vestibule_core::{
        AccessPolicy, AccountId, Membership, PresenceKey, PresenceShift, Resource, Role,
        SessionGrant, SessionId, Subject,
    };

    use super::MemoryStore;
    use crate::traits::{AccessStore, PresenceStore, SubscribeStore, SweptRow};
    use crate::watch::ResourceGrantChange;

    fn policy(resource: &Resource) -> AccessPolicy {
        AccessPolicy {
            resource: resource.clone(),
            public_guest_role: Some(Role::Reader),
            public_user_role: None,
        }
    }

    fn grant(session: &str, resource: &Resource, role: Role) -> SessionGrant {
        SessionGrant {
            session: SessionId::new(session),
            resource: resource.clone(),
            role,
            public_info: SessionId::new(session),
        }
    }

    #[tokio::test]
    async fn policy_insert_is_create_only() {
        let mut store = MemoryStore::new();
        let resource = Resource::new("room", "1");

        assert!(store.insert_policy(&policy(&resource)).await.unwrap());
        assert!(!store.insert_policy(&policy(&resource)).await.unwrap());

        assert_eq!(store.policy(&resource).await.unwrap(), Some(policy(&resource)));
        assert!(store.delete_policy(&resource).await.unwrap());
        assert_eq!(store.policy(&resource).await.unwrap(), None);
    }

    #[tokio::test]
    async fn resource_prefix_scans_are_bounded() {
        let mut store = MemoryStore::new();
        let room_1 = Resource::new("room", "1");
        let room_2 = Resource::new("room", "2");

        store
            .insert_session_grant(&grant("s1", &room_1, Role::Reader))
            .await
            .unwrap();
        store
            .insert_session_grant(&grant("s2", &room_1, Role::Vip))
            .await
            .unwrap();
        store
            .insert_session_grant(&grant("s1", &room_2, Role::Reader))
            .await
            .unwrap();

        let grants = store.session_grants_by_resource(&room_1).await.unwrap();
        assert_eq!(grants.len(), 2);

        let grants = store
            .session_grants_by_session(&SessionId::new("s1"))
            .await
            .unwrap();
        assert_eq!(grants.len(), 2);

        let removed = store.delete_session_grants_by_resource(&room_1).await.unwrap();
        assert_eq!(removed, 2);
        assert!(
            store
                .session_grants_by_resource(&room_1)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store.session_grants_by_resource(&room_2).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn membership_scans_use_the_resource_index() {
        let mut store = MemoryStore::new();
        let room = Resource::new("room", "1");

        for account in ["u1", "u2"] {
            store
                .upsert_membership(&Membership {
                    account: AccountId::new(account),
                    resource: room.clone(),
                    role: Role::Reader,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.memberships_by_resource(&room).await.unwrap().len(), 2);
        assert_eq!(
            store
                .memberships_by_account(&AccountId::new("u1"))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(store.granted_resources().await.unwrap(), vec![room.clone()]);

        assert_eq!(store.delete_memberships_by_resource(&room).await.unwrap(), 2);
        assert!(store.granted_resources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn presence_guard_suppresses_duplicates() {
        let mut store = MemoryStore::new();
        let key = PresenceKey {
            resource: Resource::new("room", "1"),
            subject: Subject::Session(SessionId::new("s1")),
        };

        let shift = store.apply_presence(&key, true, 100).await.unwrap();
        assert_eq!(
            shift,
            Some(PresenceShift::CameOnline { offline_for: None })
        );

        // Duplicate signal: no transition, nothing to record.
        assert_eq!(store.apply_presence(&key, true, 200).await.unwrap(), None);

        let shift = store.apply_presence(&key, false, 400).await.unwrap();
        assert_eq!(
            shift,
            Some(PresenceShift::WentOffline {
                online_for: Some(300)
            })
        );
    }

    #[tokio::test]
    async fn sweep_covers_resource_rows_and_sessions() {
        let mut store = MemoryStore::new();
        let room = Resource::new("room", "1");
        let key = PresenceKey {
            resource: room.clone(),
            subject: Subject::Account(AccountId::new("u1")),
        };

        store.apply_presence(&key, true, 100).await.unwrap();
        store
            .apply_session_presence(&SessionId::new("s1"), true, 100)
            .await
            .unwrap();

        assert_eq!(store.online_by_resource(&room).await.unwrap().len(), 1);

        let swept = store.sweep_all_offline(600).await.unwrap();
        assert_eq!(swept.len(), 2);
        for row in &swept {
            let shift = match row {
                SweptRow::Resource { shift, .. } => shift,
                SweptRow::Session { shift, .. } => shift,
            };
            assert_eq!(
                shift,
                &PresenceShift::WentOffline {
                    online_for: Some(500)
                }
            );
        }

        // Everything is offline now, a second sweep visits nothing.
        assert!(store.sweep_all_offline(700).await.unwrap().is_empty());
        assert!(store.online_by_resource(&room).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watchers_observe_mutations_in_order() {
        let mut store = MemoryStore::new();
        let room = Resource::new("room", "1");
        let session = SessionId::new("s1");

        let mut grant_rx = store.watch_session_grant(&session, &room);
        let mut feed_rx = store.watch_resource_grants(&room);

        store
            .insert_session_grant(&grant("s1", &room, Role::Reader))
            .await
            .unwrap();
        store
            .set_session_grant_role(&session, &room, Role::Vip)
            .await
            .unwrap();
        store.delete_session_grant(&session, &room).await.unwrap();

        let created = grant_rx.try_recv().expect("should return Ok");
        assert_eq!(created.previous, None);
        assert_eq!(created.current.as_ref().map(|g| g.role), Some(Role::Reader));

        let updated = grant_rx.try_recv().expect("should return Ok");
        assert_eq!(updated.current.as_ref().map(|g| g.role), Some(Role::Vip));

        let removed = grant_rx.try_recv().expect("should return Ok");
        assert_eq!(removed.current, None);

        // The per-resource feed saw the same three changes.
        for _ in 0..3 {
            assert!(matches!(
                feed_rx.try_recv(),
                Ok(ResourceGrantChange::SessionGrant(_))
            ));
        }
    }
}
