// SPDX-License-Identifier: MIT OR Apache-2.0

use vestibule_core::{
    AccessPolicy, Actor, EffectiveStatus, Membership, Resource, SessionGrant, effective_status,
};
use vestibule_store::{AccessStore, Change, ChangeReceiver, SubscribeStore};

/// A live feed of one actor's effective status on one resource.
///
/// Recomputation is triggered by a change notification on any of the three source records:
/// policy, membership (authenticated actors only) and session grant. A recomputed status is
/// yielded only when it differs structurally from the previously yielded one; everything else
/// is suppressed. The subscription tolerates observing a state pre- or post-mutation, it only
/// guarantees convergence to the latest state.
pub struct StatusSubscription {
    actor: Actor,
    policy: Option<AccessPolicy>,
    membership: Option<Membership>,
    session_grant: Option<SessionGrant>,
    policy_rx: ChangeReceiver<AccessPolicy>,
    membership_rx: Option<ChangeReceiver<Membership>>,
    grant_rx: ChangeReceiver<SessionGrant>,
    last: Option<EffectiveStatus>,
}

impl StatusSubscription {
    /// Subscribe to the status of `actor` on `resource`.
    ///
    /// The change streams are registered before the initial read: a mutation racing the
    /// snapshot is re-delivered afterwards and collapses into the same recomputed status.
    pub async fn subscribe<S>(
        store: &S,
        actor: Actor,
        resource: &Resource,
    ) -> Result<Self, S::Error>
    where
        S: AccessStore + SubscribeStore,
    {
        let policy_rx = store.watch_policy(resource);
        let membership_rx = actor
            .account
            .as_ref()
            .map(|account| store.watch_membership(account, resource));
        let grant_rx = store.watch_session_grant(&actor.session, resource);

        let policy = store.policy(resource).await?;
        let membership = match &actor.account {
            Some(account) => store.membership(account, resource).await?,
            None => None,
        };
        let session_grant = store.session_grant(&actor.session, resource).await?;

        Ok(Self {
            actor,
            policy,
            membership,
            session_grant,
            policy_rx,
            membership_rx,
            grant_rx,
            last: None,
        })
    }

    /// The next effective status differing from the previously yielded one.
    ///
    /// The first call yields the current status immediately. Returns `None` once the store
    /// closed all change streams, after draining any queued changes.
    pub async fn recv(&mut self) -> Option<EffectiveStatus> {
        if self.last.is_none() {
            let status = self.compute();
            self.last = Some(status.clone());
            return Some(status);
        }

        loop {
            tokio::select! {
                change = self.policy_rx.recv() => match change {
                    Some(change) => self.policy = change.current,
                    None => return None,
                },
                change = recv_membership(&mut self.membership_rx) => match change {
                    Some(change) => self.membership = change.current,
                    None => return None,
                },
                change = self.grant_rx.recv() => match change {
                    Some(change) => self.session_grant = change.current,
                    None => return None,
                },
            }

            let status = self.compute();
            if self.last.as_ref() != Some(&status) {
                self.last = Some(status.clone());
                return Some(status);
            }
        }
    }

    fn compute(&self) -> EffectiveStatus {
        effective_status(
            self.policy.as_ref(),
            self.membership.as_ref(),
            self.session_grant.as_ref(),
            &self.actor,
        )
    }
}

/// Anonymous actors carry no membership stream; their branch never resolves.
async fn recv_membership(
    rx: &mut Option<ChangeReceiver<Membership>>,
) -> Option<Change<Membership>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
