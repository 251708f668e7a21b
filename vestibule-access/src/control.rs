// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing::{debug, warn};
use vestibule_core::{
    AccessPolicy, AccountId, Actor, EffectiveStatus, Membership, PublicSessionInfo, Resource,
    Role, SessionGrant, SessionId, combine, effective_status,
};
use vestibule_store::AccessStore;

use crate::error::AccessError;

/// The access directory and grant lifecycle over one store.
///
/// Owns every mutation of policies, memberships and session grants. All reads and writes go
/// through the store's per-key read-modify-write discipline; the control layer itself holds no
/// state besides the store handle.
#[derive(Clone, Debug)]
pub struct AccessControl<S> {
    store: S,
}

impl<S> AccessControl<S>
where
    S: AccessStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create the access policy of a resource and seed its initial grants.
    ///
    /// Fails with [`AccessError::AlreadyExists`] when the resource already has a policy. Each
    /// initial session grant resolves (or lazily creates) the session's public record first.
    pub async fn create_policy(
        &mut self,
        resource: Resource,
        public_user_role: Option<Role>,
        public_guest_role: Option<Role>,
        initial_members: Vec<(AccountId, Role)>,
        initial_session_grants: Vec<(SessionId, Role)>,
    ) -> Result<AccessPolicy, AccessError<S::Error>> {
        let policy = AccessPolicy {
            resource: resource.clone(),
            public_guest_role,
            public_user_role,
        };

        let inserted = self
            .store
            .insert_policy(&policy)
            .await
            .map_err(AccessError::Store)?;
        if !inserted {
            return Err(AccessError::AlreadyExists);
        }

        for (account, role) in initial_members {
            self.store
                .upsert_membership(&Membership {
                    account,
                    resource: resource.clone(),
                    role,
                })
                .await
                .map_err(AccessError::Store)?;
        }

        for (session, role) in initial_session_grants {
            let info = self
                .store
                .get_or_create_session_info(&session)
                .await
                .map_err(AccessError::Store)?;
            self.store
                .insert_session_grant(&SessionGrant {
                    session,
                    resource: resource.clone(),
                    role,
                    public_info: info.session,
                })
                .await
                .map_err(AccessError::Store)?;
        }

        Ok(policy)
    }

    /// Get the access policy of a resource.
    pub async fn policy(&self, resource: &Resource) -> Result<AccessPolicy, AccessError<S::Error>> {
        self.store
            .policy(resource)
            .await
            .map_err(AccessError::Store)?
            .ok_or(AccessError::NotFound)
    }

    /// Tear down a resource's policy, cascading deletion of all its grants.
    ///
    /// Grants are removed before the policy so a failure part-way leaves a policy with fewer
    /// grants rather than grants pointing at a vanished policy. Whatever still slips through is
    /// picked up by [`Self::reconcile_orphans`].
    pub async fn delete_policy(&mut self, resource: &Resource) -> Result<(), AccessError<S::Error>> {
        let memberships = self
            .store
            .delete_memberships_by_resource(resource)
            .await
            .map_err(AccessError::Store)?;
        let session_grants = self
            .store
            .delete_session_grants_by_resource(resource)
            .await
            .map_err(AccessError::Store)?;
        debug!(%resource, memberships, session_grants, "cascaded grant deletion");

        let removed = self
            .store
            .delete_policy(resource)
            .await
            .map_err(AccessError::Store)?;
        if !removed {
            return Err(AccessError::NotFound);
        }

        Ok(())
    }

    /// Join a resource through its public policy.
    ///
    /// The entry role is the public user role for authenticated actors (falling back to the
    /// guest role), or the guest role for anonymous ones. Fails with
    /// [`AccessError::AlreadyJoined`] when the actor already holds any grant here and with
    /// [`AccessError::AccessDenied`] when no entry role is available for its identity class.
    pub async fn join(
        &mut self,
        actor: &Actor,
        resource: &Resource,
    ) -> Result<Role, AccessError<S::Error>> {
        let policy = self
            .store
            .policy(resource)
            .await
            .map_err(AccessError::Store)?
            .ok_or(AccessError::NotFound)?;

        let membership = match &actor.account {
            Some(account) => self
                .store
                .membership(account, resource)
                .await
                .map_err(AccessError::Store)?,
            None => None,
        };
        let session_grant = self
            .store
            .session_grant(&actor.session, resource)
            .await
            .map_err(AccessError::Store)?;
        if membership.is_some() || session_grant.is_some() {
            return Err(AccessError::AlreadyJoined);
        }

        let entry_role = match &actor.account {
            Some(_) => policy.public_user_role.or(policy.public_guest_role),
            None => policy.public_guest_role,
        };
        let Some(role) = entry_role else {
            return Err(AccessError::AccessDenied);
        };

        match &actor.account {
            Some(account) => {
                self.store
                    .upsert_membership(&Membership {
                        account: account.clone(),
                        resource: resource.clone(),
                        role,
                    })
                    .await
                    .map_err(AccessError::Store)?;
            }
            None => {
                let info = self
                    .store
                    .get_or_create_session_info(&actor.session)
                    .await
                    .map_err(AccessError::Store)?;
                self.store
                    .insert_session_grant(&SessionGrant {
                        session: actor.session.clone(),
                        resource: resource.clone(),
                        role,
                        public_info: info.session,
                    })
                    .await
                    .map_err(AccessError::Store)?;
            }
        }

        Ok(role)
    }

    /// Leave a resource, removing whichever grant the actor holds on it.
    pub async fn leave(
        &mut self,
        actor: &Actor,
        resource: &Resource,
    ) -> Result<(), AccessError<S::Error>> {
        let mut removed = false;
        if let Some(account) = &actor.account {
            removed |= self
                .store
                .delete_membership(account, resource)
                .await
                .map_err(AccessError::Store)?;
        }
        removed |= self
            .store
            .delete_session_grant(&actor.session, resource)
            .await
            .map_err(AccessError::Store)?;

        if !removed {
            return Err(AccessError::NotMember);
        }

        Ok(())
    }

    /// Replace the role of an existing session grant.
    pub async fn change_grant_role(
        &mut self,
        session: &SessionId,
        resource: &Resource,
        role: Role,
    ) -> Result<(), AccessError<S::Error>> {
        let updated = self
            .store
            .set_session_grant_role(session, resource, role)
            .await
            .map_err(AccessError::Store)?;
        if !updated {
            return Err(AccessError::NotMember);
        }

        Ok(())
    }

    /// Convert every session grant of `session` into a membership for `account`.
    ///
    /// The membership role is the higher rank of the resource's public user role, the grant's
    /// role and any membership the account already holds there. Grants are removed afterwards,
    /// so re-running the migration for a drained session is a no-op.
    pub async fn migrate_on_login(
        &mut self,
        session: &SessionId,
        account: &AccountId,
    ) -> Result<usize, AccessError<S::Error>> {
        let grants = self
            .store
            .session_grants_by_session(session)
            .await
            .map_err(AccessError::Store)?;

        for grant in &grants {
            self.merge_membership(account, grant).await?;
            self.store
                .delete_session_grant(session, &grant.resource)
                .await
                .map_err(AccessError::Store)?;
        }

        Ok(grants.len())
    }

    /// Same merge as [`Self::migrate_on_login`] but the session grants are kept.
    ///
    /// Used by the provisional registration flow, where a membership and a session grant
    /// coexist until the registration is confirmed.
    pub async fn migrate_on_register_start(
        &mut self,
        session: &SessionId,
        account: &AccountId,
    ) -> Result<usize, AccessError<S::Error>> {
        let grants = self
            .store
            .session_grants_by_session(session)
            .await
            .map_err(AccessError::Store)?;

        for grant in &grants {
            self.merge_membership(account, grant).await?;
        }

        Ok(grants.len())
    }

    /// Handle a login event: migrate the session's grants and link the account on the
    /// session's public record.
    pub async fn on_login(
        &mut self,
        account: &AccountId,
        session: &SessionId,
    ) -> Result<(), AccessError<S::Error>> {
        self.migrate_on_login(session, account).await?;
        self.store
            .link_account(session, account)
            .await
            .map_err(AccessError::Store)?;
        Ok(())
    }

    /// Handle a logout event: detach the account from the session's public record.
    pub async fn on_logout(
        &mut self,
        _account: &AccountId,
        session: &SessionId,
    ) -> Result<(), AccessError<S::Error>> {
        self.store
            .unlink_account(session)
            .await
            .map_err(AccessError::Store)
    }

    /// Handle the start of a registration: provisional migration, grants kept.
    pub async fn on_register_start(
        &mut self,
        account: &AccountId,
        session: &SessionId,
    ) -> Result<(), AccessError<S::Error>> {
        self.migrate_on_register_start(session, account).await?;
        Ok(())
    }

    /// The public record of a session, created lazily on first use.
    pub async fn public_session_info(
        &mut self,
        session: &SessionId,
    ) -> Result<PublicSessionInfo, AccessError<S::Error>> {
        self.store
            .get_or_create_session_info(session)
            .await
            .map_err(AccessError::Store)
    }

    /// Set or clear the display name on a session's public record.
    pub async fn set_session_name(
        &mut self,
        session: &SessionId,
        name: Option<String>,
    ) -> Result<(), AccessError<S::Error>> {
        self.store
            .set_session_name(session, name)
            .await
            .map_err(AccessError::Store)
    }

    /// One-shot computation of an actor's effective status on a resource.
    pub async fn status(
        &self,
        actor: &Actor,
        resource: &Resource,
    ) -> Result<EffectiveStatus, AccessError<S::Error>> {
        let policy = self
            .store
            .policy(resource)
            .await
            .map_err(AccessError::Store)?;
        let membership = match &actor.account {
            Some(account) => self
                .store
                .membership(account, resource)
                .await
                .map_err(AccessError::Store)?,
            None => None,
        };
        let session_grant = self
            .store
            .session_grant(&actor.session, resource)
            .await
            .map_err(AccessError::Store)?;

        Ok(effective_status(
            policy.as_ref(),
            membership.as_ref(),
            session_grant.as_ref(),
            actor,
        ))
    }

    /// Whether the actor's effective role on the resource ranks at least `required`.
    pub async fn can(
        &self,
        actor: &Actor,
        resource: &Resource,
        required: Role,
    ) -> Result<bool, AccessError<S::Error>> {
        let status = self.status(actor, resource).await?;
        Ok(status.role.is_some_and(|role| role >= required))
    }

    /// All memberships on a resource.
    pub async fn members(
        &self,
        resource: &Resource,
    ) -> Result<Vec<Membership>, AccessError<S::Error>> {
        self.store
            .memberships_by_resource(resource)
            .await
            .map_err(AccessError::Store)
    }

    /// All session grants on a resource.
    pub async fn session_grants(
        &self,
        resource: &Resource,
    ) -> Result<Vec<SessionGrant>, AccessError<S::Error>> {
        self.store
            .session_grants_by_resource(resource)
            .await
            .map_err(AccessError::Store)
    }

    /// Every resource a session currently holds a grant on.
    pub async fn resources_of_session(
        &self,
        session: &SessionId,
    ) -> Result<Vec<Resource>, AccessError<S::Error>> {
        let grants = self
            .store
            .session_grants_by_session(session)
            .await
            .map_err(AccessError::Store)?;
        Ok(grants.into_iter().map(|grant| grant.resource).collect())
    }

    /// Remove grants whose policy no longer exists.
    ///
    /// A cascade that failed part-way violates the no-orphan-grants goal; this sweep repairs
    /// it and reports how many records were cleaned up.
    pub async fn reconcile_orphans(&mut self) -> Result<usize, AccessError<S::Error>> {
        let mut removed = 0;

        for resource in self
            .store
            .granted_resources()
            .await
            .map_err(AccessError::Store)?
        {
            let policy = self
                .store
                .policy(&resource)
                .await
                .map_err(AccessError::Store)?;
            if policy.is_some() {
                continue;
            }

            let memberships = self
                .store
                .delete_memberships_by_resource(&resource)
                .await
                .map_err(AccessError::Store)?;
            let session_grants = self
                .store
                .delete_session_grants_by_resource(&resource)
                .await
                .map_err(AccessError::Store)?;
            warn!(
                %resource,
                memberships, session_grants, "removed grants orphaned by a missing policy"
            );
            removed += memberships + session_grants;
        }

        Ok(removed)
    }

    async fn merge_membership(
        &mut self,
        account: &AccountId,
        grant: &SessionGrant,
    ) -> Result<(), AccessError<S::Error>> {
        let policy = self
            .store
            .policy(&grant.resource)
            .await
            .map_err(AccessError::Store)?;
        let existing = self
            .store
            .membership(account, &grant.resource)
            .await
            .map_err(AccessError::Store)?;

        let role = combine(
            combine(
                existing.map(|membership| membership.role),
                policy.and_then(|policy| policy.public_user_role),
            ),
            Some(grant.role),
        )
        .unwrap_or(grant.role);

        self.store
            .upsert_membership(&Membership {
                account: account.clone(),
                resource: grant.resource.clone(),
                role,
            })
            .await
            .map_err(AccessError::Store)?;

        Ok(())
    }
}
