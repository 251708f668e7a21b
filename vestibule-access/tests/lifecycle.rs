// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end lifecycle of one resource: creation, anonymous join, status feed, login
//! migration and cascading teardown, exercised through the public API only.

use assert_matches::assert_matches;
use vestibule_access::{AccessControl, AccessError, StatusSubscription};
use vestibule_core::{AccountId, Actor, Resource, Role, SessionId};
use vestibule_store::MemoryStore;

#[tokio::test]
async fn anonymous_visitor_becomes_a_member() {
    let store = MemoryStore::new();
    let mut control = AccessControl::new(store.clone());

    let room = Resource::new("room", "1");
    control
        .create_policy(
            room.clone(),
            Some(Role::Reader),
            Some(Role::Reader),
            vec![(AccountId::new("host"), Role::Owner)],
            vec![],
        )
        .await
        .unwrap();

    // An anonymous visitor joins through the public guest role and watches their status.
    let session = SessionId::new("s1");
    let visitor = Actor::anonymous(session.clone());
    let role = control.join(&visitor, &room).await.unwrap();
    assert_eq!(role, Role::Reader);

    let mut status_rx = StatusSubscription::subscribe(&store, visitor.clone(), &room)
        .await
        .unwrap();
    let status = status_rx.recv().await.expect("should yield");
    assert!(status.joined);
    assert_eq!(status.role, Some(Role::Reader));

    // A moderator upgrade on the session grant reaches the feed.
    control
        .change_grant_role(&session, &room, Role::Moderator)
        .await
        .unwrap();
    let status = status_rx.recv().await.expect("should yield");
    assert_eq!(status.role, Some(Role::Moderator));
    assert_eq!(status.level, 4);

    // The visitor signs up. Their session grant migrates into a membership at the higher
    // rank and the session's public record is linked to the account.
    let account = AccountId::new("u1");
    control.on_login(&account, &session).await.unwrap();

    let members = control.members(&room).await.unwrap();
    assert_eq!(members.len(), 2);
    let migrated = members
        .iter()
        .find(|membership| membership.account == account)
        .expect("membership exists");
    assert_eq!(migrated.role, Role::Moderator);
    assert!(control.session_grants(&room).await.unwrap().is_empty());

    // From the authenticated point of view the membership carries the status now.
    let member = Actor::authenticated(session.clone(), account.clone());
    let status = control.status(&member, &room).await.unwrap();
    assert!(status.joined);
    assert_eq!(status.role, Some(Role::Moderator));

    // The resource is torn down; nothing grant-shaped survives.
    control.delete_policy(&room).await.unwrap();
    assert_matches!(control.policy(&room).await, Err(AccessError::NotFound));
    assert!(control.members(&room).await.unwrap().is_empty());
    assert_eq!(control.reconcile_orphans().await.unwrap(), 0);

    assert_matches!(
        control.join(&Actor::anonymous(SessionId::new("s2")), &room).await,
        Err(AccessError::NotFound)
    );
}
