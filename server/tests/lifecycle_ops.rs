//! State machine and role gates for resolve / deallocate / reassign /
//! move_inbox.

mod common;

use switchboard_server::error::AllocationError;
use switchboard_server::models::{ConversationState, OperatorRole};
use switchboard_server::{allocation, lifecycle};
use uuid::Uuid;

use common::*;

#[tokio::test]
async fn test_resolve_owner_and_supervisor_paths() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;
    let owner = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &owner, &inbox).await;
    make_available(&pool, &owner).await;

    seed_conversation(&pool, &tenant, &inbox, 2, 1).await;
    let conv = allocation::allocate(&pool, &caller_for(&owner)).await.unwrap();

    // A stranger with OPERATOR role cannot resolve someone else's work.
    let stranger = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    let err = lifecycle::resolve(&pool, &caller_for(&stranger), conv.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InsufficientPermissions { .. }));

    // The owner can.
    let resolved = lifecycle::resolve(&pool, &caller_for(&owner), conv.id)
        .await
        .unwrap();
    assert_eq!(resolved.state, ConversationState::Resolved);
    assert!(resolved.resolved_at.is_some());

    // Resolving again reports success without touching the row.
    let again = lifecycle::resolve(&pool, &caller_for(&owner), conv.id)
        .await
        .unwrap();
    assert_eq!(again.resolved_at, resolved.resolved_at);

    // RESOLVED is terminal: no path back to the queue.
    let manager = create_operator(&pool, &tenant, OperatorRole::Manager).await;
    let err = lifecycle::deallocate(&pool, &caller_for(&manager), conv.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::ConversationNotAllocated { .. }));

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_resolve_requires_allocated_state() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;
    let conv = seed_conversation(&pool, &tenant, &inbox, 2, 1).await;
    let manager = create_operator(&pool, &tenant, OperatorRole::Manager).await;

    let err = lifecycle::resolve(&pool, &caller_for(&manager), conv.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AllocationError::ConversationNotAllocated {
            state: ConversationState::Queued
        }
    ));

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_deallocate_role_gate_fires_before_lookup() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;

    // Nonexistent conversation: an OPERATOR still gets the permission
    // error, proving the gate precedes any state read.
    let err = lifecycle::deallocate(&pool, &caller_for(&op), Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InsufficientPermissions { .. }));

    let err = lifecycle::reassign(&pool, &caller_for(&op), Uuid::now_v7(), Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InsufficientPermissions { .. }));

    let err = lifecycle::move_inbox(&pool, &caller_for(&op), Uuid::now_v7(), Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InsufficientPermissions { .. }));

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_deallocate_returns_row_to_queue() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;
    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &op, &inbox).await;
    make_available(&pool, &op).await;
    let manager = create_operator(&pool, &tenant, OperatorRole::Manager).await;

    seed_conversation(&pool, &tenant, &inbox, 2, 1).await;
    let conv = allocation::allocate(&pool, &caller_for(&op)).await.unwrap();

    let queued = lifecycle::deallocate(&pool, &caller_for(&manager), conv.id)
        .await
        .unwrap();
    assert_eq!(queued.state, ConversationState::Queued);
    assert!(queued.assigned_operator_id.is_none());
    assert!(queued.resolved_at.is_none());

    // Idempotent on re-submission.
    let again = lifecycle::deallocate(&pool, &caller_for(&manager), conv.id)
        .await
        .unwrap();
    assert_eq!(again.state, ConversationState::Queued);

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_reassign_validates_target_operator() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;
    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &op, &inbox).await;
    make_available(&pool, &op).await;
    let manager = create_operator(&pool, &tenant, OperatorRole::Manager).await;

    seed_conversation(&pool, &tenant, &inbox, 2, 1).await;
    let conv = allocation::allocate(&pool, &caller_for(&op)).await.unwrap();

    // Unknown target operator.
    let err = lifecycle::reassign(&pool, &caller_for(&manager), conv.id, Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::OperatorNotFound { .. }));

    // Target exists but is not subscribed to the conversation's inbox.
    let unsubscribed = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    let err = lifecycle::reassign(&pool, &caller_for(&manager), conv.id, unsubscribed.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::OperatorNotSubscribed { .. }));

    // An operator from another tenant reads as not found.
    let foreign_tenant = create_tenant(&pool, "0.5", "0.5").await;
    let foreign = create_operator(&pool, &foreign_tenant, OperatorRole::Operator).await;
    let err = lifecycle::reassign(&pool, &caller_for(&manager), conv.id, foreign.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::OperatorNotFound { .. }));

    // Valid target takes over.
    let target = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &target, &inbox).await;
    let moved = lifecycle::reassign(&pool, &caller_for(&manager), conv.id, target.id)
        .await
        .unwrap();
    assert_eq!(moved.state, ConversationState::Allocated);
    assert_eq!(moved.assigned_operator_id, Some(target.id));

    cleanup_tenant(&pool, foreign_tenant.id).await;
    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_move_inbox_paths() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox_a = create_inbox(&pool, &tenant).await;
    let inbox_b = create_inbox(&pool, &tenant).await;
    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &op, &inbox_a).await;
    make_available(&pool, &op).await;
    let manager = create_operator(&pool, &tenant, OperatorRole::Manager).await;

    seed_conversation(&pool, &tenant, &inbox_a, 2, 1).await;
    let conv = allocation::allocate(&pool, &caller_for(&op)).await.unwrap();

    // Unknown inbox.
    let err = lifecycle::move_inbox(&pool, &caller_for(&manager), conv.id, Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InboxNotFound { .. }));

    // Inbox of another tenant.
    let foreign_tenant = create_tenant(&pool, "0.5", "0.5").await;
    let foreign_inbox = create_inbox(&pool, &foreign_tenant).await;
    let err = lifecycle::move_inbox(&pool, &caller_for(&manager), conv.id, foreign_inbox.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InboxDifferentTenant));

    // Owner is not subscribed to inbox B: the move auto-deallocates.
    let moved = lifecycle::move_inbox(&pool, &caller_for(&manager), conv.id, inbox_b.id)
        .await
        .unwrap();
    assert_eq!(moved.inbox_id, inbox_b.id);
    assert_eq!(moved.state, ConversationState::Queued);
    assert!(moved.assigned_operator_id.is_none());

    // Subscribed owner keeps the conversation across a move.
    subscribe(&pool, &op, &inbox_b).await;
    let conv2 = allocation::allocate(&pool, &caller_for(&op)).await.unwrap();
    assert_eq!(conv2.id, conv.id);
    subscribe(&pool, &op, &inbox_a).await;
    let moved = lifecycle::move_inbox(&pool, &caller_for(&manager), conv.id, inbox_a.id)
        .await
        .unwrap();
    assert_eq!(moved.inbox_id, inbox_a.id);
    assert_eq!(moved.state, ConversationState::Allocated);
    assert_eq!(moved.assigned_operator_id, Some(op.id));

    // Moving to the current inbox is a no-op.
    let same = lifecycle::move_inbox(&pool, &caller_for(&manager), conv.id, inbox_a.id)
        .await
        .unwrap();
    assert_eq!(same.updated_at, moved.updated_at);

    cleanup_tenant(&pool, foreign_tenant.id).await;
    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_tenant_isolation_on_lifecycle_ops() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;
    let conv = seed_conversation(&pool, &tenant, &inbox, 2, 1).await;

    let other = create_tenant(&pool, "0.5", "0.5").await;
    let other_admin = create_operator(&pool, &other, OperatorRole::Admin).await;

    // A supervisor in another tenant sees nothing, not a permission error.
    let err = lifecycle::resolve(&pool, &caller_for(&other_admin), conv.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::NotFound { .. }));
    let err = lifecycle::deallocate(&pool, &caller_for(&other_admin), conv.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::NotFound { .. }));

    cleanup_tenant(&pool, other.id).await;
    cleanup_tenant(&pool, tenant.id).await;
}
