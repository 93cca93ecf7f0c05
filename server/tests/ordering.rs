//! Allocation ordering and listing pagination.

mod common;

use switchboard_server::models::{ConversationState, OperatorRole};
use switchboard_server::pagination::{clamp_per_page, SortOrder};
use switchboard_server::store::conversations::{self, ConversationFilters};
use switchboard_server::{allocation, priority, store};

use common::*;

#[tokio::test]
async fn test_allocate_follows_priority_then_age_order() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;

    // Distinct message volumes give strictly distinct scores.
    let low = seed_conversation(&pool, &tenant, &inbox, 1, 2).await;
    let high = seed_conversation(&pool, &tenant, &inbox, 500, 2).await;
    let mid = seed_conversation(&pool, &tenant, &inbox, 30, 2).await;

    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &op, &inbox).await;
    make_available(&pool, &op).await;
    let caller = caller_for(&op);

    let first = allocation::allocate(&pool, &caller).await.unwrap();
    let second = allocation::allocate(&pool, &caller).await.unwrap();
    let third = allocation::allocate(&pool, &caller).await.unwrap();

    assert_eq!(first.id, high.id, "highest score first");
    assert_eq!(second.id, mid.id);
    assert_eq!(third.id, low.id);

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_equal_scores_break_ties_by_oldest_message_then_id() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    // Age-only scoring; conversations older than a day all saturate at 1.0.
    let tenant = create_tenant(&pool, "0.0", "1.0").await;
    let inbox = create_inbox(&pool, &tenant).await;

    let newer = seed_conversation(&pool, &tenant, &inbox, 1, 30).await;
    let older = seed_conversation(&pool, &tenant, &inbox, 1, 48).await;
    assert_eq!(newer.priority_score, older.priority_score);

    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &op, &inbox).await;
    make_available(&pool, &op).await;

    let first = allocation::allocate(&pool, &caller_for(&op)).await.unwrap();
    assert_eq!(first.id, older.id, "older last_message_at wins the tie");

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_weight_update_flips_allocation_order() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.9", "0.1").await;
    let inbox = create_inbox(&pool, &tenant).await;

    let busy_fresh = seed_conversation(&pool, &tenant, &inbox, 100, 1).await;
    let quiet_stale = seed_conversation(&pool, &tenant, &inbox, 1, 23).await;

    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &op, &inbox).await;
    make_available(&pool, &op).await;
    let caller = caller_for(&op);

    // Volume-heavy weights: the busy conversation goes first.
    let first = allocation::allocate(&pool, &caller).await.unwrap();
    assert_eq!(first.id, busy_fresh.id);

    // Put it back, flip the weights, recompute the backlog.
    let manager = create_operator(&pool, &tenant, OperatorRole::Manager).await;
    switchboard_server::lifecycle::deallocate(&pool, &caller_for(&manager), first.id)
        .await
        .unwrap();

    let tenant = store::tenants::update_weights(
        &pool,
        tenant.id,
        "0.1".parse().unwrap(),
        "0.9".parse().unwrap(),
    )
    .await
    .unwrap();
    priority::recompute_queued_scores(&pool, &tenant).await.unwrap();

    // Age-heavy weights: now the stale conversation goes first.
    let first = allocation::allocate(&pool, &caller).await.unwrap();
    assert_eq!(first.id, quiet_stale.id);

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_listing_pagination_is_exact_and_complete() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;

    for i in 0..7 {
        seed_conversation(&pool, &tenant, &inbox, i + 1, i as i64 + 1).await;
    }

    // Page through with per_page = 3: 3 + 3 + 1, has_more exact at each step.
    let mut seen = Vec::new();
    let mut cursor = None;
    let mut pages = 0;
    loop {
        let filters = ConversationFilters {
            sort: SortOrder::Newest,
            cursor: cursor.clone(),
            per_page: clamp_per_page(Some(3)),
            ..ConversationFilters::default()
        };
        let (rows, has_more) = conversations::list_with_filters(&pool, tenant.id, &filters)
            .await
            .unwrap();
        pages += 1;
        for row in &rows {
            seen.push(row.id);
        }
        if !has_more {
            assert!(rows.len() <= 3);
            break;
        }
        assert_eq!(rows.len(), 3, "full page when more rows exist");
        cursor = rows.last().map(|r| conversations::cursor_for(r, SortOrder::Newest));
    }

    assert_eq!(pages, 3);
    assert_eq!(seen.len(), 7, "no row skipped");
    let mut deduped = seen.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), 7, "no row repeated");

    // Newest-first means descending last_message_at across the walk.
    let mut prev: Option<chrono::DateTime<chrono::Utc>> = None;
    for id in &seen {
        let conv = fetch_conversation(&pool, tenant.id, *id).await;
        if let Some(p) = prev {
            assert!(conv.last_message_at <= p);
        }
        prev = Some(conv.last_message_at);
    }

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_listing_priority_sort_paginates_without_gaps() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;

    for i in 0..6 {
        seed_conversation(&pool, &tenant, &inbox, (i * 37) % 200, (i as i64) % 5 + 1).await;
    }

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let filters = ConversationFilters {
            sort: SortOrder::Priority,
            cursor: cursor.clone(),
            per_page: 2,
            ..ConversationFilters::default()
        };
        let (rows, has_more) = conversations::list_with_filters(&pool, tenant.id, &filters)
            .await
            .unwrap();
        for row in &rows {
            seen.push((row.priority_score, row.id));
        }
        if !has_more {
            break;
        }
        cursor = rows.last().map(|r| conversations::cursor_for(r, SortOrder::Priority));
    }

    assert_eq!(seen.len(), 6);
    for pair in seen.windows(2) {
        assert!(pair[0].0 >= pair[1].0, "scores never increase down the walk");
    }

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_operator_listing_restricted_to_subscriptions() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox_a = create_inbox(&pool, &tenant).await;
    let inbox_b = create_inbox(&pool, &tenant).await;

    seed_conversation(&pool, &tenant, &inbox_a, 1, 1).await;
    let in_b = seed_conversation(&pool, &tenant, &inbox_b, 1, 1).await;

    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &op, &inbox_b).await;

    let visible = store::operators::subscription_inboxes(&pool, op.id).await.unwrap();
    let filters = ConversationFilters {
        visible_inboxes: Some(visible),
        sort: SortOrder::Newest,
        per_page: 50,
        ..ConversationFilters::default()
    };
    let (rows, has_more) = conversations::list_with_filters(&pool, tenant.id, &filters)
        .await
        .unwrap();

    assert!(!has_more);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, in_b.id);

    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_listing_filters_by_state_and_tenant() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let other = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;
    let other_inbox = create_inbox(&pool, &other).await;

    let queued = seed_conversation(&pool, &tenant, &inbox, 1, 1).await;
    seed_conversation(&pool, &other, &other_inbox, 1, 1).await;

    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &op, &inbox).await;
    make_available(&pool, &op).await;
    let allocated = allocation::allocate(&pool, &caller_for(&op)).await.unwrap();
    assert_eq!(allocated.id, queued.id);

    let filters = ConversationFilters {
        state: Some(ConversationState::Allocated),
        sort: SortOrder::Newest,
        per_page: 50,
        ..ConversationFilters::default()
    };
    let (rows, _) = conversations::list_with_filters(&pool, tenant.id, &filters)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, queued.id);

    // The other tenant's listing never shows this tenant's rows.
    let filters = ConversationFilters {
        sort: SortOrder::Newest,
        per_page: 50,
        ..ConversationFilters::default()
    };
    let (rows, _) = conversations::list_with_filters(&pool, other.id, &filters)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_ne!(rows[0].id, queued.id);

    cleanup_tenant(&pool, other.id).await;
    cleanup_tenant(&pool, tenant.id).await;
}

#[tokio::test]
async fn test_requeued_conversation_is_immediately_allocatable() {
    let Ok(_) = std::env::var("TEST_DATABASE_URL") else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };

    let pool = setup_pool().await;
    let tenant = create_tenant(&pool, "0.5", "0.5").await;
    let inbox = create_inbox(&pool, &tenant).await;
    let conv = seed_conversation(&pool, &tenant, &inbox, 5, 2).await;

    let op = create_operator(&pool, &tenant, OperatorRole::Operator).await;
    subscribe(&pool, &op, &inbox).await;
    make_available(&pool, &op).await;
    let manager = create_operator(&pool, &tenant, OperatorRole::Manager).await;

    let got = allocation::allocate(&pool, &caller_for(&op)).await.unwrap();
    assert_eq!(got.id, conv.id);

    switchboard_server::lifecycle::deallocate(&pool, &caller_for(&manager), conv.id)
        .await
        .unwrap();

    let got = allocation::allocate(&pool, &caller_for(&op))
        .await
        .expect("requeued row is eligible again");
    assert_eq!(got.id, conv.id);

    cleanup_tenant(&pool, tenant.id).await;
}
