use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchboard_server::{
    config::AppConfig,
    db,
    handlers, health,
    metrics::{self, MetricsRecorder},
    middleware::{
        idempotency::{idempotency_middleware, IdempotencyGate},
        request_id::request_id_middleware,
    },
    state::AppState,
    workers::{GraceReclaimer, IdempotencyReaper, WorkerSet},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Default to warn in production, debug in development
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            "debug".to_string()
        }

        #[cfg(not(debug_assertions))]
        {
            "warn".to_string()
        }
    });

    let filter = tracing_subscriber::EnvFilter::new(&log_level);
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("text") => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    tracing::info!("Starting Switchboard allocation engine");

    let metrics_recorder = MetricsRecorder::new();
    let metrics_handle = metrics_recorder.handle().clone();

    let config = AppConfig::from_env();
    let pool = db::init_db_default().await?;
    tracing::info!("Database initialized");

    // Background workers: grace reclaimer and idempotency reaper run on
    // every replica; skip-locked sweeps keep replicas from colliding.
    let mut workers = WorkerSet::new();
    let reclaimer = GraceReclaimer::new(
        pool.clone(),
        config.grace_reclaim_interval,
        config.grace_reclaim_batch_size,
    );
    workers.spawn("grace-reclaimer", reclaimer.run(workers.token()));
    let reaper = IdempotencyReaper::new(
        pool.clone(),
        config.idempotency_cleanup_interval,
        config.idempotency_cleanup_batch_size,
    );
    workers.spawn("idempotency-reaper", reaper.run(workers.token()));

    let app_state = AppState {
        pool: pool.clone(),
        config: config.clone(),
    };
    let gate = IdempotencyGate::new(pool.clone(), config.idempotency_ttl);

    let api = Router::new()
        .route("/allocate", post(handlers::allocate))
        .route("/claim", post(handlers::claim))
        .route("/resolve", post(handlers::resolve))
        .route("/deallocate", post(handlers::deallocate))
        .route("/reassign", post(handlers::reassign))
        .route("/move_inbox", post(handlers::move_inbox))
        .route("/operator/status", put(handlers::set_operator_status))
        .route(
            "/conversations",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route("/conversations/{id}", get(handlers::get_conversation))
        .route(
            "/conversations/{id}/message-received",
            post(handlers::message_received),
        )
        .route(
            "/conversations/{id}/labels/{label_id}",
            post(handlers::attach_label).delete(handlers::detach_label),
        )
        .route(
            "/labels",
            post(handlers::create_label).get(handlers::list_labels),
        )
        .route("/labels/{id}", delete(handlers::delete_label))
        .route("/tenants", post(handlers::create_tenant))
        .route("/tenant", get(handlers::get_tenant))
        .route("/tenant/weights", put(handlers::update_tenant_weights))
        .route(
            "/inboxes",
            post(handlers::create_inbox).get(handlers::list_inboxes),
        )
        .route("/operators", post(handlers::create_operator))
        .route(
            "/subscriptions",
            post(handlers::create_subscription).delete(handlers::delete_subscription),
        )
        .layer(axum::middleware::from_fn_with_state(
            gate,
            idempotency_middleware,
        ))
        .with_state(app_state.clone());

    // Only expose metrics when explicitly enabled
    let metrics_router = if matches!(
        std::env::var("ENABLE_METRICS").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    ) {
        Router::new()
            .route("/metrics", get(metrics::metrics_handler))
            .with_state(metrics_handle)
    } else {
        Router::new()
    };

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(app_state)
        .nest("/api/v1", api)
        .merge(metrics_router)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Shutdown order: stop workers, then stop intake, then close the pool.
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received; stopping workers");
            workers.shutdown().await;
        })
        .await?;

    pool.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
