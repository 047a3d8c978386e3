use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use checkin_core::schedule::ScheduleMatcher;

mod analysis;
mod auth;
mod config;
mod error;
mod extract;
mod guard;
mod initiator;
mod middleware;
mod reconciler;
mod routes;
mod scheduler;
mod signature;
mod state;
mod store;

use crate::analysis::{AnalysisQueue, TranscriptAnalyzer};
use crate::config::Config;
use crate::guard::TriggerGuard;
use crate::initiator::{CallInitiator, ProviderCallInitiator, SimulatedCallInitiator};
use crate::reconciler::EventReconciler;
use crate::scheduler::SchedulerLoop;
use crate::store::{CallStore, PgCallStore};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Check-in Call API",
        version = "0.1.0",
        description = "Schedules accountability check-in calls, reconciles voice provider webhooks, and scores task outcomes from transcripts."
    ),
    paths(
        routes::health::health_check,
        routes::webhooks::receive_voice_webhook,
        routes::calls::start_call,
        routes::calls::get_call,
        routes::calls::analyze_call,
    ),
    components(schemas(
        HealthResponse,
        checkin_core::error::ApiError,
        checkin_core::calls::CallStatus,
        checkin_core::calls::CallRecord,
        checkin_core::calls::CallEvent,
        checkin_core::analysis::TaskOutcome,
        checkin_core::analysis::Recommendation,
        checkin_core::webhook::ProviderWebhook,
        checkin_core::webhook::ProviderSubEvent,
        routes::webhooks::WebhookAck,
        reconciler::ResolutionTier,
        routes::calls::StartCallRequest,
        routes::calls::CallDetail,
        analysis::AnalysisReport,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let store: Arc<dyn CallStore> = Arc::new(PgCallStore::new(pool));
    let (queue, jobs) = AnalysisQueue::channel();
    let analyzer = TranscriptAnalyzer::new(store.clone());
    analysis::spawn_worker(analyzer.clone(), jobs);

    let initiator: Arc<dyn CallInitiator> = match &config.provider {
        Some(provider) => Arc::new(
            ProviderCallInitiator::new(store.clone(), provider.clone(), config.webhook_url())
                .expect("Failed to build provider HTTP client"),
        ),
        None => {
            tracing::warn!("CHECKIN_PROVIDER_API_KEY not set; calls will be simulated");
            Arc::new(SimulatedCallInitiator::new(store.clone(), queue.clone()))
        }
    };
    if config.webhook_secret.is_none() {
        tracing::warn!("CHECKIN_WEBHOOK_SECRET not set; webhook signatures are not checked");
    }
    if config.operator_token.is_none() {
        tracing::info!("CHECKIN_OPERATOR_TOKEN not set; operator endpoints are disabled");
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler = if config.scheduler.enabled {
        let scheduler = SchedulerLoop::new(
            store.clone(),
            ScheduleMatcher::new(config.scheduler.trigger_tolerance_delta()),
            TriggerGuard::new(store.clone(), config.scheduler.duplicate_lookback_delta()),
            initiator.clone(),
            config.scheduler.poll_interval,
        );
        let mut stop_rx = stop_rx;
        Some(tokio::spawn(scheduler.run(async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        })))
    } else {
        tracing::info!("Scheduler disabled (CHECKIN_SCHEDULER_ENABLED=false)");
        None
    };

    let app_state = state::AppState {
        store: store.clone(),
        initiator,
        reconciler: EventReconciler::new(store, queue),
        analyzer,
        config,
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::webhooks::router())
        .merge(routes::calls::start_router().layer(middleware::rate_limit::start_call_layer()))
        .merge(routes::calls::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::security_headers::apply))
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Check-in API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(error = %e, "Server error");
    }

    let _ = stop_tx.send(true);
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    tracing::info!("Shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
