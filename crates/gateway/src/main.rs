//! LingoChat Gateway
//!
//! The single entry point for the chat relay.
//! Handles:
//! - Session lifecycle and inactivity timeout
//! - Identity verification
//! - Chat turns, conversation reset and logout
//! - Admin usage report and the static pages
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;


use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use lingochat_common::{
    auth::{self, IdentityVerifier},
    chat::ChatService,
    completion::{self, CompletionProvider},
    config::{AppConfig, ObservabilityConfig, SessionBackend},
    db::{DbPool, DocumentStore, MemoryStore, Repository},
    language::WhatlangDetector,
    metrics::{self, COMPLETION_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
    session::{MemorySessionStore, RedisSessionStore, SessionLocks, SessionStore},
    usage::UsageAggregator,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use middleware::rate_limit::ApiRateLimit;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<dyn SessionStore>,
    pub store: Arc<dyn DocumentStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub chat: Arc<ChatService>,
    pub usage: UsageAggregator,
    pub locks: Arc<SessionLocks>,
    pub rate_limit: ApiRateLimit,
}

impl AppState {
    /// Wire the services together around the given backends
    pub fn new(
        config: AppConfig,
        sessions: Arc<dyn SessionStore>,
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn IdentityVerifier>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        let usage = UsageAggregator::new(store.clone());
        let chat = ChatService::new(Arc::new(WhatlangDetector), provider, usage.clone());
        let rate_limit = ApiRateLimit::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );

        Self {
            config: Arc::new(config),
            sessions,
            store,
            verifier,
            chat: Arc::new(chat),
            usage,
            locks: SessionLocks::new(),
            rate_limit,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&ObservabilityConfig::default());
            error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting LingoChat Gateway v{}",
        lingochat_common::VERSION
    );

    // Initialize metrics
    init_metrics(&config.observability)?;
    metrics::register_metrics();

    let store = connect_document_store(&config).await?;
    let sessions = connect_session_store(&config).await?;
    let verifier = auth::create_verifier(&config.auth)?;
    let provider = completion::create_provider(&config.completion)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let shutdown_timeout = config.shutdown_timeout();

    let state = AppState::new(config, sessions, store, verifier, provider);
    info!(
        model = %state.chat.model_name(),
        idle_timeout_secs = state.config.session.idle_timeout_secs,
        "Services initialized"
    );
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (draining_tx, draining_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = draining_tx.send(());
        })
        .into_future();

    // Connections still open after the drain window are dropped
    let drain_deadline = async move {
        match draining_rx.await {
            Ok(()) => tokio::time::sleep(shutdown_timeout).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Shutdown timeout elapsed, closing remaining connections"
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus exporter; port 0 disables it
fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_completion_duration_seconds", METRICS_PREFIX)),
            COMPLETION_BUCKETS,
        )?
        .install()?;

    info!(%addr, "Metrics exporter listening");
    Ok(())
}

async fn connect_document_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match &config.database.url {
        Some(url) => {
            let pool = DbPool::new(url, &config.database).await?;
            let repo = Repository::new(pool);
            repo.ensure_schema().await?;
            Ok(Arc::new(repo))
        }
        None => {
            warn!("No database URL configured, profiles and usage are kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn connect_session_store(config: &AppConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    match config.session.backend {
        SessionBackend::Memory => Ok(Arc::new(MemorySessionStore::new())),
        SessionBackend::Redis => {
            let store =
                RedisSessionStore::connect(&config.redis, config.session.idle_timeout_secs).await?;
            store.ping().await?;
            info!(url = %config.redis.url, "Redis session store connected");
            Ok(Arc::new(store))
        }
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes: session lifecycle and identity on every call, including
    // unknown paths and wrong methods under /api
    let mut api_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/clear", post(handlers::session::clear))
        .route("/logout", post(handlers::session::logout))
        .route("/admin-data", get(handlers::admin::admin_data))
        .fallback(handlers::api_not_found)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::session::api_session_middleware,
        ));

    if state.config.rate_limit.enabled {
        api_routes = api_routes.layer(from_fn_with_state(
            state.rate_limit.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    // Pages: timeout check only
    let pages = Router::new()
        .route("/", get(handlers::pages::home))
        .route("/chat", get(handlers::pages::chat))
        .route("/login", get(handlers::pages::login))
        .route("/signup", get(handlers::pages::signup))
        .route("/admin", get(handlers::pages::admin))
        .route("/static/base.css", get(handlers::pages::base_css))
        .route("/static/auth.js", get(handlers::pages::auth_js))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::session::page_session_middleware,
        ));

    let request_timeout = state.config.request_timeout();

    // Compose the app
    Router::new()
        .nest("/api", api_routes)
        .merge(pages)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .layer(from_fn(middleware::metrics::track_metrics))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
