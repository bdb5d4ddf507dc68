use crate::config::Settings;
use crate::handlers::{
    app, auth, budgets, categories, dashboard, entries, insights, metrics, password_reset,
    profile, reports,
};
use crate::middleware::csrf_middleware;
use crate::services::database::Database;
use crate::services::email::{email_provider, EmailProvider};
use crate::services::insights::InsightsService;
use crate::services::metrics::http_metrics_middleware;
use crate::AppState;
use axum::{
    handler::Handler,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    ip_rate_limit_middleware, request_id_middleware, security_headers_middleware, trace_layer,
    IpRateLimit,
};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

pub fn build_router(state: AppState) -> Router {
    let settings = state.settings.clone();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(settings.server.secure_cookies)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(
            settings.server.session_inactivity_hours,
        )));

    // Separate budgets, so reset requests cannot lock out logins.
    let login_limiter = IpRateLimit::new(
        settings.rate_limit.login_attempts,
        settings.rate_limit.login_window_seconds,
        settings.rate_limit.trust_forwarded_for,
    );
    let reset_limiter = IpRateLimit::new(
        settings.rate_limit.login_attempts,
        settings.rate_limit.login_window_seconds,
        settings.rate_limit.trust_forwarded_for,
    );

    Router::new()
        .route("/", get(app::index))
        .route("/health", get(app::health_check))
        .route("/ready", get(app::readiness_check))
        .route("/metrics", get(metrics::metrics))
        .route(
            "/register",
            get(auth::register_page).post(auth::register_handler),
        )
        .route(
            "/login",
            get(auth::login_page).post(
                auth::login_handler
                    .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware)),
            ),
        )
        .route("/logout", post(auth::logout_handler))
        .route(
            "/forgot-password",
            get(password_reset::forgot_password_page).post(
                password_reset::forgot_password_handler
                    .layer(from_fn_with_state(reset_limiter, ip_rate_limit_middleware)),
            ),
        )
        .route(
            "/reset-password",
            get(password_reset::reset_password_page).post(password_reset::reset_password_handler),
        )
        .route("/dashboard", get(dashboard::dashboard_handler))
        .route(
            "/entries",
            get(entries::entries_page).post(entries::create_entry),
        )
        .route("/entries/filter", get(entries::filter_entries))
        .route(
            "/entries/:id",
            get(entries::entry_detail).post(entries::update_entry),
        )
        .route("/entries/:id/edit", get(entries::edit_entry_page))
        .route("/entries/:id/delete", post(entries::delete_entry))
        .route(
            "/categories",
            get(categories::categories_page).post(categories::create_category),
        )
        .route("/categories/:id", post(categories::rename_category))
        .route("/categories/:id/delete", post(categories::delete_category))
        .route(
            "/budgets",
            get(budgets::budgets_page).post(budgets::set_budget),
        )
        .route("/budgets/:id/delete", post(budgets::delete_budget))
        .route("/reports", get(reports::reports_page))
        .route("/reports/filter", get(reports::filter_report))
        .route("/reports/export.csv", get(reports::export_csv))
        .route("/api/chart-data", get(dashboard::chart_data_handler))
        .route("/insights/ask", post(insights::ask_handler))
        .route("/profile", get(profile::profile_page))
        .route("/profile/password", post(profile::change_password))
        .nest_service("/static", ServeDir::new(settings.static_dir()))
        .fallback(app::not_found)
        .layer(from_fn(csrf_middleware))
        .layer(session_layer)
        .layer(from_fn(http_metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(trace_layer())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

type ServerFuture = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

/// Outside services the application talks to.
pub struct Providers {
    pub insights: InsightsService,
    pub email: Arc<dyn EmailProvider>,
}

impl Providers {
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let insights = InsightsService::from_settings(&settings.insights).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to configure insights: {}", e))
        })?;
        let email = email_provider(&settings.email)?;
        Ok(Self { insights, email })
    }
}

pub struct Application {
    port: u16,
    server: ServerFuture,
    state: AppState,
}

impl Application {
    /// Connects the pool, runs migrations, wires the AI and email providers and binds the
    /// listener.
    pub async fn build(settings: Settings) -> Result<Self, AppError> {
        let providers = Providers::from_settings(&settings)?;
        Self::build_with(settings, providers).await
    }

    pub async fn build_with(settings: Settings, providers: Providers) -> Result<Self, AppError> {
        let db = Database::new(
            settings.database.url.expose_secret(),
            settings.database.max_connections,
            settings.database.min_connections,
            Duration::from_secs(settings.database.acquire_timeout_seconds),
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to PostgreSQL: {}", e);
            e
        })?;

        if settings.database.run_migrations {
            db.run_migrations().await?;
        }

        let address = format!("{}:{}", settings.server.host, settings.server.port);
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        let state = AppState::new(db, providers.insights, providers.email, settings);
        let app = build_router(state.clone());

        tracing::info!(port, "budget-service listening");

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::pin(server.into_future()),
            state,
        })
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
