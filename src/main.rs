use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::time::Duration;

use storefront::config::Config;
use storefront::db::{create_pool, init_db, AppState};
use storefront::handlers;
use storefront::jwt::AccessTokenSigner;
use storefront::mailer::Mailer;
use storefront::payments::StripeClient;
use storefront::security::SecurityPolicy;
use storefront::shop::reconcile;
use storefront::tokens::TokenTtls;

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Storefront backend: checkout, webhooks, reconciliation")]
struct Cli {
    /// Run a single reconciliation sweep and exit (for cron-style operation)
    #[arg(long)]
    reconcile_once: bool,
}

/// Spawns the background task that periodically reconciles PENDING orders
/// against the gateway. The loop is sequential: a new sweep never starts
/// while one is still in flight.
fn spawn_reconcile_task(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs);

        loop {
            tokio::time::sleep(interval).await;
            reconcile::reconcile_pending_orders(&state).await;
        }
    });

    tracing::info!(
        "Reconciliation task started (runs every {} seconds)",
        interval_secs
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        stripe: StripeClient::new(
            config.stripe_secret_key.clone(),
            config.stripe_webhook_secret.clone(),
        ),
        mailer: Mailer::new(
            config.resend_api_key.clone(),
            config.email_from.clone(),
            config.frontend_base_url.clone(),
        ),
        signer: AccessTokenSigner::new(&config.jwt_secret),
        currency: config.currency.clone(),
        checkout_success_url: config.checkout_success_url.clone(),
        checkout_cancel_url: config.checkout_cancel_url.clone(),
        security: SecurityPolicy {
            max_requests_per_minute: config.max_requests_per_minute,
            max_failures: config.max_login_failures,
            lock_duration_secs: config.lock_minutes * 60,
        },
        token_ttls: TokenTtls {
            verification_secs: config.verification_ttl_minutes * 60,
            reset_secs: config.reset_ttl_minutes * 60,
            access_secs: config.access_token_ttl_minutes * 60,
            refresh_secs: config.refresh_token_ttl_days * 86400,
        },
    };

    if cli.reconcile_once {
        reconcile::reconcile_pending_orders(&state).await;
        return;
    }

    spawn_reconcile_task(state.clone(), config.reconcile_interval_secs);

    let app = Router::new()
        .merge(handlers::auth::router())
        .merge(handlers::shop::router())
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Storefront server listening on {}", addr);

    // Connect info enables peer-address fallback for client IP resolution
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
