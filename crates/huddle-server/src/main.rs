mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use huddle_api::realtime::RealtimeBackend;
use huddle_api::routes::router;
use huddle_api::{AppState, AppStateInner, AuthConfig};
use huddle_gateway::connection;
use huddle_gateway::dispatcher::Dispatcher;
use huddle_mail::{HttpRelayTransport, LogTransport, MailTransport};

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    app: AppState,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = huddle_db::Database::open(&config.db_path)?;

    let transport: Arc<dyn MailTransport> = match &config.mail_relay_url {
        Some(url) => {
            info!("Relaying mail to {}", url);
            Arc::new(HttpRelayTransport::new(url.clone()))
        }
        None => Arc::new(LogTransport),
    };
    let (mailer, mail_worker) = huddle_mail::spawn(config.mail(), transport);

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher: Dispatcher::new(),
        mailer,
        auth: AuthConfig {
            jwt_secret: config.jwt_secret.clone(),
            token_ttl: chrono::Duration::hours(config.jwt_expiry_hours),
        },
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState {
            app: app_state.clone(),
            jwt_secret: config.jwt_secret.clone(),
        });

    let app = Router::new()
        .merge(router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Huddle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    mail_worker.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let dispatcher = state.app.dispatcher.clone();
        let backend = Arc::new(RealtimeBackend::new(state.app));
        connection::handle_connection(socket, dispatcher, backend, state.jwt_secret)
    })
}
