use eschool_portal::config::{ApiConfig, ServerConfig};
use eschool_portal::routes::{self, AppState};

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt::init();
    if let Err(e) = dotenv {
        tracing::debug!(error = %e, "no .env file loaded");
    }

    let api = ApiConfig::from_env().expect("invalid API configuration");
    let server = ServerConfig::from_env();
    tracing::info!(
        base_url = %api.base_url,
        rotate_refresh_tokens = api.rotate_refresh_tokens,
        secure_cookies = api.cookies.secure,
        "backend configured"
    );

    let state = AppState::from_config(api).expect("HTTP client init failed");
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = server.port, public_url = %server.public_url, "eschool portal listening");
    axum::serve(listener, app).await.expect("server failed");
}
