#![forbid(unsafe_code)]
use anyhow::Result;
use deskbook::{authenticate::AuthApp, config::Config, routes, BookingApp};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if dotenvy::dotenv().is_err() {
        info!("No .env file, using process environment");
    }
    let config = Config::from_env()?;

    info!("Starting server");

    let book_app = Arc::new(RwLock::new(BookingApp::from_config(&config)));

    let mut auth_app = AuthApp::new(config.session_ttl);
    if let Some(password) = &config.demo_password {
        auth_app = auth_app.with_demo_account(password);
    }
    let auth_app = Arc::new(RwLock::new(auth_app));

    let app = routes::app(book_app.clone(), auth_app);

    // run our app with hyper, listening globally
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    book_app.read().await.flush().await?;
    Ok(())
}
