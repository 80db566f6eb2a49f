use anyhow::Result;
use tracing_subscriber::EnvFilter;

use broll_studio::{config::Settings, studio::Studio, web};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let studio = Studio::open(&settings).await?;
    if !studio.credential_status().selected {
        tracing::warn!("no API key selected; PUT /api/credential before generating");
    }

    let router = web::router(studio.clone(), &settings.media_dir());
    let tcp_listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    tracing::info!(
        address = %settings.bind_address,
        data_dir = %settings.data_dir.display(),
        poll_interval_secs = settings.poll.interval.as_secs(),
        video_timeout_secs = settings.poll.timeout.as_secs(),
        "b-roll studio listening"
    );

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("shutting down; cancelling outstanding video jobs");
    studio.shutdown().await;
    Ok(())
}
