//! Sentrycam - edge camera clip recorder
//!
//! Main entry point: wiring, startup sign-in, initial control flag,
//! supervisor and HTTP server.

use sentrycam::{
    auth::AuthClient,
    control_gate::{self, ControlGate},
    detector::DetectorClient,
    exporter::ClipExporter,
    pipeline::{self, Pipeline, RecorderStatus},
    state::{AppConfig, AppState},
    uploader::ClipUploader,
    web_api,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentrycam=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting sentrycam v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; invalid buffer settings are fatal here, before
    // anything is spawned
    let config = AppConfig::default();
    config.buffer.validate()?;
    tracing::info!(
        device_id = %config.device_id,
        device_location = %config.device_location,
        detector_url = %config.detector_url,
        upload_url = %config.upload_url,
        video_dir = %config.video_dir.display(),
        image_dir = %config.image_dir.display(),
        fps = config.buffer.fps,
        pre_roll_secs = config.buffer.pre_roll_secs,
        total_secs = config.buffer.total_secs,
        "Configuration loaded"
    );

    if let Ok(version) = ClipExporter::check_ffmpeg().await {
        tracing::info!(version = %version, "ffmpeg available");
    } else {
        tracing::warn!("ffmpeg not found - exports will fail until it is installed");
    }

    // Startup sign-in; the session token rides with stream reads and uploads
    let auth = AuthClient::new(config.identity_url.clone(), config.api_key.clone());
    let session = auth.sign_in(&config.email, &config.password).await?;

    // Initialize components
    let detector = Arc::new(DetectorClient::new(config.detector_url.clone()));
    let exporter = Arc::new(
        ClipExporter::new(
            config.video_dir.clone(),
            config.image_dir.clone(),
            config.buffer.fps,
            config.buffer.pre_roll_capacity(),
            config.bitrate.clone(),
        )
        .await?,
    );
    let uploader = Arc::new(ClipUploader::new(
        config.upload_url.clone(),
        config.device_id.clone(),
        config.device_location.clone(),
    ));
    tracing::info!("Exporter and uploader initialized");

    // Control gate: one channel, supervisor on the receiving end
    let (gate, gate_rx) = ControlGate::channel(session.user_id.clone());
    let status = Arc::new(RecorderStatus::new());

    let pipeline = Pipeline::new(
        config.clone(),
        detector.clone(),
        exporter,
        uploader,
        session.clone(),
        status.clone(),
    );
    tokio::spawn(pipeline::run_supervisor(pipeline, gate_rx, status.clone()));
    tracing::info!("Control supervisor started");

    // Initial flag value; later changes arrive via the push subscription
    match control_gate::fetch_initial_flag(&config.control_url, &session.user_id, &session.id_token)
        .await
    {
        Ok(enabled) => gate.set_enabled(enabled).await,
        Err(e) => {
            tracing::warn!(error = %e, "Initial control flag fetch failed, starting disabled");
        }
    }

    // Create application state and router
    let state = AppState {
        config: config.clone(),
        gate,
        detector,
        recorder: status,
    };

    let app = web_api::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
