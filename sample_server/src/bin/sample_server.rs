//! Sample server binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use clap::Parser;
use env_logger::TimestampPrecision;
use sample_server::{
    data_socket::spawn_data_socket,
    endpoints::{healthcheck, named_stream, processed_stream, recv_named_jpg_streams},
    inferer::Inferer,
    meter::spawn_meter_logger,
    models::SampleKind,
    router::FrameRouter,
    utils::default_model_dir,
    INCOMING_FRAMES_CHANNEL, INFER_IMAGES_CHANNEL,
};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the HTTP endpoints on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    /// Address of the TCP socket receiving frame streams
    #[clap(long, default_value = "127.0.0.1:3001")]
    socket_address: String,

    /// Sample to run on the processed stream
    #[clap(long, value_enum, default_value = "classification")]
    sample: SampleKind,

    /// Directory for downloaded models and labels
    #[clap(long)]
    model_dir: Option<PathBuf>,

    /// Font used for the classification overlay
    #[clap(
        long,
        default_value = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
    )]
    font_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let model_dir = default_model_dir(args.model_dir)?;

    let (incoming_tx, incoming_rx) = INCOMING_FRAMES_CHANNEL.split();
    let (infer_tx, infer_rx) = INFER_IMAGES_CHANNEL.split();
    let frame_router = Arc::new(FrameRouter::new(infer_tx));

    {
        let frame_router = frame_router.clone();
        tokio::spawn(async move { frame_router.run(incoming_rx).await });
    }

    {
        let sample = args.sample;
        let font_path = args.font_path.clone();
        tokio::spawn(async move {
            Inferer::new(infer_rx, sample, &model_dir, &font_path)
                .await
                .run()
                .await
        });
    }

    // Create socket to receive frame streams via network
    spawn_data_socket(incoming_tx.clone(), &args.socket_address).await?;

    spawn_meter_logger();

    // Build HTTP server with endpoints
    let app = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/post_jpgs", post(recv_named_jpg_streams))
        .route("/stream", get(named_stream))
        .route("/processed_stream", get(processed_stream))
        .layer(Extension(frame_router))
        .layer(Extension(incoming_tx));

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
