//! Stream camera or still-image frames to the sample server.
use std::{path::PathBuf, time::Duration};

use bytes::Bytes;
use cam_sender::{
    sensors::{CameraSource, FrameSource, StillImageSource, StreamableSource},
    Error,
};
use clap::Parser;
use common::protocol::{FrameMsg, ProtoMsg};
use env_logger::TimestampPrecision;
use futures::sink::SinkExt;
use reqwest::{multipart, Body};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Stream name announced to the server
    #[clap(long, default_value = "cam0")]
    name: String,

    /// Camera device to capture from
    #[clap(long, default_value = "/dev/video0")]
    device: String,

    /// Replay a still image instead of capturing from the camera
    #[clap(long)]
    image: Option<PathBuf>,

    /// Frame interval for still images in milliseconds
    #[clap(long, default_value_t = 100)]
    still_interval_ms: u64,

    /// Send frames over the TCP data socket instead of HTTP multipart
    #[clap(long)]
    socket: bool,

    /// Server base URL for HTTP uploads
    #[clap(long, default_value = "http://127.0.0.1:3000")]
    server_url: String,

    /// Server address of the TCP data socket
    #[clap(long, default_value = "127.0.0.1:3001")]
    socket_address: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let source: Box<dyn FrameSource + Send> = match &args.image {
        Some(path) => Box::new(StillImageSource::open(
            path,
            Duration::from_millis(args.still_interval_ms),
        )?),
        None => Box::new(CameraSource::open(&args.device, "MJPG", None, None)?),
    };

    if args.socket {
        send_over_socket(source, &args).await
    } else {
        send_over_http(source, &args).await
    }
}

/// Ship length-delimited protocol messages over the TCP data socket.
async fn send_over_socket(
    mut source: Box<dyn FrameSource + Send>,
    args: &Args,
) -> Result<(), Error> {
    let stream = TcpStream::connect(&args.socket_address).await?;
    log::info!("Connected to {}", &args.socket_address);

    let mut transport = Framed::new(stream, LengthDelimitedCodec::new());

    while let Some(frame) = source.frame() {
        let msg = ProtoMsg::FrameMsg(FrameMsg::new(args.name.clone(), frame));
        let data = msg.serialize()?;
        transport.send(Bytes::from(data)).await?;
    }

    Ok(())
}

/// Ship frames as one long HTTP multipart upload.
async fn send_over_http(source: Box<dyn FrameSource + Send>, args: &Args) -> Result<(), Error> {
    let streamable = StreamableSource::new(source);
    let chunk = multipart::Part::stream(Body::wrap_stream(streamable));
    let form = multipart::Form::new().part("chunk", chunk);

    let url = format!(
        "{}/post_jpgs?name={}",
        args.server_url.trim_end_matches('/'),
        args.name
    );
    log::info!("Streaming frames to {url}");

    reqwest::Client::new()
        .post(&url)
        .multipart(form)
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}
