//! HTTP endpoints of the sample server.
use std::{
    convert::Infallible,
    io::{Cursor, Write},
    sync::Arc,
};

use axum::{
    body::StreamBody,
    extract::{BodyStream, Query},
    http::header,
    response::IntoResponse,
    Extension,
};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use common::protocol::{FrameMsg, ProtoMsg};

use crate::router::FrameRouter;
use crate::{BroadcastReceiver, StaticFrameSender};

/// Parameters selecting a named stream.
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    name: Option<String>,
}

pub async fn healthcheck() -> &'static str {
    "Healthy"
}

/// Stream the raw frames of a name as MJPEG.
pub async fn named_stream(
    Extension(router): Extension<Arc<FrameRouter>>,
    Query(params): Query<StreamParams>,
) -> impl IntoResponse {
    let name = params.name.unwrap_or_else(|| "unknown".into());
    log::info!("Serving raw stream for name {}", &name);
    mjpeg_response(router.get_broadcast_receiver(&name))
}

/// Stream the frames of a name with the sample output applied.
pub async fn processed_stream(
    Extension(router): Extension<Arc<FrameRouter>>,
    Query(params): Query<StreamParams>,
) -> impl IntoResponse {
    let name = params.name.unwrap_or_else(|| "unknown".into());
    log::info!("Serving processed stream for name {}", &name);
    mjpeg_response(router.get_processed_receiver(&name))
}

fn mjpeg_response(rx: BroadcastReceiver) -> impl IntoResponse {
    let stream = BroadcastStream::new(rx).filter_map(|item| async move {
        item.ok().map(|data| Ok::<_, Infallible>(Bytes::from(data)))
    });
    (
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        StreamBody::new(stream),
    )
}

/// Receive a multipart JPEG upload stream and feed it into the incoming
/// channel, frame by frame.
pub async fn recv_named_jpg_streams(
    Extension(tx): Extension<StaticFrameSender>,
    Query(params): Query<StreamParams>,
    mut stream: BodyStream,
) {
    let name = params.name.unwrap_or_else(|| "unknown".into());
    log::info!("Receiving stream for name {}", &name);

    let mut buf = Cursor::new(vec![0_u8; 1_000_000]);
    while let Some(Ok(data)) = stream.next().await {
        log::debug!("Data length {}", data.len());
        if data.ends_with(b"\r\n") {
            log::debug!("Skipping header {:?}", data);
            continue;
        }
        if !data.ends_with(b"\n\n") {
            buf.write_all(&data).expect("write");
            continue;
        }

        // The last two bytes are the frame separation marker.
        buf.write_all(&data[..(data.len() - 2)]).expect("write");
        let frame = buf.get_ref()[0..(buf.position() as usize)].to_vec();
        buf.set_position(0);

        let msg = ProtoMsg::FrameMsg(FrameMsg::new(name.clone(), frame));
        let Ok(encoded) = msg.serialize() else {
            continue;
        };
        match tx.send_ref().await {
            Ok(mut slot) => {
                slot.clear();
                slot.extend_from_slice(&encoded);
            }
            Err(_) => {
                log::warn!("Incoming channel closed, dropping upload for {}", &name);
                return;
            }
        }
    }
}
