//! Server hosting the neural-network samples over streamed frames.
pub mod data_socket;
pub mod endpoints;
pub mod inferer;
pub mod meter;
pub mod models;
pub mod router;
pub mod utils;

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use thingbuf::mpsc::{StaticChannel, StaticReceiver, StaticSender};
use tokio::sync::broadcast;

/// Raw protocol messages arriving from the data socket or HTTP uploads.
pub static INCOMING_FRAMES_CHANNEL: StaticChannel<Vec<u8>, 64> = StaticChannel::new();

/// Frames scheduled for inference together with the broadcast sender the
/// processed result should be published on.
pub static INFER_IMAGES_CHANNEL: StaticChannel<InferImage, 4> = StaticChannel::new();

/// JPEG data of one scheduled frame plus its output channel.
pub type InferImage = (Vec<u8>, Option<BroadcastSender>);

pub type BroadcastSender = broadcast::Sender<Vec<u8>>;
pub type BroadcastReceiver = broadcast::Receiver<Vec<u8>>;
pub type StaticFrameSender = StaticSender<Vec<u8>>;
pub type StaticFrameReceiver = StaticReceiver<Vec<u8>>;
pub type StaticImageSender = StaticSender<InferImage>;
pub type StaticImageReceiver = StaticReceiver<InferImage>;

/// Broadcast channel for JPEG frames with a small backlog.
pub fn broadcast_channel() -> (BroadcastSender, BroadcastReceiver) {
    broadcast::channel(20)
}

/// Stable key for a stream name.
pub fn hashed(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Wrap a JPEG buffer as one part of a `multipart/x-mixed-replace` stream.
pub fn as_jpeg_stream_item(buf: &[u8]) -> Vec<u8> {
    [
        b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_slice(),
        buf,
        b"\r\n\r\n".as_slice(),
    ]
    .concat()
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_jpeg_stream_item_markers() {
        let item = as_jpeg_stream_item(&[0xff, 0xd8, 0xff]);
        assert!(item.starts_with(b"--frame\r\n"));
        assert!(item.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn test_hashed_is_stable() {
        assert_eq!(hashed("cam0"), hashed("cam0"));
        assert_ne!(hashed("cam0"), hashed("cam1"));
    }
}
