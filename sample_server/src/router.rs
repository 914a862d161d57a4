//! Distribution of incoming frames to stream subscribers and the inference
//! worker.
use std::{collections::HashMap, sync::Mutex};

use anyhow::{bail, Result};

use common::protocol::ProtoMsg;

use crate::meter::METER;
use crate::{
    as_jpeg_stream_item, broadcast_channel, hashed, BroadcastReceiver, BroadcastSender,
    StaticFrameReceiver, StaticImageSender,
};

pub struct FrameRouter {
    frames_broadcast_map: Mutex<HashMap<u64, BroadcastSender>>,
    processed_broadcast_map: Mutex<HashMap<u64, BroadcastSender>>,
    infer_tx: StaticImageSender,
}

impl FrameRouter {
    pub fn new(infer_tx: StaticImageSender) -> Self {
        Self {
            frames_broadcast_map: Mutex::new(HashMap::new()),
            processed_broadcast_map: Mutex::new(HashMap::new()),
            infer_tx,
        }
    }

    /// Forward incoming frame messages until the channel closes.
    ///
    /// Raw frames fan out to their stream subscribers directly. When the
    /// processed stream of a name has subscribers, the frame is additionally
    /// scheduled for inference; frames arriving while the worker is busy are
    /// dropped rather than queued.
    pub async fn run(&self, rx: StaticFrameReceiver) -> Result<()> {
        loop {
            match rx.recv_ref().await {
                None => bail!("incoming frames channel closed"),
                Some(data) => {
                    let Ok(ProtoMsg::FrameMsg(frame_msg)) = ProtoMsg::deserialize(&data[..])
                    else {
                        log::debug!("Skipping undecodable protocol message");
                        continue;
                    };
                    METER.tick_incoming();
                    let id = hashed(&frame_msg.id);

                    if let Some(sender) = self.live_sender(&self.frames_broadcast_map, id) {
                        sender.send(as_jpeg_stream_item(&frame_msg.data)).ok();
                    }

                    if let Some(sender) = self.live_sender(&self.processed_broadcast_map, id) {
                        if let Ok(mut slot) = self.infer_tx.try_send_ref() {
                            slot.0.clear();
                            slot.0.extend_from_slice(&frame_msg.data);
                            slot.1 = Some(sender);
                        }
                    }
                }
            }
        }
    }

    /// Sender for an id, dropping entries nobody subscribes to anymore.
    fn live_sender(
        &self,
        map: &Mutex<HashMap<u64, BroadcastSender>>,
        id: u64,
    ) -> Option<BroadcastSender> {
        let mut map = map.lock().unwrap();
        map.retain(|_id, sender| sender.receiver_count() > 0);
        map.get(&id).cloned()
    }

    pub fn get_broadcast_receiver(&self, name: &str) -> BroadcastReceiver {
        Self::subscribe(&self.frames_broadcast_map, hashed(name))
    }

    pub fn get_processed_receiver(&self, name: &str) -> BroadcastReceiver {
        Self::subscribe(&self.processed_broadcast_map, hashed(name))
    }

    fn subscribe(map: &Mutex<HashMap<u64, BroadcastSender>>, id: u64) -> BroadcastReceiver {
        let mut map = map.lock().unwrap();
        match map.get(&id) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast_channel();
                map.insert(id, tx);
                rx
            }
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::INFER_IMAGES_CHANNEL;

    #[test]
    fn test_subscription_keeps_sender_alive() {
        let (infer_tx, _infer_rx) = INFER_IMAGES_CHANNEL.split();
        let router = FrameRouter::new(infer_tx);
        let id = hashed("cam0");

        assert!(router.live_sender(&router.frames_broadcast_map, id).is_none());

        let receiver = router.get_broadcast_receiver("cam0");
        assert!(router.live_sender(&router.frames_broadcast_map, id).is_some());

        drop(receiver);
        assert!(router.live_sender(&router.frames_broadcast_map, id).is_none());
    }
}
