//! Protocol definition for the data socket.
//!
use serde::{Deserialize, Serialize};

/// Messages exchanged between frame senders and the sample server.
#[derive(Debug, Deserialize, Serialize)]
pub enum ProtoMsg {
    FrameMsg(FrameMsg),
}

/// One JPEG-encoded frame of a named stream.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FrameMsg {
    pub id: String,
    pub data: Vec<u8>,
}

impl FrameMsg {
    pub fn new(id: String, data: Vec<u8>) -> Self {
        Self { id, data }
    }
}

impl ProtoMsg {
    pub fn serialize(&self) -> Result<Vec<u8>, Box<bincode::ErrorKind>> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Box<bincode::ErrorKind>> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_bincode_serde() -> Result<(), Box<bincode::ErrorKind>> {
        let frame_msg = FrameMsg {
            id: "cam0".into(),
            data: vec![1, 2, 3],
        };

        let serialized = ProtoMsg::FrameMsg(frame_msg).serialize()?;
        let ProtoMsg::FrameMsg(deserialized) = ProtoMsg::deserialize(&serialized)?;

        assert_eq!(deserialized.id, "cam0");
        assert_eq!(deserialized.data, vec![1, 2, 3]);
        Ok(())
    }
}
