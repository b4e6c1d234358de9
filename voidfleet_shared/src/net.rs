//! Networking primitives.
//!
//! Both peers speak WebSocket with one JSON text frame per protocol message.
//! Control frames (ping/pong/close) never reach the protocol layer.

use tokio_tungstenite::tungstenite::Message as Frame;

use crate::{error::ProtocolError, protocol::Message};

/// Encodes a protocol message as a text frame.
pub fn to_frame(msg: &Message) -> Result<Frame, ProtocolError> {
    Ok(Frame::text(msg.encode()?))
}

/// Decodes a data frame. Control frames yield `Ok(None)`.
///
/// Binary frames are accepted when they hold UTF-8 JSON.
pub fn from_frame(frame: &Frame) -> Result<Option<Message>, ProtocolError> {
    match frame {
        Frame::Text(text) => Message::decode(text.as_str()).map(Some),
        Frame::Binary(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::UnsupportedFrame)?;
            Message::decode(text).map(Some)
        }
        Frame::Ping(_) | Frame::Pong(_) | Frame::Close(_) | Frame::Frame(_) => Ok(None),
    }
}
