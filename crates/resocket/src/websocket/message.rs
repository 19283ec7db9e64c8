//! Conversions between wire frames and tungstenite messages.

use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::transport::{CloseReason, Frame};

/// Close code reported when the peer's close frame carried no status.
pub(crate) const NO_STATUS: u16 = 1005;

pub(crate) fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
    }
}

/// Data frames become [`Frame`]s; control frames yield `None`.
pub(crate) fn from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        Message::Binary(data) => Some(Frame::Binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}

pub(crate) fn to_close_frame(reason: &CloseReason) -> CloseFrame {
    CloseFrame {
        code: CloseCode::from(reason.code),
        reason: reason.reason.clone().unwrap_or_default().into(),
    }
}

pub(crate) fn from_close_frame(frame: Option<CloseFrame>) -> CloseReason {
    match frame {
        Some(frame) => {
            let reason = frame.reason.as_str();
            CloseReason {
                code: u16::from(frame.code),
                reason: (!reason.is_empty()).then(|| reason.to_owned()),
            }
        }
        None => CloseReason::new(NO_STATUS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_data_frames_convert_both_ways() {
        let text = Frame::Text("hello".into());
        assert_eq!(from_message(to_message(text.clone())), Some(text));

        let binary = Frame::Binary(Bytes::from_static(b"\x00\x01"));
        assert_eq!(from_message(to_message(binary.clone())), Some(binary));
    }

    #[test]
    fn test_control_frames_are_skipped() {
        assert_eq!(from_message(Message::Ping(Bytes::new())), None);
        assert_eq!(from_message(Message::Close(None)), None);
    }

    #[test]
    fn test_close_frames() {
        let reason = CloseReason::with_reason(4001, "kicked");
        assert_eq!(from_close_frame(Some(to_close_frame(&reason))), reason);
        assert_eq!(from_close_frame(Some(to_close_frame(&CloseReason::normal()))), CloseReason::normal());
        assert_eq!(from_close_frame(None).code, NO_STATUS);
    }
}
