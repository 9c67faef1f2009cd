//! Text frame codec.
//!
//! Every WebSocket text frame carries exactly one JSON-encoded [`Envelope`].
//! The codec is stateless; callers decide what to do with frames that fail
//! to decode (the client logs and drops them).

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::Envelope;

/// Encodes an envelope into a text frame.
///
/// # Example
///
/// ```rust
/// use inferlink_protocol::{encode, Envelope};
///
/// let frame = encode(&Envelope::error("boom")).unwrap();
/// assert!(frame.starts_with('{'));
/// ```
pub fn encode(envelope: &Envelope) -> ProtocolResult<String> {
    let text = serde_json::to_string(envelope).map_err(ProtocolError::Encode)?;
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: text.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(text)
}

/// Decodes a text frame into an envelope.
///
/// # Example
///
/// ```rust
/// use inferlink_protocol::{decode, encode, Envelope, MessageType};
///
/// let frame = encode(&Envelope::heartbeat()).unwrap();
/// let envelope = decode(&frame).unwrap();
/// assert_eq!(envelope.message_type(), MessageType::Heartbeat);
/// ```
pub fn decode(text: &str) -> ProtocolResult<Envelope> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: text.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    if text.trim().is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}
