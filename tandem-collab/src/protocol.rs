//! Binary codec for awareness updates.
//!
//! Wire format (y-protocols compatible, all integers are var-uints):
//! ```text
//! ┌──────────┬───────────┬──────────┬───────────────────┐
//! │ count    │ client_id │ clock    │ state (varstring) │  × count
//! │ varuint  │ varuint   │ varuint  │ len + UTF-8 JSON  │
//! └──────────┴───────────┴──────────┴───────────────────┘
//! ```
//!
//! A removed state travels as the JSON text `null`. Framed messages prepend
//! the message-type byte and the update length:
//! `[MessageType::Awareness, varuint(len), update…]`.

use serde_json::Value;
use thiserror::Error;
use yrs::encoding::read::{self, Cursor, Read};
use yrs::encoding::write::Write;

/// Per-connection awareness identifier.
pub type ClientId = u64;

/// Leading byte of a framed relay message.
///
/// `Sync` and `Awareness` are peer traffic and get relayed to every other
/// peer in the room. The 123..=127 range is reserved for relay control
/// messages that are answered by the relay itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Sync = 0,
    Awareness = 1,
    RenameSession = 123,
    PutInitializedContent = 124,
    RequestInitializedContent = 125,
    ReleaseLock = 126,
    AcquireLock = 127,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0 => Ok(Self::Sync),
            1 => Ok(Self::Awareness),
            123 => Ok(Self::RenameSession),
            124 => Ok(Self::PutInitializedContent),
            125 => Ok(Self::RequestInitializedContent),
            126 => Ok(Self::ReleaseLock),
            127 => Ok(Self::AcquireLock),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }

    /// Whether a relay forwards this message to the other peers.
    pub fn is_relayed(self) -> bool {
        matches!(self, Self::Sync | Self::Awareness)
    }
}

/// One client's entry in an awareness update.
#[derive(Debug, Clone, PartialEq)]
pub struct AwarenessEntry {
    pub client_id: ClientId,
    pub clock: u64,
    /// `None` means the client removed its state (went away).
    pub state: Option<Value>,
}

/// A batch of awareness entries as exchanged between peers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AwarenessUpdate {
    pub entries: Vec<AwarenessEntry>,
}

impl AwarenessUpdate {
    pub fn new(entries: Vec<AwarenessEntry>) -> Self {
        Self { entries }
    }

    /// Encode to the unframed wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf: Vec<u8> = Vec::with_capacity(16 + self.entries.len() * 64);
        buf.write_var(self.entries.len() as u64);
        for entry in &self.entries {
            buf.write_var(entry.client_id);
            buf.write_var(entry.clock);
            let json = match &entry.state {
                Some(state) => serde_json::to_string(state)
                    .map_err(|e| ProtocolError::Encode(e.to_string()))?,
                None => "null".to_string(),
            };
            buf.write_string(&json);
        }
        Ok(buf)
    }

    /// Decode from the unframed wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = Cursor::new(bytes);
        let count: u64 = cursor.read_var()?;

        // Each entry takes at least three bytes, so the input bounds the count.
        let mut entries = Vec::with_capacity(count.min(bytes.len() as u64 / 3) as usize);
        for _ in 0..count {
            let client_id: u64 = cursor.read_var()?;
            let clock: u64 = cursor.read_var()?;
            let text = std::str::from_utf8(cursor.read_buf()?)
                .map_err(|_| ProtocolError::InvalidUtf8)?;
            let state = if text.is_empty() {
                None
            } else {
                match serde_json::from_str::<Value>(text)
                    .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?
                {
                    Value::Null => None,
                    value => Some(value),
                }
            };
            entries.push(AwarenessEntry { client_id, clock, state });
        }
        Ok(Self { entries })
    }

    /// Encode as a framed `Awareness` relay message.
    pub fn frame(&self) -> Result<Vec<u8>, ProtocolError> {
        let body = self.encode()?;
        let mut buf: Vec<u8> = Vec::with_capacity(body.len() + 6);
        buf.write_u8(MessageType::Awareness as u8);
        buf.write_buf(&body);
        Ok(buf)
    }

    /// Decode a framed relay message carrying an awareness update.
    pub fn unframe(message: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, rest) = message.split_first().ok_or(ProtocolError::UnexpectedEof)?;
        match MessageType::from_byte(tag)? {
            MessageType::Awareness => {}
            other => return Err(ProtocolError::InvalidMessageType(other as u8)),
        }
        let mut cursor = Cursor::new(rest);
        let body = cursor.read_buf()?;
        Self::decode(body)
    }

    /// Client ids carried by this update.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.entries.iter().map(|e| e.client_id).collect()
    }
}

/// Awareness codec errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Unexpected end of message")]
    UnexpectedEof,
    #[error("Variable-length integer overflows u64")]
    VarIntOverflow,
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,
    #[error("Invalid JSON state: {0}")]
    InvalidJson(String),
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),
    #[error("Message type {0} does not carry an awareness update")]
    InvalidMessageType(u8),
    #[error("Encoding error: {0}")]
    Encode(String),
    #[error("Decoding error: {0}")]
    Decode(String),
}

impl From<read::Error> for ProtocolError {
    fn from(e: read::Error) -> Self {
        match e {
            read::Error::EndOfBuffer(_) => Self::UnexpectedEof,
            read::Error::InvalidVarInt => Self::VarIntOverflow,
            other => Self::Decode(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lib0_var_uint_layout() {
        // client 300 -> [0xAC, 0x02], clock 127 -> [0x7F]
        let update = AwarenessUpdate::new(vec![AwarenessEntry { client_id: 300, clock: 127, state: None }]);
        assert_eq!(
            update.encode().unwrap(),
            vec![1, 0xAC, 0x02, 0x7F, 4, b'n', b'u', b'l', b'l']
        );
    }

    #[test]
    fn test_oversized_var_uint_rejected() {
        let mut bytes = vec![1];
        bytes.extend([0xFF; 11]);
        assert!(AwarenessUpdate::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_hand_built_removal() {
        // count=1, client=5, clock=2, "null"
        let bytes = [1, 5, 2, 4, b'n', b'u', b'l', b'l'];
        let update = AwarenessUpdate::decode(&bytes).unwrap();
        assert_eq!(
            update.entries,
            vec![AwarenessEntry { client_id: 5, clock: 2, state: None }]
        );
    }

    #[test]
    fn test_update_roundtrip_with_state_and_removal() {
        let update = AwarenessUpdate::new(vec![
            AwarenessEntry {
                client_id: 42,
                clock: 7,
                state: Some(json!({ "user": { "name": "alice" } })),
            },
            AwarenessEntry { client_id: 1 << 40, clock: 0, state: None },
        ]);

        let decoded = AwarenessUpdate::decode(&update.encode().unwrap()).unwrap();
        assert_eq!(decoded, update);
        assert_eq!(decoded.client_ids(), vec![42, 1 << 40]);
    }

    #[test]
    fn test_empty_string_state_is_removal() {
        let bytes = [1, 9, 3, 0];
        let update = AwarenessUpdate::decode(&bytes).unwrap();
        assert!(update.entries[0].state.is_none());
    }

    #[test]
    fn test_truncated_update_errors() {
        let update = AwarenessUpdate::new(vec![AwarenessEntry {
            client_id: 1,
            clock: 1,
            state: Some(json!({ "a": 1 })),
        }]);
        let bytes = update.encode().unwrap();
        for cut in 0..bytes.len() {
            assert!(AwarenessUpdate::decode(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn test_invalid_json_state() {
        let bytes = [1, 1, 1, 3, b'{', b'x', b'}'];
        assert!(matches!(
            AwarenessUpdate::decode(&bytes),
            Err(ProtocolError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_state() {
        let bytes = [1, 1, 1, 2, 0xC3, 0x28];
        assert_eq!(AwarenessUpdate::decode(&bytes), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn test_frame_unframe() {
        let update = AwarenessUpdate::new(vec![AwarenessEntry {
            client_id: 3,
            clock: 1,
            state: Some(json!({ "current": "notebook:a.ipynb" })),
        }]);
        let framed = update.frame().unwrap();
        assert_eq!(framed[0], MessageType::Awareness as u8);
        assert_eq!(AwarenessUpdate::unframe(&framed).unwrap(), update);
    }

    #[test]
    fn test_unframe_rejects_other_message_types() {
        assert_eq!(
            AwarenessUpdate::unframe(&[0, 0]),
            Err(ProtocolError::InvalidMessageType(0))
        );
        assert_eq!(
            AwarenessUpdate::unframe(&[42]),
            Err(ProtocolError::UnknownMessageType(42))
        );
        assert_eq!(AwarenessUpdate::unframe(&[]), Err(ProtocolError::UnexpectedEof));
    }

    #[test]
    fn test_message_type_values() {
        assert_eq!(MessageType::Sync as u8, 0);
        assert_eq!(MessageType::Awareness as u8, 1);
        assert_eq!(MessageType::RenameSession as u8, 123);
        assert_eq!(MessageType::AcquireLock as u8, 127);
        assert!(MessageType::Awareness.is_relayed());
        assert!(MessageType::Sync.is_relayed());
        assert!(!MessageType::AcquireLock.is_relayed());
        assert_eq!(MessageType::from_byte(126), Ok(MessageType::ReleaseLock));
    }
}
