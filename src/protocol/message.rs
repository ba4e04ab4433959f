//! Message Codec
//!
//! Defines the message carried by a frame and its wire encoding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::checksum::message_checksum;
use super::{HEARTBEAT_OPCODE, LENGTH_PREFIX_LEN, MAX_BODY_LEN, MIN_BODY_LEN};
use crate::error::ProtocolError;

// == Message ==
/// One application or heartbeat message.
///
/// The checksum is computed once at construction and never changes, so a
/// `Message` built locally is always valid. Decoded messages are only
/// returned when their carried checksum matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    opcode: i32,
    payload: Bytes,
    checksum: u32,
}

impl Message {
    // == Constructor ==
    /// Creates a message and computes its checksum.
    pub fn new(opcode: i32, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let checksum = message_checksum(opcode, &payload);
        Self {
            opcode,
            payload,
            checksum,
        }
    }

    /// Creates a zero-payload keepalive message.
    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT_OPCODE, Bytes::new())
    }

    pub fn opcode(&self) -> i32 {
        self.opcode
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn is_heartbeat(&self) -> bool {
        self.opcode == HEARTBEAT_OPCODE
    }

    /// Recomputes the checksum and compares it with the stored one.
    pub fn is_valid(&self) -> bool {
        self.checksum == message_checksum(self.opcode, &self.payload)
    }

    /// Length of the body this message encodes to.
    pub fn body_len(&self) -> usize {
        MIN_BODY_LEN + self.payload.len()
    }

    // == Encode ==
    /// Serializes the message into a complete frame, length prefix included.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let body_len = self.body_len();
        if body_len > MAX_BODY_LEN {
            return Err(ProtocolError::Encoding(format!(
                "body of {} bytes exceeds maximum of {} bytes",
                body_len, MAX_BODY_LEN
            )));
        }

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + body_len);
        buf.put_i32_le(body_len as i32);
        buf.put_i32_le(self.opcode);
        buf.put_slice(&self.payload);
        buf.put_u32_le(self.checksum);
        Ok(buf.freeze())
    }

    // == Decode ==
    /// Parses a frame body (everything after the length prefix).
    ///
    /// The payload length is inferred from the body size. Fails with
    /// [`ProtocolError::Frame`] when the body cannot hold an opcode and a
    /// checksum, and with [`ProtocolError::Integrity`] when the checksum
    /// does not match.
    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        if body.len() < MIN_BODY_LEN {
            return Err(ProtocolError::Frame(format!(
                "body of {} bytes is shorter than the {} byte minimum",
                body.len(),
                MIN_BODY_LEN
            )));
        }

        let opcode = body.get_i32_le();
        let payload = body.split_to(body.len() - 4);
        let expected = body.get_u32_le();

        let actual = message_checksum(opcode, &payload);
        if actual != expected {
            return Err(ProtocolError::Integrity { expected, actual });
        }

        Ok(Self {
            opcode,
            payload,
            checksum: expected,
        })
    }
}

/// Interprets a length prefix and checks it against the body limits.
pub fn parse_frame_length(prefix: [u8; LENGTH_PREFIX_LEN]) -> Result<usize, ProtocolError> {
    let length = i32::from_le_bytes(prefix);
    if length < MIN_BODY_LEN as i32 {
        return Err(ProtocolError::Frame(format!(
            "length prefix {} is below the {} byte minimum",
            length, MIN_BODY_LEN
        )));
    }

    let length = length as usize;
    if length > MAX_BODY_LEN {
        return Err(ProtocolError::Frame(format!(
            "length prefix {} exceeds maximum of {} bytes",
            length, MAX_BODY_LEN
        )));
    }
    Ok(length)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn body_of(frame: &Bytes) -> Bytes {
        frame.slice(LENGTH_PREFIX_LEN..)
    }

    #[test]
    fn test_encode_layout() {
        let frame = Message::new(1, &b"hello"[..]).encode().unwrap();

        assert_eq!(frame.len(), 4 + 8 + 5);
        assert_eq!(&frame[0..4], &13i32.to_le_bytes());
        assert_eq!(&frame[4..8], &1i32.to_le_bytes());
        assert_eq!(&frame[8..13], b"hello");
        assert_eq!(
            &frame[13..17],
            &message_checksum(1, b"hello").to_le_bytes()
        );
    }

    #[test]
    fn test_decode_roundtrip() {
        let message = Message::new(7, vec![1u8, 2, 3]);
        let frame = message.encode().unwrap();

        let decoded = Message::decode(body_of(&frame)).unwrap();
        assert_eq!(decoded, message);
        assert!(decoded.is_valid());
    }

    #[test]
    fn test_heartbeat_message() {
        let heartbeat = Message::heartbeat();
        assert!(heartbeat.is_heartbeat());
        assert!(heartbeat.payload().is_empty());
        assert_eq!(heartbeat.encode().unwrap().len(), 12);
        assert!(!Message::new(1, Bytes::new()).is_heartbeat());
    }

    #[test]
    fn test_decode_short_body() {
        let result = Message::decode(Bytes::from_static(&[1, 0, 0, 0, 9, 9, 9]));
        assert!(matches!(result, Err(ProtocolError::Frame(_))));
    }

    #[test]
    fn test_decode_bad_checksum() {
        let frame = Message::new(1, &b"hello"[..]).encode().unwrap();
        let mut body = body_of(&frame).to_vec();
        let last = body.len() - 1;
        body[last] ^= 0xFF;

        let result = Message::decode(Bytes::from(body));
        assert!(matches!(result, Err(ProtocolError::Integrity { .. })));
    }

    #[test]
    fn test_decode_empty_payload() {
        let frame = Message::new(-3, Bytes::new()).encode().unwrap();
        let decoded = Message::decode(body_of(&frame)).unwrap();
        assert_eq!(decoded.opcode(), -3);
        assert!(decoded.payload().is_empty());
    }

    #[test]
    fn test_encode_oversized_payload() {
        let message = Message::new(1, vec![0u8; MAX_BODY_LEN]);
        assert!(matches!(message.encode(), Err(ProtocolError::Encoding(_))));
    }

    #[test]
    fn test_parse_frame_length() {
        assert_eq!(parse_frame_length(13i32.to_le_bytes()).unwrap(), 13);
        assert_eq!(parse_frame_length(8i32.to_le_bytes()).unwrap(), 8);
        assert!(matches!(
            parse_frame_length(7i32.to_le_bytes()),
            Err(ProtocolError::Frame(_))
        ));
        assert!(matches!(
            parse_frame_length((-1i32).to_le_bytes()),
            Err(ProtocolError::Frame(_))
        ));
        assert!(matches!(
            parse_frame_length(((MAX_BODY_LEN + 1) as i32).to_le_bytes()),
            Err(ProtocolError::Frame(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_roundtrip(opcode in any::<i32>(), payload in prop::collection::vec(any::<u8>(), 0..512)) {
            let frame = Message::new(opcode, payload.clone()).encode().unwrap();
            prop_assert_eq!(parse_frame_length([frame[0], frame[1], frame[2], frame[3]]).unwrap(), frame.len() - 4);

            let decoded = Message::decode(body_of(&frame)).unwrap();
            prop_assert_eq!(decoded.opcode(), opcode);
            prop_assert_eq!(&decoded.payload()[..], &payload[..]);
            prop_assert!(decoded.is_valid());
        }

        // Adler-32 shifts `a` by a non-zero amount below the modulus for any
        // single-byte change, so every flip is caught.
        #[test]
        fn prop_single_byte_flip_is_rejected(
            opcode in any::<i32>(),
            payload in prop::collection::vec(any::<u8>(), 0..256),
            position in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let frame = Message::new(opcode, payload).encode().unwrap();
            let mut body = body_of(&frame).to_vec();
            let index = position.index(body.len());
            body[index] ^= mask;

            let result = Message::decode(Bytes::from(body));
            prop_assert!(matches!(result, Err(ProtocolError::Integrity { .. })), "flip at {} accepted", index);
        }
    }
}
