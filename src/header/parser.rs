//! Byte stream → framed [`Message`] records (`spec.md` §4.1).
//!
//! Grounded on `onc_rpc::RpcMessage::from_bytes`'s length-first,
//! validate-then-slice parsing order, generalized from a single fixed
//! buffer to an incremental carry buffer because Open Protocol frames
//! arrive over an arbitrary-boundary TCP stream rather than one complete
//! fragment at a time.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use super::{offsets, requires_terminator, HEADER_LEN};
use crate::message::{Message, Payload};

/// Errors produced while slicing framed messages out of a byte stream.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ParseError {
    /// The 4-digit length field is non-numeric or outside `1..=9999`.
    #[error("invalid length field")]
    InvalidLength,

    /// The 4-digit MID field is non-numeric or outside `1..=9999`.
    #[error("invalid mid field")]
    InvalidMid,

    /// The 3-digit revision field is non-blank and non-numeric, or outside
    /// `1..=999`.
    #[error("invalid revision field")]
    InvalidRevision,

    /// The 1-digit noAck field is neither blank, `'0'`, nor `'1'`.
    #[error("invalid noAck field")]
    InvalidNoAck,

    /// The 2-digit stationID field is non-blank and non-numeric, or
    /// outside `0..=99`.
    #[error("invalid stationID field")]
    InvalidStationId,

    /// The 2-digit spindleID field is non-blank and non-numeric, or
    /// outside `0..=99`.
    #[error("invalid spindleID field")]
    InvalidSpindleId,

    /// The 2-digit sequenceNumber field is non-blank and non-numeric, or
    /// outside `0..=99`.
    #[error("invalid sequenceNumber field")]
    InvalidSequenceNumber,

    /// The 1-digit messageParts field is non-blank and non-numeric, or
    /// outside `0..=9`.
    #[error("invalid messageParts field")]
    InvalidMessageParts,

    /// The 1-digit messageNumber field is non-blank and non-numeric, or
    /// outside `0..=9`.
    #[error("invalid messageNumber field")]
    InvalidMessageNumber,

    /// The frame's length field did not terminate in a single `0x00` byte
    /// where one was required.
    #[error("missing frame terminator")]
    InvalidTerminator,
}

/// Incrementally slices framed [`Message`]s out of an arbitrary-boundary
/// byte stream.
///
/// Feed stream chunks via [`push`](Self::push) and pull fully-framed
/// messages via [`next`](Self::next), calling it in a loop until it returns
/// `Ok(None)` (not enough bytes yet for another frame).
///
/// `InvalidLength` and `InvalidMid` leave the parser's position
/// unrecoverable: the length prefix itself was unreadable, so there is no
/// safe way to know where the next frame starts. Callers should treat such
/// an error as fatal to the connection. `InvalidRevision` through
/// `InvalidTerminator` are recoverable: the frame's length was known, so
/// the parser skips exactly that many bytes and can resynchronize on the
/// next call.
#[derive(Debug)]
pub struct HeaderParser {
    buf: BytesMut,
    raw_data: bool,
}

impl HeaderParser {
    /// Creates a parser. When `raw_data` is set, every emitted [`Message`]
    /// carries its original framed bytes in [`Message::raw`].
    pub fn new(raw_data: bool) -> Self {
        Self {
            buf: BytesMut::new(),
            raw_data,
        }
    }

    /// Appends a chunk of stream bytes to the carry buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// The number of bytes currently held in the carry buffer, awaiting a
    /// complete frame.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to slice the next complete frame out of the carry buffer.
    ///
    /// Returns `Ok(None)` when there isn't yet a complete frame buffered.
    pub fn next(&mut self) -> Result<Option<Message>, ParseError> {
        if self.buf.len() < offsets::MID.end {
            return Ok(None);
        }

        let length = parse_exact_digits(&self.buf[offsets::LENGTH])
            .filter(|&v| (1..=9999).contains(&v))
            .ok_or(ParseError::InvalidLength)? as usize;
        if length < HEADER_LEN {
            return Err(ParseError::InvalidLength);
        }

        let mid = parse_exact_digits(&self.buf[offsets::MID])
            .filter(|&v| (1..=9999).contains(&v))
            .ok_or(ParseError::InvalidMid)? as u16;

        let need_terminator = requires_terminator(mid);
        let required_total = length + if need_terminator { 1 } else { 0 };

        if self.buf.len() < required_total {
            return Ok(None);
        }

        // From here on the frame's length is known, so every error path
        // below consumes exactly `required_total` bytes before returning,
        // keeping the carry buffer aligned on the next frame.
        let revision = match blank_or(&self.buf[offsets::REVISION], 1) {
            Some(v) if (1..=999).contains(&v) => v,
            _ => return self.fail(required_total, ParseError::InvalidRevision),
        };

        let no_ack = match self.buf[offsets::NO_ACK][0] {
            b' ' => false,
            b'0' => false,
            b'1' => true,
            _ => return self.fail(required_total, ParseError::InvalidNoAck),
        };

        let station_id = match blank_or(&self.buf[offsets::STATION_ID], 0) {
            Some(v) if (0..=99).contains(&v) => v as u8,
            _ => return self.fail(required_total, ParseError::InvalidStationId),
        };

        let spindle_id = match blank_or(&self.buf[offsets::SPINDLE_ID], 0) {
            Some(v) if (0..=99).contains(&v) => v as u8,
            _ => return self.fail(required_total, ParseError::InvalidSpindleId),
        };

        let sequence_number = match blank_or(&self.buf[offsets::SEQUENCE_NUMBER], 0) {
            Some(v) if (0..=99).contains(&v) => v as u8,
            _ => return self.fail(required_total, ParseError::InvalidSequenceNumber),
        };

        let message_parts = match blank_or(&self.buf[offsets::MESSAGE_PARTS], 0) {
            Some(v) if (0..=9).contains(&v) => v as u8,
            _ => return self.fail(required_total, ParseError::InvalidMessageParts),
        };

        let message_number = match blank_or(&self.buf[offsets::MESSAGE_NUMBER], 0) {
            Some(v) if (0..=9).contains(&v) => v as u8,
            _ => return self.fail(required_total, ParseError::InvalidMessageNumber),
        };

        if need_terminator && self.buf[length] != 0 {
            return self.fail(required_total, ParseError::InvalidTerminator);
        }

        let mut frame = self.buf.split_to(required_total);
        let raw = self.raw_data.then(|| Bytes::copy_from_slice(&frame));
        let payload = frame.split_off(HEADER_LEN);
        // `payload` may still carry the trailing NUL if present; truncate
        // it off (it was already validated above, or absent for 900/901).
        let payload = payload.split_to(length - HEADER_LEN).freeze();

        Ok(Some(Message {
            mid,
            revision: revision as u16,
            no_ack,
            station_id,
            spindle_id,
            sequence_number,
            message_parts,
            message_number,
            payload: Payload::Raw(payload),
            is_ack: false,
            raw,
        }))
    }

    fn fail(&mut self, consume: usize, err: ParseError) -> Result<Option<Message>, ParseError> {
        let _ = self.buf.split_to(consume);
        Err(err)
    }
}

/// Parses an exact-width ASCII digit field with no blank substitution.
fn parse_exact_digits(raw: &[u8]) -> Option<u32> {
    if raw.iter().any(|b| !b.is_ascii_digit()) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.parse().ok()
}

/// Parses an ASCII digit field that may instead be entirely spaces, in
/// which case `default` is returned.
fn blank_or(raw: &[u8], default: u32) -> Option<u32> {
    if raw.iter().all(|&b| b == b' ') {
        return Some(default);
    }
    parse_exact_digits(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    }

    #[test]
    fn parses_basic_frame() {
        let mut p = HeaderParser::new(false);
        p.push(&frame("00570002001     01  010001020103Teste Airbag             "));
        let msg = p.next().unwrap().unwrap();
        assert_eq!(msg.mid, 2);
        assert_eq!(msg.revision, 1);
        assert!(!msg.no_ack);
        assert_eq!(msg.sequence_number, 1);
        assert!(p.next().unwrap().is_none());
    }

    #[test]
    fn handles_chunk_boundary_mid_header() {
        let bytes = frame("00570002001     01  010001020103Teste Airbag             ");
        let mut p = HeaderParser::new(false);
        p.push(&bytes[..10]);
        assert!(p.next().unwrap().is_none());
        p.push(&bytes[10..]);
        assert!(p.next().unwrap().is_some());
    }

    #[test]
    fn mid_900_waives_terminator() {
        let mut p = HeaderParser::new(false);
        let no_term = b"00200900            ".to_vec();
        p.push(&no_term);
        let msg = p.next().unwrap().unwrap();
        assert_eq!(msg.mid, 900);
    }

    #[test]
    fn mid_2_without_terminator_errors() {
        let mut p = HeaderParser::new(false);
        let mut bytes = b"00570002001     01  010001020103Teste Airbag             ".to_vec();
        bytes.push(b'A'); // not a NUL
        p.push(&bytes);
        assert_eq!(p.next(), Err(ParseError::InvalidTerminator));
        // Parser resynchronized past the malformed frame.
        assert_eq!(p.pending_len(), 0);
    }

    #[test]
    fn raw_data_mode_preserves_original_bytes() {
        let bytes = frame("00200001            ");
        let mut p = HeaderParser::new(true);
        p.push(&bytes);
        let msg = p.next().unwrap().unwrap();
        assert_eq!(msg.raw.unwrap(), Bytes::copy_from_slice(&bytes));
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::HeaderParser;
    use crate::header::serializer::serialize;
    use crate::message::{Message, Payload};

    fn arb_message() -> impl Strategy<Value = Message> {
        (
            1u16..=9999,
            1u16..=999,
            any::<bool>(),
            0u8..=99,
            0u8..=99,
            0u8..=99,
            0..200usize,
        )
            .prop_map(|(mid, revision, no_ack, station_id, spindle_id, sequence_number, len)| {
                let mut msg = Message::new(mid, Payload::Raw(vec![b'x'; len].into()));
                msg.revision = revision;
                msg.no_ack = no_ack;
                msg.station_id = station_id;
                msg.spindle_id = spindle_id;
                msg.sequence_number = sequence_number;
                msg
            })
            // 900/901 frames waive the terminator; keep the round trip
            // property restricted to the common case.
            .prop_filter("skip terminator-waived mids", |m| m.mid != 900 && m.mid != 901)
    }

    proptest! {
        #[test]
        fn round_trip(msg in arb_message()) {
            let framed = serialize(&msg).unwrap();
            let mut parser = HeaderParser::new(false);
            parser.push(&framed);
            let parsed = parser.next().unwrap().expect("one complete frame");
            prop_assert_eq!(parsed.mid, msg.mid);
            prop_assert_eq!(parsed.revision, msg.revision);
            prop_assert_eq!(parsed.no_ack, msg.no_ack);
            prop_assert_eq!(parsed.station_id, msg.station_id);
            prop_assert_eq!(parsed.spindle_id, msg.spindle_id);
            prop_assert_eq!(parsed.sequence_number, msg.sequence_number);
            prop_assert_eq!(parsed.payload, msg.payload);
            prop_assert!(parser.next().unwrap().is_none());
        }

        #[test]
        fn chunk_boundary_idempotence(msg in arb_message(), split_at in 0usize..64) {
            let framed = serialize(&msg).unwrap();
            let split_at = split_at.min(framed.len());

            let mut whole = HeaderParser::new(false);
            whole.push(&framed);
            let whole_result = whole.next().unwrap();

            let mut chunked = HeaderParser::new(false);
            chunked.push(&framed[..split_at]);
            let mut chunked_result = chunked.next().unwrap();
            if chunked_result.is_none() {
                chunked.push(&framed[split_at..]);
                chunked_result = chunked.next().unwrap();
            }

            prop_assert_eq!(whole_result, chunked_result);
        }
    }
}

