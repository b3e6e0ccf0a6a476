//! [`Message`] → framed bytes (`spec.md` §4.2).
//!
//! A pure function: no I/O, no state. Grounded on
//! `onc_rpc::RpcMessage::{serialise_into, serialised_len}`'s
//! compute-length-then-write-once discipline.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{requires_terminator, HEADER_LEN, MAX_FRAME_PAYLOAD};
use crate::message::{Message, Payload};

/// Errors produced while framing a [`Message`] for the wire.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializeError {
    /// `revision` is outside `1..=999`.
    #[error("revision {0} out of range")]
    InvalidRevision(u16),

    /// `station_id` is outside `0..=99`.
    #[error("stationID {0} out of range")]
    InvalidStationId(u8),

    /// `spindle_id` is outside `0..=99`.
    #[error("spindleID {0} out of range")]
    InvalidSpindleId(u8),

    /// `sequence_number` is outside `0..=99`.
    #[error("sequenceNumber {0} out of range")]
    InvalidSequenceNumber(u8),

    /// `message_parts` is outside `0..=9`.
    #[error("messageParts {0} out of range")]
    InvalidMessageParts(u8),

    /// `message_number` is outside `0..=9`.
    #[error("messageNumber {0} out of range")]
    InvalidMessageNumber(u8),

    /// `mid` is outside `1..=9999`.
    #[error("mid {0} out of range")]
    InvalidMid(u16),

    /// The payload is a [`Payload::Decoded`] record; it must be passed
    /// through a [`MidCodec`](crate::registry::MidCodec) first.
    #[error("payload is not bytes or text")]
    InvalidPayload,

    /// The payload, once converted to bytes, exceeds the single-frame
    /// maximum of 9979 bytes. Messages larger than this must be split by
    /// the Link Layer before reaching the serializer.
    #[error("payload of {0} bytes exceeds the single-frame maximum of {MAX_FRAME_PAYLOAD}")]
    InvalidLength(usize),
}

/// Serializes `msg` into its on-wire framed representation.
pub fn serialize(msg: &Message) -> Result<Bytes, SerializeError> {
    if !(1..=9999).contains(&msg.mid) {
        return Err(SerializeError::InvalidMid(msg.mid));
    }
    if !(1..=999).contains(&msg.revision) {
        return Err(SerializeError::InvalidRevision(msg.revision));
    }
    if msg.station_id > 99 {
        return Err(SerializeError::InvalidStationId(msg.station_id));
    }
    if msg.spindle_id > 99 {
        return Err(SerializeError::InvalidSpindleId(msg.spindle_id));
    }
    if msg.sequence_number > 99 {
        return Err(SerializeError::InvalidSequenceNumber(msg.sequence_number));
    }
    if msg.message_parts > 9 {
        return Err(SerializeError::InvalidMessageParts(msg.message_parts));
    }
    if msg.message_number > 9 {
        return Err(SerializeError::InvalidMessageNumber(msg.message_number));
    }

    let payload: &[u8] = match &msg.payload {
        Payload::Raw(b) => b.as_ref(),
        Payload::Text(s) => s.as_bytes(),
        Payload::Decoded(_) => return Err(SerializeError::InvalidPayload),
    };

    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(SerializeError::InvalidLength(payload.len()));
    }

    let length = HEADER_LEN + payload.len();
    let need_terminator = requires_terminator(msg.mid);
    let total = length + if need_terminator { 1 } else { 0 };

    let mut out = BytesMut::with_capacity(total);
    write_digits(&mut out, length as u32, 4);
    write_digits(&mut out, msg.mid as u32, 4);
    write_digits(&mut out, msg.revision as u32, 3);
    out.put_u8(if msg.no_ack { b'1' } else { b'0' });
    write_digits(&mut out, msg.station_id as u32, 2);
    write_digits(&mut out, msg.spindle_id as u32, 2);
    write_digits(&mut out, msg.sequence_number as u32, 2);
    write_digits(&mut out, msg.message_parts as u32, 1);
    write_digits(&mut out, msg.message_number as u32, 1);
    out.put_slice(payload);

    if need_terminator {
        out.put_u8(0);
    }

    debug_assert_eq!(out.len(), total);
    Ok(out.freeze())
}

/// The exact on-wire length `serialize` would produce for `msg`, without
/// allocating. Mirrors `onc_rpc`'s `serialised_len` companion to
/// `serialise_into`.
pub fn serialized_len(msg: &Message) -> usize {
    let payload_len = match &msg.payload {
        Payload::Raw(b) => b.len(),
        Payload::Text(s) => s.len(),
        Payload::Decoded(_) => 0,
    };
    HEADER_LEN + payload_len + if requires_terminator(msg.mid) { 1 } else { 0 }
}

fn write_digits(out: &mut BytesMut, value: u32, width: usize) {
    let s = format!("{value:0width$}", width = width);
    out.put_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn serialize_basic_message() {
        let mut msg = Message::new(2, Payload::Text("hello".to_owned()));
        msg.sequence_number = 1;
        let framed = serialize(&msg).unwrap();
        assert_eq!(&framed[0..4], b"0025");
        assert_eq!(&framed[4..8], b"0002");
        assert_eq!(framed.last().copied(), Some(0));
    }

    #[test]
    fn mid_900_has_no_terminator() {
        let msg = Message::new(900, Payload::Raw(Bytes::new()));
        let framed = serialize(&msg).unwrap();
        assert_eq!(framed.len(), 20);
    }

    #[test]
    fn rejects_oversize_single_frame_payload() {
        let payload = vec![b'x'; MAX_FRAME_PAYLOAD + 1];
        let msg = Message::new(1, Payload::Raw(Bytes::from(payload)));
        assert_eq!(
            serialize(&msg),
            Err(SerializeError::InvalidLength(MAX_FRAME_PAYLOAD + 1))
        );
    }

    #[test]
    fn decoded_payload_cannot_be_serialized_directly() {
        let msg = Message::new(1, Payload::Decoded(Default::default()));
        assert_eq!(serialize(&msg), Err(SerializeError::InvalidPayload));
    }
}
