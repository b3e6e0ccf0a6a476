//! MID 9997 / MID 9998 — POSITIVE_ACK / NEGATIVE_ACK, the Link Layer's own
//! ack frames (`spec.md` §4.3/§GLOSSARY).
//!
//! The ack's own sequence number (`spec.md` §4.3: "emit POSITIVE_ACK
//! carrying sequenceNumber+1 ... and midNumber=peerMid") lives in the
//! *frame header*'s `sequenceNumber` field, not the payload — `spec.md` §8
//! scenario 1's literal wire bytes pin this down: the POSITIVE_ACK frame
//! `"00249997001     02  0001\0"` carries header `sequenceNumber=02` and a
//! 4-byte payload `"0001"`, too short to hold a packed sequenceNumber AND a
//! 4-digit midNumber. So this codec's payload is just `midNumber` (4 ASCII
//! digits); a NEGATIVE_ACK carries an additional trailing `statusCode` (3
//! ASCII digits) naming why the frame it refers to was rejected, a
//! POSITIVE_ACK never carries one. The Link Layer reads the ack's header
//! `sequenceNumber` directly (see `link::dispatch_ack`), not via this
//! codec.

use bytes::BufMut;

use crate::fields::{read_field, FieldType};
use crate::message::{DecodedPayload, FieldValue, Message, Payload};
use crate::registry::{CodecError, CodecOptions, MidCodec};

/// Both ack MIDs share this wire layout; only the MID number registered
/// against distinguishes positive from negative.
#[derive(Debug)]
pub(crate) struct LinkAck;

impl LinkAck {
    pub fn positive() -> Self {
        Self
    }

    pub fn negative() -> Self {
        Self
    }
}

impl MidCodec for LinkAck {
    fn supported_revisions(&self) -> &'static [u16] {
        &[1]
    }

    fn parse(&self, mut msg: Message, _opts: &CodecOptions) -> Result<Message, CodecError> {
        let payload = match &msg.payload {
            Payload::Raw(b) => b.clone(),
            _ => return Err(CodecError::MalformedField { field: "payload" }),
        };

        let mut pos = 0;
        let mid_number = read_field(&payload, "midNumber", FieldType::Number, 4, &mut pos)?;

        let mut decoded = DecodedPayload::default();
        decoded.fields.push((
            "midNumber",
            match mid_number {
                crate::fields::FieldValueRaw::Number(n) => FieldValue::Number(n),
                crate::fields::FieldValueRaw::Text(t) => FieldValue::Text(t),
            },
        ));

        if payload.len() > pos {
            let status_code = read_field(&payload, "statusCode", FieldType::Number, 3, &mut pos)?;
            decoded.fields.push((
                "statusCode",
                match status_code {
                    crate::fields::FieldValueRaw::Number(n) => FieldValue::Number(n),
                    crate::fields::FieldValueRaw::Text(t) => FieldValue::Text(t),
                },
            ));
        }

        msg.payload = Payload::Decoded(decoded);
        Ok(msg)
    }

    fn serialize(&self, mut msg: Message, _opts: &CodecOptions) -> Result<Message, CodecError> {
        let decoded = match &msg.payload {
            Payload::Decoded(d) => d,
            _ => return Err(CodecError::MalformedField { field: "payload" }),
        };

        let mid_number = match decoded.field("midNumber") {
            Some(FieldValue::Number(n)) => *n,
            _ => return Err(CodecError::MalformedField { field: "midNumber" }),
        };

        let mut buf = bytes::BytesMut::with_capacity(7);
        buf.put_slice(format!("{mid_number:04}").as_bytes());
        if let Some(FieldValue::Number(code)) = decoded.field("statusCode") {
            buf.put_slice(format!("{code:03}").as_bytes());
        }

        msg.payload = Payload::Raw(buf.freeze());
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn parses_mid_number() {
        let msg = Message::new(9997, Payload::Raw(Bytes::from_static(b"0001")));
        let out = LinkAck::positive().parse(msg, &CodecOptions::default()).unwrap();
        let decoded = out.payload.as_decoded().unwrap();
        assert_eq!(decoded.field("midNumber"), Some(&FieldValue::Number(1)));
        assert!(decoded.field("statusCode").is_none());
    }

    #[test]
    fn parses_trailing_status_code_on_negative_ack() {
        let msg = Message::new(9998, Payload::Raw(Bytes::from_static(b"0001002")));
        let out = LinkAck::negative().parse(msg, &CodecOptions::default()).unwrap();
        let decoded = out.payload.as_decoded().unwrap();
        assert_eq!(decoded.field("midNumber"), Some(&FieldValue::Number(1)));
        assert_eq!(decoded.field("statusCode"), Some(&FieldValue::Number(2)));
    }
}
