//! Multi-part message reassembly (`spec.md` §3/§4.3).
//!
//! Grounded on the *shape* of `aeronet_proto::frag::recv::FragmentReceiver`
//! (a buffer accumulating parts of a message, with dedicated error
//! variants for malformed part sequences), simplified to `spec.md` §4.3's
//! strict-order requirement: a part's `messageNumber` must equal the
//! running counter exactly, with no windowed or out-of-order acceptance.

use bytes::{BufMut, Bytes, BytesMut};

use crate::message::Message;

/// The reassembler failed to make sense of an incoming part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    /// `messageNumber` did not equal the expected running counter.
    #[error("inconsistent messageNumber")]
    InconsistencyMessageNumber,
}

/// Accumulates the parts of one in-progress multi-part message.
#[derive(Debug, Default)]
pub struct Reassembler {
    partial: Option<Partial>,
}

#[derive(Debug)]
struct Partial {
    mid: u16,
    total_parts: u8,
    next_expected: u8,
    buffer: BytesMut,
    header: Message,
}

/// What happened to a part just fed into the reassembler.
#[derive(Debug)]
pub enum Outcome {
    /// More parts are still expected; nothing to deliver yet.
    Pending,
    /// The final part arrived; `Message` carries the concatenated payload
    /// and the header fields of the *last* part (matching `spec.md` §3's
    /// "messageParts=N, messageNumber=N" observed-on-delivery wording).
    Complete(Message),
}

impl Reassembler {
    /// Creates an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a multi-part message is mid-reassembly.
    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    /// Discards any in-progress reassembly, e.g. after a protocol error.
    pub fn discard(&mut self) {
        self.partial = None;
    }

    /// Feeds one frame (already sliced off the wire) into the reassembler.
    ///
    /// `frame.message_parts == 0` or `1` are passed straight through as
    /// `Outcome::Complete`, since neither represents a split message.
    pub fn feed(&mut self, frame: Message) -> Result<Outcome, ReassemblyError> {
        if frame.message_parts <= 1 {
            return Ok(Outcome::Complete(frame));
        }

        match self.partial.take() {
            None => {
                if frame.message_number != 1 {
                    return Err(ReassemblyError::InconsistencyMessageNumber);
                }
                let payload = payload_bytes(&frame);
                let mut buffer = BytesMut::with_capacity(payload.len() * frame.message_parts as usize);
                buffer.put_slice(payload);

                self.partial = Some(Partial {
                    mid: frame.mid,
                    total_parts: frame.message_parts,
                    next_expected: 2,
                    buffer,
                    header: frame,
                });
                Ok(Outcome::Pending)
            }
            Some(mut partial) => {
                if frame.mid != partial.mid || frame.message_number != partial.next_expected {
                    self.partial = None;
                    return Err(ReassemblyError::InconsistencyMessageNumber);
                }

                partial.buffer.put_slice(payload_bytes(&frame));

                if frame.message_number == partial.total_parts {
                    let mut header = partial.header;
                    header.message_number = frame.message_number;
                    header.sequence_number = frame.sequence_number;
                    header.payload = crate::message::Payload::Raw(partial.buffer.freeze());
                    self.partial = None;
                    Ok(Outcome::Complete(header))
                } else {
                    partial.next_expected += 1;
                    self.partial = Some(partial);
                    Ok(Outcome::Pending)
                }
            }
        }
    }
}

fn payload_bytes(msg: &Message) -> &[u8] {
    match &msg.payload {
        crate::message::Payload::Raw(b) => b.as_ref(),
        crate::message::Payload::Text(s) => s.as_bytes(),
        crate::message::Payload::Decoded(_) => &[],
    }
}

/// Concatenates `parts` in order, for tests and callers that already hold
/// whole frames rather than feeding them one at a time.
pub fn concat_payloads(parts: &[Bytes]) -> Bytes {
    let mut out = BytesMut::with_capacity(parts.iter().map(Bytes::len).sum());
    for p in parts {
        out.put_slice(p);
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, Payload};

    fn part(mid: u16, parts: u8, number: u8, payload: &str) -> Message {
        let mut m = Message::new(mid, Payload::Raw(Bytes::copy_from_slice(payload.as_bytes())));
        m.message_parts = parts;
        m.message_number = number;
        m
    }

    #[test]
    fn reassembles_three_parts_in_order() {
        let mut r = Reassembler::new();
        assert!(matches!(r.feed(part(2, 3, 1, "aaa")).unwrap(), Outcome::Pending));
        assert!(matches!(r.feed(part(2, 3, 2, "bbb")).unwrap(), Outcome::Pending));
        match r.feed(part(2, 3, 3, "ccc")).unwrap() {
            Outcome::Complete(msg) => {
                assert_eq!(msg.payload, Payload::Raw(Bytes::from_static(b"aaabbbccc")));
                assert_eq!(msg.message_parts, 3);
                assert_eq!(msg.message_number, 3);
            }
            Outcome::Pending => panic!("expected completion"),
        }
    }

    #[test]
    fn out_of_order_message_number_fails() {
        let mut r = Reassembler::new();
        assert!(matches!(r.feed(part(2, 3, 3, "ccc")).unwrap_err(), ReassemblyError::InconsistencyMessageNumber));
        let err = r.feed(part(2, 3, 3, "ccc")).unwrap_err();
        assert_eq!(err, ReassemblyError::InconsistencyMessageNumber);
    }

    #[test]
    fn single_part_message_passes_through() {
        let mut r = Reassembler::new();
        match r.feed(part(2, 0, 0, "hello")).unwrap() {
            Outcome::Complete(msg) => assert_eq!(msg.payload, Payload::Raw(Bytes::from_static(b"hello"))),
            Outcome::Pending => panic!("expected completion"),
        }
    }

    #[test]
    fn reassembly_matches_single_part_of_same_bytes() {
        let mut r = Reassembler::new();
        r.feed(part(2, 3, 1, "aaa")).unwrap();
        r.feed(part(2, 3, 2, "bbb")).unwrap();
        let Outcome::Complete(reassembled) = r.feed(part(2, 3, 3, "ccc")).unwrap() else {
            panic!("expected completion")
        };

        let single = part(2, 0, 0, "aaabbbccc");
        assert_eq!(reassembled.payload, single.payload);
    }
}
