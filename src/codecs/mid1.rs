//! MID 1 — communication start request. The illustrative request half of
//! `spec.md` §8 scenario 1; carries no payload fields of its own.

use crate::message::{DecodedPayload, Message, Payload};
use crate::registry::{CodecError, CodecOptions, MidCodec};

#[derive(Debug)]
pub(crate) struct CommunicationStartRequest;

impl MidCodec for CommunicationStartRequest {
    fn supported_revisions(&self) -> &'static [u16] {
        &[1]
    }

    fn parse(&self, mut msg: Message, _opts: &CodecOptions) -> Result<Message, CodecError> {
        msg.payload = Payload::Decoded(DecodedPayload::default());
        Ok(msg)
    }

    fn serialize(&self, mut msg: Message, _opts: &CodecOptions) -> Result<Message, CodecError> {
        msg.payload = Payload::Raw(bytes::Bytes::new());
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_yields_empty_decoded_payload() {
        let msg = Message::new(1, Payload::Raw(bytes::Bytes::new()));
        let out = CommunicationStartRequest
            .parse(msg, &CodecOptions::default())
            .unwrap();
        assert_eq!(out.payload, Payload::Decoded(DecodedPayload::default()));
    }
}
