//! An illustrative MID combining Data Fields, Resolution Fields, and Trace
//! Samples in one payload, purely to exercise
//! `read_data_fields`/`read_resolution_fields`/`read_trace_samples` end to
//! end (`spec.md` §4.4). `spec.md` pins down no real MID's binary layout,
//! so the MID number and field order here are this crate's own invention.
//!
//! Payload layout: `dataFieldCount` (2 digits), that many Data Fields;
//! `resolutionFieldCount` (2 digits), that many Resolution Fields;
//! `traceSampleCount` (2 digits), `timeStep` (5 digits), `unit` (3 digits),
//! that many 16-bit big-endian Trace Samples.

use bytes::{BufMut, BytesMut};

use crate::fields::{read_data_fields, read_resolution_fields, read_trace_samples};
use crate::message::{DecodedPayload, Message, Payload};
use crate::registry::{CodecError, CodecOptions, MidCodec};

/// Not a real Open Protocol MID number; chosen out of the way of the
/// illustrative MIDs this crate does assign real semantics to.
pub(crate) const MID: u16 = 9500;

#[derive(Debug)]
pub(crate) struct TraceDemo;

impl MidCodec for TraceDemo {
    fn supported_revisions(&self) -> &'static [u16] {
        &[1]
    }

    fn parse(&self, mut msg: Message, _opts: &CodecOptions) -> Result<Message, CodecError> {
        let payload = match &msg.payload {
            Payload::Raw(b) => b.clone(),
            _ => return Err(CodecError::MalformedField { field: "payload" }),
        };

        let mut pos = 0;
        let data_field_count = read_count(&payload, &mut pos, "dataFieldCount")?;
        let data_fields = read_data_fields(&payload, data_field_count, &mut pos);

        let resolution_field_count = read_count(&payload, &mut pos, "resolutionFieldCount")?;
        let resolution_fields = read_resolution_fields(&payload, resolution_field_count, &mut pos)?;

        let trace_sample_count = read_count(&payload, &mut pos, "traceSampleCount")?;
        let time_step = read_digits::<i64>(&payload, &mut pos, 5, "timeStep")?;
        let unit = read_digits::<u16>(&payload, &mut pos, 3, "unit")?;

        let trace_samples = read_trace_samples(
            &payload,
            trace_sample_count,
            &mut pos,
            &data_fields,
            time_step,
            unit,
        )?;

        msg.payload = Payload::Decoded(DecodedPayload {
            fields: Vec::new(),
            data_fields,
            resolution_fields,
            trace_samples,
        });
        Ok(msg)
    }

    fn serialize(&self, _msg: Message, _opts: &CodecOptions) -> Result<Message, CodecError> {
        // This illustrative codec is read-only: its payload is only ever
        // produced by a controller, never constructed by this client.
        Err(CodecError::MalformedField { field: "payload" })
    }
}

fn read_count(payload: &[u8], pos: &mut usize, field: &'static str) -> Result<usize, CodecError> {
    read_digits::<usize>(payload, pos, 2, field)
}

fn read_digits<T: std::str::FromStr>(
    payload: &[u8],
    pos: &mut usize,
    width: usize,
    field: &'static str,
) -> Result<T, CodecError> {
    let end = *pos + width;
    let slice = payload
        .get(*pos..end)
        .ok_or(CodecError::ShortBuffer { field })?;
    *pos = end;
    std::str::from_utf8(slice)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CodecError::MalformedField { field })
}

/// Builds a payload in this codec's layout, for tests.
#[cfg(test)]
pub(crate) fn build_fixture() -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_slice(b"01"); // one data field
    buf.put_slice(b"022130030101000012.5"); // PID 2213, len 3, "2.5"
    buf.put_slice(b"00"); // zero resolution fields
    buf.put_slice(b"03"); // three trace samples
    buf.put_slice(b"00010"); // timeStep = 10
    buf.put_slice(b"200"); // unit 200 -> 1000ms multiplier
    buf.put_i16(100);
    buf.put_i16(-50);
    buf.put_i16(0);
    buf
}
