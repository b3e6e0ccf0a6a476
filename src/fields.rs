//! Field helpers shared by every MID codec: `spec.md` §4.4's `readField`,
//! `readDataFields`, `readResolutionFields`, `readTraceSamples`, `testNul`.
//!
//! Grounded on `onc_rpc::opaque::Opaque`'s `Cursor<&[u8]>` + manual
//! length-bookkeeping style, and on the teacher's use of
//! `byteorder::{BigEndian, ReadBytesExt}` for the one genuinely binary
//! field this protocol has (a Trace Sample's 16-bit two's-complement
//! integer) — every other field here is ASCII digits, which `byteorder`
//! has no opinion on.

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use smallvec::SmallVec;
use std::io::Cursor;

use crate::message::{DataField, ResolutionField, TraceSample};
use crate::registry::CodecError;

/// The kind of scalar field [`read_field`] should decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Right-trimmed ASCII string.
    String,
    /// Exact-width string; any byte outside 7-bit ASCII printable range is
    /// not itself an error, but the width must match exactly.
    RawString,
    /// ASCII digits, parsed as an integer.
    Number,
}

/// Reads a single fixed-width scalar field out of `payload` at `position`,
/// per `spec.md` §4.4.
///
/// `name` is carried only for error messages; callers typically store the
/// result under that name in a [`DecodedPayload`](crate::message::DecodedPayload).
pub fn read_field(
    payload: &[u8],
    name: &'static str,
    field_type: FieldType,
    width: usize,
    position: &mut usize,
) -> Result<FieldValueRaw, CodecError> {
    let end = *position + width;
    let slice = payload
        .get(*position..end)
        .ok_or(CodecError::ShortBuffer { field: name })?;
    *position = end;

    match field_type {
        FieldType::String => {
            let trimmed = std::str::from_utf8(slice)
                .map_err(|_| CodecError::MalformedField { field: name })?
                .trim_end();
            Ok(FieldValueRaw::Text(trimmed.to_owned()))
        }
        FieldType::RawString => {
            let text = std::str::from_utf8(slice)
                .map_err(|_| CodecError::MalformedField { field: name })?;
            Ok(FieldValueRaw::Text(text.to_owned()))
        }
        FieldType::Number => {
            let text = std::str::from_utf8(slice)
                .map_err(|_| CodecError::MalformedField { field: name })?;
            let n: i64 = text
                .trim()
                .parse()
                .map_err(|_| CodecError::MalformedField { field: name })?;
            Ok(FieldValueRaw::Number(n))
        }
    }
}

/// The parsed value of a field read by [`read_field`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValueRaw {
    Text(String),
    Number(i64),
}

/// Asserts the byte at `position` is `0x00` and advances past it, per
/// `spec.md` §4.4's `testNul`.
pub fn test_nul(buffer: &[u8], position: &mut usize) -> Result<(), CodecError> {
    match buffer.get(*position) {
        Some(0) => {
            *position += 1;
            Ok(())
        }
        _ => Err(CodecError::MalformedField { field: "nul" }),
    }
}

const DATA_FIELD_HEADER_LEN: usize = 5 + 3 + 2 + 3 + 4;

/// Reads up to `count` repeating Data Field records starting at
/// `position`, tolerantly: the first malformed or truncated record simply
/// ends the scan, returning what was parsed so far rather than failing.
///
/// This policy is deliberate (`spec.md` §9): real controllers emit
/// under-specified Data Field groups, and a strict reader would make the
/// whole message undeliverable over one bad trailing record.
pub fn read_data_fields(
    payload: &[u8],
    count: usize,
    position: &mut usize,
) -> SmallVec<[DataField; 4]> {
    let mut out = SmallVec::new();

    for _ in 0..count {
        let Some(field) = try_read_one_data_field(payload, position) else {
            break;
        };
        out.push(field);
    }

    out
}

fn try_read_one_data_field(payload: &[u8], position: &mut usize) -> Option<DataField> {
    let start = *position;
    let header = payload.get(start..start + DATA_FIELD_HEADER_LEN)?;

    let parameter_id: u32 = ascii_digits(&header[0..5])?;
    let length: usize = ascii_digits::<usize>(&header[5..8])?;
    let data_type: u8 = ascii_digits(&header[8..10])?;
    let unit: u16 = ascii_digits(&header[10..13])?;
    let step_number: u16 = ascii_digits(&header[13..17])?;

    let value_start = start + DATA_FIELD_HEADER_LEN;
    let value = payload.get(value_start..value_start + length)?;

    *position = value_start + length;

    Some(DataField {
        parameter_id,
        data_type,
        unit,
        step_number,
        value: Bytes::copy_from_slice(value),
    })
}

const RESOLUTION_FIELD_HEADER_LEN: usize = 5 + 5 + 3 + 2 + 3;

/// Reads up to `count` repeating Resolution Field records starting at
/// `position`, strictly: any malformed record fails the whole read.
pub fn read_resolution_fields(
    payload: &[u8],
    count: usize,
    position: &mut usize,
) -> Result<SmallVec<[ResolutionField; 4]>, CodecError> {
    let mut out = SmallVec::new();

    for _ in 0..count {
        let start = *position;
        let header = payload
            .get(start..start + RESOLUTION_FIELD_HEADER_LEN)
            .ok_or(CodecError::ShortBuffer {
                field: "resolution_field",
            })?;

        let first_index: u32 = ascii_digits(&header[0..5])
            .ok_or(CodecError::MalformedField { field: "firstIndex" })?;
        let last_index: u32 = ascii_digits(&header[5..10])
            .ok_or(CodecError::MalformedField { field: "lastIndex" })?;
        let length: usize = ascii_digits(&header[10..13])
            .ok_or(CodecError::MalformedField { field: "length" })?;
        let data_type: u8 = ascii_digits(&header[13..15])
            .ok_or(CodecError::MalformedField { field: "dataType" })?;
        let unit: u16 =
            ascii_digits(&header[15..18]).ok_or(CodecError::MalformedField { field: "unit" })?;

        let value_start = start + RESOLUTION_FIELD_HEADER_LEN;
        let time_value =
            payload
                .get(value_start..value_start + length)
                .ok_or(CodecError::ShortBuffer {
                    field: "timeValue",
                })?;

        *position = value_start + length;

        out.push(ResolutionField {
            first_index,
            last_index,
            data_type,
            unit,
            time_value: Bytes::copy_from_slice(time_value),
        });
    }

    Ok(out)
}

/// Unit codes that double as time multipliers (milliseconds per unit),
/// per `spec.md` §3.
fn unit_multiplier_ms(unit: u16) -> i64 {
    match unit {
        200 => 1_000,
        201 => 60_000,
        202 => 1,
        203 => 3_600_000,
        _ => 1,
    }
}

/// Parameter IDs of the sibling Data Field coefficient used to scale Trace
/// Samples, per `spec.md` §3.
const PID_COEFFICIENT_RECIPROCAL: u32 = 2213;
const PID_COEFFICIENT_DIRECT: u32 = 2214;

/// Reads `count` 16-bit big-endian Trace Samples starting at `position`,
/// scaling each by the coefficient found in `data_fields` and
/// time-stamping each relative to `base_timestamp_ms`, per `spec.md` §3.
pub fn read_trace_samples(
    payload: &[u8],
    count: usize,
    position: &mut usize,
    data_fields: &[DataField],
    time_step: i64,
    unit: u16,
) -> Result<SmallVec<[TraceSample; 16]>, CodecError> {
    let coefficient = trace_coefficient(data_fields)?;
    let multiplier = unit_multiplier_ms(unit);

    let mut cursor = Cursor::new(
        payload
            .get(*position..)
            .ok_or(CodecError::ShortBuffer { field: "traceSample" })?,
    );

    let mut out = SmallVec::new();
    for index in 0..count {
        let raw = cursor
            .read_i16::<BigEndian>()
            .map_err(|_| CodecError::ShortBuffer { field: "traceSample" })?;

        out.push(TraceSample {
            raw,
            scaled: f64::from(raw) * coefficient,
            timestamp_offset_ms: time_step * multiplier * index as i64,
        });
    }

    *position += (cursor.position()) as usize;
    Ok(out)
}

fn trace_coefficient(data_fields: &[DataField]) -> Result<f64, CodecError> {
    for field in data_fields {
        let raw_value = std::str::from_utf8(&field.value)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok());

        match (field.parameter_id, raw_value) {
            (PID_COEFFICIENT_RECIPROCAL, Some(v)) if v != 0.0 => return Ok(1.0 / v),
            (PID_COEFFICIENT_DIRECT, Some(v)) => return Ok(v),
            _ => continue,
        }
    }

    Err(CodecError::MalformedField {
        field: "traceSampleCoefficient",
    })
}

fn ascii_digits<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_field_trims_string() {
        let payload = b"Teste Airbag             ";
        let mut pos = 0;
        let v = read_field(payload, "controllerName", FieldType::String, payload.len(), &mut pos).unwrap();
        assert_eq!(v, FieldValueRaw::Text("Teste Airbag".to_owned()));
        assert_eq!(pos, payload.len());
    }

    #[test]
    fn read_field_number_rejects_non_digits() {
        let payload = b"12a4";
        let mut pos = 0;
        let err = read_field(payload, "cellID", FieldType::Number, 4, &mut pos).unwrap_err();
        assert!(matches!(err, CodecError::MalformedField { field: "cellID" }));
    }

    #[test]
    fn data_fields_stop_on_short_trailing_record() {
        // One well-formed record followed by a truncated header.
        let mut payload = b"022130030101000012.5".to_vec();
        payload.extend_from_slice(b"0221300"); // truncated second header
        let mut pos = 0;
        let fields = read_data_fields(&payload, 2, &mut pos);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].parameter_id, 2213);
    }

    #[test]
    fn resolution_fields_fail_on_malformed_record() {
        let payload = b"0000100002XXX01020"; // dataType field "XX" is non-numeric
        let mut pos = 0;
        let err = read_resolution_fields(payload, 1, &mut pos).unwrap_err();
        assert!(matches!(err, CodecError::MalformedField { .. }));
    }

    #[test]
    fn read_trace_samples_decodes_raw_be_i16_bytes() {
        // The one genuinely binary field in the protocol: two 16-bit BE
        // two's-complement samples, 100 and -50, spelled out as hex rather
        // than built with `to_be_bytes` so the expected wire bytes are
        // visible at the call site.
        let payload = hex_literal::hex!("0064 FFCE").to_vec();
        let coefficient = DataField {
            parameter_id: PID_COEFFICIENT_DIRECT,
            data_type: 0,
            unit: 0,
            step_number: 0,
            value: Bytes::from_static(b"2.0"),
        };

        let mut pos = 0;
        let samples =
            read_trace_samples(&payload, 2, &mut pos, &[coefficient], 10, 200).unwrap();

        assert_eq!(samples[0].raw, 100);
        assert_eq!(samples[0].scaled, 200.0);
        assert_eq!(samples[1].raw, -50);
        assert_eq!(samples[1].timestamp_offset_ms, 10_000);
        assert_eq!(pos, 4);
    }
}
