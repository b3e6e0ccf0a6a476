use bytes::Bytes;
use smallvec::SmallVec;

/// The link-layer ack MIDs, reused throughout the crate.
pub const MID_POSITIVE_ACK: u16 = 9997;
pub const MID_NEGATIVE_ACK: u16 = 9998;
pub const MID_COMMAND_ACCEPTED: u16 = 5;
pub const MID_SUBSCRIBE: u16 = 8;
pub const MID_UNSUBSCRIBE: u16 = 9;

/// A single Open Protocol message, in its in-memory form.
///
/// This is the record produced by the [header parser](crate::header::parser)
/// and consumed by the [header serializer](crate::header::serializer), and
/// the record the [`Registry`](crate::registry::Registry) reads the
/// `payload` of.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message ID, 1..9999.
    pub mid: u16,

    /// Per-MID schema revision, 1..999. Defaults to 1 when blank on the
    /// wire.
    pub revision: u16,

    /// Whether the sender indicated it does not require a Link Layer ack.
    pub no_ack: bool,

    /// Station (controller) identifier, 0..99.
    pub station_id: u8,

    /// Spindle identifier, 0..99.
    pub spindle_id: u8,

    /// Link Layer sequence number, 0..99. Zero in Inactive mode.
    pub sequence_number: u8,

    /// Total number of parts this logical message was split across, 0..9.
    /// Zero or one both mean "not split".
    pub message_parts: u8,

    /// This frame's 1-based position within `message_parts`.
    pub message_number: u8,

    /// The message body.
    pub payload: Payload,

    /// Marks this as an application-level ack reply, so the Link Layer will
    /// not itself demand an ack for it.
    pub is_ack: bool,

    /// The original framed bytes, present only when raw-data mode is
    /// enabled.
    pub raw: Option<Bytes>,
}

impl Message {
    /// Builds a message with only the fields that matter for a typical
    /// caller-initiated write; everything else takes the documented wire
    /// default.
    pub fn new(mid: u16, payload: Payload) -> Self {
        Self {
            mid,
            revision: 1,
            no_ack: false,
            station_id: 0,
            spindle_id: 0,
            sequence_number: 0,
            message_parts: 0,
            message_number: 0,
            payload,
            is_ack: false,
            raw: None,
        }
    }

    /// True if this message is one of the Link Layer's own ack frames.
    pub fn is_link_ack(&self) -> bool {
        matches!(self.mid, MID_POSITIVE_ACK | MID_NEGATIVE_ACK)
    }
}

/// The body of a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Undecoded bytes, as delivered by the Header Parser or accepted
    /// verbatim by the Header Serializer.
    Raw(Bytes),

    /// ASCII text, for MIDs whose payload is plain text rather than a
    /// fixed-width record (and for the unknown-MID serializer fallback).
    Text(String),

    /// A structured record decoded by a [`MidCodec`](crate::registry::MidCodec).
    Decoded(DecodedPayload),
}

impl Payload {
    /// Borrows the raw bytes, if this payload is [`Payload::Raw`].
    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Self::Raw(b) => Some(b),
            _ => None,
        }
    }

    /// Borrows the decoded record, if this payload is [`Payload::Decoded`].
    pub fn as_decoded(&self) -> Option<&DecodedPayload> {
        match self {
            Self::Decoded(d) => Some(d),
            _ => None,
        }
    }
}

/// A single named scalar field decoded from a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A right-trimmed ASCII string field.
    Text(String),
    /// A parsed numeric field.
    Number(i64),
    /// A field read with `rawString` semantics (exact width, untrimmed).
    Raw(Bytes),
}

/// The generic structured representation a [`MidCodec`](crate::registry::MidCodec)
/// decodes a payload into.
///
/// The full MID catalog is out of scope, so rather than invent one typed
/// struct per MID this stays a generic bag of named fields plus the three
/// repeating record groups `spec.md` §3 defines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedPayload {
    /// Named scalar fields, in the order the codec read them.
    pub fields: Vec<(&'static str, FieldValue)>,

    /// Data Field records, tolerantly parsed.
    pub data_fields: SmallVec<[DataField; 4]>,

    /// Resolution Field records, strictly parsed.
    pub resolution_fields: SmallVec<[ResolutionField; 4]>,

    /// Trace Sample records.
    pub trace_samples: SmallVec<[TraceSample; 16]>,
}

impl DecodedPayload {
    /// Looks up a named scalar field.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

/// A repeating Data Field record (`spec.md` §3). Parsed tolerantly: a
/// malformed or truncated record simply ends the scan, rather than failing
/// the whole payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DataField {
    /// 5-digit parameter ID.
    pub parameter_id: u32,
    /// 2-digit data type code.
    pub data_type: u8,
    /// 3-digit unit code.
    pub unit: u16,
    /// 4-digit step number.
    pub step_number: u16,
    /// The `L`-byte data value, verbatim.
    pub value: Bytes,
}

impl DataField {
    /// Resolves [`parameter_id`](Self::parameter_id) to a human-readable
    /// name via the [`codes`](crate::codes) table, per `spec.md` §3.
    /// `None` for any parameterID the table doesn't cover.
    pub fn parameter_name(&self) -> Option<&'static str> {
        crate::codes::parameter_name(self.parameter_id)
    }

    /// Resolves [`unit`](Self::unit) to a human-readable name via the
    /// [`codes`](crate::codes) table, per `spec.md` §3.
    pub fn unit_name(&self) -> Option<&'static str> {
        crate::codes::unit_name(self.unit)
    }
}

/// A repeating Resolution Field record (`spec.md` §3). Parsed strictly: any
/// malformed record fails the whole payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionField {
    /// 5-digit first index.
    pub first_index: u32,
    /// 5-digit last index.
    pub last_index: u32,
    /// 2-digit data type code.
    pub data_type: u8,
    /// 3-digit unit code.
    pub unit: u16,
    /// The `L`-byte time value, verbatim.
    pub time_value: Bytes,
}

impl ResolutionField {
    /// Resolves [`unit`](Self::unit) to a human-readable name via the
    /// [`codes`](crate::codes) table, per `spec.md` §3.
    pub fn unit_name(&self) -> Option<&'static str> {
        crate::codes::unit_name(self.unit)
    }
}

/// A single decoded Trace Sample (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSample {
    /// The raw 16-bit two's-complement sample, before scaling.
    pub raw: i16,

    /// `raw` scaled by the sibling coefficient Data Field.
    pub scaled: f64,

    /// Milliseconds since `baseTimestamp`, per the unit-multiplier table in
    /// `spec.md` §3.
    pub timestamp_offset_ms: i64,
}
