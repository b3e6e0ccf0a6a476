//! Named-code lookup tables for Data Field `parameterID`/`unit` codes
//! (`spec.md` §3: "A named-code table resolves parameterID→parameterName
//! and unit→unitName").
//!
//! `spec.md` §1/§9 is explicit that the full MID catalog — and with it the
//! full parameterID/unit catalog — is out of scope, so this is an
//! illustrative table rather than the real Open Protocol code list. It
//! covers exactly the codes `spec.md` §3 itself names (the trace-sample
//! coefficient PIDs 02213/02214, and the four unit codes that double as
//! time-unit multipliers) plus a small sample of common units, grounded on
//! the same code-to-value `match` idiom [`fields::unit_multiplier_ms`](crate::fields)
//! already uses for the unit-multiplier table one section of `spec.md` §3
//! over.

/// Resolves a 5-digit Data Field `parameterID` to its human-readable name,
/// where this crate happens to know one.
///
/// Returns `None` for any parameterID outside this illustrative table —
/// exactly the documented fallback for a code the catalog doesn't cover,
/// not an error.
pub fn parameter_name(parameter_id: u32) -> Option<&'static str> {
    match parameter_id {
        2213 => Some("Trace sample coefficient (reciprocal)"),
        2214 => Some("Trace sample coefficient (direct)"),
        _ => None,
    }
}

/// Resolves a 3-digit `unit` code to its human-readable name.
///
/// Codes 200..=203 double as the time-unit multipliers `spec.md` §3 uses to
/// timestamp Trace Samples; the rest are illustrative physical units a Data
/// Field's `dataValue` might be expressed in.
pub fn unit_name(unit: u16) -> Option<&'static str> {
    match unit {
        1 => Some("Nm"),
        2 => Some("degrees"),
        3 => Some("rpm"),
        200 => Some("s"),
        201 => Some("min"),
        202 => Some("ms"),
        203 => Some("h"),
        _ => None,
    }
}
