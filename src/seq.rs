//! A wraparound sequence number in the protocol's 1..=99 space.
//!
//! Grounded on `aeronet_proto::seq::Seq`'s wraparound comparison/arithmetic
//! design, narrowed from a 16-bit general sequence space to the 1..=99
//! range `spec.md` §3/§8 define, with the two distinct wrap rules the spec
//! calls out: outbound sequence numbers wrap `99 -> 1`, while the sequence
//! number carried back in a POSITIVE_ACK wraps `99 -> 0`.

use std::cmp::Ordering;

/// An outbound Link Layer sequence number, always in `1..=99`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seq(u8);

impl Seq {
    /// The first sequence number a freshly activated Link Layer assigns.
    pub const FIRST: Self = Self(1);

    /// The "no frame received yet" sentinel an inbound peer-sequence
    /// tracker starts at. Not itself a valid outbound sequence number —
    /// only [`next`](Self::next)/[`prev`](Self::prev) ever see it.
    pub const ZERO: Self = Self(0);

    /// Wraps `v` into `1..=99`, per the outbound wrap rule (`99 -> 1`).
    pub fn new(v: u8) -> Self {
        Self(((v.saturating_sub(1)) % 99) + 1)
    }

    /// The next outbound sequence number after this one (`99 -> 1`).
    pub fn next(self) -> Self {
        if self.0 >= 99 {
            Self(1)
        } else {
            Self(self.0 + 1)
        }
    }

    /// The sequence number before this one (`1 -> 99`), the inverse of
    /// [`next`](Self::next). Used to roll an inbound tracker back on a
    /// detected duplicate so it re-matches the next fresh frame.
    pub fn prev(self) -> Self {
        if self.0 <= 1 {
            Self(99)
        } else {
            Self(self.0 - 1)
        }
    }

    /// The value this sequence number should appear as in the POSITIVE_ACK
    /// that acknowledges it (`99 -> 0`, otherwise `+1`).
    pub fn ack_value(self) -> u8 {
        if self.0 >= 99 {
            0
        } else {
            self.0 + 1
        }
    }

    /// The raw wire value.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for Seq {
    fn from(v: u8) -> Self {
        Self::new(v.max(1))
    }
}

impl PartialOrd for Seq {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Plain integer ordering; the Link Layer never orders sequence numbers
// across a wrap (it only ever compares for equality), so this is not
// wrap-aware. Only derived to satisfy `PartialOrd`'s supertrait bound.
impl Ord for Seq {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}
