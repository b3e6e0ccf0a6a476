//! Illustrative leaf MID codecs.
//!
//! `spec.md` §1/§4.4 is explicit that the full MID catalog is out of
//! scope and only a handful of illustrative MIDs are needed to pin down
//! the registry's conventions. This module implements exactly those: the
//! pair used in `spec.md` §8 scenario 1 (MID 1/2), the command-accepted
//! and subscribe/unsubscribe MIDs the Link Layer's outbound path relies on
//! (MID 5/8/9, though the actual rewriting lives centrally in
//! [`Registry::serialize`](crate::registry::Registry::serialize)), the two
//! Link Layer ack MIDs (9997/9998), and one MID invented purely to
//! exercise `read_data_fields`/`read_resolution_fields`/`read_trace_samples`
//! end to end, since no real MID's binary layout is pinned down by
//! `spec.md`.

mod ack;
mod mid1;
mod mid2;
mod trace_demo;

use crate::registry::Registry;

/// Registers every illustrative codec this crate ships.
pub(crate) fn register_defaults(registry: &mut Registry) {
    registry.register(1, Box::new(mid1::CommunicationStartRequest));
    registry.register(2, Box::new(mid2::CommunicationStartAcknowledge));
    registry.register(
        crate::message::MID_POSITIVE_ACK,
        Box::new(ack::LinkAck::positive()),
    );
    registry.register(
        crate::message::MID_NEGATIVE_ACK,
        Box::new(ack::LinkAck::negative()),
    );
    registry.register(trace_demo::MID, Box::new(trace_demo::TraceDemo));
}
