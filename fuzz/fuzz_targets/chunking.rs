#![no_main]

use libfuzzer_sys::fuzz_target;
use open_protocol_client::header::parser::HeaderParser;

/// Feeds the same bytes to one parser in a single chunk and to another
/// split at every byte boundary `data` happens to contain, asserting both
/// deliver the same sequence of messages (or the same first error) — the
/// chunk-boundary-idempotence property from `spec.md` §8, fed directly by
/// the fuzzer's own byte stream rather than constructed frames.
fuzz_target!(|data: &[u8]| {
    let whole = drain(std::iter::once(data));

    // Split at every 7-byte boundary: arbitrary but deterministic, and
    // small enough to cross length/mid/header/payload/terminator
    // boundaries repeatedly across a single fuzz input.
    let split = drain(data.chunks(7));

    assert_eq!(whole, split);
});

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Mid(u16),
    Err,
}

fn drain<'a>(chunks: impl Iterator<Item = &'a [u8]>) -> Vec<Outcome> {
    let mut parser = HeaderParser::new(false);
    let mut out = Vec::new();

    for chunk in chunks {
        parser.push(chunk);
        loop {
            match parser.next() {
                Ok(Some(msg)) => out.push(Outcome::Mid(msg.mid)),
                Ok(None) => break,
                Err(_) => {
                    out.push(Outcome::Err);
                    return out;
                }
            }
        }
    }

    out
}
