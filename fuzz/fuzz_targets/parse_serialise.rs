#![no_main]

use libfuzzer_sys::fuzz_target;
use open_protocol_client::header::parser::HeaderParser;
use open_protocol_client::header::serializer;

fuzz_target!(|data: &[u8]| {
    let mut parser = HeaderParser::new(false);
    parser.push(data);

    while let Ok(Some(msg)) = parser.next() {
        let Ok(framed) = serializer::serialize(&msg) else {
            continue;
        };

        let mut reparser = HeaderParser::new(false);
        reparser.push(&framed);
        let reparsed = reparser
            .next()
            .expect("re-parsing a message this crate just serialized must not error")
            .expect("a fully serialized frame must parse in one shot");

        assert_eq!(msg.mid, reparsed.mid);
        assert_eq!(msg.revision, reparsed.revision);
        assert_eq!(msg.station_id, reparsed.station_id);
        assert_eq!(msg.spindle_id, reparsed.spindle_id);
        assert_eq!(msg.payload, reparsed.payload);
    }
});
