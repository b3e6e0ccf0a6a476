use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use open_protocol_client::fields::{read_data_fields, read_trace_samples, FieldType};
use open_protocol_client::header::parser::HeaderParser;
use open_protocol_client::header::serializer;
use open_protocol_client::message::{Message, Payload};

pub fn header(c: &mut Criterion) {
    c.bench_function("parse_basic_frame", |b| {
        let mut frame = Vec::new();
        frame.extend_from_slice(b"00240002001001010100test");
        frame.push(0);

        b.iter(|| {
            let mut parser = HeaderParser::new(false);
            parser.push(black_box(&frame));
            black_box(parser.next().unwrap())
        })
    });

    c.bench_function("parse_chunked_frame", |b| {
        let mut frame = Vec::new();
        frame.extend_from_slice(b"00240002001001010100test");
        frame.push(0);

        b.iter(|| {
            let mut parser = HeaderParser::new(false);
            for chunk in frame.chunks(4) {
                parser.push(black_box(chunk));
            }
            black_box(parser.next().unwrap())
        })
    });

    c.bench_function("serialise_basic_frame", |b| {
        let mut msg = Message::new(2, Payload::Text("hello, controller".to_owned()));
        msg.sequence_number = 1;

        b.iter(|| black_box(serializer::serialize(&msg).unwrap()))
    });
}

pub fn fields(c: &mut Criterion) {
    c.bench_function("read_data_fields_x8", |b| {
        let mut payload = Vec::new();
        for _ in 0..8 {
            payload.extend_from_slice(b"022130030101000012.5");
        }
        let payload = Bytes::from(payload);

        b.iter(|| {
            let mut pos = 0;
            black_box(read_data_fields(black_box(&payload), 8, &mut pos))
        })
    });

    c.bench_function("read_trace_samples_x64", |b| {
        let mut payload = Vec::new();
        for sample in 0..64i16 {
            payload.extend_from_slice(&sample.to_be_bytes());
        }
        let payload = Bytes::from(payload);
        let data_fields = read_data_fields(
            &Bytes::from_static(b"022130030101000012.5"),
            1,
            &mut 0,
        );

        b.iter(|| {
            let mut pos = 0;
            black_box(
                read_trace_samples(black_box(&payload), 64, &mut pos, &data_fields, 10, 200)
                    .unwrap(),
            )
        })
    });

    // Exercises the non-numeric-field error path, which `FieldType::Number`
    // hits on every malformed frame a controller sends.
    c.bench_function("read_field_malformed_number", |b| {
        let payload = Bytes::from_static(b"12a4");
        b.iter(|| {
            let mut pos = 0;
            black_box(open_protocol_client::fields::read_field(
                black_box(&payload),
                "cellID",
                FieldType::Number,
                4,
                &mut pos,
            ))
        })
    });
}

criterion_group!(benches, header, fields);
criterion_main!(benches);
