use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gasp_parser::{Parser, TypeDescriptor};

const PERSON_INPUT: &str = "<think>let me draft this</think>\
    <Person><name>Alice</name><age>30</age>\
    <hobbies><item>coding</item><item>hiking</item><item>reading</item></hobbies>\
    </Person>";

fn person_descriptor() -> TypeDescriptor {
    TypeDescriptor::class(
        "Person",
        vec![
            ("name", TypeDescriptor::string()),
            ("age", TypeDescriptor::int()),
            ("hobbies", TypeDescriptor::list(TypeDescriptor::string())),
        ],
    )
    .expect("person descriptor")
}

fn bench_parse_whole(c: &mut Criterion) {
    c.bench_function("parse/person_whole", |b| {
        b.iter(|| {
            let mut parser = Parser::new(person_descriptor()).expect("parser");
            parser.feed(black_box(PERSON_INPUT)).expect("feed");
            black_box(parser.is_complete());
        });
    });
}

fn bench_parse_chunked(c: &mut Criterion) {
    let chunks: Vec<&[u8]> = PERSON_INPUT.as_bytes().chunks(8).collect();
    c.bench_function("parse/person_8_byte_chunks", |b| {
        b.iter(|| {
            let mut parser = Parser::new(person_descriptor()).expect("parser");
            for chunk in &chunks {
                parser.feed(black_box(*chunk)).expect("feed");
            }
            black_box(parser.is_complete());
        });
    });
}

criterion_group!(benches, bench_parse_whole, bench_parse_chunked);
criterion_main!(benches);
