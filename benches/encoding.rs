use bacnet_rs::encoding::{
    decode_application_tag, decode_character_string, decode_context_unsigned, decode_real,
    decode_tag, decode_unsigned, encode_character_string, encode_context_unsigned, encode_real,
    encode_unsigned,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn encode_benchmark(c: &mut Criterion) {
    c.bench_function("encode_unsigned", |b| {
        let mut buffer = Vec::with_capacity(8);
        b.iter(|| {
            buffer.clear();
            encode_unsigned(&mut buffer, black_box(4_194_302)).unwrap();
            black_box(&buffer);
        })
    });

    c.bench_function("encode_real", |b| {
        let mut buffer = Vec::with_capacity(8);
        b.iter(|| {
            buffer.clear();
            encode_real(&mut buffer, black_box(72.5_f32)).unwrap();
            black_box(&buffer);
        })
    });

    c.bench_function("encode_character_string", |b| {
        let mut buffer = Vec::with_capacity(32);
        b.iter(|| {
            buffer.clear();
            encode_character_string(&mut buffer, black_box("Analog Input 1")).unwrap();
            black_box(&buffer);
        })
    });

    c.bench_function("encode_context_unsigned", |b| {
        b.iter(|| black_box(encode_context_unsigned(black_box(150), black_box(1)).unwrap()))
    });
}

fn decode_benchmark(c: &mut Criterion) {
    let mut unsigned_buf = Vec::new();
    encode_unsigned(&mut unsigned_buf, 4_194_302).unwrap();

    let mut real_buf = Vec::new();
    encode_real(&mut real_buf, 72.5).unwrap();

    let mut string_buf = Vec::new();
    encode_character_string(&mut string_buf, "Analog Input 1").unwrap();

    let context_buf = encode_context_unsigned(150, 1).unwrap();

    c.bench_function("decode_tag", |b| {
        b.iter(|| black_box(decode_tag(black_box(&real_buf), 0).unwrap()))
    });

    c.bench_function("decode_application_tag", |b| {
        b.iter(|| black_box(decode_application_tag(black_box(&real_buf)).unwrap()))
    });

    c.bench_function("decode_unsigned", |b| {
        b.iter(|| black_box(decode_unsigned(black_box(&unsigned_buf)).unwrap()))
    });

    c.bench_function("decode_real", |b| {
        b.iter(|| black_box(decode_real(black_box(&real_buf)).unwrap()))
    });

    c.bench_function("decode_character_string", |b| {
        b.iter(|| black_box(decode_character_string(black_box(&string_buf)).unwrap()))
    });

    c.bench_function("decode_context_unsigned", |b| {
        b.iter(|| black_box(decode_context_unsigned(black_box(&context_buf), 1).unwrap()))
    });
}

criterion_group!(benches, encode_benchmark, decode_benchmark);
criterion_main!(benches);
