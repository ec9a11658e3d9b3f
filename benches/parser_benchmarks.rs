use codf::{Lexer, Parser, parse_str};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Generate nested codf sections for parsing benchmarks
fn generate_nested_sections(depth: usize, width: usize) -> String {
    fn section(out: &mut String, depth: usize, width: usize) {
        if depth == 0 {
            out.push_str("leaf 1 2.5 \"three\" [4 5] #{ six 6 };\n");
            return;
        }
        for i in 0..width {
            out.push_str(&format!("level{depth} item-{i} {{\n"));
            section(out, depth - 1, width);
            out.push_str("}\n");
        }
    }

    let mut out = String::new();
    section(&mut out, depth, width);
    out
}

fn generate_flat_statements(count: usize) -> String {
    (0..count)
        .map(|i| format!("set key-{i} {i} {i}ms \"value {i}\" [a b c];\n"))
        .collect()
}

/// Benchmark parsing documents of increasing size
fn bench_parser_basic(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_basic");

    for count in [10, 100, 1000] {
        let content = generate_flat_statements(count);
        group.throughput(Throughput::Bytes(content.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("statements", count),
            &content,
            |b, content| {
                b.iter(|| parse_str("bench.codf", black_box(content)));
            },
        );
    }

    group.finish();
}

/// Benchmark nested sections
fn bench_parser_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_nested");

    for (depth, width) in [(2, 10), (4, 4), (8, 2)] {
        let content = generate_nested_sections(depth, width);
        group.throughput(Throughput::Bytes(content.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("sections", format!("{depth}x{width}")),
            &content,
            |b, content| {
                b.iter(|| parse_str("bench.codf", black_box(content)));
            },
        );
    }

    // Deep arrays exercise the context stack past its inline capacity
    let arrays = format!("deep {}1{};", "[".repeat(64), "]".repeat(64));
    group.bench_function("deep_arrays", |b| {
        b.iter(|| parse_str("bench.codf", black_box(&arrays)));
    });

    group.finish();
}

/// Benchmark error reporting paths
fn bench_error_handling(c: &mut Criterion) {
    let mut group = c.benchmark_group("error_handling");

    let cases = [
        ("unterminated_section", "server {\n listen 80;\n"),
        ("bad_map_key", "m #{ 1 2 };"),
        ("stray_close", "a b c ];"),
        ("zero_denominator", "ratio 1/0;"),
    ];

    for (name, input) in cases {
        group.bench_with_input(BenchmarkId::new("error", name), input, |b, input| {
            b.iter(|| {
                let mut parser = Parser::new();
                let mut lexer = Lexer::new(black_box(input.as_bytes()));
                parser.parse(&mut lexer).is_err()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parser_basic,
    bench_parser_nested,
    bench_error_handling
);
criterion_main!(benches);
