//! Report rendering benchmark suite
//!
//! Benchmarks for turning results into HTML:
//! - Results table at various input counts
//! - Full template substitution

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use js_min_bench::render::{fill_template, results_table, tool_details};
use js_min_bench::schema::{ExperimentConfiguration, ExperimentResult, Measurement};
use js_min_bench::Catalog;
use std::collections::BTreeMap;
use std::path::Path;

/// Deterministic results: every builtin tool variant for `inputs` inputs,
/// with a handful of audit columns.
fn synthetic_results(catalog: &Catalog, inputs: usize) -> Vec<ExperimentResult> {
    let mut out = Vec::new();
    for i in 0..inputs {
        let input = format!("input-{i:03}");
        for (t, tool) in catalog.tools.iter().enumerate() {
            for (v, variant) in tool.variants.iter().enumerate() {
                let config = ExperimentConfiguration::for_input(&input, &tool.id, variant.id.as_deref());
                let mut r = ExperimentResult::new(&config);
                let size = 100_000 - (t as u64 * 10_000) - (v as u64 * 2_500);
                r.data.build_time = Some(Measurement::millis(50.0 + (t * 300 + v * 40) as f64));
                r.data.size = Some(Measurement::kilobytes(size));
                r.data.gzip_size = Some(Measurement::kilobytes(size / 3));
                r.data.brotli_size = Some(Measurement::kilobytes(size / 4));
                for audit in ["speedIndex", "interactive", "firstContentfulPaint"] {
                    r.data
                        .audits
                        .insert(audit.to_string(), Measurement::new(900.0 + (t * 10 + v) as f64, "ms"));
                }
                out.push(r);
            }
        }
    }
    out
}

fn bench_results_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let catalog = Catalog::builtin(Path::new("/bench/js-min-bench"));

    for inputs in [1usize, 8, 64] {
        let results = synthetic_results(&catalog, inputs);
        group.bench_with_input(BenchmarkId::new("results_table", inputs), &results, |bencher, results| {
            bencher.iter(|| black_box(results_table(black_box(results), &catalog)))
        });
    }

    let results = synthetic_results(&catalog, 8);
    let template = "<body>%%resultsTable%%<h2>Tools</h2>%%toolDetails%%</body>";
    group.bench_function("full_report", |bencher| {
        bencher.iter(|| {
            let mut fields = BTreeMap::new();
            fields.insert("resultsTable", results_table(&results, &catalog));
            fields.insert("toolDetails", tool_details(&catalog, "js-min-bench"));
            black_box(fill_template(template, &fields))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_results_table);
criterion_main!(benches);
