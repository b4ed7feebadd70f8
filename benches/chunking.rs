use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use readaloud::audio::wav::{self, AudioFormat};
use readaloud::pipeline::{AssemblyConfig, ChunkResult, assemble};
use std::collections::BTreeMap;
use std::hint::black_box;

/// Prose-like document: sentences of varying length, paragraph breaks,
/// dialogue and an occasional very long run-on sentence.
fn build_document(paragraphs: usize) -> String {
    let sentences = [
        "The morning was grey and the harbour was quiet.",
        "\"Are you coming?\" she asked, without turning around.",
        "He said nothing for a while...",
        "Gulls circled above the moored boats, crying at nobody in particular!",
        "It was, he thought, the kind of day on which nothing and everything could happen, \
         where the light never quite decided what it wanted to be and the water kept its own counsel \
         while the town above it went slowly about its business.",
    ];
    let mut doc = String::new();
    for p in 0..paragraphs {
        for (i, sentence) in sentences.iter().enumerate() {
            if (p + i) % 3 != 2 {
                doc.push_str(sentence);
                doc.push(' ');
            }
        }
        doc.push_str("\n\n");
    }
    doc
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");

    for paragraphs in [10, 100, 1000] {
        let doc = build_document(paragraphs);
        group.throughput(Throughput::Bytes(doc.len() as u64));
        for max in [120, 400] {
            group.bench_with_input(
                BenchmarkId::new(format!("max_{max}"), paragraphs),
                &doc,
                |b, doc| b.iter(|| readaloud::split(black_box(doc), max).unwrap()),
            );
        }
    }

    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    let format = AudioFormat::default();

    for chunks in [10, 100] {
        // ~3 seconds of audio per chunk at 22.05 kHz
        let payload = wav::encode(format, &vec![100; 66_150]).unwrap();
        let results: BTreeMap<usize, ChunkResult> = (0..chunks)
            .map(|i| (i, ChunkResult::success(i, 1, payload.clone())))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(chunks), &results, |b, results| {
            b.iter(|| assemble(chunks, black_box(results), &AssemblyConfig::default()).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_split, bench_assemble);
criterion_main!(benches);
