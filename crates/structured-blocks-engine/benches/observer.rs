use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use structured_blocks_engine::demo;
use structured_blocks_engine::{Document, SequentialUids, StructuredEditing};

fn descriptors(count: usize) -> Value {
    let blocks: Vec<Value> = (0..count)
        .map(|i| match i % 3 {
            0 => json!({ "typeName": "headline", "slots": { "main": format!("<h2>Section {i}</h2>") } }),
            1 => json!({ "typeName": "text", "slots": { "main": format!("<p>Paragraph {i} with <b>some</b> text</p>") } }),
            _ => json!({ "typeName": "image", "properties": { "alt": format!("figure {i}") },
                         "slots": { "caption": format!("<p>Caption {i}</p>") } }),
        })
        .collect();
    Value::Array(blocks)
}

fn editing() -> StructuredEditing {
    let registry = demo::registry(SequentialUids::new("b")).unwrap();
    StructuredEditing::attach(Document::new(), registry).unwrap()
}

fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_load");
    group.sample_size(20);

    for count in [10, 100, 500] {
        let payload = descriptors(count);
        group.bench_function(format!("{count}_blocks"), |b| {
            b.iter_batched(
                editing,
                |mut editing| {
                    let events = editing.load(black_box(&payload)).unwrap();
                    black_box(events);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_keystroke(c: &mut Criterion) {
    let mut group = c.benchmark_group("keystroke");
    group.sample_size(20);

    let mut editing = editing();
    editing.load(&descriptors(300)).unwrap();
    let tree = editing.document().tree();
    let block = tree.children(tree.root())[151];
    let text = tree
        .descendants(block)
        .into_iter()
        .find(|node| tree.text(*node).is_some())
        .unwrap();

    group.bench_function("insert_char_in_300_blocks", |b| {
        b.iter(|| {
            let events = editing
                .change(|w| w.insert_text(text, 0, black_box("x")))
                .unwrap();
            black_box(events);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_bulk_load, bench_keystroke);
criterion_main!(benches);
