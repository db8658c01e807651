use criterion::{Criterion, criterion_group, criterion_main};
use pdf_rag_chat::documents::Document;
use pdf_rag_chat::embeddings::{ChunkingConfig, chunk_documents, split_text};
use std::hint::black_box;

const PARAGRAPH: &str = "Retrieval quality depends on how documents are split. \
Chunks that are too small lose context, while chunks that are too large dilute the \
embedding with unrelated sentences. Overlap between neighbouring chunks keeps sentences \
that straddle a boundary retrievable from either side.";

fn sample_pages(pages: usize) -> Vec<Document> {
    (1..=pages)
        .map(|page| Document {
            source_path: "benches/sample.pdf".to_string(),
            page: Some(page as u32),
            text: (0..12)
                .map(|i| format!("Section {}.{}\n{}", page, i, PARAGRAPH))
                .collect::<Vec<_>>()
                .join("\n\n"),
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let config = ChunkingConfig::default();
    let pages = sample_pages(50);
    let single_page = pages[0].text.clone();

    c.bench_function("split_text", |b| {
        b.iter(|| split_text(black_box(&single_page), black_box(&config)))
    });
    c.bench_function("chunk_documents", |b| {
        b.iter(|| chunk_documents(black_box(&pages), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
