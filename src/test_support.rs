//! Shared helpers for unit tests: seed paired store/index fixtures.

use chrono::{TimeZone, Utc};

use crate::index::MemoryIndex;
use crate::store::MemoryStore;
use crate::types::{ChunkRecord, DocumentId, DocumentMeta};

/// Insert a document whose centroid is the mean of its chunk embeddings.
///
/// Chunks are `(index, text, embedding)`; every chunk is also indexed as a
/// point named `<document>:<index>`.
pub(crate) fn document(
    store: &MemoryStore,
    index: &MemoryIndex,
    title: &str,
    chunks: &[(u32, &str, [f32; 2])],
) -> DocumentId {
    let centroid = mean(chunks.iter().map(|(_, _, e)| *e));
    document_with(store, index, title, centroid, chunks)
}

/// Insert a document with an explicit centroid.
pub(crate) fn document_with(
    store: &MemoryStore,
    index: &MemoryIndex,
    title: &str,
    centroid: [f32; 2],
    chunks: &[(u32, &str, [f32; 2])],
) -> DocumentId {
    let id = DocumentId::random();
    let records: Vec<ChunkRecord> = chunks
        .iter()
        .map(|(ordinal, text, embedding)| ChunkRecord {
            document_id: id,
            index: *ordinal,
            text: text.to_string(),
            char_count: text.chars().count() as u32,
            embedding: embedding.to_vec(),
        })
        .collect();
    for record in &records {
        index.add_chunk(format!("{id}:{}", record.index), record);
    }
    store.insert_document(
        DocumentMeta {
            id,
            title: title.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            centroid: Some(centroid.to_vec()),
            chunk_count: records.len() as u32,
        },
        records,
    );
    id
}

fn mean(embeddings: impl Iterator<Item = [f32; 2]>) -> [f32; 2] {
    let mut sum = [0.0f32; 2];
    let mut n = 0u32;
    for e in embeddings {
        sum[0] += e[0];
        sum[1] += e[1];
        n += 1;
    }
    if n == 0 {
        return sum;
    }
    [sum[0] / n as f32, sum[1] / n as f32]
}
