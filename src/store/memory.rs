//! In-memory document store for tests and local corpora.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{DocumentStore, StoreResult};
use crate::types::{ChunkRecord, DocumentId, DocumentMeta};

/// [`DocumentStore`] holding everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<DocumentId, (DocumentMeta, Vec<ChunkRecord>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document with its chunks. Chunks are stored sorted by index
    /// to preserve the ordered-retrieval contract.
    pub fn insert_document(&self, meta: DocumentMeta, mut chunks: Vec<ChunkRecord>) {
        chunks.sort_by_key(|c| c.index);
        self.documents.write().insert(meta.id, (meta, chunks));
    }

    /// Remove a document entirely.
    pub fn remove_document(&self, id: DocumentId) {
        self.documents.write().remove(&id);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn document_meta(&self, id: DocumentId) -> StoreResult<Option<DocumentMeta>> {
        Ok(self.documents.read().get(&id).map(|(meta, _)| meta.clone()))
    }

    async fn document_chunks(&self, id: DocumentId) -> StoreResult<Vec<ChunkRecord>> {
        Ok(self
            .documents
            .read()
            .get(&id)
            .map(|(_, chunks)| chunks.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_chunks_come_back_ordered() {
        let store = MemoryStore::new();
        let id = DocumentId::random();
        let meta = DocumentMeta {
            id,
            title: "t".to_string(),
            created_at: Utc::now(),
            centroid: Some(vec![1.0]),
            chunk_count: 2,
        };
        let chunk = |index: u32| ChunkRecord {
            document_id: id,
            index,
            text: format!("chunk {index}"),
            char_count: 7,
            embedding: vec![1.0],
        };
        store.insert_document(meta, vec![chunk(2), chunk(0), chunk(1)]);

        let chunks = store.document_chunks(id).await.unwrap();
        let indexes: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_document_is_none() {
        let store = MemoryStore::new();
        assert!(
            store
                .document_meta(DocumentId::random())
                .await
                .unwrap()
                .is_none()
        );
    }
}
