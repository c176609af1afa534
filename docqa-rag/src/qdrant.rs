//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::qdrant::QdrantVectorStore;
//! use docqa_rag::SimilarityMetric;
//!
//! let store = QdrantVectorStore::connect("http://localhost:6334", "docs", 384, SimilarityMetric::Cosine).await?;
//! store.upsert_batch(&entries).await?;
//! let results = store.search(&query_embedding, 5, Some(0.3)).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_output::VectorsOptions;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetPointsBuilder, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::debug;
use uuid::Uuid;

use crate::document::{Chunk, IndexEntry, RetrievalResult, SearchResult};
use crate::error::{RagError, Result};
use crate::similarity::{SimilarityMetric, rank};
use crate::vectorstore::{VectorStore, validate_dimensions, validate_query};

const SCROLL_PAGE_SIZE: u32 = 256;

/// Extra candidates requested beyond `top_k` so that entries tied at the
/// cut-off reach [`rank`] instead of being dropped by the server.
const TIE_MARGIN: usize = 8;

/// A [`VectorStore`] backed by one [Qdrant](https://qdrant.tech/) collection.
///
/// Qdrant point IDs must be integers or UUIDs, so each chunk ID is mapped to
/// a name-based (v5) UUID; the chunk itself travels in the point payload.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimensions: usize,
    metric: SimilarityMetric,
}

impl QdrantVectorStore {
    /// Connect to `url` and make sure `collection` exists.
    pub async fn connect(
        url: &str,
        collection: impl Into<String>,
        dimensions: usize,
        metric: SimilarityMetric,
    ) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Self::from_client(client, collection, dimensions, metric).await
    }

    /// Wrap an existing client and make sure `collection` exists.
    pub async fn from_client(
        client: Qdrant,
        collection: impl Into<String>,
        dimensions: usize,
        metric: SimilarityMetric,
    ) -> Result<Self> {
        let store = Self { client, collection: collection.into(), dimensions, metric };
        store.ensure_collection().await?;
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists =
            self.client.collection_exists(&self.collection).await.map_err(Self::map_err)?;
        if exists {
            debug!(collection = %self.collection, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        let distance = match self.metric {
            SimilarityMetric::Cosine => Distance::Cosine,
            SimilarityMetric::InnerProduct => Distance::Dot,
        };
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(self.dimensions as u64, distance)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, dimensions = self.dimensions, "created qdrant collection");
        Ok(())
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::VectorStore { backend: "qdrant".to_string(), message: e.to_string() }
    }

    fn point_id(chunk_id: &str) -> PointId {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string().into()
    }

    fn document_filter(document_id: &str) -> Filter {
        Filter::must([Condition::matches("document_id", document_id.to_string())])
    }

    fn payload(chunk: &Chunk) -> Result<Payload> {
        let value = serde_json::to_value(chunk).map_err(|e| RagError::VectorStore {
            backend: "qdrant".to_string(),
            message: format!("serialize chunk {}: {e}", chunk.id),
        })?;
        Payload::try_from(value).map_err(Self::map_err)
    }

    /// Rebuild a chunk from a point payload.
    fn chunk_from_payload(payload: &HashMap<String, QdrantValue>) -> Result<Chunk> {
        let string = |key: &str| payload.get(key).and_then(Self::extract_string);
        let integer = |key: &str| payload.get(key).and_then(Self::extract_usize);
        let malformed = || RagError::IndexCorruption("qdrant point payload is not a chunk".to_string());

        let metadata = payload
            .get("metadata")
            .and_then(|v| match &v.kind {
                Some(Kind::StructValue(s)) => Some(
                    s.fields
                        .iter()
                        .filter_map(|(k, v)| Self::extract_string(v).map(|s| (k.clone(), s)))
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        Ok(Chunk {
            id: string("id").ok_or_else(malformed)?,
            document_id: string("document_id").ok_or_else(malformed)?,
            text: string("text").ok_or_else(malformed)?,
            offset_start: integer("offset_start").ok_or_else(malformed)?,
            offset_end: integer("offset_end").ok_or_else(malformed)?,
            sequence_index: integer("sequence_index").ok_or_else(malformed)?,
            metadata,
        })
    }

    /// Extract a string from a Qdrant payload value.
    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn extract_usize(value: &QdrantValue) -> Option<usize> {
        match &value.kind {
            Some(Kind::IntegerValue(n)) => usize::try_from(*n).ok(),
            Some(Kind::DoubleValue(n)) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            _ => None,
        }
    }

    /// Number of points to request from the server for a `top_k` search.
    ///
    /// Ties are broken by [`rank`] only among the returned candidates, so a
    /// tie group at the cut-off larger than [`TIE_MARGIN`] is still decided
    /// by the server.
    fn fetch_limit(top_k: usize) -> u64 {
        top_k.saturating_add(TIE_MARGIN) as u64
    }

    async fn count(&self, filter: Option<Filter>) -> Result<usize> {
        let mut request = CountPointsBuilder::new(&self.collection).exact(true);
        if let Some(filter) = filter {
            request = request.filter(filter);
        }
        let response = self.client.count(request).await.map_err(Self::map_err)?;
        Ok(response.result.map_or(0, |r| r.count as usize))
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    async fn upsert_batch(&self, entries: &[IndexEntry]) -> Result<()> {
        validate_dimensions(self.dimensions, entries)?;
        if entries.is_empty() {
            return Ok(());
        }

        let points = entries
            .iter()
            .map(|entry| {
                Ok(PointStruct::new(
                    Self::point_id(entry.chunk_id()),
                    entry.embedding.clone(),
                    Self::payload(&entry.chunk)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = entries.len(), "upserted entries to qdrant");
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        threshold: Option<f32>,
    ) -> Result<RetrievalResult> {
        validate_query(self.dimensions, embedding)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut request =
            SearchPointsBuilder::new(&self.collection, embedding.to_vec(), Self::fetch_limit(top_k))
                .with_payload(true);
        if let Some(threshold) = threshold {
            request = request.score_threshold(threshold);
        }
        let response = self.client.search_points(request).await.map_err(Self::map_err)?;

        let results = response
            .result
            .into_iter()
            .map(|scored| {
                Ok(SearchResult { chunk: Self::chunk_from_payload(&scored.payload)?, score: scored.score })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(rank(results, top_k, threshold))
    }

    async fn delete(&self, document_id: &str) -> Result<usize> {
        let removed = self.count(Some(Self::document_filter(document_id))).await?;
        if removed == 0 {
            return Ok(0);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Self::document_filter(document_id))
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, document.id = document_id, removed, "deleted document from qdrant");
        Ok(removed)
    }

    async fn delete_entries(&self, chunk_ids: &[&str]) -> Result<usize> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }

        let point_ids: Vec<PointId> = chunk_ids.iter().map(|id| Self::point_id(id)).collect();
        let existing = self
            .client
            .get_points(GetPointsBuilder::new(&self.collection, point_ids.clone()))
            .await
            .map_err(Self::map_err)?
            .result
            .len();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = existing, "deleted points from qdrant");
        Ok(existing)
    }

    async fn document_entries(&self, document_id: &str) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut request = ScrollPointsBuilder::new(&self.collection)
                .filter(Self::document_filter(document_id))
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true)
                .with_vectors(true);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }
            let page = self.client.scroll(request).await.map_err(Self::map_err)?;

            for point in page.result {
                let chunk = Self::chunk_from_payload(&point.payload)?;
                let embedding = match point.vectors.and_then(|v| v.vectors_options) {
                    Some(VectorsOptions::Vector(vector)) => vector.data,
                    _ => {
                        return Err(RagError::IndexCorruption(format!(
                            "qdrant point for chunk {} has no vector",
                            chunk.id
                        )));
                    }
                };
                entries.push(IndexEntry::new(chunk, embedding));
            }

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        entries.sort_by_key(|e| e.chunk.sequence_index);
        Ok(entries)
    }

    async fn len(&self) -> Result<usize> {
        self.count(None).await
    }
}
