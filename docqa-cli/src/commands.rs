//! Subcommand implementations.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use docqa_rag::{
    CancellationToken, Embedder, ErrorKind, FileVectorStore, FsDocumentSource, HashEmbedder,
    OllamaEmbedder, OllamaModel, Query, RagError, RagPipeline,
};
use tracing::info;

use crate::config::{CliConfig, EmbedderKind};

const SNIPPET_CHARS: usize = 160;

/// Turn a pipeline error into a message that says what to do about it.
pub fn explain(err: RagError) -> anyhow::Error {
    let hint = match err.kind() {
        ErrorKind::EmbeddingUnavailable => {
            "embedding service unavailable; check that Ollama is running and the embedding model is pulled"
        }
        ErrorKind::GenerationTimeout => {
            "the language model did not answer in time; consider raising rag.generation_timeout_ms"
        }
        ErrorKind::GenerationServiceError => "the language model service failed",
        ErrorKind::IndexCorruption => {
            "the index does not match the configured embedding model; delete it and run `docqa index` again"
        }
        ErrorKind::InvalidConfig => "invalid configuration",
        ErrorKind::PromptTooLarge => {
            "the question is too long for the prompt budget; shorten it or raise rag.max_prompt_size"
        }
        ErrorKind::VectorStore => "the index could not be read or written",
        ErrorKind::DocumentSource => "a document could not be read",
        ErrorKind::Cancelled => "cancelled",
    };
    anyhow::Error::new(err).context(hint)
}

/// Counts printed at the end of `docqa index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSummary {
    pub indexed: usize,
    pub failed: usize,
    pub chunks: usize,
}

/// A pipeline assembled from a [`CliConfig`].
pub struct App {
    pipeline: RagPipeline,
}

impl App {
    /// Open the configured index and connect the configured models.
    pub async fn open(config: &CliConfig) -> anyhow::Result<Self> {
        let embedder: Arc<dyn Embedder> = match config.embedder {
            EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(
                &config.ollama.url,
                config.ollama.embedding_model.clone(),
                config.ollama.embedding_dimensions,
            )),
            EmbedderKind::Hash => Arc::new(HashEmbedder::new(config.hash.dimensions)),
        };

        let mut model = OllamaModel::new(&config.ollama.url, config.ollama.generation_model.clone());
        if let Some(temperature) = config.ollama.temperature {
            model = model.with_temperature(temperature);
        }

        let path = &config.store.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create index directory {}", parent.display()))?;
        }
        let store = FileVectorStore::open(
            path,
            embedder.model_id(),
            embedder.dimensions(),
            config.rag.metric,
        )
        .await
        .map_err(explain)?;

        let pipeline = RagPipeline::builder()
            .config(config.rag.clone())
            .embedder(embedder)
            .vector_store(Arc::new(store))
            .language_model(Arc::new(model))
            .build()
            .map_err(explain)?;
        Ok(Self { pipeline })
    }

    /// Index every `.txt`, `.md` and `.pdf` file under `dir`.
    ///
    /// Fails after reporting every document if any of them failed.
    pub async fn index(&self, dir: &Path, out: &mut impl Write) -> anyhow::Result<IndexSummary> {
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }
        let source = FsDocumentSource::new(dir);
        let ids = source.list().await.map_err(explain)?;
        info!(root = %dir.display(), document_count = ids.len(), "indexing directory");

        let mut summary = IndexSummary::default();
        for (id, outcome) in ids.iter().zip(self.pipeline.ingest_from_source(&source, &ids).await) {
            match outcome {
                Ok(report) => {
                    summary.indexed += 1;
                    summary.chunks += report.chunk_count;
                    write!(out, "indexed  {id} ({} chunks", report.chunk_count)?;
                    if report.retries > 0 {
                        write!(out, ", {} retries", report.retries)?;
                    }
                    writeln!(out, ")")?;
                }
                Err(err) => {
                    summary.failed += 1;
                    writeln!(out, "failed   {id}: {:#}", explain(err))?;
                }
            }
        }
        writeln!(
            out,
            "{} indexed ({} chunks), {} failed",
            summary.indexed, summary.chunks, summary.failed
        )?;

        if summary.failed > 0 {
            bail!("{} of {} documents failed to index", summary.failed, ids.len());
        }
        Ok(summary)
    }

    /// Print the chunks retrieved for `query`, best first.
    pub async fn search(&self, query: &Query, out: &mut impl Write) -> anyhow::Result<()> {
        let results = self.pipeline.retrieve(query).await.map_err(explain)?;
        if results.is_empty() {
            writeln!(out, "no matching chunks")?;
        }
        for (rank, result) in results.iter().enumerate() {
            writeln!(out, "{}. [{:.3}] {}", rank + 1, result.score, result.chunk.id)?;
            writeln!(out, "   {}", snippet(&result.chunk.text))?;
        }
        Ok(())
    }

    /// Answer `query` and print the answer with its sources.
    pub async fn ask(
        &self,
        query: &Query,
        json: bool,
        cancel: &CancellationToken,
        out: &mut impl Write,
    ) -> anyhow::Result<()> {
        let answer = self.pipeline.query_with_cancellation(query, cancel).await.map_err(explain)?;
        if json {
            serde_json::to_writer_pretty(&mut *out, &answer)?;
            writeln!(out)?;
            return Ok(());
        }

        writeln!(out, "{}", answer.text.trim())?;
        if answer.is_grounded() {
            writeln!(out, "\nSources:")?;
            for (i, citation) in answer.citations.iter().enumerate() {
                writeln!(
                    out,
                    "  [{}] {} (document {}, score {:.3})",
                    i + 1,
                    citation.chunk_id,
                    citation.document_id,
                    citation.score
                )?;
            }
        }
        Ok(())
    }

    pub async fn remove(&self, document_id: &str, out: &mut impl Write) -> anyhow::Result<()> {
        let removed = self.pipeline.remove_document(document_id).await.map_err(explain)?;
        if removed == 0 {
            writeln!(out, "no entries for {document_id}")?;
        } else {
            writeln!(out, "removed {removed} chunks of {document_id}")?;
        }
        Ok(())
    }
}

/// First line-folded characters of a chunk.
fn snippet(text: &str) -> String {
    let folded: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match folded.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}…", &folded[..cut]),
        None => folded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_rag::NO_CONTEXT_NOTICE;

    fn offline_config(dir: &Path) -> CliConfig {
        let mut config = CliConfig::default();
        config.embedder = EmbedderKind::Hash;
        config.hash.dimensions = 256;
        config.rag.similarity_threshold = 0.3;
        config.store.path = dir.join("state/index.json");
        config
    }

    fn corpus(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("a.txt"), "Revenue grew 25% in North America.").unwrap();
        std::fs::write(dir.join("b.md"), "Europe revenue declined 3% as demand softened.").unwrap();
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn index_then_search_finds_the_document() {
        let dir = tempfile::tempdir().unwrap();
        corpus(&dir.path().join("docs"));
        let app = App::open(&offline_config(dir.path())).await.unwrap();

        let mut out = Vec::new();
        let summary = app.index(&dir.path().join("docs"), &mut out).await.unwrap();
        assert_eq!(summary, IndexSummary { indexed: 2, failed: 0, chunks: 2 });
        assert!(output(out).contains("indexed  a.txt (1 chunks)"));

        let mut out = Vec::new();
        app.search(&Query::new("How did North America perform?"), &mut out).await.unwrap();
        let printed = output(out);
        assert!(printed.starts_with("1. ["));
        assert!(printed.contains("a.txt_0"));
        assert!(!printed.contains("b.md_0"));
    }

    #[tokio::test]
    async fn index_survives_reopen_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        corpus(&dir.path().join("docs"));
        let config = offline_config(dir.path());
        App::open(&config).await.unwrap().index(&dir.path().join("docs"), &mut Vec::new()).await.unwrap();

        let app = App::open(&config).await.unwrap();
        let mut out = Vec::new();
        app.remove("a.txt", &mut out).await.unwrap();
        assert_eq!(output(out), "removed 1 chunks of a.txt\n");
    }

    #[tokio::test]
    async fn ask_without_context_declines() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(&offline_config(dir.path())).await.unwrap();

        let mut out = Vec::new();
        app.ask(&Query::new("Who founded the company?"), false, &CancellationToken::new(), &mut out)
            .await
            .unwrap();
        assert_eq!(output(out).trim(), NO_CONTEXT_NOTICE);

        let mut out = Vec::new();
        app.ask(&Query::new("Who founded the company?"), true, &CancellationToken::new(), &mut out)
            .await
            .unwrap();
        let answer: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(answer["citations"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn switching_embedders_reports_index_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        corpus(&dir.path().join("docs"));
        let config = offline_config(dir.path());
        App::open(&config).await.unwrap().index(&dir.path().join("docs"), &mut Vec::new()).await.unwrap();

        let mut other = config.clone();
        other.hash.dimensions = 128;
        let err = App::open(&other).await.err().unwrap();
        assert!(format!("{err:#}").contains("delete it and run `docqa index` again"));
    }

    #[test]
    fn snippets_fold_whitespace_and_truncate() {
        assert_eq!(snippet("a\n\n b"), "a b");
        let long = "é".repeat(SNIPPET_CHARS + 10);
        assert_eq!(snippet(&long).chars().count(), SNIPPET_CHARS + 1);
    }
}
