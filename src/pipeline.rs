//! Incremental, resumable indexing of one document.
//!
//! Every chunk is processed in two phases. The plan phase annotates the
//! chunk and calls the providers for the lemmata it introduces; nothing is
//! mutated while providers can still fail. The apply phase folds the plan
//! into the Root and Per-Document indexes, checks the Root Index invariant
//! and checkpoints both bundles. A crash or provider failure therefore loses
//! at most the chunk in flight.

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    checkpoint::Checkpoint,
    data_dir::DataDir,
    doc_index::{DocumentIndex, Progress},
    doc_key::DocumentKey,
    error::{Error, Result},
    lexicon::Lexicon,
    metadata::{DocumentMetadata, read_chunks},
    providers::Providers,
    root_index::RootIndex,
    vectors::{source_null_vector, target_null_vector},
};

/// Receives progress notifications while a document is indexed.
pub trait IndexObserver {
    fn started(&mut self, _key: &DocumentKey, _progress: &Progress) {}

    fn chunk_done(&mut self, _chunk: usize, _progress: &Progress) {}

    fn finished(&mut self, _key: &DocumentKey, _progress: &Progress) {}
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quiet;

impl IndexObserver for Quiet {}

/// Outcome of one `index_document` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub total_chunks: usize,
    /// Chunks processed by this call.
    pub processed_chunks: usize,
    /// Lemmata added to the Root Index by this call.
    pub new_lemmata: usize,
    /// The document had already been fully indexed.
    pub already_complete: bool,
}

/// Lemmata first seen in a chunk, with the provider answers for them.
struct ChunkPlan {
    /// Accepted keys, in token order.
    keys: Vec<String>,
    /// Lemma per token, including skipped ones, for the lemmatised text.
    line: Vec<String>,
    new_keys: Vec<String>,
    definitions: Vec<String>,
    source_vectors: Vec<Vec<f32>>,
    target_vectors: Vec<Vec<f32>>,
}

pub struct Indexer {
    data_dir: DataDir,
    lexicon: Lexicon,
    providers: Providers,
}

impl Indexer {
    pub fn new(data_dir: DataDir, lexicon: Lexicon, providers: Providers) -> Self {
        Self {
            data_dir,
            lexicon,
            providers,
        }
    }

    /// Index `sources/<key>.txt`, resuming where a previous run stopped.
    pub fn index_source(
        &self,
        key: &DocumentKey,
        observer: &mut dyn IndexObserver,
    ) -> Result<IndexReport> {
        let chunks = read_chunks(&self.data_dir.text_file(key))?;

        match DocumentMetadata::load(&self.data_dir.metadata_file(key)) {
            Ok(metadata) if metadata.index.len() < chunks.len() => warn!(
                "{key}: metadata cites {} chunks but the text has {}",
                metadata.index.len(),
                chunks.len()
            ),
            Ok(_) => {}
            Err(Error::NotFound { .. }) => {
                warn!("{key}: no metadata, hits will carry no citations")
            }
            Err(e) => return Err(e),
        }

        self.index_document(key, &chunks, observer)
    }

    /// Fold `chunks` into the indexes, skipping chunks already checkpointed.
    pub fn index_document(
        &self,
        key: &DocumentKey,
        chunks: &[String],
        observer: &mut dyn IndexObserver,
    ) -> Result<IndexReport> {
        let root_ckpt = Checkpoint::<RootIndex>::new(self.data_dir.root_bundle());
        let doc_ckpt =
            Checkpoint::<DocumentIndex>::new(self.data_dir.document_bundle(key));

        let mut root = root_ckpt.load(false)?;
        root.check_invariant()?;
        root.claim_scheme(self.lexicon.scheme())?;
        let mut doc = doc_ckpt.load(false)?;

        if doc.progress.is_started() {
            if doc.progress.total_chunks != chunks.len() {
                return Err(Error::Config(format!(
                    "{key} was indexed with {} chunks but now has {}",
                    doc.progress.total_chunks,
                    chunks.len()
                )));
            }
        } else {
            doc.progress.total_chunks = chunks.len();
        }

        let mut report = IndexReport {
            total_chunks: chunks.len(),
            ..Default::default()
        };

        if doc.progress.is_complete() {
            info!("{key} is already indexed");
            report.already_complete = true;
            return Ok(report);
        }

        let start = doc.progress.next_chunk();
        if start == 0 {
            info!("{key}: starting from scratch ({} chunks)", chunks.len());
        } else {
            info!("{key}: resuming from chunk {start}");
        }
        observer.started(key, &doc.progress);

        let lemmata_before = root.len();
        let timer = Instant::now();

        for (chunk_index, text) in chunks.iter().enumerate().skip(start) {
            let plan = self.plan_chunk(&root, text)?;
            apply_plan(&mut root, &mut doc, key, chunk_index, plan)?;

            report.processed_chunks += 1;
            let remaining = chunks.len() - chunk_index - 1;
            let per_chunk = timer.elapsed() / report.processed_chunks as u32;

            root.refresh_stats();
            doc.progress.completed_chunk_index = Some(chunk_index);
            doc.progress.distinct_lemmata = doc.occurrences.len();
            doc.progress.estimated_time_remaining =
                Some(format_eta(per_chunk * remaining as u32));

            root.check_invariant()?;
            root_ckpt.save(&root, true)?;
            doc_ckpt.save(&doc, true)?;

            debug!(
                chunk = chunk_index,
                lemmata = root.len(),
                "chunk checkpointed"
            );
            observer.chunk_done(chunk_index, &doc.progress);
        }

        report.new_lemmata = root.len() - lemmata_before;
        info!(
            "{key}: {} chunks processed, {} new lemmata ({} total)",
            report.processed_chunks,
            report.new_lemmata,
            root.len()
        );
        observer.finished(key, &doc.progress);
        Ok(report)
    }

    /// Annotate a chunk and gather everything new lemmata need. Read-only
    /// with respect to the indexes.
    fn plan_chunk(&self, root: &RootIndex, text: &str) -> Result<ChunkPlan> {
        let tokens = self.providers.annotator.annotate(text)?;

        let mut keys = Vec::new();
        let mut line = Vec::with_capacity(tokens.len());
        let mut new_keys = Vec::new();
        let mut new_lemmata = Vec::new();
        let mut new_words = Vec::new();
        let mut seen = HashSet::new();

        for token in &tokens {
            line.push(token.lemma.clone());
            if !self.lexicon.accepts(&token.lemma, &token.pos) {
                continue;
            }

            let key = self.lexicon.key(&token.lemma, &token.pos);
            if !root.contains(&key) && seen.insert(key.clone()) {
                new_keys.push(key.clone());
                new_lemmata.push(token.lemma.clone());
                new_words.push(token.surface.clone());
            }
            keys.push(key);
        }

        // Glossed by the form first seen in the text.
        let definitions = self.providers.glossary.define_batch(&new_words)?;
        expect_aligned("gloss", definitions.len(), new_words.len())?;

        let source_null = source_null_vector(self.providers.source.dimension());
        let source_vectors = new_lemmata
            .iter()
            .map(|lemma| {
                Ok(self
                    .providers
                    .source
                    .vector_for(lemma)?
                    .unwrap_or_else(|| source_null.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let target_vectors = self.embed_definitions(&definitions)?;

        for row in &source_vectors {
            root.source_embeddings.check(row)?;
        }
        for row in &target_vectors {
            root.target_embeddings.check(row)?;
        }

        Ok(ChunkPlan {
            keys,
            line,
            new_keys,
            definitions,
            source_vectors,
            target_vectors,
        })
    }

    /// Embed definitions; words without one share the embedding of the
    /// empty string, computed once.
    fn embed_definitions(&self, definitions: &[String]) -> Result<Vec<Vec<f32>>> {
        let target = self.providers.target.as_ref();
        let glossed: Vec<String> = definitions
            .iter()
            .filter(|definition| !definition.is_empty())
            .cloned()
            .collect();
        let embedded = target.embed_batch(&glossed)?;
        expect_aligned("embedding", embedded.len(), glossed.len())?;
        if glossed.len() == definitions.len() {
            return Ok(embedded);
        }

        let null = target_null_vector(target)?;
        let mut embedded = embedded.into_iter();
        Ok(definitions
            .iter()
            .map(|definition| {
                if definition.is_empty() {
                    null.clone()
                } else {
                    embedded.next().unwrap_or_default()
                }
            })
            .collect())
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data_dir
    }
}

fn expect_aligned(
    provider: &'static str,
    got: usize,
    expected: usize,
) -> Result<()> {
    if got == expected {
        return Ok(());
    }
    Err(Error::provider(
        provider,
        format!("returned {got} results for {expected} inputs"),
    ))
}

fn apply_plan(
    root: &mut RootIndex,
    doc: &mut DocumentIndex,
    key: &DocumentKey,
    chunk_index: usize,
    plan: ChunkPlan,
) -> Result<()> {
    let new_slots = plan
        .new_keys
        .into_iter()
        .zip(plan.definitions)
        .zip(plan.source_vectors.iter().zip(&plan.target_vectors));
    for ((lemma_key, definition), (source, target)) in new_slots {
        root.insert_lemma(lemma_key, source, target, definition, key)?;
    }

    for lemma_key in &plan.keys {
        if doc.record(lemma_key, chunk_index) {
            root.attach_document(lemma_key, key)?;
        }
    }

    doc.push_lemmatised_line(&plan.line.join(" "));
    Ok(())
}

/// Format a duration as `+HH:MM:SS.mmm`.
pub fn format_eta(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!(
        "+{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        duration.subsec_millis()
    )
}

/// The lemmatised text of an indexed document, one line per chunk.
pub fn lemmatised_text(data_dir: &DataDir, key: &DocumentKey) -> Result<String> {
    let ckpt = Checkpoint::<DocumentIndex>::new(data_dir.document_bundle(key));
    if !ckpt.exists() {
        return Err(Error::NotFound {
            kind: "document index",
            name: key.to_string(),
        });
    }
    Ok(ckpt.load(false)?.lemmatised_text)
}
