//! Similarity search over the Root Index.
//!
//! The engine loads a snapshot of every index at construction and is
//! read-only afterwards, so one instance can serve concurrent queries.
//! Document-scoped vector spaces are loaded on first use and memoized.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    panic::{self, AssertUnwindSafe},
    str::FromStr,
};

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    checkpoint::Checkpoint,
    data_dir::DataDir,
    doc_index::DocumentIndex,
    doc_key::DocumentKey,
    embeddings::Embeddings,
    error::{Error, Result},
    lexicon::{Lexicon, normalise_query},
    metadata::DocumentMetadata,
    providers::Providers,
    root_index::RootIndex,
    similarity,
    vectors::{SourceEmbedder, WordVectors},
};

pub const DEFAULT_MAX_RESULTS: usize = 50;

/// Language of the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Compared against definition embeddings.
    Target,
    /// Annotated into lemmata and compared against lemma embeddings.
    Source,
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "target" => Ok(Self::Target),
            "source" => Ok(Self::Source),
            other => Err(Error::InvalidQuery(format!(
                "unknown language '{other}' (expected 'target' or 'source')"
            ))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Target => "target",
            Self::Source => "source",
        })
    }
}

/// Embedding space searched by source-language queries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// The Root Index source embeddings.
    #[default]
    Universal,
    /// Word vectors stored with one document.
    Document(DocumentKey),
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "universal" | "root" => Ok(Self::Universal),
            other => DocumentKey::parse(other)
                .map(Self::Document)
                .map_err(|e| Error::InvalidQuery(e.to_string())),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Universal => f.write_str("universal"),
            Self::Document(key) => write!(f, "{key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub language: Language,
    /// `None` means every loaded document.
    pub documents: Option<BTreeSet<DocumentKey>>,
    pub max_results: usize,
    pub scope: Scope,
}

impl Query {
    pub fn new(text: impl Into<String>, language: Language) -> Self {
        Self {
            text: text.into(),
            language,
            documents: None,
            max_results: DEFAULT_MAX_RESULTS,
            scope: Scope::Universal,
        }
    }

    pub fn with_documents(
        mut self,
        documents: impl IntoIterator<Item = DocumentKey>,
    ) -> Self {
        self.documents = Some(documents.into_iter().collect());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

/// A quoted passage: link plus citation string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub url: String,
    pub citation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub score: f32,
    pub lemma: String,
    pub definition: String,
    pub documents: Vec<DocumentKey>,
    pub locations: BTreeMap<DocumentKey, Vec<Citation>>,
}

struct LoadedDocument {
    metadata: DocumentMetadata,
    index: DocumentIndex,
}

/// What a query is compared against.
struct Candidates<'a> {
    labels: &'a [String],
    vectors: &'a Embeddings,
    /// Whether label `i` is Root Index slot `i`.
    root_aligned: bool,
}

/// Source-language query atoms and their mean vector.
struct Atoms {
    lemmata: BTreeSet<String>,
    vector: Vec<f32>,
}

pub struct SearchEngine {
    data_dir: DataDir,
    lexicon: Lexicon,
    providers: Providers,
    root: RootIndex,
    documents: BTreeMap<DocumentKey, LoadedDocument>,
    /// Root slot of each lemma key.
    slots: HashMap<String, usize>,
    /// First Root slot of each bare lemma, for labels of scoped spaces.
    lemma_slots: HashMap<String, usize>,
    scopes: HashMap<DocumentKey, OnceCell<WordVectors>>,
}

impl SearchEngine {
    /// Load every index under `data_dir`.
    ///
    /// Returns `Ok(None)` when no sources have been acquired yet.
    pub fn open(
        data_dir: DataDir,
        lexicon: Lexicon,
        providers: Providers,
    ) -> Result<Option<Self>> {
        if !data_dir.sources_dir().is_dir() {
            info!(
                "no sources under {}, nothing to search",
                data_dir.root().display()
            );
            return Ok(None);
        }

        let root = Checkpoint::<RootIndex>::new(data_dir.root_bundle()).load(false)?;
        root.check_invariant()?;
        root.check_scheme(lexicon.scheme())?;

        let mut documents = BTreeMap::new();
        for key in data_dir.indexed_documents()? {
            let metadata = match DocumentMetadata::load(&data_dir.metadata_file(&key)) {
                Ok(metadata) => metadata,
                Err(Error::NotFound { .. }) => {
                    warn!("skipping {key}: no metadata");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let index = Checkpoint::<DocumentIndex>::new(data_dir.document_bundle(&key))
                .load(false)?;
            documents.insert(key, LoadedDocument { metadata, index });
        }

        let mut slots = HashMap::with_capacity(root.len());
        let mut lemma_slots = HashMap::with_capacity(root.len());
        for (slot, key) in root.lemmata.iter().enumerate() {
            slots.insert(key.clone(), slot);
            lemma_slots
                .entry(lexicon.lemma_of(key).to_string())
                .or_insert(slot);
        }

        let scopes = documents
            .keys()
            .map(|key| (key.clone(), OnceCell::new()))
            .collect();

        info!(
            lemmata = root.len(),
            documents = documents.len(),
            "search engine ready"
        );

        Ok(Some(Self {
            data_dir,
            lexicon,
            providers,
            root,
            documents,
            slots,
            lemma_slots,
            scopes,
        }))
    }

    /// Keys of the searchable documents, sorted.
    pub fn documents(&self) -> impl Iterator<Item = &DocumentKey> {
        self.documents.keys()
    }

    /// Run a query. Failures are logged and returned; a panic inside the
    /// query is reported as [`Error::UnexpectedQuery`].
    pub fn search(&self, query: &Query) -> Result<Vec<Hit>> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.try_search(query)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic without message".to_string());
                Err(Error::UnexpectedQuery(message))
            });

        if let Err(e) = &result {
            warn!(query = %query.text, language = %query.language, "{e}");
        }
        result
    }

    /// The query procedure without panic isolation.
    pub fn try_search(&self, query: &Query) -> Result<Vec<Hit>> {
        if query.text.trim().is_empty() {
            return Err(Error::InvalidQuery("empty query".into()));
        }

        let filter: BTreeSet<DocumentKey> = match &query.documents {
            Some(requested) => {
                for key in requested.iter().filter(|k| !self.documents.contains_key(*k)) {
                    warn!("document {key} is not indexed");
                }
                requested.clone()
            }
            None => self.documents.keys().cloned().collect(),
        };

        let (query_vector, atoms, candidates) = match query.language {
            Language::Target => {
                let vector = self.providers.target.embed(&query.text)?;
                let candidates = Candidates {
                    labels: &self.root.lemmata,
                    vectors: &self.root.target_embeddings,
                    root_aligned: true,
                };
                (vector, BTreeSet::new(), candidates)
            }
            Language::Source => match &query.scope {
                Scope::Universal => {
                    let atoms = self.atomise(&query.text, self.providers.source.as_ref())?;
                    let candidates = Candidates {
                        labels: &self.root.lemmata,
                        vectors: &self.root.source_embeddings,
                        root_aligned: true,
                    };
                    (atoms.vector, atoms.lemmata, candidates)
                }
                Scope::Document(key) => {
                    let space = self.scope(key)?;
                    let atoms = self.atomise(&query.text, space)?;
                    let candidates = Candidates {
                        labels: space.words(),
                        vectors: space.vectors(),
                        root_aligned: false,
                    };
                    (atoms.vector, atoms.lemmata, candidates)
                }
            },
        };

        if !candidates.vectors.is_empty()
            && candidates.vectors.dimension() != query_vector.len()
        {
            return Err(Error::InvalidQuery(format!(
                "query vector has dimension {} but candidates have {}",
                query_vector.len(),
                candidates.vectors.dimension()
            )));
        }

        let scores = similarity::scores(&query_vector, candidates.vectors);
        let mut hits = Vec::new();

        for index in similarity::rank(&scores) {
            if hits.len() >= query.max_results {
                break;
            }

            let label = &candidates.labels[index];
            let slot = if candidates.root_aligned {
                Some(index)
            } else {
                self.slot_of(label)
            };

            if query.language == Language::Source
                && atoms.contains(self.lexicon.lemma_of(label))
            {
                continue;
            }

            let definition = match slot {
                Some(slot) => self.root.definitions[slot].clone(),
                None => self.providers.glossary.define(label)?,
            };
            if query.language == Language::Target && definition == query.text {
                continue;
            }

            if filter.is_empty() {
                hits.push(Hit {
                    score: scores[index],
                    lemma: label.clone(),
                    definition,
                    documents: Vec::new(),
                    locations: BTreeMap::new(),
                });
                continue;
            }

            let Some(slot) = slot else {
                continue;
            };
            if let Some(hit) = self.resolve(slot, label, definition, scores[index], &filter) {
                hits.push(hit);
            }
        }

        Ok(hits)
    }

    /// Attach citations from every filtered document containing `slot`.
    fn resolve(
        &self,
        slot: usize,
        label: &str,
        definition: String,
        score: f32,
        filter: &BTreeSet<DocumentKey>,
    ) -> Option<Hit> {
        let key = &self.root.lemmata[slot];
        let containing = self.root.documents_of(key)?;

        let mut documents = Vec::new();
        let mut locations = BTreeMap::new();
        for doc_key in containing.intersection(filter) {
            let Some(doc) = self.documents.get(doc_key) else {
                continue;
            };

            let citations = doc
                .index
                .locations_of(key)
                .iter()
                .filter_map(|&chunk| match doc.metadata.citation(chunk) {
                    Some(citation) => Some(Citation {
                        url: self.providers.citations.build_url(&doc.metadata, citation),
                        citation: citation.to_string(),
                    }),
                    None => {
                        warn!("{doc_key}: chunk {chunk} has no citation");
                        None
                    }
                })
                .collect();

            documents.push(doc_key.clone());
            locations.insert(doc_key.clone(), citations);
        }

        if documents.is_empty() {
            return None;
        }
        Some(Hit {
            score,
            lemma: label.to_string(),
            definition,
            documents,
            locations,
        })
    }

    /// Root slot of a label from a document-scoped space.
    fn slot_of(&self, label: &str) -> Option<usize> {
        self.slots
            .get(label)
            .or_else(|| self.lemma_slots.get(label))
            .copied()
    }

    /// Annotate a source-language query and average the vectors of its
    /// valid lemmata.
    fn atomise(&self, text: &str, embedder: &dyn SourceEmbedder) -> Result<Atoms> {
        let normalised = normalise_query(text);
        let tokens = self.providers.annotator.annotate(&normalised)?;

        let lemmata: BTreeSet<String> = tokens
            .into_iter()
            .filter(|token| self.lexicon.accepts(&token.lemma, &token.pos))
            .map(|token| token.lemma)
            .collect();

        let mut vectors = Vec::new();
        for lemma in &lemmata {
            if let Some(vector) = embedder.vector_for(lemma)? {
                vectors.push(vector);
            }
        }

        let vector = similarity::mean(&vectors).ok_or_else(|| {
            Error::InvalidQuery("no valid terms in the query".into())
        })?;
        Ok(Atoms { lemmata, vector })
    }

    /// The word vectors of a document scope, loaded on first use.
    fn scope(&self, key: &DocumentKey) -> Result<&WordVectors> {
        let cell = self.scopes.get(key).ok_or_else(|| {
            Error::InvalidQuery(format!("unknown scope '{key}'"))
        })?;
        cell.get_or_try_init(|| {
            let path = self.data_dir.scope_vectors(key);
            info!("loading scope vectors from {}", path.display());
            WordVectors::load(&path)
        })
    }
}

impl fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchEngine")
            .field("data_dir", &self.data_dir)
            .field("lemmata", &self.root.len())
            .field("documents", &self.documents.len())
            .finish_non_exhaustive()
    }
}

// -- Output --

/// Format hits for human-readable terminal output.
pub fn format_human(hits: &[Hit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!("{:>3}. [{:.3}] {}", rank + 1, hit.score, hit.lemma);
        if !hit.definition.is_empty() {
            println!("     {}", hit.definition);
        }
        for (doc, citations) in &hit.locations {
            let cited: Vec<&str> =
                citations.iter().map(|c| c.citation.as_str()).collect();
            println!("     {doc}: {}", cited.join(", "));
        }
    }
    println!("\n{} result(s)", hits.len());
}

/// The JSON document printed by `search --json`.
pub fn json_report(query: &Query, hits: &[Hit]) -> serde_json::Value {
    serde_json::json!({
        "query": query.text,
        "language": query.language,
        "scope": query.scope.to_string(),
        "result_count": hits.len(),
        "results": hits,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{
        annotator::{Annotator, PlainAnnotator, Token},
        citation::PerseusUrl,
        doc_index::Occurrence,
        glossary::{Glossary, NoGlossary},
        lexicon::KeyScheme,
        vectors::{HashingEmbedder, TargetEmbedder},
    };

    /// Embeds a fixed set of phrases to fixed vectors.
    struct Table(Vec<(&'static str, Vec<f32>)>);

    impl TargetEmbedder for Table {
        fn dimension(&self) -> usize {
            2
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self
                .0
                .iter()
                .find(|(phrase, _)| *phrase == text)
                .map_or_else(|| vec![0.0, 0.0], |(_, v)| v.clone()))
        }
    }

    impl SourceEmbedder for Table {
        fn dimension(&self) -> usize {
            2
        }

        fn vector_for(&self, lemma: &str) -> Result<Option<Vec<f32>>> {
            Ok(self
                .0
                .iter()
                .find(|(phrase, _)| *phrase == lemma)
                .map(|(_, v)| v.clone()))
        }
    }

    struct Panicking;

    impl Annotator for Panicking {
        fn annotate(&self, _text: &str) -> Result<Vec<Token>> {
            panic!("tagger exploded")
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl Glossary for Counting {
        fn define(&self, word: &str) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("gloss of {word}"))
        }
    }

    fn table() -> Table {
        Table(vec![
            ("love", vec![1.0, 0.0]),
            ("war", vec![0.0, 1.0]),
            ("desire", vec![0.9, 0.1]),
            ("amor", vec![1.0, 0.0]),
            ("bellum", vec![0.0, 1.0]),
            ("cupido", vec![0.8, 0.2]),
        ])
    }

    fn providers() -> Providers {
        Providers {
            annotator: Box::new(PlainAnnotator),
            source: Box::new(table()),
            target: Box::new(table()),
            glossary: Box::new(NoGlossary),
            citations: Box::new(PerseusUrl::new("http://test/text")),
        }
    }

    fn key(s: &str) -> DocumentKey {
        DocumentKey::parse(s).unwrap()
    }

    fn metadata(doc: &str, chunks: usize) -> DocumentMetadata {
        DocumentMetadata {
            key: key(doc),
            title: doc.to_uppercase(),
            index: (0..chunks).map(|i| format!("1.{i}")).collect(),
            length: chunks,
            text_id: None,
            schema: None,
        }
    }

    /// Root index with `amor` (document A, chunks 2 and 5), `bellum`
    /// (document B, chunk 0) and `cupido` (document A, chunk 9).
    fn fixture(dir: &std::path::Path) -> DataDir {
        let data_dir = DataDir::resolve(Some(dir)).unwrap();
        std::fs::create_dir_all(data_dir.metadata_dir()).unwrap();

        let (a, b) = (key("A"), key("B"));
        let mut root = RootIndex::default();
        root.insert_lemma("amor".into(), &[1.0, 0.0], &[1.0, 0.0], "love".into(), &a)
            .unwrap();
        root.insert_lemma("bellum".into(), &[0.0, 1.0], &[0.0, 1.0], "war".into(), &b)
            .unwrap();
        root.insert_lemma("cupido".into(), &[0.8, 0.2], &[0.9, 0.1], "desire".into(), &a)
            .unwrap();
        root.refresh_stats();
        Checkpoint::<RootIndex>::new(data_dir.root_bundle())
            .save(&root, true)
            .unwrap();

        let mut doc_a = DocumentIndex::default();
        doc_a.occurrences.insert(
            "amor".into(),
            Occurrence {
                count: 2,
                locations: vec![2, 5],
            },
        );
        doc_a.occurrences.insert(
            "cupido".into(),
            Occurrence {
                count: 1,
                locations: vec![9],
            },
        );
        let mut doc_b = DocumentIndex::default();
        doc_b.record("bellum", 0);

        for (doc, index, chunks) in [(&a, doc_a, 6), (&b, doc_b, 1)] {
            Checkpoint::<DocumentIndex>::new(data_dir.document_bundle(doc))
                .save(&index, true)
                .unwrap();
            std::fs::write(
                data_dir.metadata_file(doc),
                serde_json::to_vec(&metadata(doc.as_str(), chunks)).unwrap(),
            )
            .unwrap();
        }
        data_dir
    }

    fn engine(dir: &std::path::Path) -> SearchEngine {
        engine_with(dir, providers())
    }

    fn engine_with(dir: &std::path::Path, providers: Providers) -> SearchEngine {
        SearchEngine::open(fixture(dir), Lexicon::new(KeyScheme::Lemma), providers)
            .unwrap()
            .unwrap()
    }

    fn lemmata(hits: &[Hit]) -> Vec<&str> {
        hits.iter().map(|hit| hit.lemma.as_str()).collect()
    }

    #[test]
    fn missing_sources_yield_no_engine() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let engine =
            SearchEngine::open(data_dir, Lexicon::default(), providers()).unwrap();
        assert!(engine.is_none());
    }

    #[test]
    fn target_query_ranks_by_similarity() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let hits = engine
            .search(&Query::new("desire", Language::Target).with_documents([]))
            .unwrap();

        // "desire" embeds to [0.9, 0.1]; cupido's own definition is dropped.
        assert_eq!(lemmata(&hits), vec!["amor", "bellum"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn target_query_skips_literal_definition() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let hits = engine.search(&Query::new("love", Language::Target)).unwrap();
        assert!(!lemmata(&hits).contains(&"amor"));
    }

    #[test]
    fn scores_are_descending() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let hits = engine
            .search(&Query::new("unknown phrase", Language::Target).with_documents([]))
            .unwrap();
        // A zero query vector scores everything equally, in slot order.
        assert_eq!(lemmata(&hits), vec!["amor", "bellum", "cupido"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn document_filter_resolves_citations() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let hits = engine
            .search(&Query::new("war", Language::Target).with_documents([key("A")]))
            .unwrap();
        let amor = hits.iter().find(|hit| hit.lemma == "amor").unwrap();

        assert_eq!(amor.documents, vec![key("A")]);
        let citations = &amor.locations[&key("A")];
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].citation, "1.2");
        assert_eq!(citations[1].url, "http://test/text?doc=1.5");

        let hits = engine
            .search(&Query::new("war", Language::Target).with_documents([key("B")]))
            .unwrap();
        assert!(!lemmata(&hits).contains(&"amor"));
    }

    #[test]
    fn out_of_range_citations_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let hits = engine
            .search(&Query::new("love", Language::Target).with_documents([key("A")]))
            .unwrap();
        let cupido = hits.iter().find(|hit| hit.lemma == "cupido").unwrap();
        assert!(cupido.locations[&key("A")].is_empty());
    }

    #[test]
    fn default_filter_is_every_document() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let hits = engine.search(&Query::new("desire", Language::Target)).unwrap();
        assert_eq!(lemmata(&hits), vec!["amor", "bellum"]);
        assert_eq!(hits[1].documents, vec![key("B")]);
    }

    #[test]
    fn max_results_caps_hits() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let hits = engine
            .search(&Query::new("desire", Language::Target).with_max_results(1))
            .unwrap();
        assert_eq!(lemmata(&hits), vec!["amor"]);
    }

    #[test]
    fn source_query_excludes_its_own_lemmata() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let hits = engine
            .search(&Query::new("Amor!", Language::Source))
            .unwrap();
        assert_eq!(lemmata(&hits), vec!["cupido", "bellum"]);
    }

    #[test]
    fn source_query_without_known_terms_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        for text in ["xyzzy", "42 ?"] {
            let err = engine
                .search(&Query::new(text, Language::Source))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidQuery(_)), "{text}: {err}");
        }
    }

    #[test]
    fn empty_query_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let err = engine.search(&Query::new("  ", Language::Target)).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
        assert!(matches!(
            "english".parse::<Language>(),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn panics_become_unexpected_query_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let mut providers = providers();
        providers.annotator = Box::new(Panicking);
        let engine = engine_with(tmp.path(), providers);

        let err = engine.search(&Query::new("amor", Language::Source)).unwrap_err();
        assert!(matches!(err, Error::UnexpectedQuery(ref m) if m.contains("exploded")));

        // The engine keeps serving.
        assert!(engine.search(&Query::new("war", Language::Target)).is_ok());
    }

    #[test]
    fn document_scope_uses_its_own_vectors() {
        let tmp = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut providers = providers();
        providers.glossary = Box::new(Counting(calls.clone()));
        let engine = engine_with(tmp.path(), providers);

        std::fs::write(
            engine.data_dir.scope_vectors(&key("A")),
            "amor 1 0\nvenus 0.9 0.1\ncupido 0.7 0.3\n",
        )
        .unwrap();

        let query = Query::new("amor", Language::Source)
            .with_scope(Scope::Document(key("A")))
            .with_documents([]);
        let hits = engine.search(&query).unwrap();

        assert_eq!(lemmata(&hits), vec!["venus", "cupido"]);
        assert_eq!(hits[0].definition, "gloss of venus");
        assert_eq!(hits[1].definition, "desire");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // With a document filter only labels known to the Root Index qualify.
        let hits = engine
            .search(&query.clone().with_documents([key("A")]))
            .unwrap();
        assert_eq!(lemmata(&hits), vec!["cupido"]);
    }

    #[test]
    fn missing_scope_vectors_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());

        let query = Query::new("amor", Language::Source)
            .with_scope(Scope::Document(key("A")));
        assert!(matches!(engine.search(&query), Err(Error::NotFound { .. })));

        let query = Query::new("amor", Language::Source)
            .with_scope(Scope::Document(key("Z")));
        assert!(matches!(engine.search(&query), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn documents_without_metadata_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = fixture(tmp.path());
        std::fs::remove_file(data_dir.metadata_file(&key("B"))).unwrap();

        let engine = SearchEngine::open(
            data_dir,
            Lexicon::new(KeyScheme::Lemma),
            providers(),
        )
        .unwrap()
        .unwrap();
        let keys: Vec<&DocumentKey> = engine.documents().collect();
        assert_eq!(keys, vec![&key("A")]);

        let hits = engine.search(&Query::new("desire", Language::Target)).unwrap();
        assert_eq!(lemmata(&hits), vec!["amor"]);
    }

    #[test]
    fn lemma_pos_keys_dedup_on_lemma() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
        std::fs::create_dir_all(data_dir.sources_dir()).unwrap();

        let embedder = HashingEmbedder::new(16);
        let mut root = RootIndex::default();
        for lemma in ["amor", "amo"] {
            let vector = embedder.vector_for(lemma).unwrap().unwrap();
            root.insert_lemma(
                format!("{lemma} (X)"),
                &vector,
                &vector,
                String::new(),
                &key("A"),
            )
            .unwrap();
        }
        Checkpoint::<RootIndex>::new(data_dir.root_bundle())
            .save(&root, true)
            .unwrap();

        let engine = SearchEngine::open(
            data_dir,
            Lexicon::default(),
            Providers {
                annotator: Box::new(PlainAnnotator),
                source: Box::new(embedder),
                target: Box::new(embedder),
                glossary: Box::new(NoGlossary),
                citations: Box::new(PerseusUrl::default()),
            },
        )
        .unwrap()
        .unwrap();

        let hits = engine.search(&Query::new("amor", Language::Source)).unwrap();
        assert_eq!(lemmata(&hits), vec!["amo (X)"]);
    }

    #[test]
    fn parse_scope() {
        assert_eq!("universal".parse::<Scope>().unwrap(), Scope::Universal);
        assert_eq!(
            "A".parse::<Scope>().unwrap(),
            Scope::Document(key("A"))
        );
        assert!(matches!("a/b".parse::<Scope>(), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn json_report_shape() {
        let query = Query::new("love", Language::Target);
        let hit = Hit {
            score: 0.75,
            lemma: "amor".into(),
            definition: "love".into(),
            documents: vec![key("A")],
            locations: BTreeMap::from([(
                key("A"),
                vec![Citation {
                    url: "u".into(),
                    citation: "1.1".into(),
                }],
            )]),
        };
        let json = json_report(&query, &[hit]);
        assert_eq!(json["language"], "target");
        assert_eq!(json["result_count"], 1);
        assert_eq!(json["results"][0]["locations"]["A"][0]["citation"], "1.1");
    }
}
