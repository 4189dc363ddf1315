//! aventine - incremental lemma indexing and semantic lexical search.
//!
//! aventine turns chunked source texts into a lemma index: every distinct
//! lemma gets a source-language vector, an English definition and a
//! target-language vector of that definition, plus the chunks of each
//! document where it occurs. Indexing is resumable after every chunk.
//! Searches rank lemmata by cosine similarity against either vector space
//! and cite the passages where the hits occur.
//!
//! # Quick start
//!
//! ```no_run
//! use aventine::{ConfigDb, DataDir, Lexicon, Providers, SearchEngine, Settings};
//! use aventine::search::{Language, Query};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let settings = Settings::load(&ConfigDb::open(&data_dir.config_db()).unwrap()).unwrap();
//! let providers = Providers::from_settings(&settings).unwrap();
//!
//! let engine = SearchEngine::open(data_dir, Lexicon::new(settings.key_scheme), providers)
//!     .unwrap()
//!     .expect("sources acquired");
//!
//! let query = Query::new("love", Language::Target).with_max_results(10);
//! for hit in engine.search(&query).unwrap() {
//!     println!("{} {:.3} {}", hit.lemma, hit.score, hit.definition);
//! }
//! ```

pub mod annotator;
pub mod checkpoint;
pub mod citation;
pub mod config_db;
pub mod data_dir;
pub mod doc_index;
pub mod doc_key;
pub mod embeddings;
pub mod error;
pub mod glossary;
pub mod lexicon;
pub mod mcp;
pub mod metadata;
pub mod pipeline;
pub mod providers;
pub mod root_index;
pub mod search;
pub mod settings;
pub mod similarity;
pub mod status;
pub mod vectors;

pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use doc_key::DocumentKey;
pub use error::{Error, Result};
pub use lexicon::{KeyScheme, Lexicon};
pub use pipeline::Indexer;
pub use providers::Providers;
pub use search::{Hit, Language, Query, Scope, SearchEngine};
pub use settings::Settings;
