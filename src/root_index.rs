//! The corpus-wide lexical table.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    checkpoint::{
        BinaryValue,
        Bundle,
        ByteReader,
        FieldReader,
        FieldSpec,
        FieldWriter,
        StorageKind,
        put_u32,
        structured_text_field,
    },
    doc_key::DocumentKey,
    embeddings::Embeddings,
    error::{Error, Result},
    lexicon::KeyScheme,
};

pub const STAT_NUM_LEMMATA: &str = "num_lemmata";

/// Which documents contain a lemma.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LemmaInfo {
    pub documents: BTreeSet<DocumentKey>,
}

impl BinaryValue for LemmaInfo {
    fn put(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u32(out, self.documents.len())?;
        for key in &self.documents {
            key.as_str().to_string().put(out)?;
        }
        Ok(())
    }

    fn get(reader: &mut ByteReader<'_>) -> std::result::Result<Self, String> {
        let len = reader.u32()?;
        let mut documents = BTreeSet::new();
        for _ in 0..len {
            let raw = <String as BinaryValue>::get(reader)?;
            let key = DocumentKey::parse(&raw).map_err(|e| e.to_string())?;
            documents.insert(key);
        }
        Ok(Self { documents })
    }
}

/// Free-form counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stats(BTreeMap<String, u64>);

impl Stats {
    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.get(name).copied()
    }

    pub fn set(&mut self, name: &str, value: u64) {
        self.0.insert(name.to_string(), value);
    }
}

structured_text_field!(Stats);

/// Every distinct lemma key ever seen, with its embeddings, definition and
/// the documents containing it.
///
/// `lemmata`, `source_embeddings`, `target_embeddings` and `definitions` are
/// parallel: slot `i` of each describes the same lemma, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootIndex {
    pub lemmata: Vec<String>,
    pub source_embeddings: Embeddings,
    pub target_embeddings: Embeddings,
    pub definitions: Vec<String>,
    pub lemma_info: BTreeMap<String, LemmaInfo>,
    pub existing_lemmata: BTreeSet<String>,
    pub stats: Stats,
    /// Key scheme the lemmata were built with; empty until the first save.
    pub key_scheme: String,
}

impl RootIndex {
    pub fn len(&self) -> usize {
        self.lemmata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lemmata.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.existing_lemmata.contains(key)
    }

    pub fn documents_of(&self, key: &str) -> Option<&BTreeSet<DocumentKey>> {
        self.lemma_info.get(key).map(|info| &info.documents)
    }

    /// Assign a new slot to `key`, first seen in `document`.
    ///
    /// Both vectors are validated before anything is appended, so a
    /// dimension mismatch leaves the index unchanged.
    pub fn insert_lemma(
        &mut self,
        key: String,
        source: &[f32],
        target: &[f32],
        definition: String,
        document: &DocumentKey,
    ) -> Result<()> {
        if self.contains(&key) {
            return Err(Error::Config(format!(
                "lemma '{key}' already has a slot"
            )));
        }
        self.source_embeddings.check(source)?;
        self.target_embeddings.check(target)?;

        self.source_embeddings.push(source)?;
        self.target_embeddings.push(target)?;
        self.definitions.push(definition);
        self.existing_lemmata.insert(key.clone());
        self.lemma_info.insert(
            key.clone(),
            LemmaInfo {
                documents: BTreeSet::from([document.clone()]),
            },
        );
        self.lemmata.push(key);
        Ok(())
    }

    /// Record that `document` contains `key`. Returns `true` if the document
    /// was not yet listed.
    pub fn attach_document(
        &mut self,
        key: &str,
        document: &DocumentKey,
    ) -> Result<bool> {
        let info = self.lemma_info.get_mut(key).ok_or_else(|| {
            Error::NotFound {
                kind: "lemma",
                name: key.to_string(),
            }
        })?;
        Ok(info.documents.insert(document.clone()))
    }

    /// Adopt `scheme` if no scheme has been recorded yet, otherwise require
    /// that it matches the recorded one.
    pub fn claim_scheme(&mut self, scheme: KeyScheme) -> Result<()> {
        if self.key_scheme.is_empty() {
            self.key_scheme = scheme.as_str().to_string();
            return Ok(());
        }
        self.check_scheme(scheme)
    }

    /// Keys built with different schemes never match, so an index is only
    /// usable with the scheme it was built with.
    pub fn check_scheme(&self, scheme: KeyScheme) -> Result<()> {
        if self.key_scheme.is_empty() || self.key_scheme == scheme.as_str() {
            return Ok(());
        }
        Err(Error::Config(format!(
            "the index was built with key scheme '{}' but '{scheme}' is \
             configured",
            self.key_scheme
        )))
    }

    pub fn refresh_stats(&mut self) {
        self.stats
            .set(STAT_NUM_LEMMATA, self.lemma_info.len() as u64);
    }

    /// Verify that the parallel fields line up and that `existing_lemmata`
    /// is exactly the key set of `lemma_info`.
    pub fn check_invariant(&self) -> Result<()> {
        let lengths_match = [
            self.existing_lemmata.len(),
            self.source_embeddings.len(),
            self.target_embeddings.len(),
            self.definitions.len(),
            self.lemma_info.len(),
        ]
        .iter()
        .all(|len| *len == self.lemmata.len());

        if lengths_match
            && self.existing_lemmata.iter().eq(self.lemma_info.keys())
        {
            return Ok(());
        }

        Err(Error::InvariantViolation {
            lemmata: self.lemmata.len(),
            existing: self.existing_lemmata.len(),
            source_embeddings: self.source_embeddings.len(),
            target_embeddings: self.target_embeddings.len(),
            definitions: self.definitions.len(),
            documented: self.lemma_info.len(),
        })
    }
}

impl Bundle for RootIndex {
    const FINGERPRINT: &'static [FieldSpec] = &[
        FieldSpec::new("lemmata", StorageKind::BinarySequence),
        FieldSpec::new("source_embeddings", StorageKind::BinarySequence),
        FieldSpec::new("target_embeddings", StorageKind::BinarySequence),
        FieldSpec::new("definitions", StorageKind::BinarySequence),
        FieldSpec::new("lemma_info", StorageKind::BinaryMap),
        FieldSpec::new("existing_lemmata", StorageKind::BinarySet),
        FieldSpec::new("stats", StorageKind::StructuredText),
        FieldSpec::new("key_scheme", StorageKind::ScalarText),
    ];

    fn write_fields(&self, writer: &mut FieldWriter<'_>) -> Result<()> {
        writer.field("lemmata", &self.lemmata)?;
        writer.field("source_embeddings", &self.source_embeddings)?;
        writer.field("target_embeddings", &self.target_embeddings)?;
        writer.field("definitions", &self.definitions)?;
        writer.field("lemma_info", &self.lemma_info)?;
        writer.field("existing_lemmata", &self.existing_lemmata)?;
        writer.field("stats", &self.stats)?;
        writer.field("key_scheme", &self.key_scheme)
    }

    fn read_fields(reader: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            lemmata: reader.field("lemmata")?,
            source_embeddings: reader.field("source_embeddings")?,
            target_embeddings: reader.field("target_embeddings")?,
            definitions: reader.field("definitions")?,
            lemma_info: reader.field("lemma_info")?,
            existing_lemmata: reader.field("existing_lemmata")?,
            stats: reader.field("stats")?,
            key_scheme: reader.field("key_scheme")?,
        })
    }
}
