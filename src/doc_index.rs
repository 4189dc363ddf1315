//! Per-document occurrence data and resumability metadata.

use std::collections::BTreeMap;

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
        structured_text_field,
    },
    error::Result,
};

/// Resumability cursor of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total_chunks: usize,
    /// Index of the last chunk whose state has been checkpointed.
    pub completed_chunk_index: Option<usize>,
    /// Formatted as `+HH:MM:SS.mmm`.
    pub estimated_time_remaining: Option<String>,
    #[serde(default)]
    pub distinct_lemmata: usize,
}

structured_text_field!(Progress);

impl Progress {
    /// The first chunk that still needs processing.
    pub fn next_chunk(&self) -> usize {
        self.completed_chunk_index.map_or(0, |done| done + 1)
    }

    pub fn is_started(&self) -> bool {
        self.completed_chunk_index.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.total_chunks > 0
            && self.completed_chunk_index == Some(self.total_chunks - 1)
    }
}

/// How often, and in which chunks, a lemma occurs in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occurrence {
    pub count: usize,
    pub locations: Vec<usize>,
}

impl Occurrence {
    fn first(chunk: usize) -> Self {
        Self {
            count: 1,
            locations: vec![chunk],
        }
    }
}

impl BinaryValue for Occurrence {
    fn put(&self, out: &mut Vec<u8>) -> Result<()> {
        self.locations.put(out)
    }

    fn get(reader: &mut ByteReader<'_>) -> std::result::Result<Self, String> {
        let locations = <Vec<usize> as BinaryValue>::get(reader)?;
        Ok(Self {
            count: locations.len(),
            locations,
        })
    }
}

/// One document's view of the corpus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentIndex {
    pub progress: Progress,
    /// One line per chunk, one lemma per token.
    pub lemmatised_text: String,
    pub occurrences: BTreeMap<String, Occurrence>,
}

impl DocumentIndex {
    /// Record one occurrence of `key` in `chunk`. Returns `true` if this is
    /// the first occurrence in the document.
    pub fn record(&mut self, key: &str, chunk: usize) -> bool {
        match self.occurrences.get_mut(key) {
            Some(occurrence) => {
                occurrence.count += 1;
                occurrence.locations.push(chunk);
                false
            }
            None => {
                self.occurrences
                    .insert(key.to_string(), Occurrence::first(chunk));
                true
            }
        }
    }

    pub fn locations_of(&self, key: &str) -> &[usize] {
        self.occurrences
            .get(key)
            .map_or(&[], |occurrence| occurrence.locations.as_slice())
    }

    pub fn push_lemmatised_line(&mut self, line: &str) {
        self.lemmatised_text.push_str(line);
        self.lemmatised_text.push('\n');
    }
}

impl Bundle for DocumentIndex {
    const FINGERPRINT: &'static [FieldSpec] = &[
        FieldSpec::new("progress", StorageKind::StructuredText),
        FieldSpec::new("lemmatised_text", StorageKind::ScalarText),
        FieldSpec::new("occurrences", StorageKind::BinaryMap),
    ];

    fn write_fields(&self, writer: &mut FieldWriter<'_>) -> Result<()> {
        writer.field("progress", &self.progress)?;
        writer.field("lemmatised_text", &self.lemmatised_text)?;
        writer.field("occurrences", &self.occurrences)
    }

    fn read_fields(reader: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            progress: reader.field("progress")?,
            lemmatised_text: reader.field("lemmatised_text")?,
            occurrences: reader.field("occurrences")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;

    #[test]
    fn record_counts_and_locations() {
        let mut doc = DocumentIndex::default();
        assert!(doc.record("amor", 2));
        assert!(!doc.record("amor", 5));
        assert!(!doc.record("amor", 5));

        let occurrence = &doc.occurrences["amor"];
        assert_eq!(occurrence.count, 3);
        assert_eq!(occurrence.locations, vec![2, 5, 5]);
        assert_eq!(doc.locations_of("bellum"), &[] as &[usize]);
    }

    #[test]
    fn progress_cursor() {
        let mut progress = Progress {
            total_chunks: 10,
            ..Default::default()
        };
        assert_eq!(progress.next_chunk(), 0);
        assert!(!progress.is_started());

        progress.completed_chunk_index = Some(4);
        assert_eq!(progress.next_chunk(), 5);
        assert!(!progress.is_complete());

        progress.completed_chunk_index = Some(9);
        assert!(progress.is_complete());
    }

    #[test]
    fn empty_document_is_never_complete() {
        assert!(!Progress::default().is_complete());
    }

    #[test]
    fn checkpoint_round_trip_preserves_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = Checkpoint::<DocumentIndex>::new(tmp.path());

        let mut doc = DocumentIndex::default();
        doc.progress = Progress {
            total_chunks: 3,
            completed_chunk_index: Some(1),
            estimated_time_remaining: Some("+00:00:01.500".into()),
            distinct_lemmata: 2,
        };
        doc.record("amor (NOUN)", 0);
        doc.record("amor (NOUN)", 1);
        doc.record("bellum (NOUN)", 1);
        doc.push_lemmatised_line("amor bellum");

        ckpt.save(&doc, true).unwrap();
        let loaded = ckpt.load(false).unwrap();

        assert_eq!(loaded, doc);
        for occurrence in loaded.occurrences.values() {
            assert_eq!(occurrence.count, occurrence.locations.len());
        }
        assert!(tmp.path().join("progress.json").exists());
        assert!(tmp.path().join("lemmatised_text.txt").exists());
    }
}
