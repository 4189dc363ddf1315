use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    doc_key::DocumentKey,
    error::{Error, Result},
};

/// Separator between chunks in a document's text file.
pub const CHUNK_SEP: char = '\n';

/// Description of a preprocessed document, written by document acquisition
/// as `sources/metadata/<key>.json`.
///
/// Chunk `i` of the document text is cited as `index[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub key: DocumentKey,
    pub title: String,
    #[serde(default)]
    pub index: Vec<String>,
    #[serde(default, alias = "len_index")]
    pub length: usize,
    /// Identifier of the text at its source library.
    #[serde(default)]
    pub text_id: Option<String>,
    /// Citation template with a `{}` placeholder for the citation string.
    #[serde(default)]
    pub schema: Option<String>,
}

impl DocumentMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound {
                kind: "document metadata",
                name: path.display().to_string(),
            },
            _ => Error::Io(e),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The citation string of a chunk, if the index covers it.
    pub fn citation(&self, chunk: usize) -> Option<&str> {
        self.index.get(chunk).map(String::as_str)
    }
}

/// Read a document text and split it into chunks.
pub fn read_chunks(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound {
            kind: "document text",
            name: path.display().to_string(),
        },
        _ => Error::Io(e),
    })?;
    Ok(split_chunks(&text))
}

pub fn split_chunks(text: &str) -> Vec<String> {
    let text = text.trim_end_matches(CHUNK_SEP);
    if text.is_empty() {
        return Vec::new();
    }
    text.split(CHUNK_SEP).map(str::to_string).collect()
}
