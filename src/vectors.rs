//! Source- and target-language embedding providers.

use std::{collections::HashMap, fs, path::Path};

use crate::{
    embeddings::Embeddings,
    error::{Error, Result},
};

/// Fill value of the source-language null vector.
pub const NULL_FILL: f32 = 1e-9;

/// Word vectors for source-language lemmata.
pub trait SourceEmbedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// The vector of `lemma`, or `None` when the provider has no vector for it.
    fn vector_for(&self, lemma: &str) -> Result<Option<Vec<f32>>>;
}

/// Sentence embeddings for target-language text.
pub trait TargetEmbedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Placeholder stored for lemmata the source embedder has no vector for.
pub fn source_null_vector(dimension: usize) -> Vec<f32> {
    vec![NULL_FILL; dimension]
}

/// Placeholder target vector: the embedding of the empty string.
pub fn target_null_vector(embedder: &dyn TargetEmbedder) -> Result<Vec<f32>> {
    embedder.embed("")
}

// -- Word vector files --

/// A vocabulary of word vectors read from the common text format: an
/// optional `<count> <dimension>` header, then one `<word> <f32>...` line
/// per word.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordVectors {
    words: Vec<String>,
    vectors: Embeddings,
    positions: HashMap<String, usize>,
}

impl WordVectors {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound {
                kind: "word vectors",
                name: path.display().to_string(),
            },
            _ => Error::Io(e),
        })?;
        Self::parse(&text).map_err(|reason| Error::Codec {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut lines = text.lines().enumerate().peekable();

        if let Some((_, first)) = lines.peek() {
            let fields: Vec<&str> = first.split_whitespace().collect();
            if fields.len() == 2
                && fields.iter().all(|f| f.parse::<usize>().is_ok())
            {
                lines.next();
            }
        }

        let mut vocabulary = Self::default();
        for (number, line) in lines {
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let row = fields
                .map(str::parse::<f32>)
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| format!("line {}: {e}", number + 1))?;
            vocabulary
                .insert(word, &row)
                .map_err(|e| format!("line {}: {e}", number + 1))?;
        }
        Ok(vocabulary)
    }

    /// Add a word. A repeated word keeps its first vector.
    pub fn insert(&mut self, word: &str, vector: &[f32]) -> Result<()> {
        if self.positions.contains_key(word) {
            return Ok(());
        }
        self.vectors.push(vector)?;
        self.positions.insert(word.to_string(), self.words.len());
        self.words.push(word.to_string());
        Ok(())
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn vectors(&self) -> &Embeddings {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.positions
            .get(word)
            .and_then(|&position| self.vectors.row(position))
    }
}

impl SourceEmbedder for WordVectors {
    fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    fn vector_for(&self, lemma: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.get(lemma).map(<[f32]>::to_vec))
    }
}

// -- Feature hashing --

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Deterministic embedder built from hashed word and character-trigram
/// features. Texts sharing words or spelling land close to each other.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let slot = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[slot] += sign * weight;
    }

    fn features(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            self.add_feature(&mut vector, &word, 1.0);

            let padded: Vec<char> =
                format!("<{word}>").chars().collect();
            for trigram in padded.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.add_feature(&mut vector, &trigram, 0.5);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl SourceEmbedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vector_for(&self, lemma: &str) -> Result<Option<Vec<f32>>> {
        if lemma.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(self.features(lemma)))
    }
}

impl TargetEmbedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.features(text))
    }
}
