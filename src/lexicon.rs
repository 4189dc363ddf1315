//! Rules deciding which annotated tokens become lemma keys.

use std::{collections::BTreeSet, fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::error::{Error, Result};

/// Part-of-speech tag of punctuation tokens.
pub const PUNCT: &str = "PUNCT";

/// Punctuation stripped from source-language queries.
pub const QUERY_PUNCTUATION: &[char] = &[',', '.', '?', '!', '(', ')'];

static DEFAULT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+$").unwrap());

/// Lemmatisation artifacts that pass the pattern but are never indexed.
const DEFAULT_STOPLIST: &[&str] = &["con", "unietvicensimus"];

/// How a lexical key is derived from an annotated token.
///
/// Chosen once per installation; Root and Per-Document indexes built with
/// different schemes are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyScheme {
    /// The lemma alone: `amor`.
    Lemma,
    /// The lemma disambiguated by part of speech: `amor (NOUN)`.
    #[default]
    LemmaPos,
}

impl KeyScheme {
    pub fn key(self, lemma: &str, pos: &str) -> String {
        match self {
            Self::Lemma => lemma.to_string(),
            Self::LemmaPos => format!("{lemma} ({pos})"),
        }
    }

    /// The lemma part of a key built by this scheme.
    pub fn lemma_of(self, key: &str) -> &str {
        match self {
            Self::Lemma => key,
            Self::LemmaPos => key
                .strip_suffix(')')
                .and_then(|rest| rest.rsplit_once(" ("))
                .map_or(key, |(lemma, _)| lemma),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lemma => "lemma",
            Self::LemmaPos => "lemma-pos",
        }
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lemma" => Ok(Self::Lemma),
            "lemma-pos" | "lemma_pos" => Ok(Self::LemmaPos),
            other => Err(Error::Config(format!(
                "unknown key scheme '{other}' (expected 'lemma' or 'lemma-pos')"
            ))),
        }
    }
}

/// Lemma validity pattern, stoplist and key scheme.
#[derive(Debug, Clone)]
pub struct Lexicon {
    pattern: Regex,
    stoplist: BTreeSet<String>,
    scheme: KeyScheme,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new(KeyScheme::default())
    }
}

impl Lexicon {
    pub fn new(scheme: KeyScheme) -> Self {
        Self {
            pattern: DEFAULT_PATTERN.clone(),
            stoplist: DEFAULT_STOPLIST.iter().map(|s| s.to_string()).collect(),
            scheme,
        }
    }

    pub fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    /// Whether a `(lemma, pos)` pair is indexed.
    pub fn accepts(&self, lemma: &str, pos: &str) -> bool {
        pos != PUNCT && self.is_valid_lemma(lemma)
    }

    pub fn is_valid_lemma(&self, lemma: &str) -> bool {
        self.pattern.is_match(lemma) && !self.stoplist.contains(lemma)
    }

    pub fn key(&self, lemma: &str, pos: &str) -> String {
        self.scheme.key(lemma, pos)
    }

    pub fn lemma_of<'k>(&self, key: &'k str) -> &'k str {
        self.scheme.lemma_of(key)
    }
}

/// Lowercase a source-language query, drop query punctuation and collapse
/// whitespace.
pub fn normalise_query(query: &str) -> String {
    query
        .to_lowercase()
        .replace(QUERY_PUNCTUATION, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
