use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    lexicon::PUNCT,
    providers::run_command,
};

/// One annotated token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub lemma: String,
    pub pos: String,
    #[serde(rename = "token")]
    pub surface: String,
}

impl Token {
    pub fn new(lemma: &str, pos: &str, surface: &str) -> Self {
        Self {
            lemma: lemma.to_string(),
            pos: pos.to_string(),
            surface: surface.to_string(),
        }
    }
}

/// Turns one chunk of raw text into `(lemma, part of speech, token)` triples.
pub trait Annotator: Send + Sync {
    fn annotate(&self, text: &str) -> Result<Vec<Token>>;
}

/// Runs an external annotation program.
///
/// The chunk is written to the program's stdin; it must print a JSON array
/// of `{"lemma": .., "pos": .., "token": ..}` objects.
#[derive(Debug, Clone)]
pub struct CommandAnnotator {
    program: String,
    args: Vec<String>,
}

impl CommandAnnotator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line into program and arguments.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            Error::Config("annotator command is empty".to_string())
        })?;
        Ok(Self::new(program, parts.collect()))
    }
}

impl Annotator for CommandAnnotator {
    fn annotate(&self, text: &str) -> Result<Vec<Token>> {
        let stdout =
            run_command("annotation", &self.program, &self.args, None, text)?;
        serde_json::from_str(&stdout).map_err(|e| {
            Error::provider(
                "annotation",
                format!("{} printed malformed tokens: {e}", self.program),
            )
        })
    }
}

/// Whitespace tokenizer that uses the lowercased word as its own lemma.
///
/// Leading and trailing punctuation is split off into `PUNCT` tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAnnotator;

impl Annotator for PlainAnnotator {
    fn annotate(&self, text: &str) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        for raw in text.split_whitespace() {
            let word = raw.trim_matches(|c: char| c.is_ascii_punctuation());
            if word.is_empty() {
                tokens.push(Token::new(raw, PUNCT, raw));
                continue;
            }

            let start = raw.find(word).unwrap_or(0);
            let (leading, rest) = raw.split_at(start);
            let trailing = &rest[word.len()..];

            if !leading.is_empty() {
                tokens.push(Token::new(leading, PUNCT, leading));
            }
            tokens.push(Token::new(&word.to_lowercase(), "X", word));
            if !trailing.is_empty() {
                tokens.push(Token::new(trailing, PUNCT, trailing));
            }
        }
        Ok(tokens)
    }
}
