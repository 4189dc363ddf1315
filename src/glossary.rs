//! Definition lookup for source-language words.

use std::{path::PathBuf, sync::LazyLock};

use regex::Regex;

use crate::{
    error::{Error, Result},
    providers::run_command,
};

/// Looks up the target-language definition of a word. The indexer passes
/// words as they occur in the text, so implementations see inflected forms.
pub trait Glossary: Send + Sync {
    fn define(&self, word: &str) -> Result<String>;

    /// Define several words at once. The result is aligned with `words`.
    fn define_batch(&self, words: &[String]) -> Result<Vec<String>> {
        words.iter().map(|word| self.define(word)).collect()
    }
}

/// A glossary that knows nothing; every definition is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGlossary;

impl Glossary for NoGlossary {
    fn define(&self, _word: &str) -> Result<String> {
        Ok(String::new())
    }

    fn define_batch(&self, words: &[String]) -> Result<Vec<String>> {
        Ok(vec![String::new(); words.len()])
    }
}

/// Marks the first line of a dictionary entry, e.g. `[XXXAO]`.
static ENTRY_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[A-Z]+\]").unwrap());

/// Runs a Whitaker's Words style `meanings` program.
///
/// All words of a batch are passed as one argument; the program answers
/// with one blank-line separated block per word.
#[derive(Debug, Clone)]
pub struct WordsGlossary {
    program: String,
    tool_dir: Option<PathBuf>,
}

impl WordsGlossary {
    pub fn new(program: String, tool_dir: Option<PathBuf>) -> Self {
        Self { program, tool_dir }
    }

    /// The meaning of each word, aligned with `words`.
    pub fn lookup(&self, words: &[String]) -> Result<Vec<String>> {
        if words.is_empty() {
            return Ok(Vec::new());
        }

        // The program prompts for more input; blank lines make it exit.
        let stdout = run_command(
            "gloss",
            &self.program,
            &[words.join(" ")],
            self.tool_dir.as_deref(),
            "\n\n\n\n\n",
        )?;
        let cleaned: String = stdout
            .trim()
            .chars()
            .filter(|c| *c != '\r' && *c != '*')
            .collect();

        let blocks: Vec<&str> = cleaned.split("\n\n").collect();
        if blocks.len() < words.len() {
            return Err(Error::provider(
                "gloss",
                format!(
                    "{} answered {} entries for {} words",
                    self.program,
                    blocks.len(),
                    words.len()
                ),
            ));
        }

        Ok(blocks
            .iter()
            .zip(words)
            .map(|(block, word)| self.parse(block, word))
            .collect())
    }

    /// Parse the program's answer for a single word.
    pub fn parse(&self, output: &str, word: &str) -> String {
        if output.contains("UNKNOWN") {
            return String::new();
        }

        let mut body = Vec::new();
        let mut meta = Vec::new();
        let mut greedy = Vec::new();
        let mut matched = false;
        let mut triggered = false;

        for line in output.lines() {
            if ENTRY_FLAG.is_match(line) {
                triggered = true;
                matched = line.starts_with(word);
            } else if matched {
                greedy.push(line.trim());
            } else if triggered {
                body.push(line.trim());
            } else if !line.trim().is_empty() {
                meta.push(line.trim());
            }
        }

        let meta = meta.join(" ");
        let greedy = greedy.join(" ");
        let meaning = if greedy.trim().is_empty() {
            body.join(" ")
        } else {
            greedy
        };

        combine(meaning.trim(), meta.trim())
    }
}

fn combine(meaning: &str, meta: &str) -> String {
    match (meaning.is_empty(), meta.is_empty()) {
        (true, _) => meta.to_string(),
        (_, true) => meaning.to_string(),
        _ => format!("{meaning} [root/prefix/suffix information: {meta}]"),
    }
}

impl Glossary for WordsGlossary {
    fn define(&self, word: &str) -> Result<String> {
        let mut meanings = self.lookup(&[word.to_string()])?;
        Ok(meanings.pop().unwrap_or_default())
    }

    fn define_batch(&self, words: &[String]) -> Result<Vec<String>> {
        self.lookup(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glossary() -> WordsGlossary {
        WordsGlossary::new("meanings".into(), None)
    }

    #[test]
    fn unknown_word_is_empty() {
        let meaning = glossary().parse("xyzzy  ========   UNKNOWN", "xyzzy");
        assert_eq!(meaning, "");
    }

    #[test]
    fn body_of_first_entry() {
        let output = "\
amor, amoris  N (3rd) M   [XXXAO]
love, affection; the beloved;";
        let meaning = glossary().parse(output, "amo");
        assert_eq!(meaning, "love, affection; the beloved;");
    }

    #[test]
    fn greedy_match_on_surface_word() {
        let output = "\
bellus, bella, bellum  ADJ   [XXXBO]
pretty, handsome;
bellum, belli  N (2nd) N   [XXXAX]
war, warfare;";
        let meaning = glossary().parse(output, "bellum");
        assert_eq!(meaning, "war, warfare;");
    }

    #[test]
    fn root_information_is_appended() {
        let output = "\
am.o  V 1 1 PRES ACTIVE IND 1 S
amo, amare, amavi, amatus  V (1st)   [XXXAO]
love, like;";
        let meaning = glossary().parse(output, "amo");
        assert_eq!(
            meaning,
            "love, like; [root/prefix/suffix information: am.o  V 1 1 PRES ACTIVE IND 1 S]"
        );
    }

    #[test]
    fn combine_prefers_present_parts() {
        assert_eq!(combine("", "meta"), "meta");
        assert_eq!(combine("love", ""), "love");
        assert_eq!(combine("", ""), "");
    }

    #[test]
    fn no_glossary_is_aligned() {
        let defs = NoGlossary
            .define_batch(&["amor".to_string(), "bellum".to_string()])
            .unwrap();
        assert_eq!(defs, vec!["", ""]);
    }

    #[cfg(unix)]
    #[test]
    fn lookup_splits_program_output() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("meanings");
        std::fs::write(
            &script,
            "#!/bin/sh\ncat > /dev/null\n\
             printf 'amor, amoris  N   [XXXAO]\\r\\nlove;*\\n\\nbellum, belli  N   [XXXAX]\\nwar;\\n'\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .unwrap();

        let glossary = WordsGlossary::new(
            script.display().to_string(),
            Some(tmp.path().to_path_buf()),
        );
        let defs = glossary
            .define_batch(&["amor".to_string(), "bellum".to_string()])
            .unwrap();
        assert_eq!(defs, vec!["love;", "war;"]);
    }
}
