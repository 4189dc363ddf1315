//! External collaborators consumed by the pipeline and the engine.
//!
//! The core never tokenizes, tags or embeds on its own; it calls these
//! providers and persists or ranks what they return. Providers are
//! constructed explicitly and injected, so tests can substitute
//! deterministic ones.

use std::{
    io::Write,
    path::Path,
    process::{Command, Stdio},
};

use crate::{
    annotator::{Annotator, CommandAnnotator, PlainAnnotator},
    citation::{CitationUrl, PerseusUrl},
    error::{Error, Result},
    glossary::{Glossary, NoGlossary, WordsGlossary},
    settings::Settings,
    vectors::{HashingEmbedder, SourceEmbedder, TargetEmbedder, WordVectors},
};

/// The full set of collaborators, shared by indexing and search.
pub struct Providers {
    pub annotator: Box<dyn Annotator>,
    pub source: Box<dyn SourceEmbedder>,
    pub target: Box<dyn TargetEmbedder>,
    pub glossary: Box<dyn Glossary>,
    pub citations: Box<dyn CitationUrl>,
}

impl Providers {
    /// Instantiate the providers named by the settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let annotator: Box<dyn Annotator> = match &settings.annotator {
            Some(command) => {
                tracing::debug!("annotating with external command {command:?}");
                Box::new(CommandAnnotator::from_command_line(command)?)
            }
            None => Box::new(PlainAnnotator),
        };

        let source: Box<dyn SourceEmbedder> = match &settings.source_vectors {
            Some(path) => {
                tracing::info!("loading word vectors from {}", path.display());
                Box::new(WordVectors::load(path)?)
            }
            None => Box::new(HashingEmbedder::new(settings.dimension)),
        };

        let glossary: Box<dyn Glossary> = match &settings.glossary {
            Some(program) => Box::new(WordsGlossary::new(
                program.clone(),
                settings.glossary_dir.clone(),
            )),
            None => Box::new(NoGlossary),
        };

        Ok(Self {
            annotator,
            source,
            target: Box::new(HashingEmbedder::new(settings.dimension)),
            glossary,
            citations: Box::new(PerseusUrl::default()),
        })
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("source_dimension", &self.source.dimension())
            .field("target_dimension", &self.target.dimension())
            .finish_non_exhaustive()
    }
}

/// Run an external program, feed it `input` on stdin and return its stdout.
pub(crate) fn run_command(
    provider: &'static str,
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    input: &str,
) -> Result<String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| {
        Error::provider(provider, format!("cannot start {program}: {e}"))
    })?;

    let mut stdin = child.stdin.take().ok_or_else(|| {
        Error::provider(provider, format!("{program} has no stdin"))
    })?;
    let input = input.to_string();
    // Feed stdin from another thread so a chatty child cannot fill its
    // stdout pipe while we are still writing.
    let feeder = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

    let output = child.wait_with_output()?;
    let fed = feeder.join().map_err(|_| {
        Error::provider(provider, format!("stdin writer for {program} panicked"))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::provider(
            provider,
            format!("{program} exited with {}: {}", output.status, stderr.trim()),
        ));
    }
    if let Err(e) = fed {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(Error::provider(
                provider,
                format!("writing to {program}: {e}"),
            ));
        }
    }

    String::from_utf8(output.stdout).map_err(|e| {
        Error::provider(provider, format!("{program} wrote invalid UTF-8: {e}"))
    })
}
