//! Typed installation settings.
//!
//! Values come from the environment first, then from the settings table of
//! [`ConfigDb`], then from built-in defaults.

use std::path::PathBuf;

use crate::{
    config_db::ConfigDb,
    error::{Error, Result},
    lexicon::KeyScheme,
};

pub const KEY_SCHEME: &str = "key_scheme";
pub const ANNOTATOR: &str = "annotator";
pub const GLOSSARY: &str = "glossary";
pub const GLOSSARY_DIR: &str = "glossary_dir";
pub const SOURCE_VECTORS: &str = "source_vectors";
pub const DIMENSION: &str = "dimension";

/// Every setting understood by the crate.
pub const KNOWN_SETTINGS: &[&str] = &[
    KEY_SCHEME,
    ANNOTATOR,
    GLOSSARY,
    GLOSSARY_DIR,
    SOURCE_VECTORS,
    DIMENSION,
];

pub const DEFAULT_DIMENSION: usize = 64;

/// Environment variable overriding a setting, e.g. `AVENTINE_KEY_SCHEME`.
pub fn env_var_name(setting: &str) -> String {
    format!("AVENTINE_{}", setting.to_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub key_scheme: KeyScheme,
    /// External annotation command line.
    pub annotator: Option<String>,
    /// External dictionary program.
    pub glossary: Option<String>,
    pub glossary_dir: Option<PathBuf>,
    /// Word-vector file for source-language lemmata.
    pub source_vectors: Option<PathBuf>,
    pub dimension: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key_scheme: KeyScheme::default(),
            annotator: None,
            glossary: None,
            glossary_dir: None,
            source_vectors: None,
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl Settings {
    /// Resolve settings from the process environment and the database.
    pub fn load(db: &ConfigDb) -> Result<Self> {
        Self::resolve(|name| std::env::var(env_var_name(name)).ok(), db)
    }

    /// Resolve settings, consulting `env` before the database.
    pub fn resolve<F>(env: F, db: &ConfigDb) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| -> Result<Option<String>> {
            match env(name).filter(|value| !value.is_empty()) {
                Some(value) => Ok(Some(value)),
                None => db.get_setting(name),
            }
        };

        let mut settings = Self::default();
        if let Some(value) = lookup(KEY_SCHEME)? {
            settings.key_scheme = value.parse()?;
        }
        if let Some(value) = lookup(DIMENSION)? {
            settings.dimension = parse_dimension(&value)?;
        }
        settings.annotator = lookup(ANNOTATOR)?;
        settings.glossary = lookup(GLOSSARY)?;
        settings.glossary_dir = lookup(GLOSSARY_DIR)?.map(PathBuf::from);
        settings.source_vectors = lookup(SOURCE_VECTORS)?.map(PathBuf::from);
        Ok(settings)
    }

    /// Check a value before it is stored under `name`.
    pub fn validate(name: &str, value: &str) -> Result<()> {
        match name {
            KEY_SCHEME => value.parse::<KeyScheme>().map(|_| ()),
            DIMENSION => parse_dimension(value).map(|_| ()),
            ANNOTATOR | GLOSSARY if value.trim().is_empty() => Err(
                Error::Config(format!("'{name}' needs a command")),
            ),
            _ if KNOWN_SETTINGS.contains(&name) => Ok(()),
            _ => Err(Error::Config(format!(
                "unknown setting '{name}' (known: {})",
                KNOWN_SETTINGS.join(", ")
            ))),
        }
    }
}

fn parse_dimension(value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(dimension) if dimension > 0 => Ok(dimension),
        _ => Err(Error::Config(format!(
            "dimension must be a positive integer, got '{value}'"
        ))),
    }
}
