use std::path::{Path, PathBuf};

use crate::{
    doc_key::DocumentKey,
    error::{Error, Result},
};

pub const DATA_DIR_ENV_VAR: &str = "AVENTINE_DATA_DIR";

/// Name of the Root Index bundle directory inside `index/`.
pub const ROOT_BUNDLE: &str = "root";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The AVENTINE_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/aventine/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("aventine")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    /// Directory holding document texts; its absence means nothing has been
    /// acquired yet.
    pub fn sources_dir(&self) -> PathBuf {
        self.root.join("sources")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.sources_dir().join("metadata")
    }

    pub fn metadata_file(&self, key: &DocumentKey) -> PathBuf {
        self.metadata_dir().join(format!("{key}.json"))
    }

    pub fn text_file(&self, key: &DocumentKey) -> PathBuf {
        self.sources_dir().join(format!("{key}.txt"))
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    pub fn root_bundle(&self) -> PathBuf {
        self.index_dir().join(ROOT_BUNDLE)
    }

    pub fn document_bundle(&self, key: &DocumentKey) -> PathBuf {
        self.index_dir().join(key.as_str())
    }

    /// Document-scoped word vectors, e.g. trained on the exported
    /// lemmatised text of that document.
    pub fn scope_vectors(&self, key: &DocumentKey) -> PathBuf {
        self.document_bundle(key).join("vectors.vec")
    }

    /// Keys of every document bundle under `index/`, sorted.
    pub fn indexed_documents(&self) -> Result<Vec<DocumentKey>> {
        let index_dir = self.index_dir();
        if !index_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&index_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == ROOT_BUNDLE {
                continue;
            }
            match DocumentKey::parse(&name) {
                Ok(key) => keys.push(key),
                Err(e) => {
                    tracing::warn!("skipping index directory {name}: {e}")
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
