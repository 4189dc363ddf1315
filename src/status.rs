use std::path::PathBuf;

use serde::Serialize;

use crate::{
    checkpoint::Checkpoint,
    data_dir::DataDir,
    doc_index::DocumentIndex,
    error::Result,
    metadata::DocumentMetadata,
    root_index::{RootIndex, STAT_NUM_LEMMATA},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentStatus {
    pub key: String,
    pub title: Option<String>,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub complete: bool,
    pub distinct_lemmata: usize,
    pub estimated_time_remaining: Option<String>,
    /// Temporary files left by an interrupted save.
    pub pending_temporaries: Vec<PathBuf>,
}

/// Summary of everything under `index/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub data_dir: PathBuf,
    pub sources_present: bool,
    /// `None` when the Root Index could not be read.
    pub lemmata: Option<usize>,
    /// Key scheme recorded by the first indexing run.
    pub key_scheme: Option<String>,
    pub root_pending_temporaries: Vec<PathBuf>,
    pub documents: Vec<DocumentStatus>,
}

impl IndexStatus {
    /// Inspect the indexes without loading anything a pending temporary
    /// file marks as suspect.
    pub fn collect(data_dir: &DataDir) -> Result<Self> {
        let root_ckpt = Checkpoint::<RootIndex>::new(data_dir.root_bundle());
        let root_pending_temporaries = root_ckpt.pending_temporaries();

        let (lemmata, key_scheme) = if root_pending_temporaries.is_empty() {
            let root = root_ckpt.load(false)?;
            let lemmata = root
                .stats
                .get(STAT_NUM_LEMMATA)
                .map_or(root.len(), |n| n as usize);
            let key_scheme = (!root.key_scheme.is_empty()).then_some(root.key_scheme);
            (Some(lemmata), key_scheme)
        } else {
            (None, None)
        };

        let mut documents = Vec::new();
        for key in data_dir.indexed_documents()? {
            let ckpt = Checkpoint::<DocumentIndex>::new(data_dir.document_bundle(&key));
            let pending_temporaries = ckpt.pending_temporaries();
            let progress = if pending_temporaries.is_empty() {
                ckpt.load(false)?.progress
            } else {
                Default::default()
            };

            let title = DocumentMetadata::load(&data_dir.metadata_file(&key))
                .ok()
                .map(|metadata| metadata.title);

            documents.push(DocumentStatus {
                key: key.to_string(),
                title,
                total_chunks: progress.total_chunks,
                completed_chunks: progress.next_chunk(),
                complete: progress.is_complete(),
                distinct_lemmata: progress.distinct_lemmata,
                estimated_time_remaining: progress.estimated_time_remaining,
                pending_temporaries,
            });
        }

        Ok(Self {
            data_dir: data_dir.root().to_path_buf(),
            sources_present: data_dir.sources_dir().is_dir(),
            lemmata,
            key_scheme,
            root_pending_temporaries,
            documents,
        })
    }

    /// Whether any bundle needs operator cleanup before it can be loaded.
    pub fn is_corrupted(&self) -> bool {
        !self.root_pending_temporaries.is_empty()
            || self
                .documents
                .iter()
                .any(|doc| !doc.pending_temporaries.is_empty())
    }

    pub fn print_human(&self) {
        println!("Data directory: {}", self.data_dir.display());
        if !self.sources_present {
            println!("Sources: none acquired yet");
        }
        match self.lemmata {
            Some(lemmata) => println!("Lemmata: {lemmata}"),
            None => println!("Lemmata: unreadable"),
        }
        if let Some(scheme) = &self.key_scheme {
            println!("Key scheme: {scheme}");
        }
        for path in &self.root_pending_temporaries {
            println!("  interrupted save: {}", path.display());
        }

        println!("Documents: {}", self.documents.len());
        for doc in &self.documents {
            let state = if doc.complete {
                "complete".to_string()
            } else {
                let eta = doc.estimated_time_remaining.as_deref().unwrap_or("?");
                format!("{}/{} chunks, eta {eta}", doc.completed_chunks, doc.total_chunks)
            };
            match &doc.title {
                Some(title) => println!("  {}: {title} ({state})", doc.key),
                None => println!("  {}: ({state})", doc.key),
            }
            for path in &doc.pending_temporaries {
                println!("    interrupted save: {}", path.display());
            }
        }
    }
}
