use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::metadata::DocumentMetadata;

/// Characters escaped in a citation before it is spliced into a URL.
const CITATION: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b':');

/// Builds a link to the quoted passage of a document.
pub trait CitationUrl: Send + Sync {
    fn build_url(&self, metadata: &DocumentMetadata, citation: &str) -> String;
}

/// Links into the Perseus digital library reader.
#[derive(Debug, Clone)]
pub struct PerseusUrl {
    base: String,
}

impl Default for PerseusUrl {
    fn default() -> Self {
        Self::new("https://www.perseus.tufts.edu/hopper/text")
    }
}

impl PerseusUrl {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl CitationUrl for PerseusUrl {
    fn build_url(&self, metadata: &DocumentMetadata, citation: &str) -> String {
        let encoded = utf8_percent_encode(citation, CITATION).to_string();
        let doc = match &metadata.schema {
            Some(schema) => schema.replacen("{}", &encoded, 1),
            None => encoded,
        };

        match &metadata.text_id {
            Some(text_id) => {
                format!("{}?doc={doc}&fromdoc=Perseus:text:{text_id}", self.base)
            }
            None => format!("{}?doc={doc}", self.base),
        }
    }
}
