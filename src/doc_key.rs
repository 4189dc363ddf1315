use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    data_dir::ROOT_BUNDLE,
    error::{Error, Result},
};

/// Identifier of an ingested document.
///
/// Keys name directories under `index/` and files under `sources/`, so they
/// are restricted to ASCII alphanumerics plus `.`, `_` and `-`, and may not
/// collide with the Root Index bundle.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |why: &str| {
            Error::Config(format!("invalid document key {raw:?}: {why}"))
        };

        if raw.is_empty() {
            return Err(invalid("empty"));
        }
        if raw == ROOT_BUNDLE {
            return Err(invalid("reserved for the root index"));
        }
        if raw.starts_with('.') {
            return Err(invalid("must not start with '.'"));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(invalid("only ASCII letters, digits, '.', '_' and '-'"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DocumentKey> for String {
    fn from(key: DocumentKey) -> Self {
        key.0
    }
}

impl std::borrow::Borrow<str> for DocumentKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_perseus_style_ids() {
        let key = DocumentKey::parse("1999.02.0055").unwrap();
        assert_eq!(key.as_str(), "1999.02.0055");
        assert_eq!(key.to_string(), "1999.02.0055");
    }

    #[test]
    fn rejects_root() {
        assert!(DocumentKey::parse("root").is_err());
    }

    #[test]
    fn rejects_path_components() {
        assert!(DocumentKey::parse("").is_err());
        assert!(DocumentKey::parse("../etc").is_err());
        assert!(DocumentKey::parse("a/b").is_err());
        assert!(DocumentKey::parse(".hidden").is_err());
    }

    #[test]
    fn deserializes_through_validation() {
        let key: DocumentKey = serde_json::from_str("\"aeneid\"").unwrap();
        assert_eq!(key.as_str(), "aeneid");
        assert!(serde_json::from_str::<DocumentKey>("\"root\"").is_err());
    }
}
