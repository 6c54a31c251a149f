//! Item references and the persisted URL list
//!
//! The URL list is a plain-text file, one absolute URL per line. It is the
//! hand-off between discovery and extraction.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use super::DomainError;

/// One discovered item, consumed exactly once by a worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemReference {
    pub sequence_index: usize,
    pub url: String,
}

impl ItemReference {
    /// Create a reference, rejecting anything that is not an absolute http(s) URL
    pub fn new(sequence_index: usize, url: &str) -> Result<Self, DomainError> {
        let url = url.trim();
        if !is_absolute_http_url(url) {
            return Err(DomainError::InvalidUrl {
                url: url.to_string(),
                line: None,
            });
        }
        Ok(Self {
            sequence_index,
            url: url.to_string(),
        })
    }

    /// Record identifier derived from the sequence index (1-based)
    #[must_use]
    pub fn record_id(&self) -> String {
        (self.sequence_index + 1).to_string()
    }
}

/// Returns true for absolute `http`/`https` URLs with a host
#[must_use]
pub fn is_absolute_http_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

/// Number a list of URLs from zero
pub fn references_from_urls<I, S>(urls: I) -> Result<Vec<ItemReference>, DomainError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .enumerate()
        .map(|(index, url)| ItemReference::new(index, url.as_ref()))
        .collect()
}

/// Parse URL-list text. Blank lines are skipped; numbering follows the remaining lines.
pub fn parse_url_list(content: &str) -> Result<Vec<ItemReference>, DomainError> {
    let mut items = Vec::new();
    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !is_absolute_http_url(line) {
            return Err(DomainError::InvalidUrl {
                url: line.to_string(),
                line: Some(line_number + 1),
            });
        }
        items.push(ItemReference {
            sequence_index: items.len(),
            url: line.to_string(),
        });
    }
    Ok(items)
}

/// Render references back to URL-list text
#[must_use]
pub fn render_url_list(items: &[ItemReference]) -> String {
    let mut content = String::new();
    for item in items {
        content.push_str(&item.url);
        content.push('\n');
    }
    content
}

/// Read a URL list from disk
pub fn load_url_list(path: &Path) -> Result<Vec<ItemReference>, DomainError> {
    let content = std::fs::read_to_string(path).map_err(|e| DomainError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_url_list(&content)
}
