//! Selector queries over rendered markup
//!
//! Holds the current document as one or more parsed fragments (the initial
//! page plus whatever pagination appended), each tagged with the URL it was
//! served from, and answers [`DocumentQuery`] calls with `scraper`.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::session::{DocumentQuery, SessionError};

/// One parsed page and the URL it came from
#[derive(Debug, Clone)]
struct Fragment {
    url: Option<Url>,
    html: Html,
}

impl Fragment {
    fn parse(url: &str, markup: &str) -> Self {
        Self {
            url: Url::parse(url).ok(),
            html: Html::parse_document(markup),
        }
    }

    /// Resolve a possibly relative link against this fragment's URL
    fn resolve(&self, link: &str) -> Option<String> {
        let link = link.trim();
        if link.is_empty() {
            return None;
        }
        match &self.url {
            Some(base) => base.join(link).ok().map(String::from),
            None => Url::parse(link).ok().map(String::from),
        }
    }
}

/// Markup of one loaded document
///
/// Fragments are parsed once, when they are loaded or appended.
#[derive(Debug, Clone, Default)]
pub struct HtmlDocument {
    url: Option<String>,
    fragments: Vec<Fragment>,
}

impl HtmlDocument {
    /// Start a new document from the markup served at `url`
    pub fn loaded(url: &str, markup: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            fragments: vec![Fragment::parse(url, markup)],
        }
    }

    /// Append content revealed by pagination, served from `url`
    pub fn append(&mut self, url: &str, markup: &str) {
        self.fragments.push(Fragment::parse(url, markup));
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.url.is_some()
    }

    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    fn compile(selector: &str) -> Result<Selector, SessionError> {
        Selector::parse(selector).map_err(|e| SessionError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })
    }

    fn ensure_loaded(&self) -> Result<(), SessionError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(SessionError::NoDocument)
        }
    }

    /// Visit matches across all fragments in document order until `visit` returns `Some`
    fn find_map<T>(
        &self,
        selector: &str,
        mut visit: impl FnMut(ElementRef<'_>) -> Option<T>,
    ) -> Result<Option<T>, SessionError> {
        self.ensure_loaded()?;
        let selector = Self::compile(selector)?;
        Ok(self
            .fragments
            .iter()
            .find_map(|fragment| fragment.html.select(&selector).find_map(&mut visit)))
    }
}

/// Text content of an element, like the DOM's `textContent`
fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

impl DocumentQuery for HtmlDocument {
    fn select_text(&self, selector: &str) -> Result<Option<String>, SessionError> {
        self.find_map(selector, |element| Some(element_text(element)))
    }

    fn select_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, SessionError> {
        // Only the first match counts; a first match without the attribute is a miss.
        let mut first_seen = false;
        self.find_map(selector, |element| {
            if first_seen {
                return None;
            }
            first_seen = true;
            element.value().attr(attribute).map(str::to_string)
        })
    }

    fn select_all_attributes(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.ensure_loaded()?;
        let selector = Self::compile(selector)?;
        Ok(self
            .fragments
            .iter()
            .flat_map(|fragment| {
                fragment
                    .html
                    .select(&selector)
                    .filter_map(|element| element.value().attr(attribute).map(str::to_string))
            })
            .collect())
    }

    fn select_all_links(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.ensure_loaded()?;
        let selector = Self::compile(selector)?;
        Ok(self
            .fragments
            .iter()
            .flat_map(|fragment| {
                fragment.html.select(&selector).filter_map(move |element| {
                    element
                        .value()
                        .attr(attribute)
                        .and_then(|link| fragment.resolve(link))
                })
            })
            .collect())
    }
}
