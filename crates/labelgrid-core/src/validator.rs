//! Label validation
//!
//! A region is a label when its sheet has exactly the expected size and the
//! text inside the region contains one of the marker strings. The two checks
//! are separate pure predicates; [`LabelValidator`] composes them.

use tracing::warn;

use crate::config::SourceConfig;
use crate::document::SourcePage;
use crate::geometry::{PageSize, Rect};
use crate::probe::{ContentStreamProbe, TextProbe};

/// Strict size check, no tolerance
pub fn dimensions_match(expected: &PageSize, actual: &PageSize) -> bool {
    expected.matches(actual)
}

/// Case-insensitive substring match against any non-blank marker
pub fn contains_marker<S: AsRef<str>>(text: &str, markers: &[S]) -> bool {
    let haystack = text.to_lowercase();
    markers
        .iter()
        .map(|m| m.as_ref().trim())
        .filter(|m| !m.is_empty())
        .any(|m| haystack.contains(&m.to_lowercase()))
}

pub struct LabelValidator<P = ContentStreamProbe> {
    sheet: PageSize,
    markers: Vec<String>,
    probe: P,
}

impl LabelValidator<ContentStreamProbe> {
    pub fn new(source: &SourceConfig) -> Self {
        Self::with_probe(source, ContentStreamProbe::default())
    }
}

impl<P: TextProbe> LabelValidator<P> {
    pub fn with_probe(source: &SourceConfig, probe: P) -> Self {
        Self {
            sheet: source.sheet,
            markers: source.markers.clone(),
            probe,
        }
    }

    /// The page is a label sheet. Unreadable dimensions count as a mismatch.
    pub fn sheet_matches(&self, page: &SourcePage<'_>) -> bool {
        match page.size() {
            Ok(size) => dimensions_match(&self.sheet, &size),
            Err(e) => {
                warn!("Cannot read size of page {}: {}", page.index() + 1, e);
                false
            }
        }
    }

    /// The region holds at least one marker string
    pub fn region_has_marker(&self, page: &SourcePage<'_>, region: &Rect) -> bool {
        let text = self.probe.extract_text(page, region);
        contains_marker(&text, &self.markers)
    }

    /// Full decision for one candidate region
    pub fn validate(&self, page: &SourcePage<'_>, region: &Rect) -> bool {
        self.sheet_matches(page) && self.region_has_marker(page, region)
    }
}
