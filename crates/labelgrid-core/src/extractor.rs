//! Label extraction
//!
//! Walks the source pages in order and, on every sheet of the expected size,
//! every template region in order. Regions that pass validation are cropped
//! into [`LabelArtifact`]s. Emission order is page order × template order.
//!
//! Wrong-size sheets and regions without a marker are not errors; they are
//! skipped and counted in the [`ExtractionReport`].

use serde::Serialize;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::document::{ArtifactOrigin, LabelArtifact, SourceDocument};
use crate::error::Result;
use crate::geometry::Rect;
use crate::probe::{ContentStreamProbe, TextProbe};
use crate::validator::LabelValidator;

/// What happened to the candidates of one extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub sheets_seen: usize,
    /// Pages skipped because their size did not match
    pub sheets_skipped: usize,
    /// Template regions examined on matching sheets
    pub candidates: usize,
    pub accepted: usize,
    /// Regions whose text held no marker
    pub rejected: usize,
}

pub struct LabelExtractor<P = ContentStreamProbe> {
    templates: Vec<Rect>,
    validator: LabelValidator<P>,
}

impl LabelExtractor<ContentStreamProbe> {
    pub fn new(source: &SourceConfig) -> Self {
        Self::with_probe(source, ContentStreamProbe::default())
    }
}

impl<P: TextProbe> LabelExtractor<P> {
    pub fn with_probe(source: &SourceConfig, probe: P) -> Self {
        Self {
            templates: source.templates.clone(),
            validator: LabelValidator::with_probe(source, probe),
        }
    }

    /// Lazy, single-pass extraction over `source`
    pub fn extract<'a>(&'a self, source: &'a SourceDocument) -> Extraction<'a, P> {
        info!(
            "Scanning {} pages with {} templates",
            source.page_count(),
            self.templates.len()
        );
        Extraction {
            extractor: self,
            source,
            page: 0,
            template: 0,
            report: ExtractionReport::default(),
        }
    }

    /// Eager extraction: all artifacts plus the final report
    pub fn extract_all(
        &self,
        source: &SourceDocument,
    ) -> Result<(Vec<LabelArtifact>, ExtractionReport)> {
        let mut extraction = self.extract(source);
        let artifacts = extraction.by_ref().collect::<Result<Vec<_>>>()?;
        Ok((artifacts, extraction.report()))
    }
}

/// Iterator of extracted labels. Ends when the source is exhausted.
pub struct Extraction<'a, P> {
    extractor: &'a LabelExtractor<P>,
    source: &'a SourceDocument,
    page: usize,
    /// Next template on the current page; 0 means the sheet is not checked yet
    template: usize,
    report: ExtractionReport,
}

impl<P> Extraction<'_, P> {
    /// Counters so far; final once the iterator returned `None`
    pub fn report(&self) -> ExtractionReport {
        self.report
    }

    fn next_page(&mut self) {
        self.page += 1;
        self.template = 0;
    }
}

impl<P: TextProbe> Iterator for Extraction<'_, P> {
    type Item = Result<LabelArtifact>;

    fn next(&mut self) -> Option<Self::Item> {
        let extractor = self.extractor;
        let source = self.source;
        let templates = &extractor.templates;
        let validator = &extractor.validator;

        loop {
            let Some(page) = source.page(self.page) else {
                if self.page == source.page_count() {
                    // Log once, then stay exhausted
                    self.page += 1;
                    let r = &self.report;
                    info!(
                        "Extraction done: {} labels from {} sheets ({} skipped, {} rejected)",
                        r.accepted, r.sheets_seen, r.sheets_skipped, r.rejected
                    );
                }
                return None;
            };

            if self.template == 0 {
                self.report.sheets_seen += 1;
                if !validator.sheet_matches(&page) {
                    debug!("Page {}: not a label sheet, skipping", self.page + 1);
                    self.report.sheets_skipped += 1;
                    self.next_page();
                    continue;
                }
            }

            let Some(region) = templates.get(self.template) else {
                self.next_page();
                continue;
            };
            let origin = ArtifactOrigin {
                sheet: self.page,
                template: self.template,
            };
            self.template += 1;
            self.report.candidates += 1;

            if !validator.region_has_marker(&page, region) {
                debug!(
                    "Page {} region {} {}: no marker text, discarded",
                    origin.sheet + 1,
                    origin.template,
                    region
                );
                self.report.rejected += 1;
                continue;
            }

            self.report.accepted += 1;
            debug!(
                "Page {} region {}: label {}",
                origin.sheet + 1,
                origin.template,
                self.report.accepted
            );
            return Some(
                source
                    .crop_page(origin.sheet, region)
                    .map(|artifact| artifact.with_origin(origin)),
            );
        }
    }
}
