//! End-to-end run: extract labels, plan their slots, compose and write
//!
//! The output document is held in memory for the whole run and written once
//! at the end, so a failed run never leaves a half-composed output behind.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::compositor::PageCompositor;
use crate::config::Config;
use crate::document::{LabelArtifact, OutputDocument, SourceDocument};
use crate::error::Result;
use crate::extractor::{ExtractionReport, LabelExtractor};
use crate::planner::LayoutPlanner;
use crate::workdir::LabelDir;

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Absent when labels came from a directory instead of a source PDF
    pub report: Option<ExtractionReport>,
    /// Labels placed on the output
    pub artifacts: usize,
    /// Output page count
    pub pages: usize,
    pub output: Option<PathBuf>,
}

pub struct LabelPipeline {
    config: Config,
}

impl LabelPipeline {
    /// Validates the configuration before anything is opened
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract and compose using the configured paths
    pub fn run(&self) -> Result<RunSummary> {
        let paths = &self.config.paths;
        self.run_with(&paths.input, &paths.output, paths.labels_dir.as_deref())
    }

    /// Extract from `input` and compose into `output`, persisting each label
    /// into `labels_dir` when given
    #[instrument(skip(self), fields(input = %input.display(), output = %output.display()))]
    pub fn run_with(
        &self,
        input: &Path,
        output: &Path,
        labels_dir: Option<&Path>,
    ) -> Result<RunSummary> {
        let source = SourceDocument::open(input)?;
        let dir = labels_dir.map(LabelDir::prepare).transpose()?;
        let extractor = LabelExtractor::new(&self.config.source);

        let mut extraction = extractor.extract(&source);
        let labels = extraction.by_ref().enumerate().map(|(i, artifact)| {
            let artifact = artifact?;
            if let Some(dir) = &dir {
                dir.save(i + 1, &artifact)?;
            }
            Ok(artifact)
        });
        let (document, placed) = self.compose(labels)?;
        let report = extraction.report();

        document.write(output)?;
        let summary = RunSummary {
            report: Some(report),
            artifacts: placed,
            pages: document.page_count(),
            output: Some(output.to_path_buf()),
        };
        info!(
            "Wrote {} labels on {} pages to {}",
            summary.artifacts,
            summary.pages,
            output.display()
        );
        Ok(summary)
    }

    /// First stage only: save every label of `input` into `dir`
    #[instrument(skip(self), fields(input = %input.display(), dir = %dir.display()))]
    pub fn extract_to_dir(&self, input: &Path, dir: &Path) -> Result<RunSummary> {
        let source = SourceDocument::open(input)?;
        let dir = LabelDir::prepare(dir)?;
        let extractor = LabelExtractor::new(&self.config.source);

        let mut extraction = extractor.extract(&source);
        let mut saved = 0;
        for artifact in extraction.by_ref() {
            saved += 1;
            dir.save(saved, &artifact?)?;
        }
        info!("Saved {} labels to {}", saved, dir.path().display());
        Ok(RunSummary {
            report: Some(extraction.report()),
            artifacts: saved,
            pages: 0,
            output: None,
        })
    }

    /// Second stage only: compose the labels saved in `dir` into `output`
    #[instrument(skip(self), fields(dir = %dir.display(), output = %output.display()))]
    pub fn compose_dir(&self, dir: &Path, output: &Path) -> Result<RunSummary> {
        let dir = LabelDir::open(dir)?;
        let (document, placed) = self.compose(dir.load_all()?)?;
        document.write(output)?;
        info!(
            "Wrote {} labels on {} pages to {}",
            placed,
            document.page_count(),
            output.display()
        );
        Ok(RunSummary {
            report: None,
            artifacts: placed,
            pages: document.page_count(),
            output: Some(output.to_path_buf()),
        })
    }

    /// Place `artifacts` in order onto a new output document.
    ///
    /// One label is held back so the planner knows whether another follows
    /// when a page fills up. Returns the document and the number placed.
    pub fn compose<I>(&self, artifacts: I) -> Result<(OutputDocument, usize)>
    where
        I: IntoIterator<Item = Result<LabelArtifact>>,
    {
        let layout = &self.config.layout;
        let mut planner = LayoutPlanner::new(layout)?;
        let compositor = PageCompositor::from_layout(layout)?;
        let mut output = OutputDocument::new(layout.page);

        let mut artifacts = artifacts.into_iter();
        let mut pending = artifacts.next().transpose()?;
        while let Some(artifact) = pending.take() {
            pending = artifacts.next().transpose()?;
            let placement = planner.assign(pending.is_some());
            compositor.place(artifact, &placement.slot, &mut output)?;
            if placement.append_page {
                output.append_blank_page();
            }
        }

        if planner.placed() == 0 {
            warn!("No labels found, output has a single blank page");
        }
        Ok((output, planner.placed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::test_support::{build_pdf, Text};
    use crate::error::LabelGridError;
    use crate::geometry::PageSize;
    use pretty_assertions::assert_eq;

    const W: f64 = 841.8898;
    const H: f64 = 595.2756;

    fn labels(count: usize) -> Vec<Result<LabelArtifact>> {
        let pdf = build_pdf(&[(W, H, vec![Text(50.0, 400.0, "NF: 1")])]);
        let source = SourceDocument::from_bytes(&pdf).unwrap();
        let region = Config::default().source.templates[0];
        (0..count).map(|_| source.crop_page(0, &region)).collect()
    }

    fn layers_per_page(document: &OutputDocument) -> Vec<usize> {
        document.pages().iter().map(|p| p.layers().len()).collect()
    }

    #[test]
    fn test_compose_fills_pages_in_order() {
        let pipeline = LabelPipeline::new(Config::default()).unwrap();
        let (document, placed) = pipeline.compose(labels(9)).unwrap();
        assert_eq!(placed, 9);
        assert_eq!(layers_per_page(&document), vec![4, 4, 1]);
        assert_eq!(document.page_size(), PageSize::new(595.0, 842.0));
    }

    #[test]
    fn test_compose_exact_multiple_leaves_no_blank_page() {
        let pipeline = LabelPipeline::new(Config::default()).unwrap();
        let (document, _) = pipeline.compose(labels(8)).unwrap();
        assert_eq!(layers_per_page(&document), vec![4, 4]);
    }

    #[test]
    fn test_compose_nothing_gives_one_blank_page() {
        let pipeline = LabelPipeline::new(Config::default()).unwrap();
        let (document, placed) = pipeline.compose(Vec::new()).unwrap();
        assert_eq!(placed, 0);
        assert_eq!(layers_per_page(&document), vec![0]);
    }

    #[test]
    fn test_compose_stops_on_first_error() {
        let pipeline = LabelPipeline::new(Config::default()).unwrap();
        let mut stream = labels(2);
        stream.insert(1, Err(LabelGridError::ParseError("bad label".into())));
        assert!(matches!(
            pipeline.compose(stream),
            Err(LabelGridError::ParseError(_))
        ));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = Config::default();
        config.source.templates.clear();
        assert!(matches!(
            LabelPipeline::new(config),
            Err(LabelGridError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_input_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = LabelPipeline::new(Config::default()).unwrap();
        let output = tmp.path().join("final.pdf");
        let err = pipeline
            .run_with(&tmp.path().join("missing.pdf"), &output, None)
            .unwrap_err();
        assert!(matches!(err, LabelGridError::NotFound(_)));
        assert!(!output.exists());
    }
}
