//! Shipping label extraction and sheet composition
//!
//! Source PDFs carry several labels side by side on each landscape sheet.
//! This crate finds them (fixed template regions that contain a marker such
//! as `NF:`), crops each one into its own single-page PDF, and lays them out
//! scaled down in a fixed grid of slots on portrait output pages.
//!
//! - [`LabelExtractor`]: lazy stream of labels in page × template order
//! - [`LayoutPlanner`]: page and slot for each label, with per-page overrides
//! - [`PageCompositor`]: draws a label onto its output page
//! - [`LabelPipeline`]: the whole run, configured by [`Config`]

pub mod compositor;
pub mod config;
pub mod document;
pub mod error;
pub mod extractor;
pub mod font;
pub mod geometry;
pub mod pipeline;
pub mod planner;
pub mod probe;
pub mod validator;
pub mod workdir;

pub use compositor::PageCompositor;
pub use config::{Config, LayoutConfig, PageOverride, PathsConfig, SourceConfig};
pub use document::{LabelArtifact, OutputDocument, OutputPage, SourceDocument, SourcePage};
pub use error::{LabelGridError, Result};
pub use extractor::{ExtractionReport, LabelExtractor};
pub use font::{FontDecoder, ToUnicodeMap};
pub use geometry::{Affine, PageSize, Rect, SlotOffset};
pub use pipeline::{LabelPipeline, RunSummary};
pub use planner::{LayoutPlanner, Placement, PlacementSlot};
pub use probe::{ContentStreamProbe, TextProbe};
pub use validator::LabelValidator;
pub use workdir::LabelDir;
