//! Configuration for extraction and layout
//!
//! Loaded from a TOML file. Every field has a default matching the
//! three-labels-per-A4-landscape sheet imposed four-up on A4 portrait, so an
//! empty file is a working configuration.
//!
//! ```toml
//! [paths]
//! input = "in.pdf"
//! output = "final.pdf"
//! labels_dir = "labels/"
//!
//! [source]
//! sheet = { width = 841.8898, height = 595.2756 }
//! templates = [[27, 143, 290, 570], [292, 143, 555, 570], [557, 143, 820, 570]]
//! markers = ["NF:", "NFe:", "JADLEVE"]
//!
//! [layout]
//! page = { width = 595, height = 842 }
//! scale = 0.91
//! slots = [
//!     { tx = 10, ty = 445 },
//!     { tx = 345, ty = 445 },
//!     { tx = 10, ty = 10 },
//!     { tx = 345, ty = 10 },
//! ]
//! slots_per_page = 4
//!
//! [[layout.overrides]]
//! page = 0
//! slots = [1, 3]
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LabelGridError, Result};
use crate::geometry::{PageSize, Rect, SlotOffset};

/// Width of one label column on the source sheet
const LABEL_PITCH: f64 = 265.0;

/// Main configuration structure loaded from TOML files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string and validate it
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(s).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could only fail mid-run
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        self.layout.validate()
    }
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_input")]
    pub input: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Where extracted labels are persisted; `None` keeps them in memory only
    #[serde(default)]
    pub labels_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            labels_dir: None,
        }
    }
}

fn default_input() -> PathBuf {
    PathBuf::from("in.pdf")
}

fn default_output() -> PathBuf {
    PathBuf::from("final.pdf")
}

/// What a label-bearing source sheet looks like
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Only sheets of exactly this size are scanned
    #[serde(default = "default_sheet")]
    pub sheet: PageSize,
    /// Label regions on a sheet, in emission order
    #[serde(default = "default_templates")]
    pub templates: Vec<Rect>,
    /// A region is a label if its text contains one of these (case-insensitive)
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sheet: default_sheet(),
            templates: default_templates(),
            markers: default_markers(),
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.sheet.is_valid() {
            return Err(invalid(format!("sheet size {} must be positive", self.sheet)));
        }
        if self.templates.is_empty() {
            return Err(invalid("at least one label template is required"));
        }
        // Rect construction already enforces positive area; this catches
        // templates that do not fit on the sheet at all.
        for (i, template) in self.templates.iter().enumerate() {
            if template.x0() >= self.sheet.width || template.y0() >= self.sheet.height {
                return Err(invalid(format!(
                    "template {} {} lies outside the {} sheet",
                    i, template, self.sheet
                )));
            }
        }
        if self.markers.iter().all(|m| m.trim().is_empty()) {
            return Err(invalid("at least one non-empty marker string is required"));
        }
        Ok(())
    }
}

fn default_sheet() -> PageSize {
    PageSize::new(841.8898, 595.2756)
}

fn default_templates() -> Vec<Rect> {
    (0..3)
        .map(|i| {
            let shift = LABEL_PITCH * i as f64;
            Rect::try_from([27.0 + shift, 143.0, 290.0 + shift, 570.0])
        })
        .collect::<Result<Vec<_>>>()
        .unwrap_or_default()
}

fn default_markers() -> Vec<String> {
    vec!["NF:".to_string(), "NFe:".to_string(), "JADLEVE".to_string()]
}

/// How labels are imposed on output pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Size of every output page
    #[serde(default = "default_page")]
    pub page: PageSize,
    /// Uniform scale applied to each label before translation
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Slot offsets, filled in order unless a page override applies
    #[serde(default = "default_slots")]
    pub slots: Vec<SlotOffset>,
    /// Defaults to the number of slots
    #[serde(default)]
    pub slots_per_page: Option<usize>,
    #[serde(default)]
    pub overrides: Vec<PageOverride>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page: default_page(),
            scale: default_scale(),
            slots: default_slots(),
            slots_per_page: None,
            overrides: Vec::new(),
        }
    }
}

impl LayoutConfig {
    /// Labels per page when no override applies
    pub fn capacity(&self) -> usize {
        self.slots_per_page.unwrap_or(self.slots.len())
    }

    /// Overrides keyed by page index
    pub fn override_map(&self) -> BTreeMap<usize, Vec<usize>> {
        self.overrides
            .iter()
            .map(|o| (o.page, o.slots.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.page.is_valid() {
            return Err(invalid(format!("page size {} must be positive", self.page)));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(invalid(format!("scale {} must be positive", self.scale)));
        }
        if self.slots.is_empty() {
            return Err(invalid("at least one slot is required"));
        }
        if self
            .slots
            .iter()
            .any(|s| !s.tx.is_finite() || !s.ty.is_finite())
        {
            return Err(invalid("slot offsets must be finite"));
        }
        let capacity = self.capacity();
        if capacity == 0 || capacity > self.slots.len() {
            return Err(invalid(format!(
                "slots_per_page {} must be between 1 and {}",
                capacity,
                self.slots.len()
            )));
        }

        let mut pages = HashSet::new();
        for o in &self.overrides {
            if !pages.insert(o.page) {
                return Err(invalid(format!("page {} has more than one override", o.page)));
            }
            if o.slots.is_empty() {
                return Err(invalid(format!("override for page {} is empty", o.page)));
            }
            let mut seen = HashSet::new();
            for &slot in &o.slots {
                if slot >= self.slots.len() {
                    return Err(invalid(format!(
                        "override for page {} uses slot {} but only {} slots exist",
                        o.page,
                        slot,
                        self.slots.len()
                    )));
                }
                if !seen.insert(slot) {
                    return Err(invalid(format!(
                        "override for page {} repeats slot {}",
                        o.page, slot
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Slot indices to fill, in order, on one specific output page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOverride {
    pub page: usize,
    pub slots: Vec<usize>,
}

fn default_page() -> PageSize {
    PageSize::new(595.0, 842.0)
}

fn default_scale() -> f64 {
    0.91
}

fn default_slots() -> Vec<SlotOffset> {
    vec![
        SlotOffset::new(10.0, 445.0),
        SlotOffset::new(345.0, 445.0),
        SlotOffset::new(10.0, 10.0),
        SlotOffset::new(345.0, 10.0),
    ]
}

fn invalid(msg: impl Into<String>) -> LabelGridError {
    LabelGridError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Affine;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.source.templates.len(), 3);
        assert_eq!(config.source.templates[1].x0(), 292.0);
        assert_eq!(config.source.templates[2].x1(), 820.0);
        assert_eq!(config.layout.capacity(), 4);
        assert_eq!(config.layout.scale, 0.91);
        assert_eq!(config.paths.input, PathBuf::from("in.pdf"));
        assert!(config.layout.overrides.is_empty());
        assert!(config.paths.labels_dir.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [paths]
            input = "sheets.pdf"
            output = "out.pdf"

            [source]
            sheet = { width = 800, height = 600 }
            templates = [[0, 0, 400, 600], [400, 0, 800, 600]]
            markers = ["TRACKING"]

            [layout]
            page = { width = 600, height = 800 }
            scale = 0.5
            slots = [{ tx = 0, ty = 400 }, { tx = 300, ty = 400 }, { tx = 0, ty = 0 }]
            slots_per_page = 2

            [[layout.overrides]]
            page = 1
            slots = [2]
        "#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.source.templates.len(), 2);
        assert_eq!(config.layout.capacity(), 2);
        assert_eq!(config.layout.override_map().get(&1), Some(&vec![2]));
        assert_eq!(config.paths.output, PathBuf::from("out.pdf"));
    }

    #[test]
    fn test_rejects_empty_templates() {
        let err = Config::from_str("[source]\ntemplates = []").unwrap_err();
        assert!(format!("{:#}", err).contains("template"));
    }

    #[test]
    fn test_rejects_zero_area_template() {
        assert!(Config::from_str("[source]\ntemplates = [[10, 10, 10, 50]]").is_err());
    }

    #[test]
    fn test_rejects_non_positive_scale() {
        assert!(Config::from_str("[layout]\nscale = 0.0").is_err());
        assert!(Config::from_str("[layout]\nscale = -1.0").is_err());
    }

    #[test]
    fn test_rejects_capacity_beyond_slots() {
        assert!(Config::from_str("[layout]\nslots_per_page = 5").is_err());
        assert!(Config::from_str("[layout]\nslots_per_page = 0").is_err());
    }

    #[test]
    fn test_rejects_bad_overrides() {
        let out_of_range = "[[layout.overrides]]\npage = 0\nslots = [4]";
        let repeated = "[[layout.overrides]]\npage = 0\nslots = [1, 1]";
        let empty = "[[layout.overrides]]\npage = 0\nslots = []";
        let twice = concat!(
            "[[layout.overrides]]\npage = 2\nslots = [0]\n",
            "[[layout.overrides]]\npage = 2\nslots = [1]"
        );
        for toml in [out_of_range, repeated, empty, twice] {
            let toml = format!("[layout]\n{}", toml);
            assert!(Config::from_str(&toml).is_err(), "accepted: {}", toml);
        }
    }

    #[test]
    fn test_rejects_blank_markers() {
        assert!(Config::from_str("[source]\nmarkers = [\"  \"]").is_err());
    }

    #[test]
    fn test_default_slots_fit_page_without_overlap() {
        let config = Config::default();
        let label = config.source.templates[0].normalized();
        let page = Rect::from_size(config.layout.page.width, config.layout.page.height).unwrap();
        let footprints: Vec<Rect> = config
            .layout
            .slots
            .iter()
            .map(|&slot| label.transformed(&Affine::placement(config.layout.scale, slot)))
            .collect();

        for (i, a) in footprints.iter().enumerate() {
            assert!(a.x0() >= page.x0() && a.x1() <= page.x1(), "slot {} too wide", i);
            assert!(a.y0() >= page.y0() && a.y1() <= page.y1(), "slot {} too tall", i);
            for b in &footprints[i + 1..] {
                assert!(!a.overlaps(b), "{} overlaps {}", a, b);
            }
        }
        assert!(footprints[0].overlaps(&footprints[0]));
    }

    #[test]
    fn test_validation_error_is_typed() {
        let mut config = Config::default();
        config.layout.slots.clear();
        assert!(matches!(
            config.validate(),
            Err(LabelGridError::InvalidConfig(_))
        ));
    }
}
