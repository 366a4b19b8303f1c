//! Page composition: put one label on its planned page

use tracing::debug;

use crate::config::LayoutConfig;
use crate::document::{LabelArtifact, OutputDocument, OutputPage};
use crate::error::{LabelGridError, Result};
use crate::geometry::Affine;
use crate::planner::PlacementSlot;

#[derive(Debug, Clone, Copy)]
pub struct PageCompositor {
    scale: f64,
}

impl PageCompositor {
    pub fn new(scale: f64) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(LabelGridError::InvalidConfig(format!(
                "scale {} must be positive",
                scale
            )));
        }
        Ok(Self { scale })
    }

    pub fn from_layout(layout: &LayoutConfig) -> Result<Self> {
        Self::new(layout.scale)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Merge `artifact` into page `slot.page_index` of `output`.
    ///
    /// A fresh page-sized canvas gets the label under scale-then-translate,
    /// then the page's existing content is merged over it and the canvas
    /// replaces the page. Other pages are untouched. A page index outside
    /// the document is a `Placement` error.
    pub fn place(
        &self,
        artifact: LabelArtifact,
        slot: &PlacementSlot,
        output: &mut OutputDocument,
    ) -> Result<()> {
        let index = slot.page_index;
        let size = output
            .page(index)
            .map(OutputPage::size)
            .ok_or(LabelGridError::Placement {
                page: index,
                page_count: output.page_count(),
            })?;

        let bounds = artifact.bounds();
        let transform = Affine::placement(self.scale, slot.offset);
        debug!(
            "Placing {}x{} label on page {} at ({}, {})",
            bounds.width(),
            bounds.height(),
            index + 1,
            slot.offset.tx,
            slot.offset.ty
        );

        let mut canvas = OutputPage::blank(size);
        canvas.merge_transformed(artifact, transform);
        let existing = output.replace_page(index, OutputPage::blank(size))?;
        canvas.merge_page(existing);
        output.replace_page(index, canvas)?;
        Ok(())
    }
}
