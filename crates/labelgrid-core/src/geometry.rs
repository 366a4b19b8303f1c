//! Geometry primitives shared by every stage
//!
//! All coordinates are PDF user-space units with the origin at the
//! lower-left corner and y growing upwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LabelGridError, Result};

/// Axis-aligned rectangle `(x0, y0, x1, y1)` with `x1 > x0` and `y1 > y0`.
///
/// Serialized as a four-element array, the same layout PDF uses for boxes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct Rect {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Result<Self> {
        let finite = [x0, y0, x1, y1].iter().all(|v| v.is_finite());
        if !finite || x1 <= x0 || y1 <= y0 {
            return Err(LabelGridError::InvalidConfig(format!(
                "rectangle [{}, {}, {}, {}] has no area",
                x0, y0, x1, y1
            )));
        }
        Ok(Self { x0, y0, x1, y1 })
    }

    /// Rectangle anchored at the origin
    pub fn from_size(width: f64, height: f64) -> Result<Self> {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn x0(&self) -> f64 {
        self.x0
    }

    pub fn y0(&self) -> f64 {
        self.y0
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Same size, re-based so the lower-left corner sits on `(0, 0)`
    pub fn normalized(&self) -> Rect {
        Rect {
            x0: 0.0,
            y0: 0.0,
            x1: self.width(),
            y1: self.height(),
        }
    }

    /// Point lies inside the rectangle, boundary excluded
    pub fn contains_strict(&self, x: f64, y: f64) -> bool {
        x > self.x0 && x < self.x1 && y > self.y0 && y < self.y1
    }

    /// Bounding box of this rectangle after applying `transform`
    pub fn transformed(&self, transform: &Affine) -> Rect {
        let corners = [
            transform.apply(self.x0, self.y0),
            transform.apply(self.x1, self.y0),
            transform.apply(self.x0, self.y1),
            transform.apply(self.x1, self.y1),
        ];
        let mut out = Rect {
            x0: f64::INFINITY,
            y0: f64::INFINITY,
            x1: f64::NEG_INFINITY,
            y1: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            out.x0 = out.x0.min(x);
            out.y0 = out.y0.min(y);
            out.x1 = out.x1.max(x);
            out.y1 = out.y1.max(y);
        }
        out
    }

    /// True when the two rectangles share interior area
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }
}

impl TryFrom<[f64; 4]> for Rect {
    type Error = LabelGridError;

    fn try_from(value: [f64; 4]) -> Result<Self> {
        Rect::new(value[0], value[1], value[2], value[3])
    }
}

impl From<Rect> for [f64; 4] {
    fn from(rect: Rect) -> Self {
        [rect.x0, rect.y0, rect.x1, rect.y1]
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {} {}]", self.x0, self.y0, self.x1, self.y1)
    }
}

/// Width and height of a page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Exact equality at the precision PDF stores reals (32-bit).
    ///
    /// No tolerance is applied: a sheet that is off by any representable
    /// amount does not match.
    pub fn matches(&self, other: &PageSize) -> bool {
        self.width as f32 == other.width as f32 && self.height as f32 == other.height as f32
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Translation applied to a label after the global scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotOffset {
    pub tx: f64,
    pub ty: f64,
}

impl SlotOffset {
    pub const fn new(tx: f64, ty: f64) -> Self {
        Self { tx, ty }
    }
}

/// 2D affine matrix in PDF order `[a b c d e f]`.
///
/// Points are row vectors: `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Uniform scale around the origin
    pub const fn scale(factor: f64) -> Self {
        Self::new(factor, 0.0, 0.0, factor, 0.0, 0.0)
    }

    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Uniform scale followed by a translation to the slot offset
    pub fn placement(scale: f64, offset: SlotOffset) -> Self {
        Self::scale(scale).then(&Self::translate(offset.tx, offset.ty))
    }

    /// Compose: apply `self` first, then `next`
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: composing with identity changes nothing
        #[test]
        fn identity_is_neutral(
            s in 0.01f64..10.0,
            tx in -1000.0f64..1000.0,
            ty in -1000.0f64..1000.0,
        ) {
            let m = Affine::placement(s, SlotOffset::new(tx, ty));
            prop_assert_eq!(m.then(&Affine::IDENTITY), m);
            prop_assert_eq!(Affine::IDENTITY.then(&m), m);
        }

        /// Property: uniform scale preserves aspect ratio of a label
        #[test]
        fn placement_preserves_aspect(
            w in 1.0f64..1000.0,
            h in 1.0f64..1000.0,
            s in 0.1f64..4.0,
        ) {
            let rect = Rect::from_size(w, h).unwrap();
            let placed = rect.transformed(&Affine::placement(s, SlotOffset::new(3.0, 7.0)));
            let before = w / h;
            let after = placed.width() / placed.height();
            prop_assert!((before - after).abs() < 1e-9 * before.max(1.0));
        }
    }
}
