//! 3-D extents and index conversion
//!
//! Launch geometry (global size, local size, group counts) and entity
//! coordinates are all 3-D. Linear indices map to coordinates
//! lexicographically with `x` fastest-varying, so
//! `linear = (z * ext.y + y) * ext.x + x`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Rem};

/// A 3-D extent or coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dim3 {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Dim3 {
    /// Create a new 3-D extent
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Create a 1-D extent
    pub const fn linear(size: usize) -> Self {
        Self { x: size, y: 1, z: 1 }
    }

    /// Total number of points in the extent
    pub const fn product(&self) -> usize {
        self.x * self.y * self.z
    }

    /// Decode a linear index into a coordinate within `extents`
    ///
    /// `x` varies fastest, then `y`, then `z`. Extents must be non-zero in
    /// every dimension.
    pub const fn from_linear(linear: usize, extents: Dim3) -> Self {
        let x = linear % extents.x;
        let rest = linear / extents.x;
        Self {
            x,
            y: rest % extents.y,
            z: rest / extents.y,
        }
    }

    /// Encode this coordinate as a linear index within `extents`
    pub const fn to_linear(&self, extents: Dim3) -> usize {
        (self.z * extents.y + self.y) * extents.x + self.x
    }
}

impl Rem for Dim3 {
    type Output = Dim3;

    fn rem(self, rhs: Dim3) -> Dim3 {
        Dim3::new(self.x % rhs.x, self.y % rhs.y, self.z % rhs.z)
    }
}

impl Div for Dim3 {
    type Output = Dim3;

    fn div(self, rhs: Dim3) -> Dim3 {
        Dim3::new(self.x / rhs.x, self.y / rhs.y, self.z / rhs.z)
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
