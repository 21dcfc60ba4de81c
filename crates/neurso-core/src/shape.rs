//! Tensor shapes as small immutable dimension tuples.
//!
//! Shapes up to rank 4 live inline (no heap allocation); higher ranks are
//! not produced by this stack. Widening a shape (1D -> 2D -> 3D -> 4D) is
//! always an explicit, pure operation via [`Shape::expand`]; there are no
//! implicit conversions anywhere in the engine.
//!
//! # Examples
//!
//! ```
//! use neurso_core::Shape;
//!
//! let flat = Shape::d1(6);
//! assert_eq!(flat.volume(), 6);
//!
//! let widened = flat.expand(4);
//! assert_eq!(widened.dims(), &[6, 4]);
//! assert_eq!(widened.volume(), 24);
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::error::CoreError;

/// Immutable dimension tuple.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    #[serde(with = "dims_serde")]
    dims: SmallVec<[usize; 4]>,
}

mod dims_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use smallvec::SmallVec;

    pub fn serialize<S: Serializer>(
        dims: &SmallVec<[usize; 4]>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        dims.as_slice().serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<SmallVec<[usize; 4]>, D::Error> {
        let v: Vec<usize> = Vec::deserialize(de)?;
        Ok(SmallVec::from_vec(v))
    }
}

impl Shape {
    /// Create a 1-D shape.
    pub fn d1(n: usize) -> Self {
        Self {
            dims: SmallVec::from_slice(&[n]),
        }
    }

    /// Create a 2-D shape (rows, cols).
    pub fn d2(rows: usize, cols: usize) -> Self {
        Self {
            dims: SmallVec::from_slice(&[rows, cols]),
        }
    }

    /// Create a 3-D shape (channels, height, width).
    pub fn d3(c: usize, h: usize, w: usize) -> Self {
        Self {
            dims: SmallVec::from_slice(&[c, h, w]),
        }
    }

    /// Create a 4-D shape.
    pub fn d4(a: usize, b: usize, c: usize, d: usize) -> Self {
        Self {
            dims: SmallVec::from_slice(&[a, b, c, d]),
        }
    }

    /// Create a shape from a dimension slice.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyShape`] for an empty slice or any zero
    /// dimension.
    pub fn from_dims(dims: &[usize]) -> Result<Self, CoreError> {
        if dims.is_empty() || dims.contains(&0) {
            return Err(CoreError::EmptyShape);
        }
        Ok(Self {
            dims: SmallVec::from_slice(dims),
        })
    }

    /// Dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Size of one dimension.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDimension`] for an out-of-range index.
    pub fn dim(&self, i: usize) -> Result<usize, CoreError> {
        self.dims.get(i).copied().ok_or(CoreError::InvalidDimension {
            dim: i,
            rank: self.rank(),
        })
    }

    /// Total element count.
    pub fn volume(&self) -> usize {
        self.dims.iter().product()
    }

    /// Pure widening transform: append one trailing dimension.
    ///
    /// This is the only sanctioned way to grow a shape's rank; the engine
    /// performs no implicit widening.
    pub fn expand(&self, extra: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims.push(extra);
        Shape { dims }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{:?}", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", parts.join("x"))
    }
}
