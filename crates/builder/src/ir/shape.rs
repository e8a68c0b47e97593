//! Tensor shapes mixing fixed and symbolic dimensions

use crate::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single tensor dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// Known extent
    Fixed(u64),
    /// Named placeholder (e.g. "N" for a batch dimension)
    Symbolic(String),
    /// Neither a value nor a name
    Unknown,
}

impl Dimension {
    /// Get the fixed extent, if known
    pub fn extent(&self) -> Option<u64> {
        match self {
            Dimension::Fixed(v) => Some(*v),
            _ => None,
        }
    }

    /// Check whether this dimension is a fixed extent
    pub fn is_fixed(&self) -> bool {
        matches!(self, Dimension::Fixed(_))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Fixed(v) => write!(f, "{}", v),
            Dimension::Symbolic(name) => write!(f, "{}", name),
            Dimension::Unknown => write!(f, "?"),
        }
    }
}

/// Ordered list of dimensions
///
/// Dimensions can only be appended. There is no API that removes or
/// reorders an existing dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeDescriptor {
    dims: Vec<Dimension>,
}

impl ShapeDescriptor {
    /// Create an empty (rank 0) shape
    pub fn new() -> Self {
        Self { dims: Vec::new() }
    }

    /// Create a shape from fixed extents
    ///
    /// A negative extent produces an `Unknown` dimension, matching the
    /// `-1` convention used for dynamic dimensions in ONNX tooling.
    pub fn fixed(extents: &[i64]) -> Self {
        let mut shape = Self::new();
        for &extent in extents {
            shape.push_extent(extent);
        }
        shape
    }

    /// Create a shape from extents with optional symbolic names
    ///
    /// Both slices must have the same length. Where a name is present and
    /// non-empty it wins over the extent.
    pub fn with_symbolic(extents: &[i64], names: &[Option<&str>]) -> Result<Self> {
        if extents.len() != names.len() {
            return Err(GraphError::InvalidArgument(format!(
                "shape has {} extents but {} symbolic names",
                extents.len(),
                names.len()
            )));
        }

        let mut shape = Self::new();
        for (&extent, name) in extents.iter().zip(names) {
            match name {
                Some(name) if !name.is_empty() => shape.push_symbolic(Some(name)),
                _ => shape.push_extent(extent),
            }
        }
        Ok(shape)
    }

    /// Append a fixed dimension
    pub fn push_fixed(&mut self, extent: u64) {
        self.dims.push(Dimension::Fixed(extent));
    }

    /// Append a symbolic dimension
    ///
    /// `None` or an empty name appends an `Unknown` dimension.
    pub fn push_symbolic(&mut self, name: Option<&str>) {
        match name {
            Some(name) if !name.is_empty() => self.dims.push(Dimension::Symbolic(name.to_string())),
            _ => self.dims.push(Dimension::Unknown),
        }
    }

    fn push_extent(&mut self, extent: i64) {
        if extent < 0 {
            self.dims.push(Dimension::Unknown);
        } else {
            self.dims.push(Dimension::Fixed(extent as u64));
        }
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimension at `index`
    pub fn dim(&self, index: usize) -> Option<&Dimension> {
        self.dims.get(index)
    }

    /// All dimensions in order
    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// Total element count when every dimension is fixed and the product fits
    pub fn element_count(&self) -> Option<u64> {
        let extents = self.dims.iter().map(Dimension::extent).collect::<Option<Vec<_>>>()?;
        if extents.contains(&0) {
            return Some(0);
        }
        extents.into_iter().try_fold(1u64, |acc, e| acc.checked_mul(e))
    }

    /// Check whether concrete `extents` are compatible with this shape
    ///
    /// Symbolic and unknown dimensions match any extent.
    pub fn accepts(&self, extents: &[i64]) -> bool {
        self.dims.len() == extents.len()
            && self.dims.iter().zip(extents).all(|(dim, &extent)| match dim {
                Dimension::Fixed(v) => extent >= 0 && *v == extent as u64,
                _ => true,
            })
    }
}

impl fmt::Display for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}
