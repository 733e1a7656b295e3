use std::fmt;

/// The dimension extents of an array, outermost first.
///
/// A shape with no dimensions describes a scalar and holds one element.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements, the product of all extents. Saturates at
    /// `usize::MAX`.
    pub fn element_count(&self) -> usize {
        self.checked_element_count().unwrap_or(usize::MAX)
    }

    /// Total number of elements, `None` if the product overflows `usize`.
    pub fn checked_element_count(&self) -> Option<usize> {
        self.0
            .iter()
            .try_fold(1usize, |count, &dim| count.checked_mul(dim))
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Self(Vec::new())
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Self(vec![d])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}
