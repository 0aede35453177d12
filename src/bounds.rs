//! Hyper-rectangular constraints on the values of a variable.

use std::fmt::{self, Debug, Display};

use itertools::Itertools;

use crate::error::{GraphError, Result};

/// A multi-dimensional 'regular' boundary (a hypervolume).
pub trait Bounds<V>: Debug + Send + Sync {
    /// The upper limit of this hypervolume in the given dimension.
    fn upper_limit(&self, dimension: usize) -> V;

    /// The lower limit of this hypervolume in the given dimension.
    fn lower_limit(&self, dimension: usize) -> V;

    /// The dimensionality of this hypervolume.
    fn bounds_dimension(&self) -> usize;

    fn upper_limits(&self) -> Vec<V> {
        (0..self.bounds_dimension())
            .map(|i| self.upper_limit(i))
            .collect()
    }

    fn lower_limits(&self) -> Vec<V> {
        (0..self.bounds_dimension())
            .map(|i| self.lower_limit(i))
            .collect()
    }

    fn in_bounds(&self, dimension: usize, value: V) -> bool
    where
        V: PartialOrd,
    {
        value >= self.lower_limit(dimension) && value <= self.upper_limit(dimension)
    }
}

/// Per-dimension real-valued limits.
#[derive(Debug, Clone, PartialEq)]
pub struct RealBounds {
    lower: Box<[f64]>,
    upper: Box<[f64]>,
}

impl RealBounds {
    pub fn new(lower: &[f64], upper: &[f64]) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(GraphError::BoundsDimensionMismatch {
                expected: lower.len(),
                found: upper.len(),
            });
        }
        if let Some((dimension, (&lower, &upper))) = lower
            .iter()
            .zip(upper.iter())
            .enumerate()
            .find(|(_, (lower, upper))| lower > upper)
        {
            return Err(GraphError::InvalidBounds {
                dimension,
                lower,
                upper,
            });
        }
        Ok(RealBounds {
            lower: lower.into(),
            upper: upper.into(),
        })
    }

    /// The same interval in every dimension.
    pub fn uniform(dimension: usize, lower: f64, upper: f64) -> Result<Self> {
        RealBounds::new(&vec![lower; dimension], &vec![upper; dimension])
    }

    /// Only a lower limit, unbounded above.
    pub fn lower_only(lower: &[f64]) -> Result<Self> {
        RealBounds::new(lower, &vec![f64::INFINITY; lower.len()])
    }
}

impl Bounds<f64> for RealBounds {
    fn upper_limit(&self, dimension: usize) -> f64 {
        self.upper[dimension]
    }

    fn lower_limit(&self, dimension: usize) -> f64 {
        self.lower[dimension]
    }

    fn bounds_dimension(&self) -> usize {
        self.lower.len()
    }
}

/// The tightest region shared by every added bounds object.
///
/// Without any added bounds the limits are the defaults given at
/// construction, usually the whole real line.
#[derive(Debug)]
pub struct IntersectionBounds<V> {
    dimension: usize,
    lower: V,
    upper: V,
    bounds: Vec<Box<dyn Bounds<V>>>,
}

impl<V> IntersectionBounds<V>
where
    V: PartialOrd + Copy + Debug + Send + Sync,
{
    pub fn new(dimension: usize, lower: V, upper: V) -> Self {
        IntersectionBounds {
            dimension,
            lower,
            upper,
            bounds: Vec::new(),
        }
    }

    pub fn add_bounds(&mut self, bounds: Box<dyn Bounds<V>>) -> Result<()> {
        if bounds.bounds_dimension() != self.dimension {
            return Err(GraphError::BoundsDimensionMismatch {
                expected: self.dimension,
                found: bounds.bounds_dimension(),
            });
        }
        self.bounds.push(bounds);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

impl<V> Bounds<V> for IntersectionBounds<V>
where
    V: PartialOrd + Copy + Debug + Send + Sync,
{
    fn upper_limit(&self, dimension: usize) -> V {
        self.bounds
            .iter()
            .map(|b| b.upper_limit(dimension))
            .reduce(|a, b| if b < a { b } else { a })
            .unwrap_or(self.upper)
    }

    fn lower_limit(&self, dimension: usize) -> V {
        self.bounds
            .iter()
            .map(|b| b.lower_limit(dimension))
            .reduce(|a, b| if b > a { b } else { a })
            .unwrap_or(self.lower)
    }

    fn bounds_dimension(&self) -> usize {
        self.dimension
    }
}

impl<V> Display for IntersectionBounds<V>
where
    V: PartialOrd + Copy + Debug + Display + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lower=[{}] upper=[{}]",
            self.lower_limits().iter().join(", "),
            self.upper_limits().iter().join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn intersection_takes_tightest_limits() {
        let mut bounds = IntersectionBounds::new(1, f64::NEG_INFINITY, f64::INFINITY);
        bounds
            .add_bounds(Box::new(RealBounds::new(&[0.], &[10.]).unwrap()))
            .unwrap();
        bounds
            .add_bounds(Box::new(RealBounds::new(&[-5.], &[8.]).unwrap()))
            .unwrap();
        assert_eq!(bounds.lower_limit(0), 0.);
        assert_eq!(bounds.upper_limit(0), 8.);
    }

    #[test]
    fn empty_intersection_uses_defaults() {
        let bounds = IntersectionBounds::new(2, f64::NEG_INFINITY, f64::INFINITY);
        assert!(bounds.is_empty());
        assert_eq!(bounds.lower_limits(), vec![f64::NEG_INFINITY; 2]);
        assert_eq!(bounds.upper_limits(), vec![f64::INFINITY; 2]);
    }

    #[test]
    fn mismatched_dimension_is_rejected() {
        let mut bounds = IntersectionBounds::new(2, f64::NEG_INFINITY, f64::INFINITY);
        let err = bounds
            .add_bounds(Box::new(RealBounds::uniform(3, 0., 1.).unwrap()))
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::BoundsDimensionMismatch {
                expected: 2,
                found: 3
            }
        ));
        assert!(bounds.is_empty());
    }

    #[test]
    fn lower_only_is_open_above() {
        let bounds = RealBounds::lower_only(&[0., -1.]).unwrap();
        assert_eq!(bounds.bounds_dimension(), 2);
        assert_eq!(bounds.lower_limits(), vec![0., -1.]);
        assert_eq!(bounds.upper_limits(), vec![f64::INFINITY; 2]);
        assert!(bounds.in_bounds(0, 0.));
        assert!(bounds.in_bounds(1, 1e300));
        assert!(!bounds.in_bounds(0, -1e-12));
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let err = RealBounds::new(&[0., 2.], &[1., 1.]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidBounds { dimension: 1, .. }));
    }

    #[test]
    fn display_lists_limits() {
        let mut bounds = IntersectionBounds::new(2, f64::NEG_INFINITY, f64::INFINITY);
        bounds
            .add_bounds(Box::new(RealBounds::new(&[0., 1.], &[2., 3.]).unwrap()))
            .unwrap();
        assert_eq!(bounds.to_string(), "lower=[0, 1] upper=[2, 3]");
    }

    proptest! {
        #[test]
        fn intersection_is_inside_every_member(
            intervals in proptest::collection::vec((-100f64..0., 0f64..100.), 1..6)
        ) {
            let mut bounds = IntersectionBounds::new(1, f64::NEG_INFINITY, f64::INFINITY);
            for &(lower, upper) in intervals.iter() {
                bounds.add_bounds(Box::new(RealBounds::new(&[lower], &[upper]).unwrap())).unwrap();
            }
            for &(lower, upper) in intervals.iter() {
                prop_assert!(bounds.lower_limit(0) >= lower);
                prop_assert!(bounds.upper_limit(0) <= upper);
            }
        }
    }
}
