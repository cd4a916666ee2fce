//! Record extraction boundary
//!
//! Domain records reach this crate only through two caller-supplied accessors,
//! a name extractor and a coordinate extractor. All input validation lives
//! here, at the boundary, so the spatial index itself stays total over
//! well-formed input: coordinates must be finite, names must be unique within
//! a batch (the pair-dedup scheme keys on them), and distance intervals must
//! be well-ordered.

use std::collections::HashSet;

use crate::kdtree::{KdPoint, KdTree};
use crate::{Result, TransitError};

/// A record reduced to the only two things the index needs.
#[derive(Debug, Clone)]
pub(crate) struct NamedPoint {
    pub(crate) name: String,
    pub(crate) coords: [f64; 3],
}

/// Extract and validate every record in one pass.
///
/// Position in the returned vector is the record's identity for the rest of
/// the run; the tree payload is that index.
pub(crate) fn named_points<R, N, C>(
    records: &[R],
    name_of: &N,
    coords_of: &C,
) -> Result<Vec<NamedPoint>>
where
    N: Fn(&R) -> String,
    C: Fn(&R) -> [f64; 3],
{
    let mut points = Vec::with_capacity(records.len());
    let mut names = HashSet::with_capacity(records.len());

    for record in records {
        let name = name_of(record);
        let coords = coords_of(record);

        if coords.iter().any(|c| !c.is_finite()) {
            return Err(TransitError::NonFiniteCoordinates { name, coords });
        }
        if !names.insert(name.clone()) {
            return Err(TransitError::DuplicateStarName(name));
        }

        points.push(NamedPoint { name, coords });
    }

    Ok(points)
}

/// Build the spatial index over extracted records, payload = record index.
pub(crate) fn build_index(points: &[NamedPoint]) -> KdTree<usize> {
    KdTree::build(
        points
            .iter()
            .enumerate()
            .map(|(index, point)| KdPoint::new(point.coords, index))
            .collect(),
    )
}

/// Validate a `(lower, upper]` distance interval.
///
/// Rejects NaN bounds as a side effect of the negated comparison.
pub(crate) fn check_interval(lower: f64, upper: f64) -> Result<()> {
    if !(lower >= 0.0 && lower < upper) {
        return Err(TransitError::InvalidInterval { lower, upper });
    }
    Ok(())
}
