//! Distance-band transit discovery
//!
//! A transit is a pair of stars whose separation falls inside a configured
//! distance band. Bands carry display metadata (line width, color) that is
//! stamped onto every route they match. The multi-band operation shares one
//! KD-tree across all enabled bands, sized to the largest upper bound, instead
//! of rebuilding the index per band.

use rayon::prelude::*;

use crate::extract::{self, NamedPoint};
use crate::kdtree::KdTree;
use crate::pairs::SeenPairs;
use crate::{PARALLEL_THRESHOLD, Result};

/// A distance band: a `(lower, upper]` separation interval plus the display
/// metadata stamped onto routes it matches.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransitBand {
    /// Label carried onto matching routes.
    pub name: String,
    /// Disabled bands are skipped entirely by the multi-band operation.
    pub enabled: bool,
    /// Exclusive lower separation bound, in the records' distance unit.
    pub lower: f64,
    /// Inclusive upper separation bound.
    pub upper: f64,
    /// Line weight for rendering routes of this band.
    pub line_width: f64,
    /// RGBA color for rendering routes of this band.
    pub color: [u8; 4],
}

impl TransitBand {
    /// Create an enabled band with default display metadata.
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            lower,
            upper,
            line_width: 1.0,
            color: [0xff, 0xff, 0xff, 0xff],
        }
    }
}

/// A discovered transit: one qualifying unordered pair, tagged with the band
/// that matched it and that band's display metadata.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransitRoute {
    /// Name of the star whose range query discovered the pair.
    pub source: String,
    /// Name of the other endpoint.
    pub target: String,
    /// Exact separation between the endpoints.
    pub distance: f64,
    /// Name of the matched band.
    pub band: String,
    /// Line weight inherited from the band.
    pub line_width: f64,
    /// RGBA color inherited from the band.
    pub color: [u8; 4],
}

/// Finds transit routes between records via KD-tree range queries.
///
/// Shares the sequential/parallel duality and the
/// [`PARALLEL_THRESHOLD`] record-count gate with
/// [`GraphBuilder`](crate::GraphBuilder). Deduplication is scoped per call;
/// bands within one multi-band run share a single seen-pairs set so no pair
/// is assigned to more than one band.
#[derive(Debug, Clone)]
pub struct TransitCalculator {
    enable_parallel: bool,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TransitCalculator {
    /// Create a calculator with parallel discovery enabled.
    pub fn new() -> Self {
        Self::with_parallel(true)
    }

    /// Create a calculator with parallel discovery explicitly on or off.
    pub fn with_parallel(enable_parallel: bool) -> Self {
        Self { enable_parallel }
    }

    /// Find all transits matching a single band.
    ///
    /// The band's `enabled` flag is not consulted here; passing a band is the
    /// request to evaluate it.
    ///
    /// # Errors
    ///
    /// Fails before any tree work on an invalid band interval, a duplicate
    /// extracted name, or non-finite coordinates.
    pub fn calculate<R, N, C>(
        &self,
        band: &TransitBand,
        records: &[R],
        name_of: N,
        coords_of: C,
    ) -> Result<Vec<TransitRoute>>
    where
        N: Fn(&R) -> String,
        C: Fn(&R) -> [f64; 3],
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("transits::calculate");

        extract::check_interval(band.lower, band.upper)?;

        if records.is_empty() {
            return Ok(Vec::new());
        }

        let stars = extract::named_points(records, &name_of, &coords_of)?;
        tracing::debug!(
            "calculating transits for {} stars (range {}-{} ly)",
            stars.len(),
            band.lower,
            band.upper
        );

        let tree = extract::build_index(&stars);
        let routes = self.discover_routes(&tree, &stars, band.upper, &|distance| {
            (distance > band.lower).then_some(band)
        });

        tracing::debug!("found {} transit routes", routes.len());
        Ok(routes)
    }

    /// Find all transits across multiple bands with one shared tree.
    ///
    /// Disabled bands are skipped entirely. Each qualifying pair is assigned
    /// to the first enabled band (in the order given) whose interval contains
    /// its distance; never to more than one, even when intervals overlap.
    /// Returns an empty list without building a tree when no band is enabled
    /// or there are no records.
    ///
    /// # Errors
    ///
    /// Every supplied band is interval-validated up front, enabled or not;
    /// extraction errors propagate as in [`calculate`](Self::calculate).
    pub fn calculate_multi<R, N, C>(
        &self,
        bands: &[TransitBand],
        records: &[R],
        name_of: N,
        coords_of: C,
    ) -> Result<Vec<TransitRoute>>
    where
        N: Fn(&R) -> String,
        C: Fn(&R) -> [f64; 3],
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("transits::calculate_multi");

        for band in bands {
            extract::check_interval(band.lower, band.upper)?;
        }

        let enabled: Vec<&TransitBand> = bands.iter().filter(|band| band.enabled).collect();
        if enabled.is_empty() || records.is_empty() {
            return Ok(Vec::new());
        }

        // One tree sized to the widest enabled band covers every band.
        let max_upper = enabled.iter().map(|band| band.upper).fold(0.0, f64::max);

        let stars = extract::named_points(records, &name_of, &coords_of)?;
        tracing::debug!(
            "calculating transits for {} stars across {} enabled bands (max range {} ly)",
            stars.len(),
            enabled.len(),
            max_upper
        );

        let tree = extract::build_index(&stars);
        let routes = self.discover_routes(&tree, &stars, max_upper, &|distance| {
            enabled
                .iter()
                .copied()
                .find(|band| distance > band.lower && distance <= band.upper)
        });

        tracing::debug!("found {} transit routes", routes.len());
        Ok(routes)
    }

    fn discover_routes<'b, F>(
        &self,
        tree: &KdTree<usize>,
        stars: &[NamedPoint],
        radius: f64,
        assign: &F,
    ) -> Vec<TransitRoute>
    where
        F: Fn(f64) -> Option<&'b TransitBand> + Sync,
    {
        if self.enable_parallel && stars.len() >= PARALLEL_THRESHOLD {
            discover_routes_parallel(tree, stars, radius, assign)
        } else {
            discover_routes_sequential(tree, stars, radius, assign)
        }
    }
}

impl Default for TransitCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn make_route(
    source: &NamedPoint,
    target: &NamedPoint,
    distance: f64,
    band: &TransitBand,
) -> TransitRoute {
    TransitRoute {
        source: source.name.clone(),
        target: target.name.clone(),
        distance,
        band: band.name.clone(),
        line_width: band.line_width,
        color: band.color,
    }
}

fn discover_routes_sequential<'b, F>(
    tree: &KdTree<usize>,
    stars: &[NamedPoint],
    radius: f64,
    assign: &F,
) -> Vec<TransitRoute>
where
    F: Fn(f64) -> Option<&'b TransitBand>,
{
    let seen = SeenPairs::new();
    let mut routes = Vec::new();

    for (index, star) in stars.iter().enumerate() {
        for neighbor in tree.range_search(&star.coords, radius) {
            let target = *neighbor.data();
            if target == index {
                continue;
            }
            if !seen.try_mark(&star.name, &stars[target].name) {
                continue;
            }
            let distance = neighbor.distance_to(&star.coords);
            if let Some(band) = assign(distance) {
                routes.push(make_route(star, &stars[target], distance, band));
            }
        }
    }

    routes
}

fn discover_routes_parallel<'b, F>(
    tree: &KdTree<usize>,
    stars: &[NamedPoint],
    radius: f64,
    assign: &F,
) -> Vec<TransitRoute>
where
    F: Fn(f64) -> Option<&'b TransitBand> + Sync,
{
    let seen = SeenPairs::new();
    let seen = &seen;

    stars
        .par_iter()
        .enumerate()
        .flat_map_iter(move |(index, star)| {
            tree.range_search(&star.coords, radius)
                .into_iter()
                .filter_map(move |neighbor| {
                    let target = *neighbor.data();
                    if target == index {
                        return None;
                    }
                    if !seen.try_mark(&star.name, &stars[target].name) {
                        return None;
                    }
                    let distance = neighbor.distance_to(&star.coords);
                    assign(distance).map(|band| make_route(star, &stars[target], distance, band))
                })
        })
        .collect()
}
