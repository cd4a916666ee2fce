//! Weighted jump-graph construction
//!
//! Builds an undirected graph whose vertices are star names and whose edges
//! connect every pair of stars with a separation in `(lower, upper]`,
//! weighted by the exact distance. Edge discovery replaces the brute-force
//! all-pairs scan with one range query per star against a shared KD-tree,
//! deduplicated through [`SeenPairs`] so each unordered pair produces exactly
//! one edge.

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};
use rayon::prelude::*;

use crate::extract::{self, NamedPoint};
use crate::kdtree::KdTree;
use crate::pairs::SeenPairs;
use crate::{PARALLEL_THRESHOLD, Result};

/// A weighted undirected graph over star names.
///
/// Thin wrapper over a petgraph [`UnGraph`] that keeps a name-to-index map so
/// callers can address vertices by star name. The underlying graph is exposed
/// through [`graph`](Self::graph) for shortest-path and connectivity
/// algorithms.
#[derive(Debug, Clone)]
pub struct StarGraph {
    graph: UnGraph<String, f64>,
    indices: HashMap<String, NodeIndex>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl StarGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            indices: HashMap::new(),
        }
    }

    /// Add a vertex, returning its index. Adding an existing name is a no-op.
    pub fn add_vertex(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.indices.get(name) {
            return index;
        }
        let index = self.graph.add_node(name.to_string());
        self.indices.insert(name.to_string(), index);
        index
    }

    /// Add an edge between two named vertices, creating them if necessary.
    /// Re-adding an existing edge updates its weight instead of duplicating.
    pub fn add_edge(&mut self, source: &str, target: &str, weight: f64) {
        let source = self.add_vertex(source);
        let target = self.add_vertex(target);
        self.graph.update_edge(source, target, weight);
    }

    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether a vertex with this name exists.
    #[inline]
    pub fn contains_vertex(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// The weight of the edge between two named vertices, if both exist and
    /// are connected.
    pub fn edge_weight(&self, a: &str, b: &str) -> Option<f64> {
        let a = *self.indices.get(a)?;
        let b = *self.indices.get(b)?;
        let edge = self.graph.find_edge(a, b)?;
        self.graph.edge_weight(edge).copied()
    }

    /// Names of all vertices adjacent to `name`; empty if unknown.
    pub fn neighbors_of(&self, name: &str) -> Vec<&str> {
        match self.indices.get(name) {
            Some(&index) => self
                .graph
                .neighbors(index)
                .map(|neighbor| self.graph[neighbor].as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Iterator over all vertex names.
    pub fn vertex_names(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    /// The underlying petgraph structure, for use with petgraph algorithms.
    #[inline]
    pub fn graph(&self) -> &UnGraph<String, f64> {
        &self.graph
    }
}

impl Default for StarGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds [`StarGraph`]s from arbitrary record types via KD-tree edge
/// discovery.
///
/// Parallel discovery engages automatically once the record count reaches
/// [`PARALLEL_THRESHOLD`]; below that, thread-pool dispatch overhead
/// outweighs the benefit.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    enable_parallel: bool,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GraphBuilder {
    /// Create a builder with parallel discovery enabled.
    pub fn new() -> Self {
        Self::with_parallel(true)
    }

    /// Create a builder with parallel discovery explicitly on or off.
    pub fn with_parallel(enable_parallel: bool) -> Self {
        Self { enable_parallel }
    }

    /// Build a weighted graph over `records`.
    ///
    /// Every record becomes a vertex (isolated ones included); every
    /// unordered pair with distance in `(lower, upper]` becomes exactly one
    /// edge weighted by that distance.
    ///
    /// # Errors
    ///
    /// Fails before any tree work on an invalid interval
    /// (`lower < 0` or `lower >= upper`), a duplicate extracted name, or
    /// non-finite coordinates.
    pub fn build_graph<R, N, C>(
        &self,
        records: &[R],
        name_of: N,
        coords_of: C,
        lower: f64,
        upper: f64,
    ) -> Result<StarGraph>
    where
        N: Fn(&R) -> String,
        C: Fn(&R) -> [f64; 3],
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("graph::build_graph");

        extract::check_interval(lower, upper)?;

        if records.is_empty() {
            tracing::debug!("empty record list, returning empty graph");
            return Ok(StarGraph::new());
        }

        let stars = extract::named_points(records, &name_of, &coords_of)?;
        tracing::debug!(
            "building graph for {} stars (range {}-{} ly)",
            stars.len(),
            lower,
            upper
        );

        let tree = extract::build_index(&stars);

        let mut graph = StarGraph::new();
        for star in &stars {
            graph.add_vertex(&star.name);
        }

        let edges = if self.enable_parallel && stars.len() >= PARALLEL_THRESHOLD {
            discover_edges_parallel(&tree, &stars, lower, upper)
        } else {
            discover_edges_sequential(&tree, &stars, lower, upper)
        };

        // Graph writes are single-threaded; workers only propose candidates.
        for (source, target, distance) in edges {
            graph.add_edge(&stars[source].name, &stars[target].name, distance);
        }

        tracing::debug!(
            "graph built: {} vertices, {} edges",
            graph.vertex_count(),
            graph.edge_count()
        );

        Ok(graph)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_edges_sequential(
    tree: &KdTree<usize>,
    stars: &[NamedPoint],
    lower: f64,
    upper: f64,
) -> Vec<(usize, usize, f64)> {
    let seen = SeenPairs::new();
    let mut edges = Vec::new();

    for (index, star) in stars.iter().enumerate() {
        for neighbor in tree.range_search(&star.coords, upper) {
            let target = *neighbor.data();
            if target == index {
                continue;
            }
            // Mark before the lower-bound filter: a sub-lower pair is final
            // from either endpoint, so it never needs a second look.
            if !seen.try_mark(&star.name, &stars[target].name) {
                continue;
            }
            let distance = neighbor.distance_to(&star.coords);
            if distance > lower {
                edges.push((index, target, distance));
            }
        }
    }

    edges
}

fn discover_edges_parallel(
    tree: &KdTree<usize>,
    stars: &[NamedPoint],
    lower: f64,
    upper: f64,
) -> Vec<(usize, usize, f64)> {
    let seen = SeenPairs::new();
    let seen = &seen;

    stars
        .par_iter()
        .enumerate()
        .flat_map_iter(move |(index, star)| {
            tree.range_search(&star.coords, upper)
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
                    (distance > lower).then_some((index, target, distance))
                })
        })
        .collect()
}
