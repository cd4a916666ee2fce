//! Balanced 3D KD-tree for fast spatial search over star positions
//!
//! The tree partitions 3D space by cycling the split axis with depth, enabling
//! range and nearest-neighbor queries without scanning every point.
//! Construction is O(n log n); range queries are O(log n + k) where k is the
//! number of points returned. The tree is immutable after construction and
//! safe for unlimited concurrent read-only queries.

/// Number of spatial dimensions indexed by the tree.
const DIMENSIONS: usize = 3;

/// An indexed point: a 3D position plus an opaque payload.
///
/// Points are created once at build time and owned by the tree; queries hand
/// back references, never copies of the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct KdPoint<T> {
    coords: [f64; 3],
    data: T,
}

impl<T> KdPoint<T> {
    /// Create a point at the given coordinates carrying `data`.
    pub fn new(coords: [f64; 3], data: T) -> Self {
        Self { coords, data }
    }

    /// The point's coordinates.
    #[inline]
    pub fn coords(&self) -> &[f64; 3] {
        &self.coords
    }

    /// The payload attached to this point.
    #[inline]
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Squared Euclidean distance from this point to `query`.
    #[inline]
    pub fn distance_sq_to(&self, query: &[f64; 3]) -> f64 {
        distance_sq(&self.coords, query)
    }

    /// Euclidean distance from this point to `query`.
    #[inline]
    pub fn distance_to(&self, query: &[f64; 3]) -> f64 {
        self.distance_sq_to(query).sqrt()
    }
}

/// Interior node stored in the flat node arena.
///
/// `point` indexes into the backing point array, which construction reorders
/// in place so that each node's subrange satisfies the split invariant:
/// everything left of the node is `<=` it on the split axis, everything right
/// is `>=` it.
#[derive(Debug, Clone)]
struct Node {
    point: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// A balanced 3D KD-tree over [`KdPoint`]s.
///
/// Built once from a batch of points; never mutated in place. When the
/// underlying point set changes, discard the tree and build a new one.
#[derive(Debug, Clone)]
pub struct KdTree<T> {
    points: Vec<KdPoint<T>>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<T> KdTree<T> {
    /// Build a tree from the given points.
    ///
    /// Accepts any finite point set, including an empty one and duplicate
    /// coordinates. Median selection runs per subrange over one owned backing
    /// array, so construction is O(n log n) without per-node allocation.
    pub fn build(mut points: Vec<KdPoint<T>>) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("kdtree::build");

        let len = points.len();
        let mut nodes = Vec::with_capacity(len);
        let root = Self::build_range(&mut points, &mut nodes, 0, len, 0);
        Self {
            points,
            nodes,
            root,
        }
    }

    fn build_range(
        points: &mut [KdPoint<T>],
        nodes: &mut Vec<Node>,
        lo: usize,
        hi: usize,
        depth: usize,
    ) -> Option<usize> {
        if lo >= hi {
            return None;
        }

        let axis = depth % DIMENSIONS;
        let mid = lo + (hi - lo) / 2;

        // Structural median: partitions the subrange around the element that
        // would sit at `mid` if the subrange were sorted by this axis.
        points[lo..hi]
            .select_nth_unstable_by(mid - lo, |a, b| a.coords[axis].total_cmp(&b.coords[axis]));

        let node_index = nodes.len();
        nodes.push(Node {
            point: mid,
            axis,
            left: None,
            right: None,
        });

        let left = Self::build_range(points, nodes, lo, mid, depth + 1);
        let right = Self::build_range(points, nodes, mid + 1, hi, depth + 1);

        let node = &mut nodes[node_index];
        node.left = left;
        node.right = right;
        Some(node_index)
    }

    /// Number of points in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the tree is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Find all points within `radius` of `query` (inclusive).
    ///
    /// Results come back in unspecified order and include a point coincident
    /// with the query if one is indexed. A negative radius yields an empty
    /// result.
    pub fn range_search(&self, query: &[f64; 3], radius: f64) -> Vec<&KdPoint<T>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("kdtree::range_search");

        let mut results = Vec::new();
        if radius < 0.0 {
            return results;
        }
        if let Some(root) = self.root {
            self.range_search_node(root, query, radius * radius, &mut results);
        }
        results
    }

    fn range_search_node<'a>(
        &'a self,
        node_index: usize,
        query: &[f64; 3],
        radius_sq: f64,
        results: &mut Vec<&'a KdPoint<T>>,
    ) {
        let node = &self.nodes[node_index];
        let point = &self.points[node.point];

        if point.distance_sq_to(query) <= radius_sq {
            results.push(point);
        }

        let axis_dist = query[node.axis] - point.coords[node.axis];
        let (near, far) = if axis_dist < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        // Always descend the side containing the query.
        if let Some(near) = near {
            self.range_search_node(near, query, radius_sq, results);
        }

        // The far side can only qualify if the splitting plane is in range.
        if axis_dist * axis_dist <= radius_sq {
            if let Some(far) = far {
                self.range_search_node(far, query, radius_sq, results);
            }
        }
    }

    /// Find the single point closest to `query`, or `None` on an empty tree.
    ///
    /// Ties between equidistant points resolve to whichever the traversal
    /// reaches first; deterministic for a fixed tree and query.
    pub fn nearest(&self, query: &[f64; 3]) -> Option<&KdPoint<T>> {
        let root = self.root?;
        let mut best = None;
        let mut best_sq = f64::INFINITY;
        self.nearest_node(root, query, &mut best, &mut best_sq);
        best.map(|index| &self.points[index])
    }

    fn nearest_node(
        &self,
        node_index: usize,
        query: &[f64; 3],
        best: &mut Option<usize>,
        best_sq: &mut f64,
    ) {
        let node = &self.nodes[node_index];
        let point = &self.points[node.point];

        let dist_sq = point.distance_sq_to(query);
        if dist_sq < *best_sq {
            *best = Some(node.point);
            *best_sq = dist_sq;
        }

        let axis_dist = query[node.axis] - point.coords[node.axis];
        let (near, far) = if axis_dist < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        // Near side first tightens the bound before the far side is considered.
        if let Some(near) = near {
            self.nearest_node(near, query, best, best_sq);
        }

        if axis_dist * axis_dist < *best_sq {
            if let Some(far) = far {
                self.nearest_node(far, query, best, best_sq);
            }
        }
    }
}

/// Squared Euclidean distance between two 3D points.
#[inline]
pub(crate) fn distance_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Euclidean distance between two 3D points.
#[inline]
pub fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    distance_sq(a, b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic xorshift PRNG; keeps the randomized tests reproducible
    /// without pulling in an RNG dependency.
    fn xorshift(state: &mut u64) -> f64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        (*state as f64) / (u64::MAX as f64)
    }

    fn random_points(n: usize, seed: u64) -> Vec<[f64; 3]> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                [
                    xorshift(&mut state) * 100.0,
                    xorshift(&mut state) * 100.0,
                    xorshift(&mut state) * 100.0,
                ]
            })
            .collect()
    }

    #[test]
    fn empty_tree() {
        let tree: KdTree<usize> = KdTree::build(vec![]);
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(tree.nearest(&[0.0, 0.0, 0.0]).is_none());
        assert!(tree.range_search(&[0.0, 0.0, 0.0], 10.0).is_empty());
    }

    #[test]
    fn single_point() {
        let tree = KdTree::build(vec![KdPoint::new([1.0, 2.0, 3.0], "only")]);
        assert_eq!(tree.len(), 1);

        let nearest = tree.nearest(&[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(*nearest.data(), "only");
        assert!((nearest.distance_to(&[0.0, 0.0, 0.0]) - 14.0_f64.sqrt()).abs() < 1e-12);

        assert_eq!(tree.range_search(&[1.0, 2.0, 3.0], 0.0).len(), 1);
        assert!(tree.range_search(&[100.0, 100.0, 100.0], 1.0).is_empty());
    }

    #[test]
    fn size_counts_duplicate_coordinates() {
        let points: Vec<KdPoint<usize>> =
            (0..10).map(|i| KdPoint::new([1.0, 1.0, 1.0], i)).collect();
        let tree = KdTree::build(points);

        assert_eq!(tree.len(), 10);
        // Every duplicate must be reachable through a range query.
        assert_eq!(tree.range_search(&[1.0, 1.0, 1.0], 0.0).len(), 10);
    }

    #[test]
    fn negative_radius_is_empty() {
        let tree = KdTree::build(vec![KdPoint::new([0.0, 0.0, 0.0], ())]);
        assert!(tree.range_search(&[0.0, 0.0, 0.0], -1.0).is_empty());
    }

    #[test]
    fn range_includes_coincident_query_point() {
        let tree = KdTree::build(vec![
            KdPoint::new([5.0, 5.0, 5.0], "here"),
            KdPoint::new([9.0, 9.0, 9.0], "there"),
        ]);
        let results = tree.range_search(&[5.0, 5.0, 5.0], 1.0);
        assert_eq!(results.len(), 1);
        assert_eq!(*results[0].data(), "here");
    }

    #[test]
    fn range_search_matches_brute_force() {
        let coords = random_points(600, 0x5eed_1);
        let points: Vec<KdPoint<usize>> = coords
            .iter()
            .enumerate()
            .map(|(i, c)| KdPoint::new(*c, i))
            .collect();
        let tree = KdTree::build(points);

        let mut state = 0x5eed_2_u64;
        for _ in 0..40 {
            let query = [
                xorshift(&mut state) * 100.0,
                xorshift(&mut state) * 100.0,
                xorshift(&mut state) * 100.0,
            ];
            let radius = xorshift(&mut state) * 40.0;

            let mut found: Vec<usize> = tree
                .range_search(&query, radius)
                .iter()
                .map(|p| *p.data())
                .collect();
            found.sort_unstable();

            let mut expected: Vec<usize> = coords
                .iter()
                .enumerate()
                .filter(|(_, c)| distance(c, &query) <= radius)
                .map(|(i, _)| i)
                .collect();
            expected.sort_unstable();

            assert_eq!(
                found, expected,
                "range mismatch for query {query:?} radius {radius}"
            );
        }
    }

    #[test]
    fn nearest_matches_brute_force() {
        let coords = random_points(400, 0xabcd_ef);
        let points: Vec<KdPoint<usize>> = coords
            .iter()
            .enumerate()
            .map(|(i, c)| KdPoint::new(*c, i))
            .collect();
        let tree = KdTree::build(points);

        let mut state = 0xfeed_beef_u64;
        for _ in 0..60 {
            let query = [
                xorshift(&mut state) * 100.0,
                xorshift(&mut state) * 100.0,
                xorshift(&mut state) * 100.0,
            ];

            let found = tree.nearest(&query).unwrap();
            let best_dist = coords
                .iter()
                .map(|c| distance(c, &query))
                .fold(f64::INFINITY, f64::min);

            assert!(
                (found.distance_to(&query) - best_dist).abs() < 1e-9,
                "nearest returned {} but brute force found {best_dist}",
                found.distance_to(&query)
            );
        }
    }

    #[test]
    fn nearest_finds_every_indexed_point_exactly() {
        let coords = random_points(100, 42);
        let points: Vec<KdPoint<usize>> = coords
            .iter()
            .enumerate()
            .map(|(i, c)| KdPoint::new(*c, i))
            .collect();
        let tree = KdTree::build(points);

        for (i, c) in coords.iter().enumerate() {
            let found = tree.nearest(c).unwrap();
            assert_eq!(*found.data(), i);
            assert!(found.distance_sq_to(c) < 1e-15);
        }
    }

    #[test]
    fn degenerate_collinear_points() {
        // All points share y and z; the axis cycling must still keep the
        // tree queryable when two of three axes carry no information.
        let points: Vec<KdPoint<usize>> = (0..50)
            .map(|i| KdPoint::new([i as f64, 0.0, 0.0], i))
            .collect();
        let tree = KdTree::build(points);

        let results = tree.range_search(&[25.0, 0.0, 0.0], 3.0);
        let mut found: Vec<usize> = results.iter().map(|p| *p.data()).collect();
        found.sort_unstable();
        assert_eq!(found, vec![22, 23, 24, 25, 26, 27, 28]);

        assert_eq!(*tree.nearest(&[25.4, 0.0, 0.0]).unwrap().data(), 25);
    }

    #[test]
    fn distance_helper() {
        assert!((distance(&[0.0, 0.0, 0.0], &[3.0, 4.0, 0.0]) - 5.0).abs() < 1e-12);
        assert_eq!(distance(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]), 0.0);
    }
}
