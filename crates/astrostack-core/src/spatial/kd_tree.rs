use std::cmp::Ordering;
use std::collections::BinaryHeap;

use num_traits::ToPrimitive;

use crate::error::{Result, StackerError};

/// Exact k-nearest-neighbor index over `D`-dimensional points with a payload.
///
/// Two-phase protocol: insert every point with [`KdTree::add_point`], call
/// [`KdTree::build_tree_structure`] once, then query. Inserting after the
/// build or querying before it returns an error. Collecting an iterator of
/// `(coordinates, value)` pairs yields an already built tree.
#[derive(Clone, Debug)]
pub struct KdTree<T, const D: usize, V> {
    points: Vec<([T; D], V)>,
    nodes: Vec<KdNode>,
    root: Option<usize>,
    built: bool,
}

#[derive(Clone, Debug)]
struct KdNode {
    /// Index into the points array
    point_idx: usize,
    left: Option<usize>,
    right: Option<usize>,
    split_dim: usize,
}

/// One query result.
#[derive(Clone, Debug)]
pub struct Neighbor<'a, T, const D: usize, V> {
    pub coordinates: [T; D],
    pub value: &'a V,
    pub distance_squared: f64,
}

impl<T, const D: usize, V> Default for KdTree<T, D, V> {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            nodes: Vec::new(),
            root: None,
            built: false,
        }
    }
}

impl<T, const D: usize, V> FromIterator<([T; D], V)> for KdTree<T, D, V>
where
    T: Copy + PartialOrd + ToPrimitive,
{
    fn from_iter<I: IntoIterator<Item = ([T; D], V)>>(iter: I) -> Self {
        let mut tree = Self {
            points: iter.into_iter().collect(),
            ..Self::default()
        };
        tree.build_tree_structure();
        tree
    }
}

impl<T, const D: usize, V> KdTree<T, D, V>
where
    T: Copy + PartialOrd + ToPrimitive,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, coordinates: [T; D], value: V) -> Result<()> {
        if self.built {
            return Err(StackerError::TreeAlreadyBuilt);
        }
        self.points.push((coordinates, value));
        Ok(())
    }

    /// Build the balanced tree by recursive median split on cycling axes.
    pub fn build_tree_structure(&mut self) {
        let mut indices: Vec<usize> = (0..self.points.len()).collect();
        let mut nodes = Vec::with_capacity(self.points.len());
        self.root = Self::build_recursive(&self.points, &mut indices, 0, &mut nodes);
        self.nodes = nodes;
        self.built = true;
    }

    fn build_recursive(
        points: &[([T; D], V)],
        indices: &mut [usize],
        depth: usize,
        nodes: &mut Vec<KdNode>,
    ) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }

        let split_dim = if D == 0 { 0 } else { depth % D };
        indices.sort_by(|&a, &b| {
            points[a].0[split_dim]
                .partial_cmp(&points[b].0[split_dim])
                .unwrap_or(Ordering::Equal)
        });

        let median = indices.len() / 2;
        let node_idx = nodes.len();
        nodes.push(KdNode {
            point_idx: indices[median],
            left: None,
            right: None,
            split_dim,
        });

        let (left_indices, right_part) = indices.split_at_mut(median);
        let right_indices = &mut right_part[1..];

        let left = Self::build_recursive(points, left_indices, depth + 1, nodes);
        let right = Self::build_recursive(points, right_indices, depth + 1, nodes);
        nodes[node_idx].left = left;
        nodes[node_idx].right = right;

        Some(node_idx)
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Up to `k` points ordered by ascending distance to `query`.
    ///
    /// Asking for more points than the tree holds returns all of them.
    pub fn get_k_nearest_neighbors(
        &self,
        query: &[T; D],
        k: usize,
    ) -> Result<Vec<Neighbor<'_, T, D, V>>> {
        if !self.built {
            return Err(StackerError::TreeNotBuilt);
        }
        let Some(root) = self.root else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let capacity = k.min(self.points.len());
        let mut heap = BinaryHeap::with_capacity(capacity + 1);
        self.k_nearest_recursive(root, query, capacity, &mut heap);

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| self.neighbor(c.idx, c.dist_sq))
            .collect())
    }

    fn k_nearest_recursive(
        &self,
        node_idx: usize,
        query: &[T; D],
        k: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        let node = &self.nodes[node_idx];
        let point = &self.points[node.point_idx].0;
        heap.push(Candidate {
            dist_sq: distance_squared(query, point),
            idx: node.point_idx,
        });
        if heap.len() > k {
            heap.pop();
        }

        let diff = axis_difference(query, point, node.split_dim);
        let (first, second) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(first_idx) = first {
            self.k_nearest_recursive(first_idx, query, k, heap);
        }
        if let Some(second_idx) = second {
            let worst = heap.peek().map_or(f64::INFINITY, |c| c.dist_sq);
            if heap.len() < k || diff * diff < worst {
                self.k_nearest_recursive(second_idx, query, k, heap);
            }
        }
    }

    /// All points within `radius` of `query`, ordered by ascending distance.
    pub fn get_points_within(
        &self,
        query: &[T; D],
        radius: f64,
    ) -> Result<Vec<Neighbor<'_, T, D, V>>> {
        if !self.built {
            return Err(StackerError::TreeNotBuilt);
        }
        let mut found = Vec::new();
        if let Some(root) = self.root {
            self.radius_recursive(root, query, radius * radius, &mut found);
        }
        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(found
            .into_iter()
            .map(|(idx, dist_sq)| self.neighbor(idx, dist_sq))
            .collect())
    }

    fn radius_recursive(
        &self,
        node_idx: usize,
        query: &[T; D],
        radius_sq: f64,
        found: &mut Vec<(usize, f64)>,
    ) {
        let node = &self.nodes[node_idx];
        let point = &self.points[node.point_idx].0;
        let dist_sq = distance_squared(query, point);
        if dist_sq <= radius_sq {
            found.push((node.point_idx, dist_sq));
        }

        let diff = axis_difference(query, point, node.split_dim);
        let diff_sq = diff * diff;
        if let Some(left) = node.left {
            if diff <= 0.0 || diff_sq <= radius_sq {
                self.radius_recursive(left, query, radius_sq, found);
            }
        }
        if let Some(right) = node.right {
            if diff >= 0.0 || diff_sq <= radius_sq {
                self.radius_recursive(right, query, radius_sq, found);
            }
        }
    }

    fn neighbor(&self, idx: usize, distance_squared: f64) -> Neighbor<'_, T, D, V> {
        let (coordinates, value) = &self.points[idx];
        Neighbor {
            coordinates: *coordinates,
            value,
            distance_squared,
        }
    }
}

#[inline]
fn to_f64<T: ToPrimitive>(v: T) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

#[inline]
fn axis_difference<T: Copy + ToPrimitive, const D: usize>(a: &[T; D], b: &[T; D], axis: usize) -> f64 {
    to_f64(a[axis]) - to_f64(b[axis])
}

#[inline]
fn distance_squared<T: Copy + ToPrimitive, const D: usize>(a: &[T; D], b: &[T; D]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = to_f64(x) - to_f64(y);
            d * d
        })
        .sum()
}

/// Heap entry ordered by distance, so the farthest kept point sits on top.
#[derive(Debug)]
struct Candidate {
    dist_sq: f64,
    idx: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.idx.cmp(&other.idx))
    }
}
