//! Static 3-D k-d tree for radius queries on the unit sphere.
//!
//! Sky positions are stored as unit vectors, so an angular radius `r` becomes
//! the chord distance `2 sin(r / 2)` and distances stay Euclidean.

/// Convert longitude/latitude in radians to a unit vector
#[must_use]
pub fn unit_vector(lon: f64, lat: f64) -> [f64; 3] {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat]
}

/// Chord length subtending `angle` radians on the unit sphere
#[must_use]
pub fn chord_length(angle: f64) -> f64 {
    2.0 * (angle.min(std::f64::consts::PI) / 2.0).sin()
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        axis: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

/// Balanced k-d tree over 3-D points, each carrying a row id
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<[f64; 3]>,
    ids: Vec<usize>,
    nodes: Vec<Node>,
    leaf_size: usize,
}

impl KdTree {
    /// Build from `(row id, point)` pairs. Leaves hold at most `leaf_size` points.
    pub fn build(entries: impl IntoIterator<Item = (usize, [f64; 3])>, leaf_size: usize) -> Self {
        let (ids, points): (Vec<usize>, Vec<[f64; 3]>) = entries.into_iter().unzip();
        let mut tree = Self {
            points,
            ids,
            nodes: Vec::new(),
            leaf_size: leaf_size.max(1),
        };
        if !tree.points.is_empty() {
            tree.build_node(0, tree.points.len());
        }
        tree
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn build_node(&mut self, start: usize, end: usize) -> usize {
        let node_idx = self.nodes.len();
        if end - start <= self.leaf_size {
            self.nodes.push(Node::Leaf { start, end });
            return node_idx;
        }

        let axis = self.widest_axis(start, end);
        let mid = start + (end - start) / 2;

        // Reorder points and ids together around the median
        let mut order: Vec<usize> = (start..end).collect();
        order.select_nth_unstable_by(mid - start, |&a, &b| {
            self.points[a][axis].total_cmp(&self.points[b][axis])
        });
        let points: Vec<[f64; 3]> = order.iter().map(|&i| self.points[i]).collect();
        let ids: Vec<usize> = order.iter().map(|&i| self.ids[i]).collect();
        self.points[start..end].copy_from_slice(&points);
        self.ids[start..end].copy_from_slice(&ids);

        let value = self.points[mid][axis];
        self.nodes.push(Node::Split {
            axis,
            value,
            left: 0,
            right: 0,
        });
        let left = self.build_node(start, mid);
        let right = self.build_node(mid, end);
        if let Node::Split {
            left: l, right: r, ..
        } = &mut self.nodes[node_idx]
        {
            *l = left;
            *r = right;
        }
        node_idx
    }

    fn widest_axis(&self, start: usize, end: usize) -> usize {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for p in &self.points[start..end] {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(p[axis]);
                hi[axis] = hi[axis].max(p[axis]);
            }
        }
        (0..3)
            .max_by(|&a, &b| (hi[a] - lo[a]).total_cmp(&(hi[b] - lo[b])))
            .unwrap_or(0)
    }

    /// Ids of all points within Euclidean distance `radius` of `center`, sorted ascending
    #[must_use]
    pub fn within(&self, center: [f64; 3], radius: f64) -> Vec<usize> {
        let mut found = Vec::new();
        if self.nodes.is_empty() {
            return found;
        }
        let r2 = radius * radius;
        let mut stack = vec![0];
        while let Some(node_idx) = stack.pop() {
            match self.nodes[node_idx] {
                Node::Leaf { start, end } => {
                    for i in start..end {
                        if distance_squared(&self.points[i], &center) <= r2 {
                            found.push(self.ids[i]);
                        }
                    }
                }
                Node::Split {
                    axis,
                    value,
                    left,
                    right,
                } => {
                    if center[axis] - radius <= value {
                        stack.push(left);
                    }
                    if center[axis] + radius >= value {
                        stack.push(right);
                    }
                }
            }
        }
        found.sort_unstable();
        found
    }
}

fn distance_squared(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|i| (a[i] - b[i]) * (a[i] - b[i])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let points: Vec<[f64; 3]> = (0..2_000)
            .map(|_| {
                unit_vector(
                    rng.random_range(0.0..std::f64::consts::TAU),
                    rng.random_range(-1.5..1.5),
                )
            })
            .collect();
        let tree = KdTree::build(points.iter().copied().enumerate(), 16);
        let radius = chord_length(10f64.to_radians());

        for center in points.iter().step_by(97) {
            let expected: Vec<usize> = points
                .iter()
                .enumerate()
                .filter(|(_, p)| distance_squared(p, center) <= radius * radius)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(tree.within(*center, radius), expected);
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(std::iter::empty(), 8);
        assert!(tree.is_empty());
        assert!(tree.within([1.0, 0.0, 0.0], 1.0).is_empty());
    }
}
