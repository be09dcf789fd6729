// src/core/layout.rs
//! Deterministic 3D layout
//!
//! Clusters are spread on a golden-angle spiral in the horizontal plane and
//! each cluster's members sit on a Fibonacci sphere around its center. No
//! iterative relaxation is involved, so the same node order always produces
//! the same positions.

use indexmap::IndexMap;
use std::f64::consts::PI;

use super::model::GraphNode;

const GOLDEN_ANGLE: f64 = 2.4;

type Point = [f64; 3];

/// Pseudo-random value in `[0, 1)` that depends only on `seed`
pub fn seeded_float(seed: u64) -> f64 {
    let x = ((seed as f64) * 12.9898 + 78.233).sin() * 43758.5453;
    x - x.floor()
}

/// Assign a position to every node
///
/// When the layout spreads beyond `2 * max_extent` along any axis it is
/// rescaled and re-centred to fit.
pub fn compute_layout(nodes: &[GraphNode], max_extent: f64) -> Vec<GraphNode> {
    match nodes.len() {
        0 => return Vec::new(),
        1 => {
            return vec![GraphNode {
                position: [0.0, 0.0, 0.0],
                ..nodes[0].clone()
            }]
        }
        _ => {}
    }

    let mut clusters: IndexMap<usize, Vec<usize>> = IndexMap::new();
    for (i, node) in nodes.iter().enumerate() {
        clusters.entry(node.cluster).or_default().push(i);
    }

    let cluster_count = clusters.len();
    let mut positions: Vec<Point> = vec![[0.0; 3]; nodes.len()];

    for (cluster_idx, members) in clusters.values().enumerate() {
        let center = cluster_center(cluster_idx, cluster_count);
        for (local_idx, &node_idx) in members.iter().enumerate() {
            positions[node_idx] = member_position(center, local_idx, members.len(), node_idx);
        }
    }

    scale_to_fit(&mut positions, max_extent);

    nodes
        .iter()
        .zip(positions)
        .map(|(node, position)| GraphNode {
            position,
            ..node.clone()
        })
        .collect()
}

fn cluster_center(index: usize, total: usize) -> Point {
    if total == 1 {
        return [0.0, 0.0, 0.0];
    }

    let seed = index as u64;
    let theta = index as f64 * GOLDEN_ANGLE;
    let radius = 4.0 + (total as f64).sqrt() * 2.2 + seeded_float(seed * 7 + 13) * 2.0;
    let y = (seeded_float(seed * 11 + 3) - 0.5) * 6.0;

    [radius * theta.cos(), y, radius * theta.sin()]
}

fn member_position(center: Point, local_index: usize, group_size: usize, node_index: usize) -> Point {
    if group_size == 1 {
        return center;
    }

    let n = group_size as f64;
    let i = local_index as f64;
    let radius = 0.6 + n.sqrt() * 0.45;
    let phi = (1.0 - 2.0 * (i + 0.5) / n).acos();
    let theta = PI * (1.0 + 5f64.sqrt()) * i;

    let seed = node_index as u64;
    let jitter = |mult: u64, offset: u64| (seeded_float(seed * mult + offset) - 0.5) * 0.3;

    [
        center[0] + radius * phi.sin() * theta.cos() + jitter(3, 1),
        center[1] + radius * phi.sin() * theta.sin() + jitter(5, 2),
        center[2] + radius * phi.cos() + jitter(7, 3),
    ]
}

fn scale_to_fit(positions: &mut [Point], max_extent: f64) {
    if positions.is_empty() {
        return;
    }

    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for p in positions.iter() {
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }

    let max_range = (0..3)
        .map(|axis| max[axis] - min[axis])
        .fold(0.0_f64, f64::max);

    if max_range <= max_extent * 2.0 {
        return;
    }

    let scale = (max_extent * 2.0) / max_range;
    let center: Point = [
        (min[0] + max[0]) / 2.0,
        (min[1] + max[1]) / 2.0,
        (min[2] + max[2]) / 2.0,
    ];

    for p in positions.iter_mut() {
        for axis in 0..3 {
            p[axis] = (p[axis] - center[axis]) * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(i: usize, cluster: usize) -> GraphNode {
        GraphNode {
            id: i.to_string(),
            path: format!("c{}/f{}.ts", cluster, i),
            name: format!("f{}.ts", i),
            extension: "ts".to_string(),
            size: 0,
            lines: 1,
            complexity: 0,
            cluster,
            position: [0.0; 3],
            deps: 0,
            dependents: 0,
        }
    }

    fn extent(nodes: &[GraphNode]) -> f64 {
        (0..3)
            .map(|axis| {
                let lo = nodes.iter().map(|n| n.position[axis]).fold(f64::INFINITY, f64::min);
                let hi = nodes.iter().map(|n| n.position[axis]).fold(f64::NEG_INFINITY, f64::max);
                hi - lo
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_seeded_float_range_and_purity() {
        for seed in 0..1000 {
            let v = seeded_float(seed);
            assert!((0.0..1.0).contains(&v));
            assert_eq!(v, seeded_float(seed));
        }
        assert_ne!(seeded_float(1), seeded_float(2));
    }

    #[test]
    fn test_empty_and_single() {
        assert!(compute_layout(&[], 15.0).is_empty());

        let mut lone = node(0, 3);
        lone.position = [4.0, 5.0, 6.0];
        let out = compute_layout(&[lone], 15.0);
        assert_eq!(out[0].position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let nodes: Vec<GraphNode> = (0..50).map(|i| node(i, i % 4)).collect();
        let first = compute_layout(&nodes, 15.0);
        let second = compute_layout(&nodes, 15.0);

        let a: Vec<Point> = first.iter().map(|n| n.position).collect();
        let b: Vec<Point> = second.iter().map(|n| n.position).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_cluster_centres_on_origin() {
        let nodes: Vec<GraphNode> = (0..8).map(|i| node(i, 0)).collect();
        let out = compute_layout(&nodes, 15.0);

        let centroid: Vec<f64> = (0..3)
            .map(|axis| out.iter().map(|n| n.position[axis]).sum::<f64>() / out.len() as f64)
            .collect();
        for c in centroid {
            assert!(c.abs() < 1.0, "centroid drifted to {}", c);
        }
    }

    #[test]
    fn test_clusters_are_separated() {
        let nodes: Vec<GraphNode> = (0..20).map(|i| node(i, i / 10)).collect();
        let out = compute_layout(&nodes, 15.0);

        let mean = |range: std::ops::Range<usize>| -> Point {
            let len = range.len() as f64;
            let mut acc = [0.0; 3];
            for i in range {
                for axis in 0..3 {
                    acc[axis] += out[i].position[axis] / len;
                }
            }
            acc
        };
        let a = mean(0..10);
        let b = mean(10..20);
        let dist = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt();
        assert!(dist > 4.0, "cluster centres only {} apart", dist);
    }

    #[test]
    fn test_large_layouts_are_rescaled() {
        let nodes: Vec<GraphNode> = (0..400).map(|i| node(i, i % 200)).collect();
        let out = compute_layout(&nodes, 15.0);
        assert!(extent(&out) <= 30.0 + 1e-9);
    }

    proptest! {
        #[test]
        fn prop_positions_finite_and_bounded(count in 2usize..120, clusters in 1usize..30) {
            let nodes: Vec<GraphNode> = (0..count).map(|i| node(i, i % clusters)).collect();
            let out = compute_layout(&nodes, 15.0);

            prop_assert_eq!(out.len(), count);
            for n in &out {
                prop_assert!(n.position.iter().all(|v| v.is_finite()));
            }
            prop_assert!(extent(&out) <= 30.0 + 1e-9);
        }
    }
}
