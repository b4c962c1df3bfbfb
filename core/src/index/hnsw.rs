use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_M: usize = 16;
pub(crate) const DEFAULT_EF_CONSTRUCTION: usize = 100;
const MAX_LEVEL: usize = 16;

/// Layered proximity graph over the nodes `0..len` of one partition.
///
/// The graph stores topology only; callers supply distances through
/// closures so the same graph can be walked with exact or quantized
/// vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct HnswGraph {
    m: usize,
    entry_point: Option<u32>,
    max_level: usize,
    /// `links[node][level]` holds the neighbors of `node` on `level`.
    links: Vec<Vec<Vec<u32>>>,
}

impl HnswGraph {
    pub(crate) fn build(
        len: usize,
        m: usize,
        ef_construction: usize,
        seed: u64,
        distance: impl Fn(usize, usize) -> f32,
    ) -> Self {
        let m = m.max(2);
        let mut graph = Self {
            m,
            entry_point: None,
            max_level: 0,
            links: Vec::with_capacity(len),
        };

        for node in 0..len {
            let level = random_level(seed, node as u64, m);
            graph.links.push(vec![Vec::new(); level + 1]);

            let Some(entry) = graph.entry_point else {
                graph.entry_point = Some(node as u32);
                graph.max_level = level;
                continue;
            };

            let to_node = |other: usize| distance(node, other);
            let mut nearest = vec![Scored::new(entry as usize, to_node(entry as usize))];
            for layer in (level + 1..=graph.max_level).rev() {
                nearest = graph.search_layer(&nearest, 1, layer, &to_node);
            }

            for layer in (0..=level.min(graph.max_level)).rev() {
                let found = graph.search_layer(&nearest, ef_construction.max(m), layer, &to_node);
                let keep = graph.max_links(layer).min(m);
                let neighbors: Vec<u32> = found.iter().take(keep).map(|c| c.node as u32).collect();
                for neighbor in &neighbors {
                    graph.connect(*neighbor as usize, node, layer, &distance);
                }
                graph.links[node][layer] = neighbors;
                nearest = found;
            }

            if level > graph.max_level {
                graph.max_level = level;
                graph.entry_point = Some(node as u32);
            }
        }
        graph
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    /// Returns up to `ef` nodes closest to the query, nearest first.
    pub(crate) fn search(&self, ef: usize, distance: impl Fn(usize) -> f32) -> Vec<(usize, f32)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        let mut nearest = vec![Scored::new(entry as usize, distance(entry as usize))];
        for layer in (1..=self.max_level).rev() {
            nearest = self.search_layer(&nearest, 1, layer, &distance);
        }
        self.search_layer(&nearest, ef.max(1), 0, &distance)
            .into_iter()
            .map(|candidate| (candidate.node, candidate.distance))
            .collect()
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }

    fn connect(
        &mut self,
        from: usize,
        to: usize,
        layer: usize,
        distance: &impl Fn(usize, usize) -> f32,
    ) {
        let max_links = self.max_links(layer);
        let Some(links) = self.links[from].get_mut(layer) else {
            return;
        };
        links.push(to as u32);
        if links.len() <= max_links {
            return;
        }
        let mut scored: Vec<Scored> = links
            .iter()
            .map(|other| Scored::new(*other as usize, distance(from, *other as usize)))
            .collect();
        scored.sort();
        scored.truncate(max_links);
        *links = scored.into_iter().map(|c| c.node as u32).collect();
    }

    /// Best-first beam search on one layer, nearest first.
    fn search_layer(
        &self,
        entry: &[Scored],
        ef: usize,
        layer: usize,
        distance: &impl Fn(usize) -> f32,
    ) -> Vec<Scored> {
        let mut visited = vec![false; self.links.len()];
        let mut frontier = BinaryHeap::new();
        let mut best = BinaryHeap::new();
        for candidate in entry {
            if visited[candidate.node] {
                continue;
            }
            visited[candidate.node] = true;
            frontier.push(std::cmp::Reverse(*candidate));
            best.push(*candidate);
        }
        while best.len() > ef {
            best.pop();
        }

        while let Some(std::cmp::Reverse(current)) = frontier.pop() {
            let worst = best.peek().map(|c: &Scored| c.distance).unwrap_or(f32::INFINITY);
            if best.len() >= ef && current.distance > worst {
                break;
            }
            let Some(neighbors) = self.links[current.node].get(layer) else {
                continue;
            };
            for neighbor in neighbors {
                let neighbor = *neighbor as usize;
                if visited[neighbor] {
                    continue;
                }
                visited[neighbor] = true;
                let candidate = Scored::new(neighbor, distance(neighbor));
                let worst = best.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
                if best.len() < ef || candidate.distance < worst {
                    frontier.push(std::cmp::Reverse(candidate));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }
}

fn random_level(seed: u64, node: u64, m: usize) -> usize {
    let mut z = seed ^ node.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    let uniform = ((z >> 11) as f64 + 0.5) / (1u64 << 53) as f64;
    let level = -uniform.ln() / (m as f64).ln();
    (level as usize).min(MAX_LEVEL)
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    node: usize,
    distance: f32,
}

impl Scored {
    fn new(node: usize, distance: f32) -> Self {
        Self { node, distance }
    }
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.node.cmp(&other.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(count: usize) -> Vec<[f32; 2]> {
        (0..count)
            .map(|idx| [(idx % 10) as f32, (idx / 10) as f32])
            .collect()
    }

    fn l2(left: &[f32; 2], right: &[f32; 2]) -> f32 {
        (left[0] - right[0]).powi(2) + (left[1] - right[1]).powi(2)
    }

    #[test]
    fn search_finds_exact_neighbor_on_grid() {
        let data = points(100);
        let graph = HnswGraph::build(data.len(), 8, 64, 7, |a, b| l2(&data[a], &data[b]));
        assert_eq!(graph.len(), 100);

        let query = [3.0f32, 4.0];
        let found = graph.search(16, |node| l2(&data[node], &query));
        assert_eq!(found.first().map(|(node, _)| *node), Some(43));
        assert!(found.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    }

    #[test]
    fn empty_graph_returns_nothing() {
        let graph = HnswGraph::build(0, 8, 64, 7, |_, _| 0.0);
        assert!(graph.search(10, |_| 0.0).is_empty());
    }
}
