// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Graph analytics: card centrality and combo packages
//!
//! Centrality is measured on the card co-occurrence graph, where two cards
//! are adjacent when some combo uses both and the edge weight counts those
//! combos.
//!
//! - degree: share of all combos that use the card
//! - betweenness: Brandes (2001), unweighted shortest paths, normalized to
//!   [0, 1]; sampled from evenly spaced sources on large graphs
//! - eigenvector: power iteration on `A + I`, L2-normalized

use crate::config::QuerySettings;
use crate::graph::{CardIdx, ComboGraph, ComboIdx};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;
use tracing::{info, warn};

/// Per-card centrality scores for one graph snapshot, indexed by card
#[derive(Debug, Clone, PartialEq)]
pub struct CentralityTable {
    /// Fraction of combos touching each card
    pub degree: Vec<f64>,
    /// Normalized betweenness on the co-occurrence graph
    pub betweenness: Vec<f64>,
    /// Eigenvector centrality on the co-occurrence graph
    pub eigenvector: Vec<f64>,
    /// Betweenness was estimated from a subset of sources
    pub betweenness_sampled: bool,
    /// Power iteration converged (otherwise `eigenvector` holds degree)
    pub eigenvector_converged: bool,
}

/// Build the weighted card co-occurrence graph. Node `i` is card `i`.
#[must_use]
pub fn card_projection(graph: &ComboGraph) -> UnGraph<CardIdx, u32> {
    let mut weights: HashMap<(CardIdx, CardIdx), u32> = HashMap::new();
    for combo in 0..graph.combo_count() {
        let cards = graph.cards_of(combo);
        for (i, &a) in cards.iter().enumerate() {
            for &b in &cards[i + 1..] {
                let key = if a < b { (a, b) } else { (b, a) };
                *weights.entry(key).or_default() += 1;
            }
        }
    }

    let mut edges: Vec<((CardIdx, CardIdx), u32)> = weights.into_iter().collect();
    edges.sort_unstable();

    let mut projection = UnGraph::with_capacity(graph.card_count(), edges.len());
    for card in 0..graph.card_count() {
        projection.add_node(card);
    }
    for ((a, b), w) in edges {
        projection.add_edge(NodeIndex::new(a), NodeIndex::new(b), w);
    }
    projection
}

/// Compute every centrality measure for a graph
#[must_use]
pub fn compute_centrality(graph: &ComboGraph, settings: &QuerySettings) -> CentralityTable {
    let started = Instant::now();
    let total = graph.combo_count().max(1) as f64;
    let degree: Vec<f64> = (0..graph.card_count())
        .map(|card| graph.combos_with_card(card).len() as f64 / total)
        .collect();

    let projection = card_projection(graph);
    let (betweenness, betweenness_sampled) =
        betweenness(&projection, settings.exact_betweenness_limit.max(1));

    let (eigenvector, eigenvector_converged) = match eigenvector(
        &projection,
        settings.eigenvector_max_iter,
        settings.eigenvector_tolerance,
    ) {
        Some(scores) => (scores, true),
        None => {
            warn!("Eigenvector centrality did not converge, falling back to degree");
            (degree.clone(), false)
        }
    };

    info!(
        cards = projection.node_count(),
        links = projection.edge_count(),
        sampled = betweenness_sampled,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Computed card centrality"
    );

    CentralityTable {
        degree,
        betweenness,
        eigenvector,
        betweenness_sampled,
        eigenvector_converged,
    }
}

/// Brandes betweenness, normalized for an undirected graph.
///
/// With more than `max_sources` nodes, only `max_sources` evenly spaced
/// sources are expanded and the result is scaled up; the flag reports it.
#[must_use]
pub fn betweenness<N, E>(graph: &UnGraph<N, E>, max_sources: usize) -> (Vec<f64>, bool) {
    let n = graph.node_count();
    let mut scores = vec![0.0_f64; n];
    if n <= 2 {
        return (scores, false);
    }

    let sampled = n > max_sources;
    let sources: Vec<usize> = if sampled {
        (0..max_sources).map(|i| i * n / max_sources).collect()
    } else {
        (0..n).collect()
    };

    let adjacency: Vec<Vec<usize>> = (0..n)
        .map(|v| {
            graph
                .neighbors(NodeIndex::new(v))
                .map(NodeIndex::index)
                .collect()
        })
        .collect();

    let mut sigma = vec![0.0_f64; n];
    let mut dist = vec![usize::MAX; n];
    let mut delta = vec![0.0_f64; n];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut stack = Vec::with_capacity(n);
    let mut queue = VecDeque::new();

    for &s in &sources {
        for v in 0..n {
            sigma[v] = 0.0;
            dist[v] = usize::MAX;
            delta[v] = 0.0;
            preds[v].clear();
        }
        sigma[s] = 1.0;
        dist[s] = 0;
        queue.push_back(s);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &adjacency[v] {
                if dist[w] == usize::MAX {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    preds[w].push(v);
                }
            }
        }

        while let Some(w) = stack.pop() {
            for &v in &preds[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                scores[w] += delta[w];
            }
        }
    }

    // Each unordered pair is counted from both ends
    let mut scale = 1.0 / ((n - 1) * (n - 2)) as f64;
    if sampled {
        scale *= n as f64 / sources.len() as f64;
    }
    for score in &mut scores {
        *score *= scale;
    }

    (scores, sampled)
}

/// Weighted eigenvector centrality by power iteration on `A + I`.
///
/// Returns `None` when the iteration has not converged after `max_iter`
/// rounds (total change below `n * tolerance`).
#[must_use]
pub fn eigenvector<N>(graph: &UnGraph<N, u32>, max_iter: usize, tolerance: f64) -> Option<Vec<f64>> {
    let n = graph.node_count();
    if n == 0 {
        return Some(Vec::new());
    }

    let mut x = vec![1.0 / n as f64; n];
    for _ in 0..max_iter {
        let mut next = x.clone();
        for edge in graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            let w = f64::from(*edge.weight());
            next[b] += x[a] * w;
            next[a] += x[b] * w;
        }

        let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            return None;
        }
        for v in &mut next {
            *v /= norm;
        }

        let change: f64 = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if change < n as f64 * tolerance {
            return Some(x);
        }
    }

    None
}

// =============================================================================
// Packages
// =============================================================================

/// A connected cluster of combos under a shared-card threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Member combo ids, ascending
    pub combo_ids: Vec<String>,
    /// Number of members
    pub combo_count: usize,
    /// Distinct cards across all members
    pub total_unique_cards: usize,
    /// Cards used by more than one member
    pub core_cards: Vec<String>,
    /// Every card used by a member, sorted
    pub all_cards: Vec<String>,
}

/// Summarize a set of combos as a package
#[must_use]
pub fn package_from(graph: &ComboGraph, members: &[ComboIdx]) -> Package {
    let mut usage: BTreeMap<CardIdx, usize> = BTreeMap::new();
    for &combo in members {
        for &card in graph.cards_of(combo) {
            *usage.entry(card).or_default() += 1;
        }
    }

    let mut combo_ids: Vec<String> = members
        .iter()
        .map(|&c| graph.combo_at(c).id.clone())
        .collect();
    combo_ids.sort();

    Package {
        combo_count: combo_ids.len(),
        combo_ids,
        total_unique_cards: usage.len(),
        core_cards: usage
            .iter()
            .filter(|(_, &count)| count > 1)
            .map(|(&card, _)| graph.card_name(card).to_string())
            .collect(),
        all_cards: usage
            .keys()
            .map(|&card| graph.card_name(card).to_string())
            .collect(),
    }
}

/// Every package with at least two members, largest first
#[must_use]
pub fn find_packages(graph: &ComboGraph, min_shared: usize) -> Vec<Package> {
    let started = Instant::now();
    let packages: Vec<Package> = graph
        .components(min_shared)
        .into_iter()
        .filter(|members| members.len() >= 2)
        .map(|members| package_from(graph, &members))
        .collect();

    info!(
        min_shared,
        packages = packages.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Found combo packages"
    );
    packages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{make_combo, scenario};

    fn path_graph() -> ComboGraph {
        // Projection: A - B - C
        ComboGraph::build(vec![make_combo("1", &["A", "B"]), make_combo("2", &["B", "C"])]).unwrap()
    }

    #[test]
    fn test_card_projection_weights() {
        let graph = ComboGraph::build(vec![
            make_combo("1", &["A", "B"]),
            make_combo("2", &["A", "B", "C"]),
        ])
        .unwrap();
        let projection = card_projection(&graph);

        assert_eq!(projection.node_count(), 3);
        assert_eq!(projection.edge_count(), 3);
        let ab = projection
            .find_edge(NodeIndex::new(0), NodeIndex::new(1))
            .unwrap();
        assert_eq!(projection[ab], 2);
    }

    #[test]
    fn test_betweenness_path_center() {
        let projection = card_projection(&path_graph());
        let (scores, sampled) = betweenness(&projection, 100);

        assert!(!sampled);
        assert!((scores[1] - 1.0).abs() < 1e-9);
        assert!(scores[0].abs() < 1e-9);
        assert!(scores[2].abs() < 1e-9);
    }

    #[test]
    fn test_betweenness_sampling_flag() {
        let projection = card_projection(&path_graph());
        let (scores, sampled) = betweenness(&projection, 1);

        assert!(sampled);
        assert!(scores.iter().all(|s| s.is_finite() && *s >= 0.0));
    }

    #[test]
    fn test_eigenvector_path() {
        let projection = card_projection(&path_graph());
        let scores = eigenvector(&projection, 1000, 1e-9).unwrap();

        assert!((scores[1] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3);
        assert!((scores[0] - 0.5).abs() < 1e-3);
        assert!((scores[0] - scores[2]).abs() < 1e-9);
    }

    #[test]
    fn test_eigenvector_not_converged() {
        let projection = card_projection(&path_graph());
        assert!(eigenvector(&projection, 1, 1e-15).is_none());
    }

    #[test]
    fn test_compute_centrality_degree() {
        let graph = ComboGraph::build(scenario()).unwrap();
        let table = compute_centrality(&graph, &QuerySettings::default());
        let scepter = graph.card_index_of("Isochron Scepter").unwrap();

        assert!((table.degree[scepter] - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(table.betweenness.len(), graph.card_count());
        assert!(table.eigenvector_converged);
    }

    #[test]
    fn test_package_core_cards() {
        let graph = ComboGraph::build(vec![
            make_combo("1", &["A", "B", "X"]),
            make_combo("2", &["A", "B", "Y"]),
            make_combo("3", &["B", "Z"]),
        ])
        .unwrap();

        let package = package_from(&graph, &[0, 1, 2]);

        assert_eq!(package.combo_count, 3);
        assert_eq!(package.total_unique_cards, 5);
        assert_eq!(package.core_cards, vec!["A", "B"]);
        assert_eq!(package.all_cards, vec!["A", "B", "X", "Y", "Z"]);
    }

    #[test]
    fn test_find_packages_excludes_singletons() {
        let graph = ComboGraph::build(scenario()).unwrap();
        let packages = find_packages(&graph, 1);

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].combo_ids, vec!["C1", "C2"]);
        assert_eq!(packages[0].core_cards, vec!["Isochron Scepter"]);
    }
}
