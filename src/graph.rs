// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Graph data structures for the combo graph
//!
//! Combos and cards form a bipartite membership graph. The combo-to-combo
//! adjacency (two combos are neighbors when they share a card) is derived
//! from it once at build time. Combos and cards are stored in sorted order,
//! so the same records always produce the same indices regardless of how
//! the dataset ordered them.

use crate::error::LoadError;
use crate::types::Combo;
use petgraph::unionfind::UnionFind;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Index of a combo within a [`ComboGraph`]
pub type ComboIdx = usize;
/// Index of a card within a [`ComboGraph`]
pub type CardIdx = usize;

/// One adjacency entry: a neighboring combo and the cards shared with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    /// Neighboring combo
    pub combo: ComboIdx,
    /// Shared cards, ascending by card index (i.e. by name)
    pub shared: Vec<CardIdx>,
}

impl Neighbor {
    /// Number of shared cards (the edge weight)
    #[must_use]
    pub fn weight(&self) -> usize {
        self.shared.len()
    }
}

/// Immutable combo graph
#[derive(Debug, Clone)]
pub struct ComboGraph {
    /// Combos sorted by id
    combos: Vec<Combo>,
    combo_index: HashMap<String, ComboIdx>,
    /// Card names sorted
    cards: Vec<String>,
    card_index: HashMap<String, CardIdx>,
    /// Membership edges, combo side (record order)
    combo_cards: Vec<Vec<CardIdx>>,
    /// Membership edges, card side (ascending)
    card_combos: Vec<Vec<ComboIdx>>,
    /// Symmetric shared-card adjacency, each list ascending by combo
    adjacency: Vec<Vec<Neighbor>>,
    edge_count: usize,
}

impl ComboGraph {
    /// Build the graph from validated combos.
    ///
    /// Duplicate ids are rejected. Adjacency is found by inverting through
    /// the card index: only combos that share a card are ever paired, so the
    /// work is proportional to the sum of squared card popularity.
    pub fn build(mut combos: Vec<Combo>) -> Result<Self, LoadError> {
        combos.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(pair) = combos.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(LoadError::DuplicateComboId(pair[0].id.clone()));
        }
        if let Some(empty) = combos.iter().find(|c| c.card_names.is_empty()) {
            return Err(LoadError::EmptyCombo(empty.id.clone()));
        }

        let combo_index: HashMap<String, ComboIdx> = combos
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let mut cards: Vec<String> = combos
            .iter()
            .flat_map(|c| c.card_names.iter().cloned())
            .collect();
        cards.sort();
        cards.dedup();
        let card_index: HashMap<String, CardIdx> = cards
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let combo_cards: Vec<Vec<CardIdx>> = combos
            .iter()
            .map(|combo| {
                let mut seen = HashSet::new();
                combo
                    .card_names
                    .iter()
                    .map(|name| card_index[name.as_str()])
                    .filter(|idx| seen.insert(*idx))
                    .collect()
            })
            .collect();

        let mut card_combos: Vec<Vec<ComboIdx>> = vec![Vec::new(); cards.len()];
        for (combo, members) in combo_cards.iter().enumerate() {
            for &card in members {
                card_combos[card].push(combo);
            }
        }

        // Cards are visited in ascending order, so every shared list ends up sorted
        let mut pairs: HashMap<(ComboIdx, ComboIdx), Vec<CardIdx>> = HashMap::new();
        for (card, members) in card_combos.iter().enumerate() {
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    pairs.entry((a, b)).or_default().push(card);
                }
            }
        }

        let edge_count = pairs.len();
        let mut adjacency: Vec<Vec<Neighbor>> = vec![Vec::new(); combos.len()];
        for ((a, b), shared) in pairs {
            adjacency[a].push(Neighbor {
                combo: b,
                shared: shared.clone(),
            });
            adjacency[b].push(Neighbor { combo: a, shared });
        }
        for list in &mut adjacency {
            list.sort_by_key(|n| n.combo);
        }

        debug!(
            combos = combos.len(),
            cards = cards.len(),
            edges = edge_count,
            "Built combo graph"
        );

        Ok(Self {
            combos,
            combo_index,
            cards,
            card_index,
            combo_cards,
            card_combos,
            adjacency,
            edge_count,
        })
    }

    /// Get a combo by id
    #[must_use]
    pub fn combo(&self, id: &str) -> Option<&Combo> {
        self.index_of(id).map(|idx| &self.combos[idx])
    }

    /// Index of a combo id. Surrounding whitespace is ignored, as in the loader.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<ComboIdx> {
        self.combo_index.get(id.trim()).copied()
    }

    /// Combo at an index
    #[must_use]
    pub fn combo_at(&self, idx: ComboIdx) -> &Combo {
        &self.combos[idx]
    }

    /// All combos, sorted by id
    #[must_use]
    pub fn combos(&self) -> &[Combo] {
        &self.combos
    }

    /// All card names, sorted
    #[must_use]
    pub fn cards(&self) -> &[String] {
        &self.cards
    }

    /// Name of a card index
    #[must_use]
    pub fn card_name(&self, idx: CardIdx) -> &str {
        &self.cards[idx]
    }

    /// Index of a card name (exact match after trimming)
    #[must_use]
    pub fn card_index_of(&self, name: &str) -> Option<CardIdx> {
        self.card_index.get(name.trim()).copied()
    }

    /// Card indices of a combo, in record order
    #[must_use]
    pub fn cards_of(&self, combo: ComboIdx) -> &[CardIdx] {
        &self.combo_cards[combo]
    }

    /// Combos containing a card, ascending
    #[must_use]
    pub fn combos_with_card(&self, card: CardIdx) -> &[ComboIdx] {
        &self.card_combos[card]
    }

    /// Number of combos a card participates in (0 when unknown)
    #[must_use]
    pub fn combos_count(&self, name: &str) -> usize {
        self.card_index_of(name)
            .map_or(0, |idx| self.card_combos[idx].len())
    }

    /// Distance-1 neighbors of a combo, ascending by index
    #[must_use]
    pub fn neighbors(&self, combo: ComboIdx) -> &[Neighbor] {
        &self.adjacency[combo]
    }

    /// The adjacency entry from `a` to `b`, if they share a card
    #[must_use]
    pub fn edge_between(&self, a: ComboIdx, b: ComboIdx) -> Option<&Neighbor> {
        let list = &self.adjacency[a];
        list.binary_search_by_key(&b, |n| n.combo)
            .ok()
            .map(|pos| &list[pos])
    }

    /// Resolve card indices to names
    #[must_use]
    pub fn card_names_of(&self, cards: &[CardIdx]) -> Vec<String> {
        cards.iter().map(|&c| self.cards[c].clone()).collect()
    }

    /// Get combo count
    #[must_use]
    pub fn combo_count(&self) -> usize {
        self.combos.len()
    }

    /// Get distinct card count
    #[must_use]
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Get combo-to-combo edge count
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Get combo-to-card membership link count
    #[must_use]
    pub fn membership_count(&self) -> usize {
        self.combo_cards.iter().map(Vec::len).sum()
    }

    /// Connected components over edges sharing at least `min_shared` cards.
    ///
    /// Every combo belongs to exactly one component; isolated combos come
    /// back as singletons. Members are ascending; components are ordered by
    /// size (largest first), then by their first member.
    #[must_use]
    pub fn components(&self, min_shared: usize) -> Vec<Vec<ComboIdx>> {
        let mut sets = UnionFind::<ComboIdx>::new(self.combos.len());
        for (a, list) in self.adjacency.iter().enumerate() {
            for n in list.iter().filter(|n| n.combo > a && n.weight() >= min_shared) {
                sets.union(a, n.combo);
            }
        }

        let mut groups: HashMap<ComboIdx, Vec<ComboIdx>> = HashMap::new();
        for combo in 0..self.combos.len() {
            groups.entry(sets.find(combo)).or_default().push(combo);
        }

        let mut components: Vec<Vec<ComboIdx>> = groups.into_values().collect();
        components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
        components
    }

    /// Export the combo adjacency to DOT format for Graphviz
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("graph combos {\n");
        dot.push_str("  node [shape=box, style=rounded];\n\n");

        for combo in &self.combos {
            dot.push_str(&format!(
                "  \"{}\" [label=\"{}\\n{}\"];\n",
                escape(&combo.id),
                escape(&combo.id),
                combo.color_identity.label()
            ));
        }

        dot.push('\n');

        for (a, list) in self.adjacency.iter().enumerate() {
            for n in list.iter().filter(|n| n.combo > a) {
                dot.push_str(&format!(
                    "  \"{}\" -- \"{}\" [label=\"{}\", weight={}];\n",
                    escape(&self.combos[a].id),
                    escape(&self.combos[n.combo].id),
                    n.weight(),
                    n.weight()
                ));
            }
        }

        dot.push_str("}\n");
        dot
    }

    /// Export selected combos and their cards as a bipartite DOT graph.
    /// Unknown ids are ignored.
    #[must_use]
    pub fn subgraph_dot(&self, ids: &[String]) -> String {
        let selected: Vec<ComboIdx> = ids.iter().filter_map(|id| self.index_of(id)).collect();
        let mut cards: Vec<CardIdx> = selected
            .iter()
            .flat_map(|&c| self.combo_cards[c].iter().copied())
            .collect();
        cards.sort_unstable();
        cards.dedup();

        let mut dot = String::from("graph subgraph {\n");
        for &c in &selected {
            dot.push_str(&format!(
                "  \"combo:{}\" [shape=box, label=\"{}\"];\n",
                escape(&self.combos[c].id),
                escape(&self.combos[c].id)
            ));
        }
        for &card in &cards {
            dot.push_str(&format!(
                "  \"card:{}\" [shape=ellipse, label=\"{}\"];\n",
                escape(&self.cards[card]),
                escape(&self.cards[card])
            ));
        }
        dot.push('\n');
        for &c in &selected {
            for &card in &self.combo_cards[c] {
                dot.push_str(&format!(
                    "  \"combo:{}\" -- \"card:{}\";\n",
                    escape(&self.combos[c].id),
                    escape(&self.cards[card])
                ));
            }
        }
        dot.push_str("}\n");
        dot
    }

    /// Export the combo adjacency to JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        let edges: Vec<ExportEdge<'_>> = self
            .adjacency
            .iter()
            .enumerate()
            .flat_map(|(a, list)| {
                list.iter().filter(move |n| n.combo > a).map(move |n| ExportEdge {
                    from: &self.combos[a].id,
                    to: &self.combos[n.combo].id,
                    shared_cards: n.shared.iter().map(|&c| self.cards[c].as_str()).collect(),
                })
            })
            .collect();

        serde_json::to_string_pretty(&GraphExport {
            combos: &self.combos,
            edges,
        })
    }
}

#[derive(Serialize)]
struct GraphExport<'a> {
    combos: &'a [Combo],
    edges: Vec<ExportEdge<'a>>,
}

#[derive(Serialize)]
struct ExportEdge<'a> {
    from: &'a str,
    to: &'a str,
    shared_cards: Vec<&'a str>,
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::ColorIdentity;

    pub(crate) fn make_combo(id: &str, cards: &[&str]) -> Combo {
        Combo {
            id: id.into(),
            card_names: cards.iter().map(|c| (*c).to_string()).collect(),
            prerequisites: vec![],
            steps: vec![],
            produces: vec![],
            color_identity: ColorIdentity::colorless(),
            popularity: None,
            mana_needed: None,
            description: None,
        }
    }

    pub(crate) fn scenario() -> Vec<Combo> {
        vec![
            make_combo("C1", &["Sol Ring", "Isochron Scepter"]),
            make_combo("C2", &["Isochron Scepter", "Dramatic Reversal"]),
            make_combo("C3", &["Kiki-Jiki", "Restoration Angel"]),
        ]
    }

    #[test]
    fn test_build_indexes_cards_and_combos() {
        let graph = ComboGraph::build(scenario()).unwrap();

        assert_eq!(graph.combo_count(), 3);
        assert_eq!(graph.card_count(), 5);
        assert_eq!(graph.membership_count(), 6);
        assert_eq!(graph.combos_count("Isochron Scepter"), 2);
        assert_eq!(graph.combos_count("Sol Ring"), 1);
        assert_eq!(graph.combos_count("sol ring"), 0);
    }

    #[test]
    fn test_adjacency_is_symmetric_without_self_loops() {
        let graph = ComboGraph::build(scenario()).unwrap();
        let c1 = graph.index_of("C1").unwrap();
        let c2 = graph.index_of("C2").unwrap();
        let c3 = graph.index_of("C3").unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.neighbors(c1).len(), 1);
        assert_eq!(graph.neighbors(c1)[0].combo, c2);
        assert_eq!(graph.neighbors(c2)[0].combo, c1);
        assert!(graph.neighbors(c3).is_empty());
        assert_eq!(
            graph.card_names_of(&graph.edge_between(c1, c2).unwrap().shared),
            vec!["Isochron Scepter".to_string()]
        );
    }

    #[test]
    fn test_shared_cards_accumulate_per_pair() {
        let graph = ComboGraph::build(vec![
            make_combo("a", &["X", "Y", "Z"]),
            make_combo("b", &["Z", "Y", "W"]),
        ])
        .unwrap();

        let edge = graph.edge_between(0, 1).unwrap();
        assert_eq!(graph.card_names_of(&edge.shared), vec!["Y", "Z"]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = ComboGraph::build(vec![make_combo("a", &["X"]), make_combo("a", &["Y"])])
            .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateComboId(id) if id == "a"));
    }

    #[test]
    fn test_empty_combo_rejected() {
        let err = ComboGraph::build(vec![make_combo("a", &[])]).unwrap_err();
        assert!(matches!(err, LoadError::EmptyCombo(_)));
    }

    #[test]
    fn test_repeated_card_in_one_combo_is_not_a_self_loop() {
        let graph = ComboGraph::build(vec![make_combo("a", &["X", "X"])]).unwrap();
        assert!(graph.neighbors(0).is_empty());
        assert_eq!(graph.combos_count("X"), 1);
    }

    #[test]
    fn test_components_threshold() {
        let graph = ComboGraph::build(vec![
            make_combo("a", &["X", "Y"]),
            make_combo("b", &["X", "Y", "Z"]),
            make_combo("c", &["Z"]),
        ])
        .unwrap();

        let loose = graph.components(1);
        assert_eq!(loose, vec![vec![0, 1, 2]]);

        let tight = graph.components(2);
        assert_eq!(tight, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_to_dot() {
        let graph = ComboGraph::build(scenario()).unwrap();
        let dot = graph.to_dot();

        assert!(dot.contains("graph combos"));
        assert!(dot.contains("\"C1\" -- \"C2\""));
        assert!(!dot.contains("\"C3\" --"));
    }

    #[test]
    fn test_subgraph_dot_lists_cards() {
        let graph = ComboGraph::build(scenario()).unwrap();
        let dot = graph.subgraph_dot(&["C1".into(), "missing".into()]);

        assert!(dot.contains("\"combo:C1\" -- \"card:Sol Ring\""));
        assert!(!dot.contains("combo:C2"));
    }

    #[test]
    fn test_to_json_edges() {
        let graph = ComboGraph::build(scenario()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&graph.to_json().unwrap()).unwrap();

        assert_eq!(json["combos"].as_array().unwrap().len(), 3);
        assert_eq!(json["edges"][0]["shared_cards"][0], "Isochron Scepter");
    }
}
