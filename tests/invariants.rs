// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Invariant tests for the combo graph and query engine
//!
//! These tests verify:
//! 1. Adjacency symmetry - shared-card edges look the same from both ends
//! 2. Determinism - record order never changes the graph
//! 3. Package and chain structure - disjoint, connected, simple

use combograph::config::QuerySettings;
use combograph::graph::ComboGraph;
use combograph::loader::{parse_dataset, Dataset};
use combograph::query::QueryEngine;
use combograph::types::{ColorIdentity, Combo};
use proptest::prelude::*;
use std::collections::HashSet;

// =============================================================================
// Test Helpers
// =============================================================================

fn make_combo(id: &str, cards: &[&str]) -> Combo {
    Combo {
        id: id.into(),
        card_names: cards.iter().map(|c| (*c).to_string()).collect(),
        prerequisites: vec![],
        steps: vec![],
        produces: vec!["Infinite mana".into()],
        color_identity: ColorIdentity::colorless(),
        popularity: None,
        mana_needed: None,
        description: None,
    }
}

fn engine(combos: Vec<Combo>) -> QueryEngine {
    QueryEngine::new(Dataset::from_combos("invariants", combos), QuerySettings::default()).unwrap()
}

fn sample() -> Vec<Combo> {
    vec![
        make_combo("c01", &["Sol Ring", "Isochron Scepter", "Dramatic Reversal"]),
        make_combo("c02", &["Isochron Scepter", "Dramatic Reversal", "Sensei's Divining Top"]),
        make_combo("c03", &["Kiki-Jiki, Mirror Breaker", "Restoration Angel"]),
        make_combo("c04", &["Kiki-Jiki, Mirror Breaker", "Zealous Conscripts"]),
        make_combo("c05", &["Thassa's Oracle", "Demonic Consultation"]),
        make_combo("c06", &["Thassa's Oracle", "Tainted Pact"]),
        make_combo("c07", &["Sol Ring", "Sensei's Divining Top", "Dramatic Reversal"]),
        make_combo("c08", &["Walking Ballista", "Heliod, Sun-Crowned"]),
    ]
}

fn check_graph(graph: &ComboGraph) {
    for a in 0..graph.combo_count() {
        for n in graph.neighbors(a) {
            assert_ne!(n.combo, a, "self loop on {}", graph.combo_at(a).id);
            let back = graph.edge_between(n.combo, a).expect("edge must be symmetric");
            assert_eq!(back.shared, n.shared);
            assert!(!n.shared.is_empty());
        }
    }
}

// =============================================================================
// Fixed Dataset Invariants
// =============================================================================

#[test]
fn test_adjacency_is_symmetric() {
    let engine = engine(sample());
    check_graph(engine.graph());
}

#[test]
fn test_no_combo_in_its_own_neighborhoods() {
    let engine = engine(sample());
    for combo in engine.graph().combos() {
        let d1 = engine.distance1(&combo.id).unwrap();
        let d2 = engine.distance2(&combo.id).unwrap();
        assert!(d1.combos.iter().all(|c| c.id != combo.id));
        assert!(d2.combos.iter().all(|c| c.id != combo.id));

        let direct: HashSet<&str> = d1.combos.iter().map(|c| c.id.as_str()).collect();
        assert!(d2.combos.iter().all(|c| !direct.contains(c.id.as_str())));
    }
}

#[test]
fn test_build_is_order_independent() {
    let forward = ComboGraph::build(sample()).unwrap();
    let mut reversed_input = sample();
    reversed_input.reverse();
    let reversed = ComboGraph::build(reversed_input).unwrap();

    assert_eq!(forward.to_json().unwrap(), reversed.to_json().unwrap());
    assert_eq!(forward.to_dot(), reversed.to_dot());
}

#[test]
fn test_card_search_matches_popularity() {
    let engine = engine(sample());
    for name in engine.graph().cards() {
        let found = engine.combos_by_card(name, None);
        assert_eq!(found.total_combos, engine.graph().combos_count(name));
        assert!(found.combos.iter().all(|c| c.card_names.contains(name)));
    }
}

#[test]
fn test_packages_partition_connected_groups() {
    let engine = engine(sample());
    let list = engine.packages(2, None).unwrap();

    let mut seen = HashSet::new();
    for package in &list.packages {
        assert!(package.combo_count >= 2);
        for id in &package.combo_ids {
            assert!(seen.insert(id.clone()), "{id} appears in two packages");
        }
        let seeded = engine.package_for(&package.combo_ids, 2, false).unwrap();
        assert!(seeded.connected);
    }

    // c01/c02 share two cards, c01/c07 and c02/c07 share two as well
    assert_eq!(list.total, 1);
    assert_eq!(list.packages[0].combo_ids, vec!["c01", "c02", "c07"]);
}

#[test]
fn test_statistics_bounds() {
    let engine = engine(sample());
    let stats = engine.statistics();

    assert_eq!(stats.total_combos, 8);
    assert!((0.0..=1.0).contains(&stats.graph_density));
    assert!(stats.largest_connected_component <= stats.total_combos);
    assert_eq!(stats.isolated_combos, 1);
}

#[test]
fn test_chains_are_simple_and_rooted() {
    let engine = engine(sample());
    let origin = engine.chains("c01", 0).unwrap();
    assert_eq!(origin.chains.len(), 1);
    assert_eq!(origin.chains[0][0].id, "c01");

    let result = engine.chains("c01", 4).unwrap();
    for chain in &result.chains {
        assert_eq!(chain[0].id, "c01");
        let unique: HashSet<&str> = chain.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(unique.len(), chain.len());
        for pair in chain.windows(2) {
            let a = engine.graph().index_of(&pair[0].id).unwrap();
            let b = engine.graph().index_of(&pair[1].id).unwrap();
            assert!(engine.graph().edge_between(a, b).is_some());
        }
    }
}

#[test]
fn test_scenario_from_json_document() {
    let json = r#"{
        "metadata": {"source": "fixture", "total_combos": 3},
        "combos": {
            "C1": {"card_names": ["Sol Ring", "Isochron Scepter"], "color_identity": ""},
            "C2": {"card_names": ["Isochron Scepter", "Dramatic Reversal"], "color_identity": "U"},
            "C3": {"card_names": ["Kiki-Jiki", "Restoration Angel"], "color_identity": "RW"}
        }
    }"#;
    let engine = QueryEngine::new(parse_dataset(json, "fixture").unwrap(), QuerySettings::default()).unwrap();

    let d1 = engine.distance1("C1").unwrap();
    assert_eq!(d1.combos.len(), 1);
    assert_eq!(d1.combos[0].id, "C2");
    assert_eq!(d1.combos[0].shared_cards, vec!["Isochron Scepter"]);
    assert!(engine.distance1("C3").unwrap().combos.is_empty());

    let packages = engine.packages(1, None).unwrap();
    assert_eq!(packages.total, 1);
    assert_eq!(packages.packages[0].combo_ids, vec!["C1", "C2"]);

    assert!(engine.combo("nonexistent").is_none());
}

// =============================================================================
// Generated Datasets
// =============================================================================

const POOL: [&str; 10] = [
    "Sol Ring",
    "Isochron Scepter",
    "Dramatic Reversal",
    "Kiki-Jiki",
    "Restoration Angel",
    "Thassa's Oracle",
    "Demonic Consultation",
    "Walking Ballista",
    "Basalt Monolith",
    "Rings of Brighthaven",
];

fn arb_combos() -> impl Strategy<Value = Vec<Combo>> {
    prop::collection::vec(prop::collection::btree_set(0..POOL.len(), 1..4), 1..14).prop_map(|sets| {
        sets.into_iter()
            .enumerate()
            .map(|(i, cards)| {
                let names: Vec<&str> = cards.into_iter().map(|c| POOL[c]).collect();
                make_combo(&format!("g{i:02}"), &names)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_graph_invariants(combos in arb_combos()) {
        let n = combos.len();
        let engine = engine(combos.clone());
        check_graph(engine.graph());

        let stats = engine.statistics();
        prop_assert_eq!(stats.total_combos, n);
        prop_assert!((0.0..=1.0).contains(&stats.graph_density));

        let mut reversed = combos;
        reversed.reverse();
        let other = ComboGraph::build(reversed).unwrap();
        prop_assert_eq!(engine.graph().to_json().unwrap(), other.to_json().unwrap());
    }

    #[test]
    fn prop_packages_disjoint(combos in arb_combos(), threshold in 1i64..3) {
        let engine = engine(combos);
        let list = engine.packages(threshold, Some(usize::MAX)).unwrap();
        let mut seen = HashSet::new();
        for package in &list.packages {
            prop_assert!(package.combo_count >= 2);
            for id in &package.combo_ids {
                prop_assert!(seen.insert(id.clone()));
            }
            prop_assert!(engine.package_for(&package.combo_ids, threshold, false).unwrap().connected);
        }
    }

    #[test]
    fn prop_chains_simple(combos in arb_combos(), depth in 0i64..4) {
        let engine = engine(combos);
        let origin = engine.graph().combo_at(0).id.clone();
        let result = engine.chains(&origin, depth).unwrap();
        prop_assert!(!result.chains.is_empty());
        for chain in &result.chains {
            prop_assert!(chain.len() as i64 <= depth + 1);
            let unique: HashSet<&str> = chain.iter().map(|l| l.id.as_str()).collect();
            prop_assert_eq!(unique.len(), chain.len());
        }
    }
}
