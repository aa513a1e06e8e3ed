// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Query engine over the immutable combo graph
//!
//! Every operation is a read. The costly ones (centrality, packages,
//! statistics) are computed once and memoized for the lifetime of the
//! engine, so repeated calls with the same arguments are cheap.

use crate::analytics::{self, CentralityTable, Package};
use crate::config::QuerySettings;
use crate::error::{LoadError, QueryError};
use crate::graph::{ComboGraph, ComboIdx};
use crate::loader::{self, Dataset};
use crate::types::{ColorIdentity, Combo, DatasetMetadata};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Default depth for chain searches
pub const DEFAULT_CHAIN_DEPTH: i64 = 3;
/// Default shared-card threshold for packages
pub const DEFAULT_MIN_SHARED_CARDS: i64 = 2;
/// Default number of related combos
pub const DEFAULT_RELATED_LIMIT: i64 = 10;

/// Weight of each common neighbor in related-combo scores
const COMMON_NEIGHBOR_WEIGHT: f64 = 0.5;

// =============================================================================
// Result Types
// =============================================================================

/// A card inside a combo lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardUsage {
    /// Card name
    pub name: String,
    /// Combos the card participates in
    pub combos_count: usize,
}

/// `getComboById` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboView {
    /// The combo record
    #[serde(flatten)]
    pub combo: Combo,
    /// Component cards with their popularity
    pub cards: Vec<CardUsage>,
}

/// Distance-1 neighbor entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborCombo {
    /// Neighbor id
    pub id: String,
    /// Cards shared with the origin, sorted
    pub shared_cards: Vec<String>,
    /// Size of `shared_cards`
    pub shared_cards_count: usize,
    /// Neighbor color identity
    pub color_identity: ColorIdentity,
    /// Neighbor effects
    pub produces: Vec<String>,
}

/// `getDistance1Combos` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distance1Result {
    /// Neighbor count
    pub total: usize,
    /// Neighbors, most shared cards first
    pub combos: Vec<NeighborCombo>,
}

/// One way of reaching a distance-2 combo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distance2Path {
    /// Intermediate combo
    pub via_combo_id: String,
    /// Effects of the intermediate combo
    pub via_combo_produces: Vec<String>,
    /// Cards shared by origin and intermediate
    pub shared_with_original: Vec<String>,
    /// Cards shared by intermediate and target
    pub shared_with_via: Vec<String>,
}

/// Distance-2 entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distance2Combo {
    /// Combo id
    pub id: String,
    /// Every intermediate leading here
    pub paths: Vec<Distance2Path>,
    /// Color identity
    pub color_identity: ColorIdentity,
    /// Effects
    pub produces: Vec<String>,
}

/// `getDistance2Combos` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distance2Result {
    /// Combo count
    pub total: usize,
    /// Combos, most paths first
    pub combos: Vec<Distance2Combo>,
}

/// A step of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Combo id
    pub id: String,
    /// Effects
    pub produces: Vec<String>,
    /// Prerequisites
    pub prerequisites: Vec<String>,
}

/// Chain search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainResult {
    /// Starting combo
    pub origin: String,
    /// Depth searched
    pub max_depth: usize,
    /// Number of chains returned
    pub total: usize,
    /// Hit the configured path cap
    pub truncated: bool,
    /// Simple paths, each starting at the origin
    pub chains: Vec<Vec<ChainLink>>,
}

/// Compact combo entry used by card and color listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboSummary {
    /// Combo id
    pub id: String,
    /// Color identity
    pub color_identity: ColorIdentity,
    /// Effects
    pub produces: Vec<String>,
    /// Component cards
    pub card_names: Vec<String>,
}

/// `searchCombosByCard` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSearchResult {
    /// Queried card
    pub card_name: String,
    /// Combos containing the card
    pub total_combos: usize,
    /// The combos (possibly limited)
    pub combos: Vec<ComboSummary>,
}

/// Centrality of a single card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardImportance {
    /// Card name
    pub name: String,
    /// Combos the card participates in
    pub combos_count: usize,
    /// Share of combos touching the card
    pub degree_centrality: f64,
    /// Betweenness on the card co-occurrence graph
    pub betweenness_centrality: f64,
    /// Eigenvector centrality on the card co-occurrence graph
    pub eigenvector_centrality: f64,
    /// Combos containing the card
    pub combo_ids: Vec<String>,
}

/// Flags describing how centrality was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralityNotes {
    /// Betweenness estimated from sampled sources
    pub betweenness_sampled: bool,
    /// Eigenvector iteration converged
    pub eigenvector_converged: bool,
}

/// `getCardImportance` result for a named card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardReport {
    /// The card's scores
    #[serde(flatten)]
    pub card: CardImportance,
    /// Computation flags
    pub notes: CentralityNotes,
}

/// `getCardImportance` result without a card name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCards {
    /// Most important cards, by degree
    pub top_cards: Vec<CardImportance>,
    /// Computation flags
    pub notes: CentralityNotes,
}

/// `getCardImportance` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CardImportanceResult {
    /// A named card
    Card(CardReport),
    /// Ranking by degree
    Top(TopCards),
}

/// `findComboPackages` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageList {
    /// Threshold used
    pub min_shared_cards: usize,
    /// Packages found before limiting
    pub total: usize,
    /// Packages, largest first
    pub packages: Vec<Package>,
}

/// `getComboPackageById` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeededPackage {
    /// The package over the known members
    #[serde(flatten)]
    pub package: Package,
    /// Threshold used
    pub min_shared_cards: usize,
    /// Seeds grown to their full components
    pub expanded: bool,
    /// All members form one component under the threshold
    pub connected: bool,
    /// Seed ids not present in the graph
    pub unknown_ids: Vec<String>,
}

/// `getCombosByColorIdentity` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorIdentityCombo {
    /// Combo id
    pub id: String,
    /// Effects
    pub produces: Vec<String>,
    /// Number of component cards
    pub card_count: usize,
}

/// `getCombosByColorIdentity` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorIdentityResult {
    /// Normalized identity that was matched
    pub color_identity: ColorIdentity,
    /// Matching combos before limiting
    pub total: usize,
    /// The combos (possibly limited)
    pub combos: Vec<ColorIdentityCombo>,
}

/// Related combo entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedCombo {
    /// Combo id
    pub id: String,
    /// Hop distance from the origin (1 or 2)
    pub distance: u8,
    /// Cards shared with the origin
    pub shared_cards: Vec<String>,
    /// Size of `shared_cards`
    pub shared_cards_count: usize,
    /// Neighbors shared with the origin
    pub common_neighbors: usize,
    /// Ranking score
    pub score: f64,
}

/// `getRelatedCombos` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedResult {
    /// Origin combo
    pub combo_id: String,
    /// Ranked candidates
    pub related_combos: Vec<RelatedCombo>,
}

/// Connectivity entry in statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedCombo {
    /// Combo id
    pub id: String,
    /// Distance-1 neighbor count
    pub connections: usize,
}

/// Versatility entry in statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersatileCard {
    /// Card name
    pub name: String,
    /// Combos the card participates in
    pub combos_count: usize,
}

/// Graph snapshot identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// Path or label the data came from
    pub origin: String,
    /// Short SHA-256 of the input
    pub fingerprint: String,
    /// Records rejected at load
    pub skipped_records: usize,
    /// Producer metadata
    pub metadata: DatasetMetadata,
    /// When the engine was built
    pub loaded_at: DateTime<Utc>,
}

/// `getGraphStatistics` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    /// Combo count
    pub total_combos: usize,
    /// Distinct card count
    pub total_cards: usize,
    /// Combo-to-combo edges
    pub total_edges: usize,
    /// Combo-to-card links
    pub membership_edges: usize,
    /// `total_edges / (n (n - 1) / 2)`
    pub graph_density: f64,
    /// Mean card count per combo
    pub avg_cards_per_combo: f64,
    /// Mean combo count per card
    pub avg_combos_per_card: f64,
    /// Combos with the most neighbors
    pub most_connected_combos: Vec<ConnectedCombo>,
    /// Cards in the most combos
    pub most_versatile_cards: Vec<VersatileCard>,
    /// Combos per color identity label
    pub color_distribution: BTreeMap<String, usize>,
    /// Connected components of the combo graph
    pub connected_components: usize,
    /// Combos with no neighbor
    pub isolated_combos: usize,
    /// Combos in the largest component
    pub largest_connected_component: usize,
    /// Snapshot identity
    pub dataset: DatasetInfo,
}

// =============================================================================
// Engine
// =============================================================================

/// Read-only query engine. Cheap to share behind an `Arc`.
pub struct QueryEngine {
    graph: ComboGraph,
    dataset: DatasetInfo,
    settings: QuerySettings,
    centrality: OnceLock<CentralityTable>,
    statistics: OnceLock<GraphStatistics>,
    packages: Mutex<HashMap<usize, Arc<Vec<Package>>>>,
    enablers: OnceLock<Vec<Vec<ComboIdx>>>,
}

impl QueryEngine {
    /// Build an engine from a loaded dataset
    pub fn new(dataset: Dataset, settings: QuerySettings) -> Result<Self, LoadError> {
        let info = DatasetInfo {
            origin: dataset.origin,
            fingerprint: dataset.fingerprint,
            skipped_records: dataset.skipped.len(),
            metadata: dataset.metadata,
            loaded_at: Utc::now(),
        };
        let graph = ComboGraph::build(dataset.combos)?;
        Ok(Self::from_graph(graph, info, settings))
    }

    /// Load a dataset file and build an engine over it
    pub fn open(path: &Path, settings: QuerySettings) -> Result<Self, LoadError> {
        Self::new(loader::load_dataset(path)?, settings)
    }

    /// Wrap an already-built graph
    #[must_use]
    pub fn from_graph(graph: ComboGraph, dataset: DatasetInfo, settings: QuerySettings) -> Self {
        Self {
            graph,
            dataset,
            settings,
            centrality: OnceLock::new(),
            statistics: OnceLock::new(),
            packages: Mutex::new(HashMap::new()),
            enablers: OnceLock::new(),
        }
    }

    /// The underlying graph
    #[must_use]
    pub fn graph(&self) -> &ComboGraph {
        &self.graph
    }

    /// Snapshot identity
    #[must_use]
    pub fn dataset(&self) -> &DatasetInfo {
        &self.dataset
    }

    /// Engine limits
    #[must_use]
    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    fn require(&self, id: &str) -> Result<ComboIdx, QueryError> {
        self.graph
            .index_of(id)
            .ok_or_else(|| QueryError::ComboNotFound(id.to_string()))
    }

    /// Single combo lookup; `None` when absent
    #[must_use]
    pub fn combo(&self, id: &str) -> Option<ComboView> {
        let combo = self.graph.combo(id)?;
        let cards = combo
            .card_names
            .iter()
            .map(|name| CardUsage {
                name: name.clone(),
                combos_count: self.graph.combos_count(name),
            })
            .collect();
        Some(ComboView {
            combo: combo.clone(),
            cards,
        })
    }

    /// Combos sharing at least one card with `id`
    pub fn distance1(&self, id: &str) -> Result<Distance1Result, QueryError> {
        let origin = self.require(id)?;
        let mut combos: Vec<NeighborCombo> = self
            .graph
            .neighbors(origin)
            .iter()
            .map(|n| {
                let other = self.graph.combo_at(n.combo);
                NeighborCombo {
                    id: other.id.clone(),
                    shared_cards: self.graph.card_names_of(&n.shared),
                    shared_cards_count: n.weight(),
                    color_identity: other.color_identity.clone(),
                    produces: other.produces.clone(),
                }
            })
            .collect();
        combos.sort_by(|a, b| {
            b.shared_cards_count
                .cmp(&a.shared_cards_count)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(Distance1Result {
            total: combos.len(),
            combos,
        })
    }

    /// Combos exactly two hops from `id`
    pub fn distance2(&self, id: &str) -> Result<Distance2Result, QueryError> {
        let origin = self.require(id)?;
        let direct: HashSet<ComboIdx> = self.graph.neighbors(origin).iter().map(|n| n.combo).collect();

        let mut reached: BTreeMap<ComboIdx, Vec<Distance2Path>> = BTreeMap::new();
        for first in self.graph.neighbors(origin) {
            let via = self.graph.combo_at(first.combo);
            for second in self.graph.neighbors(first.combo) {
                if second.combo == origin || direct.contains(&second.combo) {
                    continue;
                }
                reached.entry(second.combo).or_default().push(Distance2Path {
                    via_combo_id: via.id.clone(),
                    via_combo_produces: via.produces.clone(),
                    shared_with_original: self.graph.card_names_of(&first.shared),
                    shared_with_via: self.graph.card_names_of(&second.shared),
                });
            }
        }

        let mut combos: Vec<Distance2Combo> = reached
            .into_iter()
            .map(|(idx, paths)| {
                let combo = self.graph.combo_at(idx);
                Distance2Combo {
                    id: combo.id.clone(),
                    paths,
                    color_identity: combo.color_identity.clone(),
                    produces: combo.produces.clone(),
                }
            })
            .collect();
        combos.sort_by(|a, b| b.paths.len().cmp(&a.paths.len()).then_with(|| a.id.cmp(&b.id)));

        Ok(Distance2Result {
            total: combos.len(),
            combos,
        })
    }

    fn checked_depth(&self, max_depth: i64) -> Result<usize, QueryError> {
        let depth = usize::try_from(max_depth).map_err(|_| {
            QueryError::InvalidArgument(format!("maxDepth must be non-negative, got {max_depth}"))
        })?;
        if depth > self.settings.max_chain_depth {
            return Err(QueryError::InvalidArgument(format!(
                "maxDepth {depth} exceeds the limit of {}",
                self.settings.max_chain_depth
            )));
        }
        Ok(depth)
    }

    /// Simple paths of up to `max_depth` shared-card hops from `id`
    pub fn chains(&self, id: &str, max_depth: i64) -> Result<ChainResult, QueryError> {
        let origin = self.require(id)?;
        let depth = self.checked_depth(max_depth)?;
        let graph = &self.graph;
        Ok(self.collect_chains(origin, depth, |combo| {
            graph.neighbors(combo).iter().map(|n| n.combo).collect()
        }))
    }

    /// Chains where each combo's effects satisfy a prerequisite of the next
    pub fn enabling_chains(&self, id: &str, max_depth: i64) -> Result<ChainResult, QueryError> {
        let origin = self.require(id)?;
        let depth = self.checked_depth(max_depth)?;
        let enablers = self.enablers.get_or_init(|| self.build_enablers());
        Ok(self.collect_chains(origin, depth, |combo| enablers[combo].clone()))
    }

    /// For each combo, the combos whose prerequisites it produces
    fn build_enablers(&self) -> Vec<Vec<ComboIdx>> {
        let mut by_prerequisite: HashMap<&str, Vec<ComboIdx>> = HashMap::new();
        for (idx, combo) in self.graph.combos().iter().enumerate() {
            for prerequisite in &combo.prerequisites {
                by_prerequisite.entry(prerequisite.as_str()).or_default().push(idx);
            }
        }

        self.graph
            .combos()
            .iter()
            .enumerate()
            .map(|(idx, combo)| {
                let mut next: Vec<ComboIdx> = combo
                    .produces
                    .iter()
                    .filter_map(|effect| by_prerequisite.get(effect.as_str()))
                    .flatten()
                    .copied()
                    .filter(|&other| other != idx)
                    .collect();
                next.sort_unstable();
                next.dedup();
                next
            })
            .collect()
    }

    /// Depth-first enumeration of simple paths; the origin-only path first
    fn collect_chains<F>(&self, origin: ComboIdx, depth: usize, successors: F) -> ChainResult
    where
        F: Fn(ComboIdx) -> Vec<ComboIdx>,
    {
        let limit = self.settings.max_chains.max(1);
        let mut paths: Vec<Vec<ComboIdx>> = vec![vec![origin]];
        let mut truncated = false;

        // Each frame: the current path and the successors still to try
        let mut path = vec![origin];
        let mut on_path: HashSet<ComboIdx> = HashSet::from([origin]);
        let mut stack: Vec<std::vec::IntoIter<ComboIdx>> = Vec::new();
        if depth > 0 {
            stack.push(successors(origin).into_iter());
        }

        while let Some(frame) = stack.last_mut() {
            let Some(next) = frame.next() else {
                stack.pop();
                if let Some(done) = path.pop() {
                    on_path.remove(&done);
                }
                continue;
            };
            if on_path.contains(&next) {
                continue;
            }
            if paths.len() >= limit {
                truncated = true;
                break;
            }

            path.push(next);
            on_path.insert(next);
            paths.push(path.clone());

            if path.len() <= depth {
                stack.push(successors(next).into_iter());
            } else {
                path.pop();
                on_path.remove(&next);
            }
        }

        let chains: Vec<Vec<ChainLink>> = paths
            .into_iter()
            .map(|p| {
                p.into_iter()
                    .map(|idx| {
                        let combo = self.graph.combo_at(idx);
                        ChainLink {
                            id: combo.id.clone(),
                            produces: combo.produces.clone(),
                            prerequisites: combo.prerequisites.clone(),
                        }
                    })
                    .collect()
            })
            .collect();

        ChainResult {
            origin: self.graph.combo_at(origin).id.clone(),
            max_depth: depth,
            total: chains.len(),
            truncated,
            chains,
        }
    }

    fn summary(&self, idx: ComboIdx) -> ComboSummary {
        let combo = self.graph.combo_at(idx);
        ComboSummary {
            id: combo.id.clone(),
            color_identity: combo.color_identity.clone(),
            produces: combo.produces.clone(),
            card_names: combo.card_names.clone(),
        }
    }

    /// Combos containing exactly `card_name`; empty for unknown cards
    #[must_use]
    pub fn combos_by_card(&self, card_name: &str, limit: Option<usize>) -> CardSearchResult {
        let members = self
            .graph
            .card_index_of(card_name)
            .map_or(&[][..], |card| self.graph.combos_with_card(card));

        CardSearchResult {
            card_name: card_name.trim().to_string(),
            total_combos: members.len(),
            combos: members
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .map(|&idx| self.summary(idx))
                .collect(),
        }
    }

    fn centrality(&self) -> &CentralityTable {
        self.centrality
            .get_or_init(|| analytics::compute_centrality(&self.graph, &self.settings))
    }

    fn importance_of(&self, table: &CentralityTable, card: usize) -> CardImportance {
        CardImportance {
            name: self.graph.card_name(card).to_string(),
            combos_count: self.graph.combos_with_card(card).len(),
            degree_centrality: table.degree[card],
            betweenness_centrality: table.betweenness[card],
            eigenvector_centrality: table.eigenvector[card],
            combo_ids: self
                .graph
                .combos_with_card(card)
                .iter()
                .map(|&c| self.graph.combo_at(c).id.clone())
                .collect(),
        }
    }

    /// Centrality for one card, or the top cards by degree
    pub fn card_importance(
        &self,
        card_name: Option<&str>,
        limit: Option<usize>,
    ) -> Result<CardImportanceResult, QueryError> {
        let table = self.centrality();
        let notes = CentralityNotes {
            betweenness_sampled: table.betweenness_sampled,
            eigenvector_converged: table.eigenvector_converged,
        };

        if let Some(name) = card_name {
            let card = self
                .graph
                .card_index_of(name)
                .ok_or_else(|| QueryError::CardNotFound(name.to_string()))?;
            return Ok(CardImportanceResult::Card(CardReport {
                card: self.importance_of(table, card),
                notes,
            }));
        }

        // Degree order equals combos_count order; ties by name (card index)
        let mut ranked: Vec<usize> = (0..self.graph.card_count()).collect();
        ranked.sort_by(|&a, &b| {
            self.graph
                .combos_with_card(b)
                .len()
                .cmp(&self.graph.combos_with_card(a).len())
                .then_with(|| a.cmp(&b))
        });
        ranked.truncate(limit.unwrap_or(self.settings.top_cards_limit));

        Ok(CardImportanceResult::Top(TopCards {
            top_cards: ranked
                .into_iter()
                .map(|card| self.importance_of(table, card))
                .collect(),
            notes,
        }))
    }

    fn threshold(min_shared_cards: i64) -> Result<usize, QueryError> {
        usize::try_from(min_shared_cards)
            .ok()
            .filter(|&m| m >= 1)
            .ok_or_else(|| {
                QueryError::InvalidArgument(format!(
                    "minSharedCards must be at least 1, got {min_shared_cards}"
                ))
            })
    }

    fn packages_at(&self, min_shared: usize) -> Arc<Vec<Package>> {
        // No combo can share more cards than its own size
        let max_cards = self.graph.combos().iter().map(|c| c.card_names.len()).max().unwrap_or(0);
        if min_shared > max_cards {
            return Arc::new(Vec::new());
        }

        if let Some(cached) = self.packages.lock().get(&min_shared) {
            return Arc::clone(cached);
        }

        let computed = Arc::new(analytics::find_packages(&self.graph, min_shared));
        self.packages
            .lock()
            .entry(min_shared)
            .or_insert(computed)
            .clone()
    }

    /// Connected packages under a shared-card threshold
    pub fn packages(
        &self,
        min_shared_cards: i64,
        limit: Option<usize>,
    ) -> Result<PackageList, QueryError> {
        let min_shared = Self::threshold(min_shared_cards)?;
        let all = self.packages_at(min_shared);
        let limit = limit.unwrap_or(self.settings.package_limit);

        Ok(PackageList {
            min_shared_cards: min_shared,
            total: all.len(),
            packages: all.iter().take(limit).cloned().collect(),
        })
    }

    /// Grow (or restrict) a package from explicit seed combos
    pub fn package_for(
        &self,
        combo_ids: &[String],
        min_shared_cards: i64,
        expand: bool,
    ) -> Result<SeededPackage, QueryError> {
        if combo_ids.is_empty() {
            return Err(QueryError::InvalidArgument("comboIds must not be empty".into()));
        }
        let min_shared = Self::threshold(min_shared_cards)?;

        let mut unknown_ids = Vec::new();
        let mut seeds: Vec<ComboIdx> = Vec::new();
        for id in combo_ids {
            match self.graph.index_of(id) {
                Some(idx) => seeds.push(idx),
                None => unknown_ids.push(id.clone()),
            }
        }
        seeds.sort_unstable();
        seeds.dedup();

        let members: Vec<ComboIdx> = if expand {
            let mut grown = self.reachable(&seeds, min_shared, None);
            grown.sort_unstable();
            grown
        } else {
            seeds.clone()
        };

        let connected = match members.first() {
            None => false,
            Some(&start) => {
                let allowed: HashSet<ComboIdx> = members.iter().copied().collect();
                self.reachable(&[start], min_shared, Some(&allowed)).len() == members.len()
            }
        };

        Ok(SeededPackage {
            package: analytics::package_from(&self.graph, &members),
            min_shared_cards: min_shared,
            expanded: expand,
            connected,
            unknown_ids,
        })
    }

    /// Breadth-first closure over edges of weight >= `min_shared`
    fn reachable(
        &self,
        seeds: &[ComboIdx],
        min_shared: usize,
        within: Option<&HashSet<ComboIdx>>,
    ) -> Vec<ComboIdx> {
        let mut seen: HashSet<ComboIdx> = seeds.iter().copied().collect();
        let mut queue: std::collections::VecDeque<ComboIdx> = seeds.iter().copied().collect();
        let mut out: Vec<ComboIdx> = seeds.to_vec();

        while let Some(current) = queue.pop_front() {
            for n in self.graph.neighbors(current) {
                if n.weight() < min_shared || within.is_some_and(|w| !w.contains(&n.combo)) {
                    continue;
                }
                if seen.insert(n.combo) {
                    out.push(n.combo);
                    queue.push_back(n.combo);
                }
            }
        }
        out
    }

    /// Aggregate statistics, computed once
    pub fn statistics(&self) -> &GraphStatistics {
        self.statistics.get_or_init(|| self.compute_statistics())
    }

    fn compute_statistics(&self) -> GraphStatistics {
        let graph = &self.graph;
        let n = graph.combo_count();
        let top_n = self.settings.top_n;

        let possible = n.saturating_mul(n.saturating_sub(1)) / 2;
        let graph_density = if possible == 0 {
            0.0
        } else {
            graph.edge_count() as f64 / possible as f64
        };

        let membership = graph.membership_count();
        let avg_cards_per_combo = if n == 0 { 0.0 } else { membership as f64 / n as f64 };
        let avg_combos_per_card = if graph.card_count() == 0 {
            0.0
        } else {
            membership as f64 / graph.card_count() as f64
        };

        let mut connected: Vec<ConnectedCombo> = graph
            .combos()
            .iter()
            .enumerate()
            .map(|(idx, combo)| ConnectedCombo {
                id: combo.id.clone(),
                connections: graph.neighbors(idx).len(),
            })
            .collect();
        let isolated_combos = connected.iter().filter(|c| c.connections == 0).count();
        connected.sort_by(|a, b| b.connections.cmp(&a.connections).then_with(|| a.id.cmp(&b.id)));
        connected.truncate(top_n);

        let mut versatile: Vec<VersatileCard> = graph
            .cards()
            .iter()
            .enumerate()
            .map(|(idx, name)| VersatileCard {
                name: name.clone(),
                combos_count: graph.combos_with_card(idx).len(),
            })
            .collect();
        versatile.sort_by(|a, b| b.combos_count.cmp(&a.combos_count).then_with(|| a.name.cmp(&b.name)));
        versatile.truncate(top_n);

        let mut color_distribution: BTreeMap<String, usize> = BTreeMap::new();
        for combo in graph.combos() {
            *color_distribution
                .entry(combo.color_identity.label().to_string())
                .or_default() += 1;
        }

        let components = graph.components(1);
        let largest_connected_component = components.first().map_or(0, Vec::len);
        debug!(components = components.len(), largest = largest_connected_component, "Computed statistics");

        GraphStatistics {
            total_combos: n,
            total_cards: graph.card_count(),
            total_edges: graph.edge_count(),
            membership_edges: membership,
            graph_density,
            avg_cards_per_combo,
            avg_combos_per_card,
            most_connected_combos: connected,
            most_versatile_cards: versatile,
            color_distribution,
            connected_components: components.len(),
            isolated_combos,
            largest_connected_component,
            dataset: self.dataset.clone(),
        }
    }

    /// Combos whose identity equals the normalized query
    pub fn combos_by_color_identity(
        &self,
        color_identity: &str,
        limit: Option<usize>,
    ) -> Result<ColorIdentityResult, QueryError> {
        let wanted = ColorIdentity::parse(color_identity)?;
        let matches: Vec<&Combo> = self
            .graph
            .combos()
            .iter()
            .filter(|c| c.color_identity == wanted)
            .collect();

        Ok(ColorIdentityResult {
            total: matches.len(),
            combos: matches
                .into_iter()
                .take(limit.unwrap_or(self.settings.color_identity_limit))
                .map(|c| ColorIdentityCombo {
                    id: c.id.clone(),
                    produces: c.produces.clone(),
                    card_count: c.card_names.len(),
                })
                .collect(),
            color_identity: wanted,
        })
    }

    /// Combos ranked by shared cards plus common neighbors, over distance 1 and 2
    pub fn related(&self, id: &str, limit: i64) -> Result<RelatedResult, QueryError> {
        let origin = self.require(id)?;
        let limit = usize::try_from(limit).map_err(|_| {
            QueryError::InvalidArgument(format!("limit must be non-negative, got {limit}"))
        })?;

        let direct: HashMap<ComboIdx, &crate::graph::Neighbor> = self
            .graph
            .neighbors(origin)
            .iter()
            .map(|n| (n.combo, n))
            .collect();

        // Common neighbors: for every candidate, how many of origin's neighbors it touches
        let mut common: HashMap<ComboIdx, usize> = HashMap::new();
        for first in self.graph.neighbors(origin) {
            for second in self.graph.neighbors(first.combo) {
                if second.combo != origin {
                    *common.entry(second.combo).or_default() += 1;
                }
            }
        }

        let mut candidates: HashSet<ComboIdx> = direct.keys().copied().collect();
        candidates.extend(common.keys().copied());

        let mut related: Vec<RelatedCombo> = candidates
            .into_iter()
            .map(|idx| {
                let common_neighbors = common.get(&idx).copied().unwrap_or(0);
                let (distance, shared_cards) = match direct.get(&idx) {
                    Some(n) => (1, self.graph.card_names_of(&n.shared)),
                    None => (2, Vec::new()),
                };
                let shared_cards_count = shared_cards.len();
                RelatedCombo {
                    id: self.graph.combo_at(idx).id.clone(),
                    distance,
                    shared_cards,
                    shared_cards_count,
                    common_neighbors,
                    score: shared_cards_count as f64 + COMMON_NEIGHBOR_WEIGHT * common_neighbors as f64,
                }
            })
            .collect();

        related.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.shared_cards_count.cmp(&a.shared_cards_count))
                .then_with(|| a.id.cmp(&b.id))
        });
        related.truncate(limit);

        Ok(RelatedResult {
            combo_id: self.graph.combo_at(origin).id.clone(),
            related_combos: related,
        })
    }
}
