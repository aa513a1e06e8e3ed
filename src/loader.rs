// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Combo dataset loading
//!
//! Reads a JSON dataset of combo records and validates each record into a
//! strict [`Combo`]. Bad records are skipped and logged one by one; the load
//! only fails when nothing usable remains.

use crate::error::{LoadError, RecordError};
use crate::types::{ColorIdentity, Combo, DatasetMetadata};
use serde::de::{Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// A validated dataset ready for graph building
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Path or label the data was read from
    pub origin: String,
    /// Producer metadata, if the file carried any
    pub metadata: DatasetMetadata,
    /// Valid combos in file order
    pub combos: Vec<Combo>,
    /// Records rejected during validation
    pub skipped: Vec<SkippedRecord>,
    /// Short SHA-256 of the input, identifying the graph snapshot
    pub fingerprint: String,
}

/// A record that failed validation
#[derive(Debug, Clone)]
pub struct SkippedRecord {
    /// Zero-based position in the record list
    pub position: usize,
    /// Id, when one could be read
    pub id: Option<String>,
    /// Human-readable reason
    pub reason: String,
}

impl Dataset {
    /// Wrap already-validated combos, e.g. for embedded use and tests
    #[must_use]
    pub fn from_combos(origin: impl Into<String>, combos: Vec<Combo>) -> Self {
        let encoded = serde_json::to_vec(&combos).unwrap_or_default();
        Self {
            origin: origin.into(),
            metadata: DatasetMetadata::default(),
            combos,
            skipped: Vec::new(),
            fingerprint: fingerprint(&encoded),
        }
    }
}

/// Load and validate a dataset file
pub fn load_dataset(path: &Path) -> Result<Dataset, LoadError> {
    info!("Loading dataset from {}", path.display());
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_dataset(&text, &path.display().to_string())
}

/// Validate dataset JSON already in memory
pub fn parse_dataset(text: &str, origin: &str) -> Result<Dataset, LoadError> {
    let file: DatasetFile = serde_json::from_str(text).map_err(|source| LoadError::Parse {
        origin: origin.to_string(),
        source,
    })?;

    let (metadata, records) = match file {
        DatasetFile::Document { metadata, combos } => (metadata, combos.0),
        DatasetFile::Bare(records) => (DatasetMetadata::default(), records.0),
    };

    let mut combos = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();

    for (position, (key, value)) in records.into_iter().enumerate() {
        let hint = key.clone().or_else(|| value.get("id").and_then(id_from_value));
        match parse_record(key, value) {
            Ok(combo) => combos.push(combo),
            Err(err) => {
                warn!(position, id = ?hint, "Skipping combo record: {}", err);
                skipped.push(SkippedRecord {
                    position,
                    id: hint,
                    reason: err.to_string(),
                });
            }
        }
    }

    if combos.is_empty() {
        return Err(LoadError::NoValidCombos {
            origin: origin.to_string(),
            skipped: skipped.len(),
        });
    }

    if let Some(claimed) = metadata.total_combos {
        if claimed != combos.len() as u64 {
            debug!(claimed, loaded = combos.len(), "Dataset metadata combo count differs");
        }
    }

    info!(
        "Loaded {} combos from {} ({} skipped, source: {}, fetched: {})",
        combos.len(),
        origin,
        skipped.len(),
        metadata.source.as_deref().unwrap_or("unknown"),
        metadata.fetch_date.as_deref().unwrap_or("unknown date"),
    );

    Ok(Dataset {
        origin: origin.to_string(),
        metadata,
        combos,
        skipped,
        fingerprint: fingerprint(text.as_bytes()),
    })
}

/// First 16 hex digits of the SHA-256 of `bytes`
fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hash = hex::encode(hasher.finalize());
    hash[..16].to_string()
}

// =============================================================================
// File shapes
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Document {
        #[serde(default)]
        metadata: DatasetMetadata,
        combos: RecordList,
    },
    Bare(RecordList),
}

/// Raw records, each paired with its key when the list is keyed by id.
/// Duplicate keys are kept so the graph builder can reject them.
struct RecordList(Vec<(Option<String>, Value)>);

impl<'de> Deserialize<'de> for RecordList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordListVisitor;

        impl<'de> Visitor<'de> for RecordListVisitor {
            type Value = RecordList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of combo records or an object keyed by combo id")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RecordList, A::Error> {
                let mut records = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(value) = seq.next_element::<Value>()? {
                    records.push((None, value));
                }
                Ok(RecordList(records))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RecordList, A::Error> {
                let mut records = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    records.push((Some(key), value));
                }
                Ok(RecordList(records))
            }
        }

        deserializer.deserialize_any(RecordListVisitor)
    }
}

#[derive(Deserialize)]
struct ComboRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    card_names: Option<Vec<String>>,
    #[serde(default)]
    cards: Option<Vec<CardEntry>>,
    #[serde(default, alias = "identity")]
    color_identity: Option<String>,
    #[serde(default, alias = "requires")]
    prerequisites: Option<Vec<String>>,
    #[serde(default)]
    steps: Option<Vec<String>>,
    #[serde(default)]
    produces: Option<Vec<String>>,
    #[serde(default)]
    popularity: Option<u64>,
    #[serde(default)]
    mana_needed: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct CardEntry {
    name: String,
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}

fn parse_record(key: Option<String>, value: Value) -> Result<Combo, RecordError> {
    let record: ComboRecord = serde_json::from_value(value)?;

    let id = key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .or_else(|| record.id.as_ref().and_then(id_from_value))
        .ok_or(RecordError::MissingId)?;

    let raw_cards = match (record.card_names, record.cards) {
        (Some(names), _) if !names.is_empty() => names,
        (_, Some(cards)) => cards.into_iter().map(|c| c.name).collect(),
        _ => Vec::new(),
    };
    let card_names = dedup_cards(raw_cards);
    if card_names.is_empty() {
        return Err(RecordError::NoCards);
    }

    let color_identity = ColorIdentity::parse(
        record
            .color_identity
            .as_deref()
            .ok_or(RecordError::MissingColorIdentity)?,
    )?;

    Ok(Combo {
        id,
        card_names,
        prerequisites: clean(record.prerequisites),
        steps: clean(record.steps),
        produces: clean(record.produces),
        color_identity,
        popularity: record.popularity,
        mana_needed: record.mana_needed.filter(|m| !m.trim().is_empty()),
        description: record.description.filter(|d| !d.trim().is_empty()),
    })
}

/// Trim names, drop blanks and keep the first occurrence of each card
fn dedup_cards(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|c| c == name) {
            out.push(name.to_string());
        }
    }
    out
}

fn clean(list: Option<Vec<String>>) -> Vec<String> {
    list.unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_keyed_by_id() {
        let json = r#"{
            "metadata": {"source": "Commander Spellbook", "total_combos": 2},
            "combos": {
                "1": {"card_names": ["Sol Ring", "Isochron Scepter"], "color_identity": "C",
                      "produces": ["Infinite mana", ""], "steps": ["  "]},
                "2": {"card_names": ["Isochron Scepter", "Dramatic Reversal"], "color_identity": "u"}
            },
            "cards": {},
            "card_to_combos": {}
        }"#;

        let dataset = parse_dataset(json, "test").unwrap();

        assert_eq!(dataset.combos.len(), 2);
        assert_eq!(dataset.metadata.source.as_deref(), Some("Commander Spellbook"));
        assert_eq!(dataset.combos[0].id, "1");
        assert_eq!(dataset.combos[0].produces, vec!["Infinite mana".to_string()]);
        assert!(dataset.combos[0].steps.is_empty());
        assert!(dataset.combos[0].color_identity.is_colorless());
        assert_eq!(dataset.combos[1].color_identity.as_str(), "U");
        assert_eq!(dataset.fingerprint.len(), 16);
    }

    #[test]
    fn test_bare_array_with_numeric_ids_and_card_objects() {
        let json = r#"[
            {"id": 42, "cards": [{"name": "Kiki-Jiki, Mirror Breaker", "zone": "B"},
                                 {"name": "Restoration Angel"}], "identity": "RW",
             "requires": ["Untap step"]}
        ]"#;

        let dataset = parse_dataset(json, "test").unwrap();
        let combo = &dataset.combos[0];

        assert_eq!(combo.id, "42");
        assert_eq!(combo.card_names.len(), 2);
        assert_eq!(combo.color_identity.as_str(), "WR");
        assert_eq!(combo.prerequisites, vec!["Untap step".to_string()]);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let json = r#"[
            {"id": "ok", "card_names": ["A"], "color_identity": ""},
            {"id": "no-cards", "card_names": [], "color_identity": ""},
            {"id": "no-color", "card_names": ["A"]},
            {"id": "bad-color", "card_names": ["A"], "color_identity": "XYZ"},
            {"card_names": ["A"], "color_identity": ""},
            {"id": "bad-type", "card_names": "A", "color_identity": ""}
        ]"#;

        let dataset = parse_dataset(json, "test").unwrap();

        assert_eq!(dataset.combos.len(), 1);
        assert_eq!(dataset.skipped.len(), 5);
        assert_eq!(dataset.skipped[0].id.as_deref(), Some("no-cards"));
        assert_eq!(dataset.skipped[3].id, None);
    }

    #[test]
    fn test_zero_valid_combos_is_fatal() {
        let json = r#"[{"id": "x", "card_names": []}]"#;
        let err = parse_dataset(json, "test").unwrap_err();
        assert!(matches!(err, LoadError::NoValidCombos { skipped: 1, .. }));
    }

    #[test]
    fn test_not_json_is_fatal() {
        let err = parse_dataset("not json", "test").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn test_duplicate_keys_are_preserved() {
        let json = r#"{"combos": {
            "7": {"card_names": ["A"], "color_identity": ""},
            "7": {"card_names": ["B"], "color_identity": ""}
        }}"#;

        let dataset = parse_dataset(json, "test").unwrap();
        assert_eq!(dataset.combos.len(), 2);
        assert!(dataset.combos.iter().all(|c| c.id == "7"));
    }

    #[test]
    fn test_card_names_trimmed_and_deduplicated() {
        let json = r#"[{"id": "d", "card_names": [" Sol Ring ", "Sol Ring", "", "Scepter"],
                        "color_identity": ""}]"#;
        let dataset = parse_dataset(json, "test").unwrap();
        assert_eq!(dataset.combos[0].card_names, vec!["Sol Ring", "Scepter"]);
    }

    #[test]
    fn test_missing_file() {
        let err = load_dataset(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
