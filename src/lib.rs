// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Combograph library - combo relationship graph service
//!
//! This crate loads a dataset of combos (sets of cards that jointly produce
//! an effect), builds an immutable shared-card graph over them and answers
//! structural queries: neighbors, chains, packages, card centrality and
//! aggregate statistics. The [`query::QueryEngine`] runs embedded; the
//! [`server`] module wraps it in a newline-delimited JSON protocol and
//! [`client::ComboGraphClient`] is the typed stub for remote callers.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod analytics;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod graph;
pub mod loader;
pub mod query;
pub mod rpc;
pub mod server;

/// Core data types shared by the loader, graph and wire protocol
pub mod types {
    use crate::error::InvalidColorIdentity;
    use serde::{Deserialize, Serialize};
    use std::fmt;

    // =========================================================================
    // Color Identity
    // =========================================================================

    /// Canonical color order
    const COLOR_ORDER: [char; 5] = ['W', 'U', 'B', 'R', 'G'];

    /// Histogram label for the empty identity
    pub const COLORLESS_LABEL: &str = "Colorless";

    /// A normalized subset of `WUBRG`, always in canonical order
    #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(try_from = "String", into = "String")]
    pub struct ColorIdentity(String);

    impl ColorIdentity {
        /// Parse and normalize a color identity.
        ///
        /// Case-insensitive; whitespace and commas are ignored and repeated
        /// colors collapse. `""`, `"C"` and `"Colorless"` are colorless.
        pub fn parse(raw: &str) -> Result<Self, InvalidColorIdentity> {
            let trimmed = raw.trim();
            if trimmed.is_empty()
                || trimmed.eq_ignore_ascii_case("c")
                || trimmed.eq_ignore_ascii_case(COLORLESS_LABEL)
            {
                return Ok(Self::colorless());
            }

            let mut present = [false; 5];
            for ch in trimmed.chars() {
                if ch.is_whitespace() || ch == ',' {
                    continue;
                }
                let upper = ch.to_ascii_uppercase();
                match COLOR_ORDER.iter().position(|&c| c == upper) {
                    Some(i) => present[i] = true,
                    None => return Err(InvalidColorIdentity(raw.to_string())),
                }
            }

            Ok(Self(
                COLOR_ORDER
                    .iter()
                    .zip(present)
                    .filter(|(_, on)| *on)
                    .map(|(c, _)| *c)
                    .collect(),
            ))
        }

        /// The empty identity
        #[must_use]
        pub fn colorless() -> Self {
            Self(String::new())
        }

        /// Canonical string form (empty for colorless)
        #[must_use]
        pub fn as_str(&self) -> &str {
            &self.0
        }

        /// Whether no colors are present
        #[must_use]
        pub fn is_colorless(&self) -> bool {
            self.0.is_empty()
        }

        /// Human-readable label used in histograms
        #[must_use]
        pub fn label(&self) -> &str {
            if self.is_colorless() {
                COLORLESS_LABEL
            } else {
                &self.0
            }
        }
    }

    impl fmt::Display for ColorIdentity {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl TryFrom<String> for ColorIdentity {
        type Error = InvalidColorIdentity;

        fn try_from(value: String) -> Result<Self, Self::Error> {
            Self::parse(&value)
        }
    }

    impl From<ColorIdentity> for String {
        fn from(value: ColorIdentity) -> Self {
            value.0
        }
    }

    // =========================================================================
    // Combo
    // =========================================================================

    /// A combo: a set of cards that together produce one or more effects
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Combo {
        /// Opaque identifier
        pub id: String,
        /// Component cards, in record order, never empty
        pub card_names: Vec<String>,
        /// Conditions that must hold before the combo can start
        #[serde(default)]
        pub prerequisites: Vec<String>,
        /// Ordered steps
        #[serde(default)]
        pub steps: Vec<String>,
        /// Produced effects (e.g. "Infinite mana")
        #[serde(default)]
        pub produces: Vec<String>,
        /// Normalized color identity
        pub color_identity: ColorIdentity,
        /// Popularity score reported by the dataset source
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub popularity: Option<u64>,
        /// Mana required to assemble the combo
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub mana_needed: Option<String>,
        /// Free-form description
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub description: Option<String>,
    }

    impl Combo {
        /// Whether the combo lists `card` among its components
        #[must_use]
        pub fn uses_card(&self, card: &str) -> bool {
            self.card_names.iter().any(|c| c == card)
        }
    }

    // =========================================================================
    // Dataset Metadata
    // =========================================================================

    /// Provenance block carried by dataset documents
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DatasetMetadata {
        /// Where the data came from
        #[serde(default)]
        pub source: Option<String>,
        /// When the data was fetched (as written by the producer)
        #[serde(default)]
        pub fetch_date: Option<String>,
        /// Producer format version
        #[serde(default)]
        pub version: Option<String>,
        /// Combo count claimed by the producer
        #[serde(default)]
        pub total_combos: Option<u64>,
    }
}

#[cfg(test)]
mod tests {
    use super::types::ColorIdentity;

    #[test]
    fn test_color_identity_normalizes_order_and_case() {
        assert_eq!(ColorIdentity::parse("gwu").unwrap().as_str(), "WUG");
        assert_eq!(ColorIdentity::parse("B, R").unwrap().as_str(), "BR");
        assert_eq!(ColorIdentity::parse("UUb").unwrap().as_str(), "UB");
    }

    #[test]
    fn test_color_identity_colorless_forms() {
        for raw in ["", "  ", "C", "colorless", "Colorless"] {
            let ci = ColorIdentity::parse(raw).unwrap();
            assert!(ci.is_colorless(), "{raw:?} should be colorless");
            assert_eq!(ci.label(), "Colorless");
        }
    }

    #[test]
    fn test_color_identity_rejects_unknown_letters() {
        assert!(ColorIdentity::parse("UX").is_err());
        assert!(ColorIdentity::parse("purple").is_err());
    }

    #[test]
    fn test_color_identity_serde_is_plain_string() {
        let ci = ColorIdentity::parse("rg").unwrap();
        assert_eq!(serde_json::to_string(&ci).unwrap(), "\"RG\"");
        let back: ColorIdentity = serde_json::from_str("\"gr\"").unwrap();
        assert_eq!(back, ci);
    }
}
