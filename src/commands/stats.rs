// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Stats command - graph statistics for the configured dataset

use crate::config::Settings;
use crate::query::GraphStatistics;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::fmt::Write;

/// Print statistics as a report, or as JSON when `json` is set
pub fn run(settings: &Settings, json: bool, color: bool) -> Result<()> {
    let engine = super::load_engine(settings)?;
    let stats = engine.statistics();

    if json {
        return super::print_json(stats);
    }
    print!("{}", report(stats, color));
    Ok(())
}

fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().cyan().to_string()
    } else {
        text.to_string()
    }
}

fn figure(value: impl std::fmt::Display, color: bool) -> String {
    if color {
        value.green().to_string()
    } else {
        value.to_string()
    }
}

/// Human-readable statistics report
#[must_use]
pub fn report(stats: &GraphStatistics, color: bool) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "{}", heading("Combo graph", color));
    let _ = writeln!(out, "  Dataset:     {} ({})", stats.dataset.origin, stats.dataset.fingerprint);
    let _ = writeln!(out, "  Combos:      {}", figure(stats.total_combos, color));
    let _ = writeln!(out, "  Cards:       {}", figure(stats.total_cards, color));
    let _ = writeln!(out, "  Edges:       {}", figure(stats.total_edges, color));
    let _ = writeln!(out, "  Density:     {}", figure(format!("{:.6}", stats.graph_density), color));
    let _ = writeln!(out, "  Cards/combo: {:.2}", stats.avg_cards_per_combo);
    let _ = writeln!(out, "  Combos/card: {:.2}", stats.avg_combos_per_card);
    let _ = writeln!(
        out,
        "  Components:  {} (largest {}, isolated {})",
        stats.connected_components, stats.largest_connected_component, stats.isolated_combos
    );
    if stats.dataset.skipped_records > 0 {
        let _ = writeln!(out, "  Skipped:     {} records", stats.dataset.skipped_records);
    }

    let _ = writeln!(out, "\n{}", heading("Most connected combos", color));
    for combo in &stats.most_connected_combos {
        let _ = writeln!(out, "  {:>6}  {}", combo.connections, combo.id);
    }

    let _ = writeln!(out, "\n{}", heading("Most versatile cards", color));
    for card in &stats.most_versatile_cards {
        let _ = writeln!(out, "  {:>6}  {}", card.combos_count, card.name);
    }

    let _ = writeln!(out, "\n{}", heading("Color identities", color));
    for (label, count) in &stats.color_distribution {
        let _ = writeln!(out, "  {:>6}  {}", count, label);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuerySettings;
    use crate::graph::tests::scenario;
    use crate::loader::Dataset;
    use crate::query::QueryEngine;

    #[test]
    fn test_plain_report() {
        let engine = QueryEngine::new(Dataset::from_combos("fixture", scenario()), QuerySettings::default()).unwrap();
        let text = report(engine.statistics(), false);

        assert!(text.contains("Combos:      3"));
        assert!(text.contains("Isochron Scepter"));
        assert!(text.contains("Colorless"));
        assert!(!text.contains('\u{1b}'));
    }
}
