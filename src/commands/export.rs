// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Export command - writes the combo graph in DOT or JSON

use crate::config::Settings;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Graphviz DOT format
    Dot,
    /// JSON format
    Json,
}

impl ExportFormat {
    /// Parse format from string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dot" | "graphviz" => Some(Self::Dot),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Get file extension for format
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Dot => "dot",
            Self::Json => "json",
        }
    }
}

/// Run the export command. With `combos`, DOT output is the bipartite
/// combo/card subgraph of just those combos.
pub fn run(settings: &Settings, format: &str, output: Option<PathBuf>, combos: &[String]) -> Result<()> {
    let export_format = ExportFormat::parse(format)
        .ok_or_else(|| anyhow::anyhow!("Unknown export format: {}. Supported: dot, json", format))?;
    info!("Exporting to {}", export_format.extension());

    let engine = super::load_engine(settings)?;
    let graph = engine.graph();

    let content = match export_format {
        ExportFormat::Dot if combos.is_empty() => graph.to_dot(),
        ExportFormat::Dot => graph.subgraph_dot(combos),
        ExportFormat::Json => {
            if !combos.is_empty() {
                anyhow::bail!("--combos is only supported for DOT export");
            }
            graph.to_json()?
        }
    };

    match output {
        Some(path) => {
            fs::write(&path, &content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}
