// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Command implementations

pub mod call;
pub mod completions;
pub mod config;
pub mod export;
pub mod query;
pub mod serve;
pub mod stats;

use crate::config::Settings;
use crate::query::QueryEngine;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;

/// Load the configured dataset and build an engine in-process
pub fn load_engine(settings: &Settings) -> Result<QueryEngine> {
    let path = &settings.dataset.path;
    QueryEngine::open(path, settings.query.clone())
        .with_context(|| format!("Failed to load combo dataset from {}", path.display()))
}

/// Parse a JSON params argument; absent means no params
pub fn parse_params(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(text) => serde_json::from_str(text).with_context(|| format!("Params are not valid JSON: {text}")),
    }
}

/// Pretty-print a value as JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    stdout.write_all(b"\n")?;
    Ok(())
}
