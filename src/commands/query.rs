// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Query command - answers one method in-process, without a server

use crate::config::Settings;
use crate::rpc;
use anyhow::{Context, Result};

/// Load the dataset, run `method` with JSON `params`, print the result
pub fn run(settings: &Settings, method: &str, params: Option<&str>) -> Result<()> {
    let params = super::parse_params(params)?;
    let engine = super::load_engine(settings)?;

    let result = rpc::handle(&engine, method, params).with_context(|| format!("{method} failed"))?;
    super::print_json(&result)
}
