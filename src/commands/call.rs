// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Call and health commands - talk to a running service

use crate::client::ComboGraphClient;
use crate::config::Settings;
use crate::rpc::Method;
use anyhow::{Context, Result};

async fn connect(settings: &Settings, address: Option<String>) -> Result<ComboGraphClient> {
    let address = address.unwrap_or_else(|| settings.server.address());
    ComboGraphClient::connect(address.as_str(), settings.client.clone())
        .await
        .with_context(|| format!("Is the service running on {address}?"))
}

/// Send one request to the service and print the result
pub async fn run(settings: &Settings, address: Option<String>, method: &str, params: Option<&str>) -> Result<()> {
    let params = super::parse_params(params)?;
    let client = connect(settings, address).await?;

    if !Method::from_name(method).is_some_and(Method::is_ungated) {
        client.ensure_ready().await.context("Service did not become ready")?;
    }

    let result = client
        .call(method, params)
        .await
        .with_context(|| format!("{method} failed"))?;
    super::print_json(&result)
}

/// Print the service's health report
pub async fn health(settings: &Settings, address: Option<String>) -> Result<()> {
    let client = connect(settings, address).await?;
    let report = client.health().await.context("Health check failed")?;
    super::print_json(&report)
}
