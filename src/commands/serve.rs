// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Serve command - runs the combo graph service

use crate::config::Settings;
use crate::server;
use anyhow::Result;
use tracing::info;

/// Run the service on TCP, or on stdio when `stdio` is set
pub async fn run(settings: Settings, stdio: bool) -> Result<()> {
    info!(
        dataset = %settings.dataset.path.display(),
        transport = if stdio { "stdio" } else { "tcp" },
        "Starting combo graph service"
    );
    server::run(settings, stdio).await
}
