// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Config command - prints the effective settings

use crate::config::Settings;
use anyhow::{bail, Context, Result};

/// Print all settings as TOML, or the value at a dotted `key`
pub fn run(settings: &Settings, key: Option<&str>) -> Result<()> {
    let rendered = render(settings, key)?;
    println!("{}", rendered.trim_end());
    Ok(())
}

fn render(settings: &Settings, key: Option<&str>) -> Result<String> {
    let Some(key) = key else {
        return toml::to_string_pretty(settings).context("Failed to render settings");
    };

    let root = toml::Value::try_from(settings).context("Failed to render settings")?;
    let mut current = &root;
    for part in key.split('.') {
        current = match current.get(part) {
            Some(value) => value,
            None => bail!("Unknown config key: {key}"),
        };
    }

    Ok(match current {
        toml::Value::String(s) => s.clone(),
        toml::Value::Table(_) => toml::to_string_pretty(current)?,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_key() {
        let settings = Settings::default();
        assert_eq!(render(&settings, Some("server.port")).unwrap(), "8080");
        assert_eq!(render(&settings, Some("server.host")).unwrap(), "127.0.0.1");
        assert!(render(&settings, Some("server.nope")).is_err());
    }

    #[test]
    fn test_render_all() {
        let out = render(&Settings::default(), None).unwrap();
        assert!(out.contains("[query]"));
        assert!(out.contains("max_chain_depth = 6"));
    }
}
