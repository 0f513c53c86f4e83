//! INI parsing logic for converting `Ini` → `TowerConfig`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::file::ConfigFileError;
use super::settings::{RecipeSource, TowerConfig};
use crate::barcode::Orientation;
use crate::fixture::FixtureId;

/// Parse an `Ini` object into a `TowerConfig`.
///
/// Starts from `TowerConfig::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<TowerConfig, ConfigFileError> {
    let mut config = TowerConfig::default();

    // [tower] section
    if let Some(section) = ini.section(Some("tower")) {
        if let Some(v) = non_empty(section, "line") {
            config.tower.line = v.to_string();
        }
        if let Some(v) = non_empty(section, "process") {
            config.tower.process = v.to_string();
        }
        if let Some(v) = non_empty(section, "aisle") {
            config.tower.aisle = v.to_string();
        }
        if let Some(v) = section.get("fixtures") {
            let fixtures = parse_fixture_list("tower", "fixtures", v)?;
            if fixtures.is_empty() {
                return Err(invalid("tower", "fixtures", v, "at least one fixture is required"));
            }
            config.tower.fixtures = fixtures;
        }
        if let Some(v) = section.get("allowed_fixtures") {
            config.tower.allowed_fixtures = parse_fixture_list("tower", "allowed_fixtures", v)?;
        }
        if let Err(e) = config.tower.fixture_barcode(config.tower.fixtures[0]) {
            return Err(invalid(
                "tower",
                "line",
                &config.tower.line,
                &format!("location does not form a fixture barcode: {}", e),
            ));
        }
    }

    // [cell_api] section
    if let Some(section) = ini.section(Some("cell_api")) {
        if let Some(v) = non_empty(section, "base_url") {
            config.cell_api.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = section.get("mock") {
            config.cell_api.mock = parse_bool("cell_api", "mock", v)?;
        }
        if let Some(v) = section.get("timeout_secs") {
            config.cell_api.timeout = secs("cell_api", "timeout_secs", v)?;
        }
        let endpoints = &mut config.cell_api.endpoints;
        for (key, slot) in [
            ("next_process_step_path", &mut endpoints.next_process_step),
            ("cell_map_path", &mut endpoints.cell_map),
            ("process_status_path", &mut endpoints.process_status),
            ("cell_status_path", &mut endpoints.cell_status),
            ("close_process_path", &mut endpoints.close_process),
            ("hold_tray_path", &mut endpoints.hold_tray),
        ] {
            if let Some(v) = non_empty(section, key) {
                if !v.starts_with('/') {
                    return Err(invalid("cell_api", key, v, "path must start with '/'"));
                }
                *slot = v.to_string();
            }
        }
    }

    // [recipes] section
    if let Some(section) = ini.section(Some("recipes")) {
        if let Some(v) = section.get("source") {
            config.recipes.source = RecipeSource::from_str(v)
                .map_err(|reason| invalid("recipes", "source", v, &reason))?;
        }
        if let Some(v) = non_empty(section, "recipe_file") {
            config.recipes.recipe_file = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "ingredients_file") {
            config.recipes.ingredients_file = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "allowed_step_type") {
            config.recipes.allowed_step_type = v.to_string();
        }
    }

    // [telemetry] section
    if let Some(section) = ini.section(Some("telemetry")) {
        if let Some(v) = section.get("operational_expiry_ms") {
            config.telemetry.operational_expiry = millis("telemetry", "operational_expiry_ms", v)?;
        }
        if let Some(v) = section.get("diagnostic_expiry_ms") {
            config.telemetry.diagnostic_expiry = millis("telemetry", "diagnostic_expiry_ms", v)?;
        }
    }

    // [workflow] section
    if let Some(section) = ini.section(Some("workflow")) {
        if let Some(v) = section.get("poll_interval_ms") {
            config.workflow.poll_interval = millis("workflow", "poll_interval_ms", v)?;
        }
        if let Some(v) = section.get("readiness_timeout_secs") {
            config.workflow.readiness_timeout = secs("workflow", "readiness_timeout_secs", v)?;
        }
        if let Some(v) = section.get("mailbox_timeout_ms") {
            config.workflow.mailbox_timeout = millis("workflow", "mailbox_timeout_ms", v)?;
        }
        if let Some(v) = section.get("queue_depth") {
            let depth: usize = number("workflow", "queue_depth", v)?;
            if depth == 0 {
                return Err(invalid("workflow", "queue_depth", v, "must be at least 1"));
            }
            config.workflow.queue_depth = depth;
        }
        if let Some(v) = section.get("max_fixture_faults") {
            config.workflow.max_fixture_faults = number("workflow", "max_fixture_faults", v)?;
        }
        if let Some(v) = section.get("recover_in_progress") {
            config.workflow.recover_in_progress =
                parse_bool("workflow", "recover_in_progress", v)?;
        }
    }

    // [cell_map] section: one key per orientation, positions in channel order
    if let Some(section) = ini.section(Some("cell_map")) {
        for (key, value) in section.iter() {
            let orientation = parse_orientation(key)
                .ok_or_else(|| invalid("cell_map", key, value, "key must be A-D or 1-4"))?;
            let positions: Vec<String> = value
                .split(',')
                .map(|p| p.trim().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect();
            if positions.is_empty() {
                return Err(invalid("cell_map", key, value, "expected a list of positions"));
            }
            config.cell_map.insert(orientation, positions);
        }
    }

    // [transport] section
    if let Some(section) = ini.section(Some("transport")) {
        if let Some(v) = section.get("listen_addr") {
            config.transport.listen_addr = number("transport", "listen_addr", v)?;
        }
        if let Some(v) = section.get("publish_addr") {
            config.transport.publish_addr = number("transport", "publish_addr", v)?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section, "directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "file") {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "could not parse value"))
}

fn millis(section: &str, key: &str, value: &str) -> Result<Duration, ConfigFileError> {
    let ms: u64 = number(section, key, value)?;
    if ms == 0 {
        return Err(invalid(section, key, value, "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

fn secs(section: &str, key: &str, value: &str) -> Result<Duration, ConfigFileError> {
    let s: u64 = number(section, key, value)?;
    if s == 0 {
        return Err(invalid(section, key, value, "must be greater than zero"));
    }
    Ok(Duration::from_secs(s))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false")),
    }
}

fn parse_fixture_list(
    section: &str,
    key: &str,
    value: &str,
) -> Result<Vec<FixtureId>, ConfigFileError> {
    let mut fixtures = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id = FixtureId::from_str(item)
            .map_err(|_| invalid(section, key, item, "expected fixture ids like 01-01"))?;
        if !fixtures.contains(&id) {
            fixtures.push(id);
        }
    }
    Ok(fixtures)
}

fn parse_orientation(key: &str) -> Option<Orientation> {
    let key = key.trim();
    if let Ok(n) = key.parse::<u8>() {
        return Orientation::ALL.iter().copied().find(|o| o.number() == n);
    }
    Orientation::from_str(key).ok()
}

/// Expand a leading `~/` to the user's home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
