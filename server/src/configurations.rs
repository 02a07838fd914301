// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use config::{Config, Environment, File, FileFormat};

use crate::settings::Settings;

/// Loads `<prefix>configuration/base.yaml`, overlaid with the optional
/// `<prefix>configuration/local.yaml`, overlaid with `SIPSERVER_`-prefixed
/// environment variables (`SIPSERVER_APPLICATION__LISTEN_METRICS=...`).
pub fn get_configuration(prefix: &str) -> Result<Settings, config::ConfigError> {
    let base = format!("{prefix}configuration/base.yaml");
    let local = format!("{prefix}configuration/local.yaml");
    build_configuration(File::with_name(&base), File::with_name(&local).required(false))
}

pub fn get_configuration_from_str(
    base: &str,
    local: &str,
) -> Result<Settings, config::ConfigError> {
    build_configuration(
        File::from_str(base, FileFormat::Yaml),
        File::from_str(local, FileFormat::Yaml),
    )
}

fn build_configuration(
    base: impl config::Source + Send + Sync + 'static,
    local: impl config::Source + Send + Sync + 'static,
) -> Result<Settings, config::ConfigError> {
    Config::builder()
        .add_source(base)
        .add_source(local)
        .add_source(Environment::with_prefix("sipserver").separator("__"))
        .build()?
        .try_deserialize()
}
