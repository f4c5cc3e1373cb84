// panwctl - CLI utilities for Palo Alto Networks firewalls and Panorama
// Copyright (C) 2025 panwctl authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::render::OutputMode;
use anyhow::{Context, Result};
use dirs::config_dir;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Saved preferences. Every field is optional; the merged view of the user
/// and local scopes is consulted at startup and written only on an explicit
/// `configure` (or `api-key --save`).
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub default_firewall: Option<String>,
    pub panorama: Option<String>,
    pub default_user: Option<String>,
    pub domain_suffix: Option<String>,
    pub output: Option<OutputMode>,
    pub parallel: Option<usize>,
    pub retries: Option<u32>,
    #[serde(default)]
    pub verify_tls: bool,
    pub ssh: Option<SshSettings>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct SshSettings {
    #[serde(default)]
    pub key_based_auth: bool,
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".panwctl.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("PANWCTL_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("panwctl").join("config.yaml"))
        }
    }
}

/// Merged settings: user scope first, local scope on top.
pub fn load(cwd: &Path) -> Result<Settings> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?);
    let local = read_if_exists(&config_path(Scope::Local, cwd)?);
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Settings> {
    Ok(read_if_exists(&config_path(scope, cwd)?))
}

pub fn save(scope: Scope, settings: &Settings, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(settings).context("serializing settings")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    restrict_permissions(&path);
    Ok(path)
}

// The settings file may hold an API key; keep it owner-readable only.
#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!("could not restrict permissions on {:?}: {}", path, err);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

// An unreadable or corrupt settings file must not take the tool down;
// it is reported and treated as empty.
fn read_if_exists(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!("ignoring unreadable settings file {:?}: {}", path, err);
            return Settings::default();
        }
    };

    match serde_yaml::from_str(&contents) {
        Ok(settings) => settings,
        Err(err) => {
            warn!("ignoring corrupt settings file {:?}: {}", path, err);
            Settings::default()
        }
    }
}

fn merge(user: Settings, local: Settings) -> Settings {
    Settings {
        api_key: local.api_key.or(user.api_key),
        default_firewall: local.default_firewall.or(user.default_firewall),
        panorama: local.panorama.or(user.panorama),
        default_user: local.default_user.or(user.default_user),
        domain_suffix: local.domain_suffix.or(user.domain_suffix),
        output: local.output.or(user.output),
        parallel: local.parallel.or(user.parallel),
        retries: local.retries.or(user.retries),
        verify_tls: local.verify_tls || user.verify_tls,
        ssh: match (user.ssh, local.ssh) {
            (Some(u), Some(l)) => Some(merge_ssh(u, l)),
            (Some(u), None) => Some(u),
            (None, Some(l)) => Some(l),
            (None, None) => None,
        },
    }
}

fn merge_ssh(user: SshSettings, local: SshSettings) -> SshSettings {
    SshSettings {
        key_based_auth: local.key_based_auth || user.key_based_auth,
        key_file: local.key_file.or(user.key_file),
    }
}
