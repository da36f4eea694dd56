//! Configuration file support for the treedav binary.
//!
//! Configuration is read from `--config`, or from `~/.config/treedav/config.toml`
//! (XDG standard) / the platform equivalent when that file exists.
//!
//! # Example configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8080
//!
//! [mounts.photos]
//! backend = "filesystem"
//! root = "/srv/photos"
//!
//! [mounts.scratch]
//! backend = "memory"
//! ```

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub server: ServerSection,

    /// Mounts keyed by URL prefix
    #[serde(default)]
    pub mounts: BTreeMap<String, MountConfig>,
}

/// `[server]` table
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
}

/// Storage behind a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Filesystem,
    Memory,
}

/// `[mounts.<prefix>]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    pub backend: BackendKind,
    /// Host directory; required for filesystem mounts
    pub root: Option<PathBuf>,
}

/// A fully resolved mount, ready to be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSpec {
    Filesystem { prefix: String, root: PathBuf },
    Memory { prefix: String },
}

impl MountSpec {
    pub fn prefix(&self) -> &str {
        match self {
            MountSpec::Filesystem { prefix, .. } | MountSpec::Memory { prefix } => prefix,
        }
    }
}

impl Config {
    /// Load `explicit` if given, else the default config file if it exists,
    /// else an empty configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Config::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Mounts declared in the file, in prefix order.
    pub fn mount_specs(&self) -> Result<Vec<MountSpec>> {
        self.mounts
            .iter()
            .map(|(prefix, mount)| match mount.backend {
                BackendKind::Memory => Ok(MountSpec::Memory {
                    prefix: prefix.clone(),
                }),
                BackendKind::Filesystem => {
                    let root = mount.root.clone().ok_or_else(|| {
                        anyhow::anyhow!("mount '{prefix}' uses the filesystem backend but has no root")
                    })?;
                    Ok(MountSpec::Filesystem {
                        prefix: prefix.clone(),
                        root,
                    })
                }
            })
            .collect()
    }
}

/// Combine file mounts with command-line mounts.
///
/// A command-line mount replaces a file mount with the same prefix.
pub fn merge_mounts(from_file: Vec<MountSpec>, from_flags: Vec<MountSpec>) -> Vec<MountSpec> {
    let mut merged: Vec<MountSpec> = from_file
        .into_iter()
        .filter(|spec| !from_flags.iter().any(|flag| flag.prefix() == spec.prefix()))
        .collect();
    merged.extend(from_flags);
    merged
}

/// Parse a `--fs PREFIX=DIR` argument.
pub fn parse_fs_mount(arg: &str) -> Result<MountSpec, String> {
    let (prefix, root) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected PREFIX=DIR, got '{arg}'"))?;
    if prefix.is_empty() || root.is_empty() {
        return Err(format!("expected PREFIX=DIR, got '{arg}'"));
    }
    Ok(MountSpec::Filesystem {
        prefix: prefix.to_string(),
        root: PathBuf::from(root),
    })
}

/// Parse a `--memory PREFIX` argument.
pub fn parse_memory_mount(arg: &str) -> Result<MountSpec, String> {
    if arg.is_empty() {
        return Err("mount prefix cannot be empty".to_string());
    }
    Ok(MountSpec::Memory {
        prefix: arg.to_string(),
    })
}

/// Get the path to the default configuration file.
///
/// Uses the XDG config directory on Linux, Application Support on macOS.
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "treedav").map(|dirs| dirs.config_dir().join("config.toml"))
}
