//! Configuration file (beacon.toml) and its overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use beacon_audit::{AuditConfig, SiteLayout};

/// Configuration file structure (beacon.toml).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub audit: AuditSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSection {
    /// Built site served to the browsers
    pub dir: PathBuf,
    /// Component tree below `dir`
    pub components: PathBuf,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("build"),
            components: PathBuf::from("components"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSection {
    pub instances: usize,
    pub categories: Vec<String>,
    pub max_retries: Option<u32>,
    pub lighthouse: String,
    pub chrome: Option<PathBuf>,
    pub shutdown_timeout_secs: u64,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            instances: 1,
            categories: vec!["accessibility".to_string()],
            max_retries: None,
            lighthouse: "lighthouse".to_string(),
            chrome: None,
            shutdown_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Values given on the command line.
#[derive(Debug, Default)]
pub struct Overrides {
    pub dir: Option<PathBuf>,
    pub instances: Option<usize>,
    pub port: Option<u16>,
    pub max_retries: Option<u32>,
}

impl ConfigFile {
    /// Load `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Apply command line overrides and the `PORT` environment value.
    pub fn resolve(self, overrides: Overrides, port_env: Option<String>) -> Result<Resolved> {
        let port = match (overrides.port, port_env) {
            (Some(port), _) => port,
            (None, Some(env)) => env
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value '{}'", env))?,
            (None, None) => self.server.port,
        };

        let instances = overrides.instances.unwrap_or(self.audit.instances);
        if instances == 0 {
            bail!("At least one browser instance is required");
        }

        if self.audit.categories.is_empty() {
            bail!("At least one audit category is required");
        }

        let layout = SiteLayout {
            root: overrides.dir.unwrap_or(self.site.dir),
            components: self.site.components,
        };

        Ok(Resolved {
            audit: AuditConfig {
                layout,
                host: "127.0.0.1".to_string(),
                port,
                instances,
                categories: self.audit.categories,
                max_retries: overrides.max_retries.or(self.audit.max_retries),
                shutdown_timeout: Duration::from_secs(self.audit.shutdown_timeout_secs),
            },
            lighthouse: self.audit.lighthouse,
            chrome: self.audit.chrome,
        })
    }
}

/// Fully resolved settings for a command.
#[derive(Debug)]
pub struct Resolved {
    pub audit: AuditConfig,
    pub lighthouse: String,
    pub chrome: Option<PathBuf>,
}

/// Load `path` and resolve it against `overrides` and the process environment.
pub fn load(path: &Path, overrides: Overrides) -> Result<Resolved> {
    ConfigFile::load(path)?.resolve(overrides, std::env::var("PORT").ok())
}
