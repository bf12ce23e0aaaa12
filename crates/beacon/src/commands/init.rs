//! Write a default configuration file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Run the init command.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    if config_path.exists() && !yes {
        tracing::warn!(
            "{} already exists. Use --yes to overwrite.",
            config_path.display()
        );
        return Ok(());
    }

    fs::write(config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    tracing::info!("Created {}", config_path.display());
    tracing::info!("Run 'beacon audit' after building your documentation site.");

    Ok(())
}

pub(crate) const DEFAULT_CONFIG: &str = r#"# Beacon Configuration

[site]
# Built documentation site
dir = "build"

# Component tree below the site root; previews are read from
# <components>/preview and detail pages patched in <components>/detail
components = "components"

[audit]
# Number of headless browsers auditing in parallel
instances = 1

# Lighthouse categories to run; the first one labels detail pages
categories = ["accessibility"]

# Give up on a page after this many failed retries (unset retries forever)
# max_retries = 3

# Lighthouse executable
lighthouse = "lighthouse"

# Chrome executable (detected when unset)
# chrome = "/usr/bin/chromium"

# Seconds each browser gets to exit at shutdown
shutdown_timeout_secs = 10

[server]
# Port the site is served on (PORT overrides it)
port = 3000
"#;
