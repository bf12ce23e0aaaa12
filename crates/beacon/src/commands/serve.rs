//! Serve command.

use std::path::Path;

use anyhow::{Context, Result};
use beacon_server::{StaticServer, StaticServerConfig};

use crate::config::{self, Overrides};

/// Run the serve command.
pub async fn run(config_path: &Path, overrides: Overrides) -> Result<()> {
    let resolved = config::load(config_path, overrides)?;
    let audit = resolved.audit;

    let server = StaticServer::bind(StaticServerConfig {
        root: audit.layout.root.clone(),
        host: audit.host,
        port: audit.port,
    })
    .await
    .with_context(|| format!("Failed to serve {}", audit.layout.root.display()))?;

    server.run().await?;

    Ok(())
}
