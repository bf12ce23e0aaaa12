//! Audit orchestration for component previews.
//!
//! Serves the built site, runs one accessibility audit per preview page on a
//! pool of headless browsers, retries failed audits, writes reports, patches
//! detail pages, and shuts everything down once every page is done.

pub mod layout;
pub mod lifecycle;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use layout::{PreviewPage, SiteLayout};
pub use lifecycle::{run_audit, AuditConfig};
pub use orchestrator::{AuditSettings, AuditSummary, Orchestrator, OrchestratorError, RunState};
