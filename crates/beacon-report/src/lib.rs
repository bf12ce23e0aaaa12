//! Report output for beacon audits.
//!
//! Renders audit results to standalone HTML reports and adds an accessibility
//! tab, pointing at the report, to pre-built component detail pages.

pub mod patch;
pub mod report;

pub use patch::{DetailPatcher, PatchOutcome};
pub use report::{ReportError, ReportWriter};
