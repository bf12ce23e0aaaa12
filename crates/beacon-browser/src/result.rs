//! Structured audit results.
//!
//! Parses the JSON report Lighthouse emits (the "LHR") down to the parts a
//! report page needs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::traits::AuditError;

/// Score of one audit category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
    /// Category identifier (e.g. "accessibility")
    pub id: String,

    /// Human readable title
    pub title: String,

    /// Score between 0 and 1
    pub score: f64,

    /// Audits contributing to this category
    pub audit_ids: Vec<String>,
}

impl CategoryScore {
    /// Score as a whole percentage.
    pub fn percent(&self) -> u32 {
        (self.score * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

/// One individual check within a category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditItem {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Absent for manual, informative and not-applicable checks
    pub score: Option<f64>,
    /// Lighthouse score display mode ("binary", "manual", "notApplicable", ...)
    pub display_mode: String,
}

impl AuditItem {
    /// Whether the check was scored and did not fully pass.
    pub fn is_failing(&self) -> bool {
        self.is_scored() && self.score.map_or(false, |s| s < 1.0)
    }

    /// Whether the check was scored and passed.
    pub fn is_passing(&self) -> bool {
        self.is_scored() && self.score.map_or(false, |s| s >= 1.0)
    }

    fn is_scored(&self) -> bool {
        self.display_mode == "binary" || self.display_mode == "numeric"
    }
}

/// Result of auditing one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditResult {
    /// URL the engine was asked to load
    pub requested_url: String,

    /// URL after redirects
    pub final_url: String,

    /// Engine timestamp of the run
    pub fetch_time: String,

    /// Engine version string
    pub engine_version: String,

    /// Scores in the order the categories were requested
    pub categories: Vec<CategoryScore>,

    /// Checks referenced by the requested categories
    pub audits: Vec<AuditItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReport {
    #[serde(default)]
    lighthouse_version: String,
    #[serde(default)]
    requested_url: Option<String>,
    #[serde(default)]
    final_url: Option<String>,
    #[serde(default)]
    final_displayed_url: Option<String>,
    #[serde(default)]
    fetch_time: String,
    #[serde(default)]
    runtime_error: Option<RawRuntimeError>,
    #[serde(default)]
    categories: BTreeMap<String, RawCategory>,
    #[serde(default)]
    audits: BTreeMap<String, RawAudit>,
}

#[derive(Debug, Deserialize)]
struct RawRuntimeError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCategory {
    #[serde(default)]
    title: String,
    score: Option<f64>,
    #[serde(default)]
    audit_refs: Vec<RawAuditRef>,
}

#[derive(Debug, Deserialize)]
struct RawAuditRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAudit {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    score: Option<f64>,
    #[serde(default)]
    score_display_mode: String,
}

impl AuditResult {
    /// Parse a Lighthouse JSON report, keeping only `categories`.
    ///
    /// A report carrying a runtime error, or lacking a score for any requested
    /// category, is treated as a failed audit.
    pub fn from_lighthouse_json(json: &str, categories: &[String]) -> Result<Self, AuditError> {
        let mut raw: RawReport =
            serde_json::from_str(json).map_err(|e| AuditError::InvalidReport(e.to_string()))?;

        if let Some(err) = raw.runtime_error.take() {
            return Err(AuditError::RuntimeError {
                code: err.code,
                message: err.message,
            });
        }

        let mut scores = Vec::with_capacity(categories.len());
        let mut audits = Vec::new();

        for id in categories {
            let category = raw
                .categories
                .remove(id)
                .ok_or_else(|| AuditError::MissingCategory(id.clone()))?;
            let score = category
                .score
                .ok_or_else(|| AuditError::MissingCategory(id.clone()))?;

            let audit_ids: Vec<String> =
                category.audit_refs.into_iter().map(|r| r.id).collect();

            // Categories may share checks; keep one copy of each.
            for audit_id in &audit_ids {
                if audits.iter().any(|a: &AuditItem| &a.id == audit_id) {
                    continue;
                }
                if let Some(audit) = raw.audits.get(audit_id) {
                    audits.push(AuditItem {
                        id: audit.id.clone(),
                        title: audit.title.clone(),
                        description: audit.description.clone(),
                        score: audit.score,
                        display_mode: audit.score_display_mode.clone(),
                    });
                }
            }

            scores.push(CategoryScore {
                id: id.clone(),
                title: if category.title.is_empty() {
                    id.clone()
                } else {
                    category.title
                },
                score,
                audit_ids,
            });
        }

        let requested_url = raw.requested_url.unwrap_or_default();
        let final_url = raw
            .final_displayed_url
            .or(raw.final_url)
            .unwrap_or_else(|| requested_url.clone());

        Ok(Self {
            requested_url,
            final_url,
            fetch_time: raw.fetch_time,
            engine_version: raw.lighthouse_version,
            categories: scores,
            audits,
        })
    }

    /// Score for `category`, if it was audited.
    pub fn category(&self, id: &str) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// The first requested category; the score shown on detail pages.
    pub fn primary(&self) -> Option<&CategoryScore> {
        self.categories.first()
    }

    /// Checks belonging to `category`.
    pub fn audits_for<'a>(&'a self, category: &'a CategoryScore) -> impl Iterator<Item = &'a AuditItem> {
        self.audits
            .iter()
            .filter(move |a| category.audit_ids.contains(&a.id))
    }
}
