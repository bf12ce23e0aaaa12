//! Standalone HTML audit reports.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{context, Environment};
use serde::Serialize;

use beacon_browser::{AuditItem, AuditResult, CategoryScore};

/// Errors that can occur while writing reports or patching pages.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to render report: {0}")]
    Template(String),

    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Detail page not found: {0}")]
    DetailNotFound(String),

    #[error("Detail page for {page} has no element matching '{selector}'")]
    MissingStructure { page: String, selector: String },

    #[error("Failed to rewrite HTML: {0}")]
    Rewrite(String),
}

/// One category as shown in the report.
#[derive(Debug, Serialize)]
struct CategoryView<'a> {
    title: &'a str,
    percent: u32,
    grade: &'static str,
    failing: Vec<&'a AuditItem>,
    passing: Vec<&'a AuditItem>,
    manual: Vec<&'a AuditItem>,
    not_applicable: usize,
}

impl<'a> CategoryView<'a> {
    fn new(result: &'a AuditResult, category: &'a CategoryScore) -> Self {
        let percent = category.percent();
        let audits: Vec<&AuditItem> = result.audits_for(category).collect();

        Self {
            title: &category.title,
            percent,
            grade: grade(percent),
            failing: audits.iter().copied().filter(|a| a.is_failing()).collect(),
            passing: audits.iter().copied().filter(|a| a.is_passing()).collect(),
            manual: audits
                .iter()
                .copied()
                .filter(|a| a.display_mode == "manual")
                .collect(),
            not_applicable: audits
                .iter()
                .filter(|a| a.display_mode == "notApplicable")
                .count(),
        }
    }
}

/// Lighthouse's score bands.
fn grade(percent: u32) -> &'static str {
    match percent {
        90..=100 => "pass",
        50..=89 => "average",
        _ => "fail",
    }
}

/// Writes one report file per audited page.
pub struct ReportWriter {
    report_dir: PathBuf,
    env: Environment<'static>,
}

impl ReportWriter {
    /// Create a writer for `report_dir`, creating the directory if needed.
    pub fn new(report_dir: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let report_dir = report_dir.into();

        fs::create_dir_all(&report_dir).map_err(|e| ReportError::Write {
            path: report_dir.display().to_string(),
            message: e.to_string(),
        })?;

        let mut env = Environment::new();
        env.add_template("report.html", REPORT_TEMPLATE)
            .map_err(|e| ReportError::Template(e.to_string()))?;

        Ok(Self { report_dir, env })
    }

    /// Directory reports are written to.
    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// Path of the report for `page_id`.
    pub fn report_path(&self, page_id: &str) -> PathBuf {
        self.report_dir.join(page_id)
    }

    /// Render `result` to a self-contained HTML document.
    pub fn render(&self, page_id: &str, result: &AuditResult) -> Result<String, ReportError> {
        let categories: Vec<CategoryView> = result
            .categories
            .iter()
            .map(|c| CategoryView::new(result, c))
            .collect();

        let tmpl = self
            .env
            .get_template("report.html")
            .map_err(|e| ReportError::Template(e.to_string()))?;

        tmpl.render(context! {
            page_id => page_id,
            url => &result.final_url,
            fetch_time => &result.fetch_time,
            engine_version => &result.engine_version,
            categories => categories,
        })
        .map_err(|e| ReportError::Template(e.to_string()))
    }

    /// Render and write the report for `page_id`, replacing any previous one.
    pub fn write_report(&self, page_id: &str, result: &AuditResult) -> Result<PathBuf, ReportError> {
        let html = self.render(page_id, result)?;
        let path = self.report_path(page_id);
        write_atomic(&path, &html)?;
        tracing::info!("Wrote report {}", path.display());
        Ok(path)
    }
}

/// Write through a sibling temp file so readers never see a partial file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), ReportError> {
    let write_err = |e: std::io::Error| ReportError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp, contents).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        write_err(e)
    })
}

const REPORT_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Accessibility report - {{ page_id }}</title>
  <style>
    body { font-family: system-ui, sans-serif; margin: 0; padding: 1.5rem; color: #212121; }
    header { display: flex; flex-wrap: wrap; gap: 1.5rem; align-items: center; margin-bottom: 1.5rem; }
    .meta { font-size: 0.8rem; color: #616161; }
    .gauge { width: 5rem; height: 5rem; border-radius: 50%; display: flex; align-items: center;
             justify-content: center; font-size: 1.5rem; font-weight: 600; border: 0.4rem solid; }
    .gauge.pass { color: #0c6b2c; border-color: #0cce6b; }
    .gauge.average { color: #8a4b00; border-color: #ffa400; }
    .gauge.fail { color: #b00020; border-color: #ff4e42; }
    h2 { font-size: 1.1rem; margin: 1.5rem 0 0.5rem; }
    ul.audits { list-style: none; padding: 0; margin: 0; }
    ul.audits li { padding: 0.5rem 0; border-bottom: 1px solid #e0e0e0; }
    .audit-title { font-weight: 500; }
    .audit-description { font-size: 0.85rem; color: #616161; margin-top: 0.25rem; }
    .failing .audit-title::before { content: "\2717  "; color: #ff4e42; }
    .passing .audit-title::before { content: "\2713  "; color: #0cce6b; }
    .manual .audit-title::before { content: "\25CB  "; color: #757575; }
  </style>
</head>
<body>
{% for category in categories %}
  <section class="category">
    <header>
      <div class="gauge {{ category.grade }}" role="img" aria-label="{{ category.title }} score {{ category.percent }} percent">{{ category.percent }}</div>
      <div>
        <h1>{{ category.title }}</h1>
        <div class="meta">{{ url }}</div>
        <div class="meta">{{ fetch_time }}{% if engine_version %} &middot; Lighthouse {{ engine_version }}{% endif %}</div>
      </div>
    </header>

    {% if category.failing %}
    <h2>Failed checks ({{ category.failing | length }})</h2>
    <ul class="audits failing">
      {% for audit in category.failing %}
      <li><div class="audit-title">{{ audit.title }}</div><div class="audit-description">{{ audit.description }}</div></li>
      {% endfor %}
    </ul>
    {% endif %}

    {% if category.manual %}
    <h2>Additional items to check manually ({{ category.manual | length }})</h2>
    <ul class="audits manual">
      {% for audit in category.manual %}
      <li><div class="audit-title">{{ audit.title }}</div><div class="audit-description">{{ audit.description }}</div></li>
      {% endfor %}
    </ul>
    {% endif %}

    {% if category.passing %}
    <h2>Passed checks ({{ category.passing | length }})</h2>
    <ul class="audits passing">
      {% for audit in category.passing %}
      <li><div class="audit-title">{{ audit.title }}</div></li>
      {% endfor %}
    </ul>
    {% endif %}

    {% if category.not_applicable %}
    <p class="meta">{{ category.not_applicable }} check(s) not applicable to this component.</p>
    {% endif %}
  </section>
{% endfor %}
</body>
</html>"##;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn item(id: &str, score: Option<f64>, mode: &str) -> AuditItem {
        AuditItem {
            id: id.to_string(),
            title: format!("{} title", id),
            description: format!("{} description", id),
            score,
            display_mode: mode.to_string(),
        }
    }

    fn result(score: f64) -> AuditResult {
        AuditResult {
            requested_url: "http://127.0.0.1:3000/components/preview/button.html".to_string(),
            final_url: "http://127.0.0.1:3000/components/preview/button.html".to_string(),
            fetch_time: "2024-05-01T10:00:00.000Z".to_string(),
            engine_version: "9.6.8".to_string(),
            categories: vec![CategoryScore {
                id: "accessibility".to_string(),
                title: "Accessibility".to_string(),
                score,
                audit_ids: vec![
                    "button-name".to_string(),
                    "color-contrast".to_string(),
                    "tab-order".to_string(),
                    "video-caption".to_string(),
                ],
            }],
            audits: vec![
                item("button-name", Some(1.0), "binary"),
                item("color-contrast", Some(0.0), "binary"),
                item("tab-order", None, "manual"),
                item("video-caption", None, "notApplicable"),
            ],
        }
    }

    #[test]
    fn renders_score_and_checks() {
        let temp = tempdir().unwrap();
        let writer = ReportWriter::new(temp.path().join("report")).unwrap();

        let html = writer.render("button.html", &result(0.82)).unwrap();

        assert!(html.contains("<title>Accessibility report - button.html</title>"));
        assert!(html.contains(r#"class="gauge average""#));
        assert!(html.contains(">82</div>"));
        assert!(html.contains("Failed checks (1)"));
        assert!(html.contains("color-contrast title"));
        assert!(html.contains("Additional items to check manually (1)"));
        assert!(html.contains("Passed checks (1)"));
        assert!(html.contains("1 check(s) not applicable"));
    }

    #[test]
    fn report_is_self_contained() {
        let temp = tempdir().unwrap();
        let writer = ReportWriter::new(temp.path().join("report")).unwrap();

        let html = writer.render("button.html", &result(1.0)).unwrap();

        assert!(!html.contains("<link"));
        assert!(!html.contains("<script"));
        assert!(html.contains(r#"class="gauge pass""#));
    }

    #[test]
    fn overwrites_previous_report() {
        let temp = tempdir().unwrap();
        let writer = ReportWriter::new(temp.path().join("report")).unwrap();

        writer.write_report("button.html", &result(0.3)).unwrap();
        let path = writer.write_report("button.html", &result(0.95)).unwrap();

        let html = fs::read_to_string(&path).unwrap();
        assert!(html.contains(">95</div>"));
        assert!(!html.contains(">30</div>"));

        let files: Vec<_> = fs::read_dir(writer.report_dir()).unwrap().collect();
        assert_eq!(files.len(), 1, "temp files must not be left behind");
    }

    #[test]
    fn escapes_engine_text() {
        let temp = tempdir().unwrap();
        let writer = ReportWriter::new(temp.path().join("report")).unwrap();

        let mut result = result(0.5);
        result.audits[1].title = "<script>alert(1)</script>".to_string();

        let html = writer.render("button.html", &result).unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
    }

    #[test]
    fn grades_follow_score_bands() {
        assert_eq!(grade(100), "pass");
        assert_eq!(grade(90), "pass");
        assert_eq!(grade(89), "average");
        assert_eq!(grade(50), "average");
        assert_eq!(grade(49), "fail");
    }
}
