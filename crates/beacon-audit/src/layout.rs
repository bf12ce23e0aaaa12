//! Directory layout of a built documentation site.

use std::path::{Component, Path, PathBuf};

use url::Url;
use walkdir::WalkDir;

use crate::orchestrator::OrchestratorError;

/// One preview page to audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewPage {
    /// File name, shared by the preview, detail, and report files
    pub id: String,

    /// URL the page is served at
    pub url: String,
}

/// Where previews, detail pages, and reports live in a built site.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    /// Served root directory
    pub root: PathBuf,

    /// Component tree, relative to `root`
    pub components: PathBuf,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("build"),
            components: PathBuf::from("components"),
        }
    }
}

impl SiteLayout {
    /// Create a layout rooted at `root` with the default component tree.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    fn component_dir(&self) -> PathBuf {
        self.root.join(&self.components)
    }

    /// Directory of standalone component previews.
    pub fn preview_dir(&self) -> PathBuf {
        self.component_dir().join("preview")
    }

    /// Directory of documentation detail pages.
    pub fn detail_dir(&self) -> PathBuf {
        self.component_dir().join("detail")
    }

    /// Directory reports are written to.
    pub fn report_dir(&self) -> PathBuf {
        self.component_dir().join("report")
    }

    /// Report location relative to a detail page.
    pub fn report_href(&self, page_id: &str) -> String {
        format!("../report/{}", page_id)
    }

    /// URL of the preview `page_id` under `base_url`.
    pub fn preview_url(&self, base_url: &str, page_id: &str) -> Result<String, OrchestratorError> {
        let invalid = |message: String| OrchestratorError::Discovery {
            path: base_url.to_string(),
            message,
        };

        let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| invalid("base URL cannot have a path".to_string()))?;
            segments.pop_if_empty();

            for part in self.components.components() {
                if let Component::Normal(part) = part {
                    segments.push(&part.to_string_lossy());
                }
            }
            segments.push("preview").push(page_id);
        }

        Ok(url.to_string())
    }

    /// List the preview pages, sorted by file name.
    ///
    /// Only regular files directly inside the preview directory count; hidden
    /// files are skipped.
    pub fn discover(&self, base_url: &str) -> Result<Vec<PreviewPage>, OrchestratorError> {
        let preview_dir = self.preview_dir();
        if !preview_dir.is_dir() {
            return Err(discovery_error(&preview_dir, "directory not found"));
        }

        let mut pages = Vec::new();

        for entry in WalkDir::new(&preview_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| discovery_error(&preview_dir, &e.to_string()))?;

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(id) = entry.file_name().to_str() else {
                tracing::warn!("Skipping non UTF-8 preview {}", entry.path().display());
                continue;
            };

            if id.starts_with('.') {
                continue;
            }

            pages.push(PreviewPage {
                id: id.to_string(),
                url: self.preview_url(base_url, id)?,
            });
        }

        Ok(pages)
    }
}

fn discovery_error(path: &Path, message: &str) -> OrchestratorError {
    OrchestratorError::Discovery {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn derives_component_directories() {
        let layout = SiteLayout::new("/site");

        assert_eq!(layout.preview_dir(), PathBuf::from("/site/components/preview"));
        assert_eq!(layout.detail_dir(), PathBuf::from("/site/components/detail"));
        assert_eq!(layout.report_dir(), PathBuf::from("/site/components/report"));
        assert_eq!(layout.report_href("button.html"), "../report/button.html");
    }

    #[test]
    fn builds_preview_urls() {
        let layout = SiteLayout::new("/site");

        assert_eq!(
            layout.preview_url("http://127.0.0.1:3000", "button.html").unwrap(),
            "http://127.0.0.1:3000/components/preview/button.html"
        );
        assert_eq!(
            layout.preview_url("http://127.0.0.1:3000/", "icon button.html").unwrap(),
            "http://127.0.0.1:3000/components/preview/icon%20button.html"
        );
    }

    #[test]
    fn discovers_sorted_files_only() {
        let temp = tempdir().unwrap();
        let layout = SiteLayout::new(temp.path());
        let preview = layout.preview_dir();

        fs::create_dir_all(preview.join("nested")).unwrap();
        fs::write(preview.join("c.html"), "").unwrap();
        fs::write(preview.join("a.html"), "").unwrap();
        fs::write(preview.join("b.html"), "").unwrap();
        fs::write(preview.join(".DS_Store"), "").unwrap();
        fs::write(preview.join("nested/d.html"), "").unwrap();

        let pages = layout.discover("http://127.0.0.1:4000").unwrap();
        let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();

        assert_eq!(ids, vec!["a.html", "b.html", "c.html"]);
        assert_eq!(pages[0].url, "http://127.0.0.1:4000/components/preview/a.html");
    }

    #[test]
    fn missing_preview_dir_is_an_error() {
        let temp = tempdir().unwrap();
        let layout = SiteLayout::new(temp.path());

        let err = layout.discover("http://127.0.0.1:4000").unwrap_err();
        assert!(matches!(err, OrchestratorError::Discovery { .. }));
    }
}
