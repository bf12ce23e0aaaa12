//! Accessibility tab injection for component detail pages.
//!
//! Detail pages are produced by the documentation theme. The selectors below
//! are the contract with that theme's browser widget markup: a tab bar, a panel
//! container, and an HTML tab whose link names the panel id prefix.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};

use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};

use crate::report::{write_atomic, ReportError};

/// Tab list the accessibility tab is appended to.
pub const TAB_BAR: &str = ".Browser-tabs";

/// Container the accessibility panel is appended to.
pub const PANEL_CONTAINER: &str = ".Browser";

/// Link of the HTML tab; its `href` is `#<prefix>panel-html`.
pub const HTML_TAB_LINK: &str = ".Browser-tab--html a";

/// The injected accessibility tab.
pub const A11Y_TAB: &str = ".Browser-tab--a11y";

/// Link inside the accessibility tab carrying the visible label.
pub const A11Y_TAB_LINK: &str = ".Browser-tab--a11y a";

/// What a patch did to a detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Tab and panel were inserted
    Inserted,

    /// An existing tab's label was updated
    Updated,
}

/// What the inspection pass found in a page.
#[derive(Debug, Default)]
struct Structure {
    html_tab_href: Option<String>,
    has_tab_bar: bool,
    has_container: bool,
    has_a11y_tab: bool,
}

/// Patches detail pages in place.
#[derive(Debug, Clone)]
pub struct DetailPatcher {
    detail_dir: PathBuf,
}

impl DetailPatcher {
    /// Create a patcher for pages under `detail_dir`.
    pub fn new(detail_dir: impl Into<PathBuf>) -> Self {
        Self {
            detail_dir: detail_dir.into(),
        }
    }

    /// Path of the detail page for `page_id`.
    pub fn detail_path(&self, page_id: &str) -> PathBuf {
        self.detail_dir.join(page_id)
    }

    /// Add or update the accessibility tab of `page_id`'s detail page.
    ///
    /// # Arguments
    /// * `page_id` - Detail page file name
    /// * `report_href` - Report URL relative to the detail page
    /// * `score` - Score percentage shown in the tab label
    pub fn patch(
        &self,
        page_id: &str,
        report_href: &str,
        score: u32,
    ) -> Result<PatchOutcome, ReportError> {
        let path = self.detail_path(page_id);
        if !path.is_file() {
            return Err(ReportError::DetailNotFound(path.display().to_string()));
        }

        let html = read(&path)?;
        let (patched, outcome) = patch_html(&html, page_id, report_href, score)?;
        write_atomic(&path, &patched)?;

        tracing::info!("Patched {} ({:?}, {}%)", path.display(), outcome, score);
        Ok(outcome)
    }
}

fn read(path: &Path) -> Result<String, ReportError> {
    fs::read_to_string(path).map_err(|e| ReportError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Visible label of the accessibility tab.
pub fn tab_label(score: u32) -> String {
    format!("Accessibility ({}%)", score)
}

/// Apply the tab patch to a detail page's markup.
pub fn patch_html(
    html: &str,
    page_id: &str,
    report_href: &str,
    score: u32,
) -> Result<(String, PatchOutcome), ReportError> {
    let structure = inspect(html)?;
    let missing = |selector: &str| ReportError::MissingStructure {
        page: page_id.to_string(),
        selector: selector.to_string(),
    };

    if structure.has_a11y_tab {
        return relabel(html, score)
            .and_then(|patched| patched.ok_or_else(|| missing(A11Y_TAB_LINK)))
            .map(|patched| (patched, PatchOutcome::Updated));
    }

    if !structure.has_tab_bar {
        return Err(missing(TAB_BAR));
    }
    if !structure.has_container {
        return Err(missing(PANEL_CONTAINER));
    }

    let prefix = structure
        .html_tab_href
        .as_deref()
        .and_then(panel_prefix)
        .ok_or_else(|| missing(HTML_TAB_LINK))?;

    let patched = insert(html, &prefix, report_href, score)?;
    Ok((patched, PatchOutcome::Inserted))
}

/// `#browser-1a2b-panel-html` -> `browser-1a2b-`
fn panel_prefix(href: &str) -> Option<String> {
    href.trim_start_matches('#')
        .strip_suffix("panel-html")
        .map(str::to_string)
}

fn inspect(html: &str) -> Result<Structure, ReportError> {
    let href: RefCell<Option<String>> = RefCell::new(None);
    let tab_bar = Cell::new(false);
    let container = Cell::new(false);
    let a11y_tab = Cell::new(false);

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(HTML_TAB_LINK, |el| {
                    let mut href = href.borrow_mut();
                    if href.is_none() {
                        *href = el.get_attribute("href");
                    }
                    Ok(())
                }),
                element!(TAB_BAR, |_el| {
                    tab_bar.set(true);
                    Ok(())
                }),
                element!(PANEL_CONTAINER, |_el| {
                    container.set(true);
                    Ok(())
                }),
                element!(A11Y_TAB, |_el| {
                    a11y_tab.set(true);
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )
    .map_err(|e| ReportError::Rewrite(e.to_string()))?;

    Ok(Structure {
        html_tab_href: href.into_inner(),
        has_tab_bar: tab_bar.get(),
        has_container: container.get(),
        has_a11y_tab: a11y_tab.get(),
    })
}

/// Replace the label of an existing tab. `None` when the tab has no link.
fn relabel(html: &str, score: u32) -> Result<Option<String>, ReportError> {
    let label = tab_label(score);
    let relabeled = Cell::new(false);

    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(A11Y_TAB_LINK, |el| {
                el.set_inner_content(&label, ContentType::Text);
                relabeled.set(true);
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )
    .map_err(|e| ReportError::Rewrite(e.to_string()))?;

    Ok(relabeled.get().then_some(output))
}

fn insert(html: &str, prefix: &str, report_href: &str, score: u32) -> Result<String, ReportError> {
    let panel_id = format!("{}panel-a11y", escape_attr(prefix));

    let tab = format!(
        r##"<li class="Browser-tab Browser-tab--a11y" data-role="tab"><a href="#{}">{}</a></li>"##,
        panel_id,
        tab_label(score)
    );
    let panel = format!(
        r#"<div class="Browser-panel Browser-a11y" id="{}" data-role="tab-panel"><iframe class="Preview-iframe" data-role="window" src="{}" sandbox="allow-same-origin allow-scripts allow-forms" marginwidth="0" marginheight="0" frameborder="0" vspace="0" hspace="0" scrolling="yes"></iframe></div>"#,
        panel_id,
        escape_attr(report_href)
    );

    let tab_done = Cell::new(false);
    let panel_done = Cell::new(false);

    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(TAB_BAR, |el| {
                    if !tab_done.replace(true) {
                        el.append(&tab, ContentType::Html);
                    }
                    Ok(())
                }),
                element!(PANEL_CONTAINER, |el| {
                    if !panel_done.replace(true) {
                        el.append(&panel, ContentType::Html);
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )
    .map_err(|e| ReportError::Rewrite(e.to_string()));

    output
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
