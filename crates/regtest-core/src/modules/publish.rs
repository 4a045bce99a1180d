//! Publishing of plots, XML results and the `index.html` overview.

use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const INDEX_FILE: &str = "index.html";
pub const INSERT_MARKER: &str = "insert here";
pub const STATIC_ASSETS: &[&str] = &["ok.png", "nok.png", "results.xslt", "accordion.js"];

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("cannot access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("index template '{}' does not exist", path.display())]
    MissingTemplate { path: PathBuf },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PublishError + '_ {
    move |source| PublishError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn plots_dir_name(timestamp: &str) -> String {
    format!("plots_{}", timestamp)
}

pub fn results_xml_name(timestamp: &str) -> String {
    format!("results_{}.xml", timestamp)
}

/// Page the index links to; rendered from the XML by `results.xslt`.
pub fn results_page_name(timestamp: &str) -> String {
    format!("results_{}.html", timestamp)
}

/// Removes plots of an earlier run with the same timestamp.
pub fn reset_plots_dir(plots_dir: &Path) -> Result<(), PublishError> {
    if plots_dir.is_dir() {
        fs::remove_dir_all(plots_dir).map_err(io_error(plots_dir))?;
    }
    Ok(())
}

/// Copies every `*.png` of a case directory into `plots_dir`.
pub fn publish_case_plots(case_dir: &Path, plots_dir: &Path) -> Result<usize, PublishError> {
    fs::create_dir_all(plots_dir).map_err(io_error(plots_dir))?;

    let mut copied = 0;
    for entry in fs::read_dir(case_dir).map_err(io_error(case_dir))? {
        let path = entry.map_err(io_error(case_dir))?.path();
        let is_png = path.extension().is_some_and(|extension| extension == "png");
        let Some(file_name) = path.file_name().filter(|_| is_png && path.is_file()) else {
            continue;
        };
        let target = plots_dir.join(file_name);
        fs::copy(&path, &target).map_err(io_error(&target))?;
        copied += 1;
    }
    debug!(copied, dir = %plots_dir.display(), "published case plots");
    Ok(copied)
}

/// One line of the overview page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub page: String,
    pub started: DateTime<Local>,
    pub passed: usize,
    pub broken: usize,
    pub failed: usize,
    pub total: usize,
}

impl IndexEntry {
    pub fn line(&self) -> String {
        format!(
            "<a href=\"{}\">{}</a> [passed:{} | broken:{} | failed:{} | total:{}] <br/>\n",
            self.page,
            self.started.format("%Y-%m-%d %H:%M"),
            self.passed,
            self.broken,
            self.failed,
            self.total
        )
    }
}

/// Inserts `entry` after the marker line, replacing an existing line for the
/// same page.
pub fn insert_index_entry(index: &str, entry: &IndexEntry) -> Option<String> {
    let mut lines: Vec<String> = index.split_inclusive('\n').map(str::to_string).collect();
    let marker = lines.iter().position(|line| line.contains(INSERT_MARKER))?;

    let same_page = lines
        .get(marker + 1)
        .is_some_and(|next| next.contains(entry.page.as_str()));
    if same_page {
        lines[marker + 1] = entry.line();
    } else {
        lines.insert(marker + 1, entry.line());
    }
    Some(lines.concat())
}

/// Updates `<publish_dir>/index.html`, seeding it from `<html_dir>/index.html`.
pub fn update_index(
    publish_dir: &Path,
    html_dir: &Path,
    entry: &IndexEntry,
) -> Result<(), PublishError> {
    let index_path = publish_dir.join(INDEX_FILE);
    if !index_path.is_file() {
        let template = html_dir.join(INDEX_FILE);
        if !template.is_file() {
            return Err(PublishError::MissingTemplate { path: template });
        }
        fs::copy(&template, &index_path).map_err(io_error(&index_path))?;
    }

    let index = fs::read_to_string(&index_path).map_err(io_error(&index_path))?;
    match insert_index_entry(&index, entry) {
        Some(updated) => fs::write(&index_path, updated).map_err(io_error(&index_path)),
        None => {
            warn!(index = %index_path.display(), "index has no '{}' marker", INSERT_MARKER);
            Ok(())
        }
    }
}

/// Copies the stylesheet, script and icons the results page needs.
pub fn copy_static_assets(html_dir: &Path, publish_dir: &Path) -> Result<(), PublishError> {
    for asset in STATIC_ASSETS {
        let source = html_dir.join(asset);
        if !source.is_file() {
            warn!(asset = %source.display(), "publish asset is missing");
            continue;
        }
        let target = publish_dir.join(asset);
        fs::copy(&source, &target).map_err(io_error(&target))?;
    }
    Ok(())
}
