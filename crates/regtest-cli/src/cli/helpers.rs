use super::CliError;
use anyhow::Context;
use regtest_core::domain::RegtestError;
use regtest_core::modules::publish::INDEX_FILE;
use regtest_core::modules::suite::SIMULATOR_BINARY;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub(super) const HTML_DIR_NAME: &str = "html";

pub(super) fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second init (tests dispatching twice in one process) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub(super) fn current_working_dir() -> Result<PathBuf, RegtestError> {
    std::env::current_dir().map_err(|source| {
        RegtestError::io_system(
            "IO.CLI_CURRENT_DIR",
            format!("cannot read current working directory: {}", source),
        )
    })
}

pub(super) fn resolve_cli_path(working_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

/// Directory holding `opalx`: the explicit one if given, otherwise the first
/// `PATH` entry that has it.
pub(super) fn resolve_simulator_dir(
    explicit: Option<&Path>,
    working_dir: &Path,
) -> Result<PathBuf, RegtestError> {
    let found = match explicit.filter(|dir| !dir.as_os_str().is_empty()) {
        Some(dir) => {
            let dir = resolve_cli_path(working_dir, dir);
            is_executable_file(&dir.join(SIMULATOR_BINARY)).then_some(dir)
        }
        None => std::env::var_os("PATH")
            .and_then(|search_path| find_in_search_path(SIMULATOR_BINARY, &search_path)),
    };

    found.ok_or_else(|| {
        RegtestError::input_validation(
            "INPUT.SIMULATOR",
            format!("{} - not found or not an executable!", SIMULATOR_BINARY),
        )
    })
}

pub(super) fn find_in_search_path(binary: &str, search_path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .find(|dir| is_executable_file(&dir.join(binary)))
}

#[cfg(unix)]
pub(super) fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(super) fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// A publish run needs an index page to update: either one already in
/// `publish_dir` or the template in `html_dir`.
pub(super) fn ensure_index_template(publish_dir: &Path, html_dir: &Path) -> Result<(), RegtestError> {
    if publish_dir.join(INDEX_FILE).is_file() || html_dir.join(INDEX_FILE).is_file() {
        return Ok(());
    }
    Err(RegtestError::input_validation(
        "INPUT.HTML_DIR",
        format!(
            "{} - index template not found, pass --html-dir",
            html_dir.join(INDEX_FILE).display()
        ),
    ))
}

/// `html/` next to the running binary.
pub(super) fn default_html_dir() -> Result<PathBuf, CliError> {
    let exe = std::env::current_exe().context("cannot locate the running executable")?;
    let dir = exe
        .parent()
        .with_context(|| format!("executable '{}' has no parent directory", exe.display()))?;
    Ok(dir.join(HTML_DIR_NAME))
}
