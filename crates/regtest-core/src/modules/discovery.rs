//! Finding regression cases below a base directory.
//!
//! A case `<name>` is a directory holding `<name>.in` and
//! `reference/<name>.stat`. A `disabled` file inside it takes it out of the
//! suite.

use super::comparator::{REFERENCE_DIR, STAT_SUFFIX};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DISABLED_MARKER: &str = "disabled";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("{} - regression tests base directory does not exist!", path.display())]
    MissingBaseDir { path: PathBuf },
    #[error("cannot list '{}': {source}", path.display())]
    List {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} - unknown test!")]
    UnknownTest(String),
}

pub fn is_regression_case(base_dir: &Path, name: &str) -> bool {
    let case_dir = base_dir.join(name);
    case_dir.join(format!("{}.in", name)).is_file()
        && case_dir
            .join(REFERENCE_DIR)
            .join(format!("{}.{}", name, STAT_SUFFIX))
            .is_file()
        && !case_dir.join(DISABLED_MARKER).is_file()
}

/// All enabled cases below `base_dir`, sorted by name.
pub fn discover_tests(base_dir: &Path) -> Result<Vec<String>, DiscoveryError> {
    if !base_dir.is_dir() {
        return Err(DiscoveryError::MissingBaseDir {
            path: base_dir.to_path_buf(),
        });
    }

    let entries = fs::read_dir(base_dir).map_err(|source| DiscoveryError::List {
        path: base_dir.to_path_buf(),
        source,
    })?;
    let mut tests = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|source| DiscoveryError::List {
            path: base_dir.to_path_buf(),
            source,
        })?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        if is_regression_case(base_dir, &name) {
            tests.insert(name);
        }
    }
    Ok(tests.into_iter().collect())
}

/// Narrows `discovered` to `requested`; an empty request keeps everything.
pub fn select_tests(
    discovered: Vec<String>,
    requested: &[String],
) -> Result<Vec<String>, DiscoveryError> {
    if requested.is_empty() {
        return Ok(discovered);
    }
    if let Some(unknown) = requested.iter().find(|name| !discovered.contains(name)) {
        return Err(DiscoveryError::UnknownTest(unknown.clone()));
    }
    let selected: BTreeSet<String> = requested.iter().cloned().collect();
    Ok(selected.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::{DiscoveryError, discover_tests, select_tests};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn make_case(base: &Path, name: &str) {
        let case_dir = base.join(name);
        fs::create_dir_all(case_dir.join("reference")).expect("case dir should be created");
        fs::write(case_dir.join(format!("{name}.in")), "").expect("input should be written");
        fs::write(case_dir.join(format!("reference/{name}.stat")), "")
            .expect("reference should be written");
    }

    #[test]
    fn finds_complete_enabled_cases_in_name_order() {
        let temp = TempDir::new().expect("tempdir should be created");
        make_case(temp.path(), "Ring");
        make_case(temp.path(), "Gauss");
        make_case(temp.path(), ".hidden");
        make_case(temp.path(), "Switched");
        fs::write(temp.path().join("Switched/disabled"), "").expect("marker should be written");
        fs::create_dir_all(temp.path().join("NoReference")).expect("dir should be created");
        fs::write(temp.path().join("NoReference/NoReference.in"), "").expect("input should be written");
        fs::write(temp.path().join("README"), "").expect("file should be written");

        let tests = discover_tests(temp.path()).expect("discovery should succeed");
        assert_eq!(tests, vec!["Gauss".to_string(), "Ring".to_string()]);
    }

    #[test]
    fn missing_base_directory_is_reported() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = discover_tests(&temp.path().join("absent")).expect_err("discovery should fail");
        assert!(matches!(error, DiscoveryError::MissingBaseDir { .. }));
        assert!(error.to_string().ends_with("regression tests base directory does not exist!"));
    }

    #[test]
    fn selection_rejects_unknown_names_and_sorts() {
        let discovered = vec!["Gauss".to_string(), "Ring".to_string()];

        assert_eq!(
            select_tests(discovered.clone(), &[]).expect("empty request keeps all"),
            discovered
        );
        assert_eq!(
            select_tests(discovered.clone(), &["Ring".to_string(), "Gauss".to_string()])
                .expect("known names should be selected"),
            vec!["Gauss".to_string(), "Ring".to_string()]
        );

        let error = select_tests(discovered, &["Drift".to_string()]).expect_err("unknown name");
        assert_eq!(error.to_string(), "Drift - unknown test!");
    }
}
