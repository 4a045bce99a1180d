//! Removal of artifacts left behind by a previous run of a case.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("invalid cleanup pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("cannot list '{}': {source}", path.display())]
    List {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot remove '{}': {source}", path.display())]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Matcher for every stale file name belonging to `case_name`.
pub fn stale_artifact_matcher(case_name: &str) -> Result<GlobSet, CleanupError> {
    let case = globset::escape(case_name);
    let mut builder = GlobSetBuilder::new();
    for pattern in [
        format!("{}-RT.*", case),
        format!("{}*.png", case),
        "*.loss".to_string(),
        "*.smb".to_string(),
        format!("{}.stat", case),
        format!("{}.lbal", case),
        format!("{}.out", case),
    ] {
        builder.add(Glob::new(&pattern)?);
    }
    Ok(builder.build()?)
}

/// Deletes stale artifacts in `case_dir` (not recursive). Running it on a
/// clean directory removes nothing.
pub fn clean_case_directory(case_name: &str, case_dir: &Path) -> Result<usize, CleanupError> {
    let matcher = stale_artifact_matcher(case_name)?;
    let entries = fs::read_dir(case_dir).map_err(|source| CleanupError::List {
        path: case_dir.to_path_buf(),
        source,
    })?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|source| CleanupError::List {
            path: case_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() || !matcher.is_match(entry.file_name()) {
            continue;
        }
        fs::remove_file(&path).map_err(|source| CleanupError::Remove {
            path: path.clone(),
            source,
        })?;
        debug!(file = %path.display(), "removed stale artifact");
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::{clean_case_directory, stale_artifact_matcher};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn matcher_covers_case_artifacts_only() {
        let matcher = stale_artifact_matcher("Gauss").expect("patterns should compile");
        for name in [
            "Gauss-RT.o",
            "Gauss-RT.e",
            "Gauss_rms_x.png",
            "Drift.loss",
            "bunch-0.smb",
            "Gauss.stat",
            "Gauss.lbal",
            "Gauss.out",
        ] {
            assert!(matcher.is_match(name), "{name} should be stale");
        }
        for name in ["Gauss.in", "Gauss.rt", "Gauss.local", "Other.stat", "Other.png"] {
            assert!(!matcher.is_match(name), "{name} should be kept");
        }
    }

    #[test]
    fn removes_stale_files_and_keeps_inputs() {
        let temp = TempDir::new().expect("tempdir should be created");
        for name in ["Gauss.in", "Gauss.rt", "Gauss.stat", "Gauss-RT.o", "Gauss_rms_x.png"] {
            fs::write(temp.path().join(name), "x").expect("fixture should be written");
        }
        fs::create_dir(temp.path().join("reference")).expect("reference dir should be created");
        fs::write(temp.path().join("reference/Gauss.stat"), "x").expect("reference should be written");

        let removed = clean_case_directory("Gauss", temp.path()).expect("cleanup should succeed");
        assert_eq!(removed, 3);
        assert!(temp.path().join("Gauss.in").is_file());
        assert!(temp.path().join("Gauss.rt").is_file());
        assert!(!temp.path().join("Gauss.stat").exists());
        assert!(temp.path().join("reference/Gauss.stat").is_file());
    }

    #[test]
    fn cleaning_a_clean_directory_is_a_no_op() {
        let temp = TempDir::new().expect("tempdir should be created");
        fs::write(temp.path().join("Gauss.in"), "x").expect("fixture should be written");

        assert_eq!(clean_case_directory("Gauss", temp.path()).expect("cleanup should succeed"), 0);
        assert_eq!(clean_case_directory("Gauss", temp.path()).expect("cleanup should succeed"), 0);
    }

    #[test]
    fn case_names_with_glob_characters_are_literal() {
        let matcher = stale_artifact_matcher("Ring[1]").expect("patterns should compile");
        assert!(matcher.is_match("Ring[1].stat"));
        assert!(!matcher.is_match("Ring1.stat"));
    }
}
