//! Integrity check of reference files against their `md5sum` records.

use super::comparator::{REFERENCE_DIR, STAT_SUFFIX};
use super::report::Report;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Reference suffixes whose presence and checksum are validated per case.
pub const REFERENCE_SUFFIXES: &[&str] = &[STAT_SUFFIX];

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("'{}' is not a '<md5> <file>' record", path.display())]
    Malformed { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub digest: String,
    pub file_name: String,
}

/// Parses the first line of an `md5sum` output file.
pub fn parse_checksum_record(path: &Path, content: &str) -> Result<ChecksumRecord, ChecksumError> {
    let first_line = content.lines().next().unwrap_or_default();
    let mut fields = first_line.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some(digest), Some(file_name)) => Ok(ChecksumRecord {
            digest: digest.to_ascii_lowercase(),
            // md5sum marks binary-mode entries with a leading '*'
            file_name: file_name.trim_start_matches('*').to_string(),
        }),
        _ => Err(ChecksumError::Malformed {
            path: path.to_path_buf(),
        }),
    }
}

/// Checks the file named in `md5_path` (relative to its directory) against the
/// recorded digest.
pub fn verify_checksum_file(md5_path: &Path) -> Result<bool, ChecksumError> {
    let content = fs::read_to_string(md5_path).map_err(|source| ChecksumError::Read {
        path: md5_path.to_path_buf(),
        source,
    })?;
    let record = parse_checksum_record(md5_path, &content)?;

    let target = md5_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&record.file_name);
    let bytes = fs::read(&target).map_err(|source| ChecksumError::Read {
        path: target.clone(),
        source,
    })?;
    Ok(format!("{:x}", md5::compute(bytes)) == record.digest)
}

/// Validates every required reference file of a case, logging one line per
/// checksum. Never aborts the case; returns whether everything matched.
pub fn validate_reference_files(case_name: &str, case_dir: &Path, report: &mut Report) -> bool {
    let reference_dir = case_dir.join(REFERENCE_DIR);
    let mut all_ok = true;

    for suffix in REFERENCE_SUFFIXES {
        let file_name = format!("{}.{}", case_name, suffix);
        let md5_name = format!("{}.md5", file_name);
        let md5_path = reference_dir.join(&md5_name);

        if !reference_dir.join(&file_name).is_file() {
            report.append_log(format!("\t Reference file {} is missing!\n", file_name));
            all_ok = false;
        }
        if is_symlink(&md5_path) {
            continue;
        }
        if !md5_path.is_file() {
            report.append_log(format!("\t Reference file {} is missing!\n", md5_name));
            all_ok = false;
            continue;
        }

        let matched = match verify_checksum_file(&md5_path) {
            Ok(matched) => matched,
            Err(error) => {
                warn!(case = case_name, %error, "checksum not verifiable");
                false
            }
        };
        report.append_log(format!(
            "\t Checksum for reference {} {} \n",
            md5_name,
            if matched { "OK" } else { "FAILED" }
        ));
        all_ok &= matched;
    }

    all_ok
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{ChecksumError, parse_checksum_record, validate_reference_files, verify_checksum_file};
    use crate::modules::report::Report;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn reference_case(content: &str) -> TempDir {
        let temp = TempDir::new().expect("tempdir should be created");
        fs::create_dir(temp.path().join("reference")).expect("reference dir should be created");
        fs::write(temp.path().join("reference/Gauss.stat"), content)
            .expect("reference should be written");
        temp
    }

    #[test]
    fn parses_md5sum_text_and_binary_records() {
        let path = Path::new("x.md5");
        let text = parse_checksum_record(path, "D41D8CD98F00B204E9800998ECF8427E  x.stat\n")
            .expect("record should parse");
        assert_eq!(text.digest, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(text.file_name, "x.stat");

        let binary = parse_checksum_record(path, "d41d8cd98f00b204e9800998ecf8427e *x.stat")
            .expect("record should parse");
        assert_eq!(binary.file_name, "x.stat");

        assert!(matches!(
            parse_checksum_record(path, "d41d8cd98f00b204e9800998ecf8427e\n"),
            Err(ChecksumError::Malformed { .. })
        ));
    }

    #[test]
    fn matching_checksum_is_logged_ok() {
        let temp = reference_case("");
        fs::write(
            temp.path().join("reference/Gauss.stat.md5"),
            "d41d8cd98f00b204e9800998ecf8427e  Gauss.stat\n",
        )
        .expect("md5 should be written");
        let mut report = Report::new();

        assert!(validate_reference_files("Gauss", temp.path(), &mut report));
        assert_eq!(report.log(), "\t Checksum for reference Gauss.stat.md5 OK \n");
    }

    #[test]
    fn mismatching_checksum_never_counts_as_failed_test() {
        let temp = reference_case("changed");
        fs::write(
            temp.path().join("reference/Gauss.stat.md5"),
            "d41d8cd98f00b204e9800998ecf8427e  Gauss.stat\n",
        )
        .expect("md5 should be written");
        let mut report = Report::new();

        assert!(!validate_reference_files("Gauss", temp.path(), &mut report));
        assert!(report.log().contains("Gauss.stat.md5 FAILED"));
        assert_eq!(report.count_failed(), 0);
        assert!(
            !verify_checksum_file(&temp.path().join("reference/Gauss.stat.md5"))
                .expect("checksum should be computed")
        );
    }

    #[test]
    fn missing_checksum_file_is_reported() {
        let temp = reference_case("data");
        let mut report = Report::new();

        assert!(!validate_reference_files("Gauss", temp.path(), &mut report));
        assert_eq!(report.log(), "\t Reference file Gauss.stat.md5 is missing!\n");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_checksum_file_is_skipped() {
        let temp = reference_case("data");
        std::os::unix::fs::symlink(
            temp.path().join("elsewhere.md5"),
            temp.path().join("reference/Gauss.stat.md5"),
        )
        .expect("symlink should be created");
        let mut report = Report::new();

        assert!(validate_reference_files("Gauss", temp.path(), &mut report));
        assert_eq!(report.log(), "");
    }
}
