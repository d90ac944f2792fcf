//! Input discovery and output naming

use crate::config::Config;
use crate::error::{ExcelError, Result};
use chrono::{DateTime, Local};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Format of the suffix appended to output file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Every file under `config.base_dir` matching the prefix and extension
///
/// Walks recursively, skips the output directory, and returns paths sorted
/// so batches are processed in a stable order. Unreadable entries are
/// logged and skipped.
pub fn find_input_files(config: &Config) -> Result<Vec<PathBuf>> {
    if !config.base_dir.is_dir() {
        return Err(ExcelError::Config(format!(
            "{} is not a directory",
            config.base_dir.display()
        )));
    }

    let output_dir = canonical(&config.output_dir());
    let mut files = Vec::new();

    let walker = WalkDir::new(&config.base_dir)
        .into_iter()
        .filter_entry(|entry| {
            !entry.file_type().is_dir() || canonical(entry.path()) != output_dir
        });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && matches_filter(entry.path(), config) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    debug!(
        "found {} input files under {}",
        files.len(),
        config.base_dir.display()
    );
    Ok(files)
}

/// Resolved form of `path` for comparisons; unchanged if it does not exist
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn matches_filter(path: &Path, config: &Config) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let extension_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(config.extension.trim_start_matches('.')));
    extension_ok && name.starts_with(&config.file_prefix)
}

/// Create the output directory if it does not exist yet
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        ExcelError::IoWrite(format!("cannot create {}: {}", dir.display(), e))
    })
}

/// `<output_dir>/<stem>[_<timestamp>].xlsx`
pub fn target_path_for(
    source: &Path,
    output_dir: &Path,
    timestamp: Option<&DateTime<Local>>,
) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match timestamp {
        Some(ts) => format!("{}_{}.xlsx", stem, ts.format(TIMESTAMP_FORMAT)),
        None => format!("{}.xlsx", stem),
    };
    output_dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "a,b\n1,2\n").unwrap();
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        touch(&base.join("sales_b.csv"));
        touch(&base.join("sales_a.CSV"));
        touch(&base.join("nested/sales_c.csv"));
        touch(&base.join("other.csv"));
        touch(&base.join("sales_d.txt"));
        touch(&base.join("ExcelerateCSV/sales_old.csv"));

        let mut config = Config::new(base);
        config.file_prefix = "sales".to_string();
        let files = find_input_files(&config).unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(base).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["nested/sales_c.csv", "sales_a.CSV", "sales_b.csv"]);
    }

    #[test]
    fn test_output_dir_skipped_however_spelled() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        touch(&base.join("data/in.csv"));
        touch(&base.join("data/out/in_old.csv"));
        fs::create_dir_all(base.join("data/sub")).unwrap();

        let mut config = Config::new(base.join("data"));
        config.output_dir = Some(base.join("data/./sub/../out"));
        let files = find_input_files(&config).unwrap();
        assert_eq!(files, vec![base.join("data/in.csv")]);

        let mut config = Config::new(base.join("data/."));
        config.output_dir = Some(base.join("data/out"));
        let files = find_input_files(&config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("in.csv"));
    }

    #[test]
    fn test_scan_missing_dir() {
        let config = Config::new("/definitely/not/here");
        assert!(matches!(
            find_input_files(&config),
            Err(ExcelError::Config(_))
        ));
    }

    #[test]
    fn test_target_path_naming() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let out = Path::new("/out");
        assert_eq!(
            target_path_for(Path::new("/in/report.csv"), out, Some(&ts)),
            Path::new("/out/report_20240309070501.xlsx")
        );
        assert_eq!(
            target_path_for(Path::new("/in/report.csv"), out, None),
            Path::new("/out/report.xlsx")
        );
    }

    #[test]
    fn test_ensure_output_dir_nested() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a/b/c");
        ensure_output_dir(&out).unwrap();
        assert!(out.is_dir());
        ensure_output_dir(&out).unwrap();
    }
}
