//! Retention sweep: compress old daily logs, delete very old ones.

use crate::errors::*;
use chrono::{Local, NaiveDate};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;

/// Compress `.log` files older than `retention_days` and delete `.log.gz`
/// files older than twice that.
pub fn sweep(dir: &Path, retention_days: u32) -> Result<()> {
    let today = Local::now().date_naive();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if let Some(stem) = name.strip_suffix(".log") {
            if let Some(age) = file_age_days(stem, today) {
                if age > retention_days as i64 {
                    compress(&path)?;
                }
            }
        } else if let Some(stem) = name.strip_suffix(".log.gz") {
            if let Some(age) = file_age_days(stem, today) {
                if age > 2 * retention_days as i64 {
                    debug!("Deleting expired audit log {:?}", path);
                    fs::remove_file(&path)?;
                }
            }
        }
    }

    Ok(())
}

fn file_age_days(stem: &str, today: NaiveDate) -> Option<i64> {
    let date = NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()?;
    Some((today - date).num_days())
}

fn compress(path: &Path) -> Result<()> {
    let gz_path = path.with_extension("log.gz");
    let mut input = File::open(path)?;
    let output = File::create(&gz_path)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)?;
    debug!("Compressed audit log to {:?}", gz_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_old_logs_compressed_and_ancient_deleted() {
        let dir = tempfile::TempDir::new().unwrap();
        let today = Local::now().date_naive();

        let old = today - Duration::days(40);
        let ancient = today - Duration::days(90);
        let fresh = today;

        fs::write(dir.path().join(format!("{}.log", old.format("%Y-%m-%d"))), "old\n").unwrap();
        fs::write(
            dir.path()
                .join(format!("{}.log.gz", ancient.format("%Y-%m-%d"))),
            "gz",
        )
        .unwrap();
        fs::write(
            dir.path().join(format!("{}.log", fresh.format("%Y-%m-%d"))),
            "fresh\n",
        )
        .unwrap();

        sweep(dir.path(), 30).unwrap();

        assert!(!dir
            .path()
            .join(format!("{}.log", old.format("%Y-%m-%d")))
            .exists());
        assert!(dir
            .path()
            .join(format!("{}.log.gz", old.format("%Y-%m-%d")))
            .exists());
        assert!(!dir
            .path()
            .join(format!("{}.log.gz", ancient.format("%Y-%m-%d")))
            .exists());
        assert!(dir
            .path()
            .join(format!("{}.log", fresh.format("%Y-%m-%d")))
            .exists());
    }

    #[test]
    fn test_unrelated_files_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        sweep(dir.path(), 30).unwrap();

        assert!(dir.path().join("notes.txt").exists());
    }
}
