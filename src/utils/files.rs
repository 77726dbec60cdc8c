use crate::utils::error::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// 確保目錄存在，不存在時建立
pub fn ensure_dir<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(dir.to_path_buf())
}

/// 備份檔案，預設以時間戳記為後綴：file.xlsx -> file_20250101_120000.xlsx
pub fn backup_file<P: AsRef<Path>>(
    file_path: P,
    backup_dir: Option<&Path>,
    suffix: Option<&str>,
) -> Result<PathBuf> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(PipelineError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", file_path.display()),
        )));
    }

    let stem = file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("backup");
    let ext = file_path.extension().and_then(|e| e.to_str());

    let target_dir = match backup_dir {
        Some(dir) => ensure_dir(dir)?,
        None => file_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let suffix = match suffix {
        Some(s) => s.to_string(),
        None => chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
    };

    let backup_name = match ext {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", stem, suffix),
    };
    let backup_path = target_dir.join(backup_name);

    fs::copy(file_path, &backup_path)?;
    Ok(backup_path)
}

/// 將字串轉成安全的檔名
pub fn safe_filename(filename: &str) -> String {
    const UNSAFE: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    filename
        .chars()
        .map(|c| if UNSAFE.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a/b/c");
        assert!(!nested.exists());
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_backup_file_with_suffix() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("report.xlsx");
        fs::write(&original, b"workbook bytes").unwrap();

        let backup = backup_file(&original, None, Some("before_update")).unwrap();

        assert_eq!(
            backup.file_name().unwrap().to_str().unwrap(),
            "report_before_update.xlsx"
        );
        assert_eq!(fs::read(&backup).unwrap(), b"workbook bytes");
    }

    #[test]
    fn test_backup_file_into_backup_dir() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("data.csv");
        fs::write(&original, b"a,b\n1,2\n").unwrap();
        let backup_dir = tmp.path().join("backups");

        let backup = backup_file(&original, Some(&backup_dir), Some("v1")).unwrap();

        assert!(backup.starts_with(&backup_dir));
        assert!(backup.exists());
    }

    #[test]
    fn test_backup_missing_file_fails() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.xlsx");
        assert!(backup_file(&missing, None, None).is_err());
    }

    #[test]
    fn test_safe_filename_replaces_unsafe_chars() {
        assert_eq!(safe_filename("a/b:c*d.xlsx"), "a_b_c_d.xlsx");
        assert_eq!(safe_filename("plain.csv"), "plain.csv");
    }
}
