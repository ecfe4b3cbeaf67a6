//! Append-only command history.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Resolves a history file name against the home directory; absolute paths
/// are used as given.
pub fn resolve_path(name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    if path.is_absolute() {
        return path;
    }
    dirs::home_dir().unwrap_or_default().join(path)
}

/// Creates the history file if it does not exist yet.
pub fn ensure_file(path: &PathBuf) -> io::Result<()> {
    if !path.exists() {
        File::create(path)?;
    }
    Ok(())
}

/// Appends one input line.
pub fn append(line: &str, path: &PathBuf) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", line.trim())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    #[test]
    fn appends_lines_in_order() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        append("insert 1 a a@a", &path).unwrap();
        append("select", &path).unwrap();

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "insert 1 a a@a\nselect\n");
    }

    #[test]
    fn ensure_file_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        assert!(!path.exists());
        ensure_file(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn absolute_paths_resolve_to_themselves() {
        let path = resolve_path("/tmp/some-history");
        assert_eq!(path, PathBuf::from("/tmp/some-history"));
    }
}
