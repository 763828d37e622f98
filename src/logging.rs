//! Size-capped log file.
//!
//! [`RotatingFile`] appends to a log file and, once a write would push it
//! past the size cap, shifts `<file>.1 .. <file>.N` up by one, moves the
//! current file to `<file>.1` and starts a fresh one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// An append-only file rotated by size.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    /// Open `path` for appending. A `max_bytes` of 0 disables rotation.
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
            backups,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups > 0 {
            let oldest = self.backup_path(self.backups);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_bytes > 0 && self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }

        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read(path: PathBuf) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_rotates_and_keeps_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut log = RotatingFile::open(&path, 10, 2).unwrap();

        for line in ["aaaaaa\n", "bbbbbb\n", "cccccc\n", "dddddd\n"] {
            log.write_all(line.as_bytes()).unwrap();
        }
        log.flush().unwrap();

        assert_eq!(read(path.clone()), "dddddd\n");
        assert_eq!(read(dir.path().join("app.log.1")), "cccccc\n");
        assert_eq!(read(dir.path().join("app.log.2")), "bbbbbb\n");
        assert!(!dir.path().join("app.log.3").exists());
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "old\n").unwrap();

        let mut log = RotatingFile::open(&path, 1024, 5).unwrap();
        log.write_all(b"new\n").unwrap();

        assert_eq!(read(path), "old\nnew\n");
    }

    #[test]
    fn test_zero_cap_never_rotates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut log = RotatingFile::open(&path, 0, 5).unwrap();

        for _ in 0..100 {
            log.write_all(b"0123456789\n").unwrap();
        }

        assert_eq!(read(path).len(), 1100);
        assert!(!dir.path().join("app.log.1").exists());
    }

    #[test]
    fn test_no_backups_truncates_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut log = RotatingFile::open(&path, 8, 0).unwrap();

        log.write_all(b"first\n").unwrap();
        log.write_all(b"second\n").unwrap();

        assert_eq!(read(path), "second\n");
        assert!(!dir.path().join("app.log.1").exists());
    }
}
