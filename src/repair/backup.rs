//! Snapshot and restore around autonomous-agent repairs.
//!
//! The agent is the only actor allowed to touch multiple files
//! unsupervised, so every attempt is bracketed: snapshot before, restore
//! when the result fails the sanity gate.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// An immutable copy of the critical files taken before a repair attempt.
#[derive(Debug)]
pub struct Backup {
    dir: PathBuf,
    files: Vec<String>,
}

impl Backup {
    /// Snapshots `files` (those that exist) from `output_dir` into
    /// `_backup_<task_id>` inside it.
    pub fn capture(output_dir: &Path, task_id: &str, files: &[String]) -> io::Result<Self> {
        let dir = output_dir.join(format!("_backup_{task_id}"));
        fs::create_dir_all(&dir)?;

        let mut captured = Vec::new();
        for name in files {
            let source = output_dir.join(name);
            if source.is_file() {
                fs::copy(&source, dir.join(name))?;
                captured.push(name.clone());
            }
        }

        tracing::debug!(dir = %dir.display(), files = captured.len(), "Captured backup");
        Ok(Self {
            dir,
            files: captured,
        })
    }

    /// Copies every snapshotted file back, making the originals
    /// byte-identical to the snapshot.
    pub fn restore(&self, output_dir: &Path) -> io::Result<()> {
        for name in &self.files {
            fs::copy(self.dir.join(name), output_dir.join(name))?;
        }
        tracing::info!(files = self.files.len(), "Restored files from backup");
        Ok(())
    }

    /// Files included in the snapshot.
    pub fn files(&self) -> &[String] {
        &self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_reverts_to_byte_identical_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logic = dir.path().join("logic.js");
        fs::write(&logic, "class Original {}").expect("write");
        fs::write(dir.path().join("index.html"), "<html></html>").expect("write");

        let backup = Backup::capture(
            dir.path(),
            "t1",
            &["logic.js".to_string(), "index.html".to_string()],
        )
        .expect("capture");
        assert_eq!(backup.files().len(), 2);

        fs::write(&logic, "garbage the agent wrote").expect("write");
        backup.restore(dir.path()).expect("restore");

        assert_eq!(
            fs::read(&logic).expect("read"),
            b"class Original {}".to_vec()
        );
    }

    #[test]
    fn capture_skips_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("logic.js"), "x").expect("write");

        let backup = Backup::capture(
            dir.path(),
            "t2",
            &["logic.js".to_string(), "missing.html".to_string()],
        )
        .expect("capture");

        assert_eq!(backup.files(), &["logic.js".to_string()]);
        backup.restore(dir.path()).expect("restore");
    }
}
