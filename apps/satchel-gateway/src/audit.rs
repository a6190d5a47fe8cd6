use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

/// One append-only plain-text file per logical concern.
///
/// Write-only observability artifacts: no rotation, no read path, and a
/// failed append never propagates to a request handler.
#[derive(Debug, Clone, Copy)]
pub enum AuditKind {
    Access,
    Error,
    Session,
    Activation,
}

impl AuditKind {
    fn file_name(self) -> &'static str {
        match self {
            AuditKind::Access => "access.log",
            AuditKind::Error => "error.log",
            AuditKind::Session => "sessions.log",
            AuditKind::Activation => "activations.log",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(err) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %err, "could not create log directory");
        }
        Self { dir }
    }

    /// Appends `[timestamp] message` to the concern's file, fire-and-forget.
    pub fn append(&self, kind: AuditKind, message: &str) {
        let line = format!("[{}] {}\n", chrono::Utc::now().to_rfc3339(), message);
        let path = self.dir.join(kind.file_name());
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "audit append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_creates_and_extends_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audit = AuditLog::new(dir.path());
        audit.append(AuditKind::Activation, "first");
        audit.append(AuditKind::Activation, "second");

        let contents =
            fs::read_to_string(dir.path().join("activations.log")).expect("read log file");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("first"));
        assert!(lines[1].ends_with("second"));
    }

    #[test]
    fn concerns_go_to_separate_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audit = AuditLog::new(dir.path());
        audit.append(AuditKind::Access, "GET /session");
        audit.append(AuditKind::Session, "Session created: abc");

        assert!(dir.path().join("access.log").exists());
        assert!(dir.path().join("sessions.log").exists());
        assert!(!dir.path().join("error.log").exists());
    }
}
