//! Append-only storage for finalized login attempts.
//!
//! Files are opened in append mode for each record and closed again when the
//! write returns, so a crash never loses a record that was already written.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::models::LoginRecord;

/// Receives every finalized login attempt.
pub trait EventSink {
    fn record(&mut self, record: &LoginRecord) -> Result<(), SinkError>;
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn record(&mut self, record: &LoginRecord) -> Result<(), SinkError> {
        (**self).record(record)
    }
}

/// Text log (`FTP:,<ip>,USER:..,PAS:..,STA:..`) plus an optional JSON-lines copy.
#[derive(Debug, Clone)]
pub struct LoginStore {
    log_path: PathBuf,
    json_path: Option<PathBuf>,
    echo: bool,
}

impl LoginStore {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            json_path: None,
            echo: true,
        }
    }

    pub fn with_json_log(mut self, json_path: Option<PathBuf>) -> Self {
        self.json_path = json_path;
        self
    }

    /// Disables the stdout copy of each record; tracing output is kept.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    fn append_text(&self, record: &LoginRecord) -> Result<(), SinkError> {
        append(&self.log_path, record.log_line().as_bytes())
    }

    fn append_json(&self, path: &Path, record: &LoginRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        append(path, &line)
    }
}

impl EventSink for LoginStore {
    fn record(&mut self, record: &LoginRecord) -> Result<(), SinkError> {
        tracing::info!(
            server = %record.server,
            username = %record.username,
            status = %record.status,
            "ftp login attempt"
        );
        if self.echo {
            println!(
                "FTP:{}\tUSER:{}\tPAS:{}\tSTA:{}",
                record.server, record.username, record.password, record.status
            );
        }

        let text = self.append_text(record);
        let json = match &self.json_path {
            Some(path) => self.append_json(path, record),
            None => Ok(()),
        };
        text.and(json)
    }
}

fn append(path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
    let write = || -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(bytes)?;
        file.flush()
    };
    write().map_err(|source| SinkError::SinkWriteFailed {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LoginStatus;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use std::net::Ipv4Addr;

    /// Directory under the system temp dir, removed when dropped even if the
    /// test panics first.
    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn join(&self, name: &str) -> PathBuf {
            self.0.join(name)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn scratch_dir(name: &str) -> ScratchDir {
        let dir = std::env::temp_dir().join(format!("ftpwatch-db-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        ScratchDir(dir)
    }

    fn record(user: &str, status: LoginStatus) -> LoginRecord {
        LoginRecord {
            server: Ipv4Addr::new(10, 0, 0, 21),
            username: user.into(),
            password: "secret".into(),
            status,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_records_are_appended_one_line_each() {
        let dir = scratch_dir("append");
        let path = dir.join("record.csv");
        let mut store = LoginStore::new(&path).quiet();

        store.record(&record("alice", LoginStatus::Ok)).unwrap();
        store.record(&record("bob", LoginStatus::Failed)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "FTP:,10.0.0.21,USER:alice,PAS:secret,STA:OK\n\
             FTP:,10.0.0.21,USER:bob,PAS:secret,STA:FAILED\n"
        );
    }

    #[test]
    fn test_existing_log_is_not_truncated() {
        let dir = scratch_dir("existing");
        let path = dir.join("record.csv");
        fs::write(&path, "earlier\n").unwrap();

        LoginStore::new(&path).quiet().record(&record("alice", LoginStatus::Ok)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("earlier\nFTP:,"));
    }

    #[test]
    fn test_json_copy_is_one_object_per_line() {
        let dir = scratch_dir("json");
        let json = dir.join("record.jsonl");
        let mut store = LoginStore::new(dir.join("record.csv"))
            .with_json_log(Some(json.clone()))
            .quiet();

        store.record(&record("alice", LoginStatus::Ok)).unwrap();
        store.record(&record("bob", LoginStatus::Failed)).unwrap();

        let contents = fs::read_to_string(&json).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["username"], "alice");
        assert_eq!(lines[1]["status"], "FAILED");
    }

    #[test]
    fn test_unwritable_path_reports_sink_write_failed() {
        let dir = scratch_dir("missing");
        let path = dir.join("no-such-dir").join("record.csv");
        let err = LoginStore::new(&path)
            .quiet()
            .record(&record("alice", LoginStatus::Ok))
            .unwrap_err();
        assert!(matches!(err, SinkError::SinkWriteFailed { .. }));
    }
}
