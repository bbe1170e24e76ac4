//! Append-only durable message journal
//!
//! One message per line, UTF-8 newline-delimited JSON, flushed on every
//! append so durability precedes delivery. The journal is never pruned
//! or rotated by this crate.

use crate::bus::message::Message;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by journal IO
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("malformed journal line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
}

/// Writer half of the journal
pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Journal {
    /// Open (or create) a journal for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Append one message and flush before returning
    pub fn append(&mut self, message: &Message) -> Result<(), JournalError> {
        let line = serde_json::to_string(message)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Path the journal writes to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a journal back in append order
    ///
    /// Blank lines are skipped; a malformed line is an error naming the
    /// line number.
    pub fn replay(path: impl AsRef<Path>) -> Result<Vec<Message>, JournalError> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let mut messages = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let message = serde_json::from_str(&line)
                .map_err(|source| JournalError::Malformed {
                    line: index + 1,
                    source,
                })?;
            messages.push(message);
        }
        Ok(messages)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::{MessageKind, Scope};

    fn message(content: &str) -> Message {
        Message::new("test", Scope::Broadcast, MessageKind::Progress, content)
    }

    #[test]
    fn test_append_and_replay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut journal = Journal::open(&path).unwrap();
        journal.append(&message("first")).unwrap();
        journal.append(&message("second")).unwrap();
        drop(journal);

        let back = Journal::replay(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].content, "first");
        assert_eq!(back[1].content, "second");
    }

    #[test]
    fn test_reopen_appends_rather_than_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        Journal::open(&path).unwrap().append(&message("one")).unwrap();
        Journal::open(&path).unwrap().append(&message("two")).unwrap();

        let back = Journal::replay(&path).unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_malformed_line_names_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut journal = Journal::open(&path).unwrap();
        journal.append(&message("good")).unwrap();
        drop(journal);

        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json}\n")
            .unwrap();

        let err = Journal::replay(&path).unwrap_err();
        assert!(matches!(err, JournalError::Malformed { line: 2, .. }));
    }
}
