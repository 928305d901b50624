//! Append-only text sinks for captured device output.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, StoreError};

/// Shared append-only text sink.
///
/// Each `write` is applied as one unit, so concurrent writers never
/// interleave inside an entry.
pub trait TranscriptSink: Send + Sync {
    /// Append `text`.
    fn write(&self, text: &str) -> Result<()>;

    /// Push buffered text to durable storage.
    fn flush(&self) -> Result<()>;
}

/// Transcript file opened in append mode.
#[derive(Debug)]
pub struct FileTranscript {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileTranscript {
    /// Open (or create) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the transcript file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TranscriptSink for FileTranscript {
    fn write(&self, text: &str) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| StoreError::Poisoned("transcript"))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let file = self
            .file
            .lock()
            .map_err(|_| StoreError::Poisoned("transcript"))?;
        file.sync_data().map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// In-memory transcript.
#[derive(Debug, Default)]
pub struct MemoryTranscript {
    text: Mutex<String>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.text.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl TranscriptSink for MemoryTranscript {
    fn write(&self, text: &str) -> Result<()> {
        self.text
            .lock()
            .map_err(|_| StoreError::Poisoned("transcript"))?
            .push_str(text);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_file_transcript_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("maintenance.log");

        let transcript = FileTranscript::open(&path).unwrap();
        transcript.write("first\n").unwrap();
        transcript.flush().unwrap();
        drop(transcript);

        let transcript = FileTranscript::open(&path).unwrap();
        transcript.write("second\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_concurrent_entries_do_not_interleave() {
        let transcript = Arc::new(MemoryTranscript::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let transcript = Arc::clone(&transcript);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let entry = format!("<{i}>{}</{i}>\n", "x".repeat(64));
                        transcript.write(&entry).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = transcript.contents();
        assert_eq!(contents.lines().count(), 200);
        for line in contents.lines() {
            let open = &line[1..2];
            assert!(line.ends_with(&format!("</{open}>")));
        }
    }
}
