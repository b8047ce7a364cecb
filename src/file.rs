//! Append-only YAML file sink with optional size-based rotation.
//!
//! Every record becomes one YAML document (`---` followed by the body), so a
//! log file can be read back as a multi-document stream. The file handle and
//! the rotation bookkeeping live behind one async mutex: a record is written
//! either wholly before or wholly after a rotation, never split across it.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SinkError;
use crate::record::LogRecord;
use crate::sink::LogSink;

/// Size-based rotation policy.
///
/// When appending the next record to a non-empty file would take it past
/// `max_size` bytes, the file is moved to `<path>.1`, older backups shift to
/// `<path>.2` .. `<path>.<backup_count>` and anything older is deleted. With
/// `backup_count == 0` the file is truncated instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_size: u64,
    pub backup_count: usize,
}

struct FileState {
    file: Option<File>,
    size: u64,
}

/// [`LogSink`] that appends serialized records to a file.
///
/// One sink should own a path: two sinks on the same file keep separate
/// size counts and would rotate it independently. The logger reuses its
/// sink across reloads and only swaps the policy.
pub struct FileSink {
    path: PathBuf,
    name: String,
    rotation: RwLock<Option<RotationPolicy>>,
    state: Mutex<FileState>,
    rotations: AtomicU64,
}

impl FileSink {
    /// Create a sink for `path`. The file (and its parent directories) are
    /// created lazily on the first write.
    pub fn new(path: impl Into<PathBuf>, rotation: Option<RotationPolicy>) -> Self {
        let path = path.into();
        FileSink {
            name: format!("file:{}", path.display()),
            path,
            rotation: RwLock::new(rotation),
            state: Mutex::new(FileState { file: None, size: 0 }),
            rotations: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rotation(&self) -> Option<RotationPolicy> {
        *self.rotation.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the rotation policy. Takes effect from the next write.
    pub fn set_rotation(&self, rotation: Option<RotationPolicy>) {
        *self.rotation.write().unwrap_or_else(PoisonError::into_inner) = rotation;
    }

    /// Number of rotations performed by this sink.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Path of the `index`-th backup (`<path>.<index>`).
    pub fn backup_path(&self, index: usize) -> PathBuf {
        let mut raw: OsString = self.path.as_os_str().to_owned();
        raw.push(format!(".{index}"));
        PathBuf::from(raw)
    }

    /// Serialize a record into the bytes appended to the file.
    pub fn encode(record: &LogRecord) -> Result<Vec<u8>, SinkError> {
        let body = record.to_yaml()?;
        Ok(format!("---\n{body}").into_bytes())
    }

    /// Append one pre-encoded block, rotating first if needed.
    pub(crate) async fn write_bytes(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;

        if state.file.is_none() {
            let (file, size) = self.open(false).await.map_err(|e| self.io_error(e))?;
            state.file = Some(file);
            state.size = size;
        }

        if let Some(policy) = self.rotation() {
            let len = bytes.len() as u64;
            if state.size > 0 && state.size + len > policy.max_size {
                state.file = None;
                self.rotate(policy).await.map_err(|e| self.io_error(e))?;
                let (file, size) = self
                    .open(policy.backup_count == 0)
                    .await
                    .map_err(|e| self.io_error(e))?;
                state.file = Some(file);
                state.size = size;
            }
        }

        let file = match state.file.as_mut() {
            Some(file) => file,
            None => return Err(SinkError::Other(format!("{} is not open", self.path.display()))),
        };
        let written = match file.write_all(bytes).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                state.size += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                // Reopen on the next write; the handle may be unusable.
                state.file = None;
                Err(self.io_error(e))
            }
        }
    }

    async fn open(&self, truncate: bool) -> io::Result<(File, u64)> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options.open(&self.path).await?;
        let size = file.metadata().await?.len();
        Ok((file, size))
    }

    async fn rotate(&self, policy: RotationPolicy) -> io::Result<()> {
        if policy.backup_count > 0 {
            let oldest = self.backup_path(policy.backup_count);
            if fs::try_exists(&oldest).await? {
                fs::remove_file(&oldest).await?;
            }
            for index in (1..policy.backup_count).rev() {
                let from = self.backup_path(index);
                if fs::try_exists(&from).await? {
                    fs::rename(&from, self.backup_path(index + 1)).await?;
                }
            }
            fs::rename(&self.path, self.backup_path(1)).await?;
            info!(
                path = %self.path.display(),
                backups = policy.backup_count,
                "rotated log file"
            );
        } else {
            debug!(path = %self.path.display(), "truncating log file, no backups kept");
        }

        self.rotations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl LogSink for FileSink {
    async fn send(&self, record: &LogRecord) -> Result<(), SinkError> {
        let bytes = Self::encode(record)?;
        self.write_bytes(&bytes).await
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        if let Some(file) = state.file.as_mut() {
            file.flush().await.map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RecordBuilder;
    use crate::level::Level;
    use serde::Deserialize;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn chunk(id: usize) -> Vec<u8> {
        // 100 bytes per chunk, distinguishable by id.
        let mut line = format!("chunk-{id:04}");
        line.push_str(&"x".repeat(99 - line.len()));
        line.push('\n');
        line.into_bytes()
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }

    #[tokio::test]
    async fn appends_yaml_documents() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path().join("nested/logs.yml"), None);
        let builder = RecordBuilder::default();

        sink.send(&builder.build(Level::Info, Some("first"), None, None))
            .await
            .unwrap();
        sink.send(&builder.build(Level::Error, Some("second"), None, None))
            .await
            .unwrap();

        let contents = read(sink.path());
        let docs: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&contents)
            .map(|doc| serde_yaml::Value::deserialize(doc).unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["Message"].as_str(), Some("first"));
        assert_eq!(docs[1]["Level"].as_str(), Some("ERROR"));
    }

    #[tokio::test]
    async fn rotates_once_per_threshold_crossing() {
        let dir = TempDir::new().unwrap();
        let policy = RotationPolicy {
            max_size: 250,
            backup_count: 2,
        };
        let sink = FileSink::new(dir.path().join("app.log"), Some(policy));

        for id in 1..=7 {
            sink.write_bytes(&chunk(id)).await.unwrap();
        }

        // Two chunks fit per file, so chunks 3, 5 and 7 each opened a new one.
        assert_eq!(sink.rotations(), 3);
        assert!(read(sink.path()).starts_with("chunk-0007"));
        assert_eq!(read(&sink.backup_path(1)).lines().count(), 2);
        assert!(read(&sink.backup_path(1)).starts_with("chunk-0005"));
        assert!(read(&sink.backup_path(2)).starts_with("chunk-0003"));
        assert!(!sink.backup_path(3).exists());

        let retained: Vec<String> = [sink.path().to_path_buf(), sink.backup_path(1), sink.backup_path(2)]
            .iter()
            .flat_map(|p| read(p).lines().map(|l| l[..10].to_string()).collect::<Vec<_>>())
            .collect();
        let mut unique = retained.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(retained.len(), 5);
        assert_eq!(unique.len(), 5);
    }

    #[tokio::test]
    async fn zero_backups_truncates() {
        let dir = TempDir::new().unwrap();
        let policy = RotationPolicy {
            max_size: 150,
            backup_count: 0,
        };
        let sink = FileSink::new(dir.path().join("app.log"), Some(policy));

        sink.write_bytes(&chunk(1)).await.unwrap();
        sink.write_bytes(&chunk(2)).await.unwrap();

        assert_eq!(sink.rotations(), 1);
        assert!(read(sink.path()).starts_with("chunk-0002"));
        assert!(!sink.backup_path(1).exists());
    }

    #[tokio::test]
    async fn oversized_record_is_written_whole() {
        let dir = TempDir::new().unwrap();
        let policy = RotationPolicy {
            max_size: 50,
            backup_count: 1,
        };
        let sink = FileSink::new(dir.path().join("app.log"), Some(policy));

        sink.write_bytes(&chunk(1)).await.unwrap();

        assert_eq!(sink.rotations(), 0);
        assert_eq!(read(sink.path()).len(), 100);
    }

    #[tokio::test]
    async fn policy_change_applies_to_next_write() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path().join("app.log"), None);

        sink.write_bytes(&chunk(1)).await.unwrap();
        sink.write_bytes(&chunk(2)).await.unwrap();
        assert_eq!(sink.rotations(), 0);

        let policy = RotationPolicy {
            max_size: 250,
            backup_count: 1,
        };
        sink.set_rotation(Some(policy));
        assert_eq!(sink.rotation(), Some(policy));
        sink.write_bytes(&chunk(3)).await.unwrap();

        assert_eq!(sink.rotations(), 1);
        assert_eq!(read(&sink.backup_path(1)).lines().count(), 2);
        assert!(read(sink.path()).starts_with("chunk-0003"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_never_interleave() {
        let dir = TempDir::new().unwrap();
        let policy = RotationPolicy {
            max_size: 1000,
            backup_count: 100,
        };
        let sink = Arc::new(FileSink::new(dir.path().join("app.log"), Some(policy)));

        let tasks: Vec<_> = (0..8)
            .map(|task| {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    for i in 0..25 {
                        sink.write_bytes(&chunk(task * 100 + i)).await.unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut lines = read(sink.path()).lines().map(str::to_string).collect::<Vec<_>>();
        for index in 1..=100 {
            lines.extend(read(&sink.backup_path(index)).lines().map(str::to_string));
        }
        assert_eq!(lines.len(), 200);
        assert!(lines.iter().all(|l| l.len() == 99 && l.starts_with("chunk-")));
        assert_eq!(sink.rotations(), 19);
    }
}
