//! Follows a single append-only text file, yielding each new line.
//!
//! The follower starts at the current end of the file and never replays
//! history. File-system events from `notify` wake it as soon as the log
//! changes; a poll timer covers missed events and platforms where no
//! watcher can be installed. It survives read errors, truncation (including
//! a rewrite that regrows past the old offset) and rename-style rotation,
//! and ends only when cancelled, when the consumer goes away, or when the
//! file cannot be opened at all.

use std::ffi::OsString;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;

/// Item type of the follower sequence.
pub type LineResult = Result<String, SourceError>;

/// Bytes from the start of the file remembered to notice in-place rewrites.
const HEAD_LEN: usize = 64;

/// Tunables for [`follow`].
#[derive(Debug, Clone)]
pub struct FollowerConfig {
    /// Re-check interval when no file-system event arrives.
    pub poll_interval: Duration,
    /// Start at the end of the file (live tail). `false` reads from the start.
    pub start_at_end: bool,
    /// Capacity of the outbound channel.
    pub channel_capacity: usize,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            start_at_end: true,
            channel_capacity: 1,
        }
    }
}

/// Spawn a task following `path` and return the receiving end of its
/// line sequence.
///
/// The task holds the file open until `cancel` fires or the receiver is
/// dropped. If the file cannot be opened a single [`SourceError::Open`] is
/// sent and the sequence ends.
pub fn follow(
    path: impl Into<PathBuf>,
    config: FollowerConfig,
    cancel: CancellationToken,
) -> mpsc::Receiver<LineResult> {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    tokio::spawn(run(path.into(), config, tx, cancel));
    rx
}

async fn run(
    path: PathBuf,
    config: FollowerConfig,
    tx: mpsc::Sender<LineResult>,
    cancel: CancellationToken,
) {
    let mut reader = match TailReader::open(&path, config.start_at_end).await {
        Ok(reader) => reader,
        Err(source) => {
            tracing::error!(path = %path.display(), error = %source, "Cannot open source log");
            emit(&tx, Err(SourceError::Open { path, source }), &cancel).await;
            return;
        }
    };

    let wake = Arc::new(Notify::new());
    // Dropping the watcher stops its event thread.
    let _watcher = watch(&path, Arc::clone(&wake));
    tracing::info!(path = %path.display(), offset = reader.pos, "Following source log");

    'follow: loop {
        if let Err(e) = reader.check_rotation(&path).await {
            if !emit(&tx, Err(SourceError::Read(e)), &cancel).await {
                break;
            }
        }

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => break 'follow,
                step = reader.next_line() => step,
            };

            match step {
                Ok(Some(line)) => {
                    if !emit(&tx, Ok(line), &cancel).await {
                        break 'follow;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // A bad line is consumed; anything else waits for the next wake.
                    let consumed = e.kind() == ErrorKind::InvalidData;
                    if !emit(&tx, Err(SourceError::Read(e)), &cancel).await {
                        break 'follow;
                    }
                    if !consumed {
                        break;
                    }
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = wake.notified() => {}
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    tracing::info!(path = %path.display(), "Stopped following source log");
}

/// Send one item. Returns `false` when the sequence should end.
async fn emit(tx: &mpsc::Sender<LineResult>, item: LineResult, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Watch the directory holding `path` so that writes, truncation and
/// replacement of the log all wake the follower. `None` leaves the
/// follower on its poll timer.
fn watch(path: &Path, wake: Arc<Notify>) -> Option<RecommendedWatcher> {
    let name: Option<OsString> = path.file_name().map(ToOwned::to_owned);
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let handler = move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else { return };
        if event.paths.iter().any(|p| p.file_name() == name.as_deref()) {
            wake.notify_one();
        }
    };

    let mut watcher = match notify::recommended_watcher(handler) {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::warn!(error = %e, "File watcher unavailable, polling only");
            return None;
        }
    };
    if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        tracing::warn!(dir = %dir.display(), error = %e, "Cannot watch log directory, polling only");
        return None;
    }
    Some(watcher)
}

/// Identity of the file behind a path, used to notice rotation.
#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    None
}

/// Up to `len` bytes from the start of `file`. Leaves the cursor moved.
async fn read_head(file: &mut File, len: usize) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(len);
    file.seek(SeekFrom::Start(0)).await?;
    file.take(len as u64).read_to_end(&mut head).await?;
    Ok(head)
}

struct TailReader {
    reader: BufReader<File>,
    /// Bytes consumed from the current file, including any partial line.
    pos: u64,
    /// Partial line awaiting its terminating newline.
    pending: Vec<u8>,
    /// First bytes of the file as seen when they were consumed.
    head: Vec<u8>,
    identity: Option<(u64, u64)>,
}

impl TailReader {
    async fn open(path: &Path, start_at_end: bool) -> std::io::Result<Self> {
        let mut file = File::open(path).await?;
        let identity = file_identity(&file.metadata().await?);

        let (pos, head) = if start_at_end {
            let head = read_head(&mut file, HEAD_LEN).await?;
            (file.seek(SeekFrom::End(0)).await?, head)
        } else {
            (0, Vec::new())
        };

        Ok(Self {
            reader: BufReader::new(file),
            pos,
            pending: Vec::new(),
            head,
            identity,
        })
    }

    /// Next complete line, or `None` when no complete line is available yet.
    ///
    /// Blank lines are skipped. A line that is not valid UTF-8 is reported
    /// as an `InvalidData` error and consumed.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let n = self.reader.read_until(b'\n', &mut self.pending).await?;
            if n == 0 {
                return Ok(None);
            }
            self.remember_head(n);
            self.pos += n as u64;

            if self.pending.last() != Some(&b'\n') {
                // Writer is mid-line; wait for the rest.
                return Ok(None);
            }

            let mut bytes = std::mem::take(&mut self.pending);
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            if bytes.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e));
        }
    }

    /// Extend the head fingerprint with the `n` bytes just read, while the
    /// fingerprint still ends exactly at the read offset.
    fn remember_head(&mut self, n: usize) {
        if self.head.len() >= HEAD_LEN || self.head.len() as u64 != self.pos {
            return;
        }
        let fresh = &self.pending[self.pending.len() - n..];
        let take = fresh.len().min(HEAD_LEN - self.head.len());
        self.head.extend_from_slice(&fresh[..take]);
    }

    /// Reopen or rewind when the file behind `path` was replaced, truncated
    /// or rewritten in place. A missing path is treated as a rotation in
    /// progress.
    async fn check_rotation(&mut self, path: &Path) -> std::io::Result<()> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let identity = file_identity(&meta);
        if identity.is_some() && identity != self.identity {
            tracing::info!(path = %path.display(), "Source log replaced, reopening");
            *self = Self::open(path, false).await?;
            return Ok(());
        }

        let shrunk = meta.len() < self.pos;
        let rewritten = !shrunk && !self.head.is_empty() && self.head_changed(path).await?;
        if shrunk || rewritten {
            tracing::info!(
                path = %path.display(),
                len = meta.len(),
                offset = self.pos,
                rewritten,
                "Source log truncated, rewinding",
            );
            self.reader.seek(SeekFrom::Start(0)).await?;
            self.pos = 0;
            self.pending.clear();
            self.head.clear();
        }

        Ok(())
    }

    async fn head_changed(&self, path: &Path) -> std::io::Result<bool> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        let current = read_head(&mut file, self.head.len()).await?;
        Ok(current != self.head)
    }
}
