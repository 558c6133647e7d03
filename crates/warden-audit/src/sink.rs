use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use warden_core::{Result, WardenError};

use crate::entry::AuditLogEntry;

/// Durable destination for audit entries. Append only.
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    /// Persist one entry. Called with entries in sequence order.
    fn write(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Last entry already persisted, used to continue the chain on restart.
    fn last_entry(&self) -> Result<Option<AuditLogEntry>> {
        Ok(None)
    }
}

// ── JSON-lines file ────────────────────────────────────────────

struct FileState {
    file: Option<File>,
    written: u64,
}

/// One JSON object per line. When `rotate_bytes` is non-zero, the live file
/// is renamed to `<path>.<n>` before it would grow past that size and the
/// chain continues in a fresh file.
pub struct JsonlFileSink {
    path: PathBuf,
    rotate_bytes: u64,
    state: Mutex<FileState>,
}

impl JsonlFileSink {
    pub fn open(path: impl Into<PathBuf>, rotate_bytes: u64) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        info!(?path, written, "opened audit log");
        Ok(Self {
            path,
            rotate_bytes,
            state: Mutex::new(FileState {
                file: Some(file),
                written,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotate(&self, state: &mut FileState) -> Result<()> {
        state.file = None;
        let n = segments(&self.path)?.len() + 1;
        let target = segment_path(&self.path, n);
        std::fs::rename(&self.path, &target)?;
        state.file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        state.written = 0;
        info!(from = ?self.path, to = ?target, "rotated audit log");
        Ok(())
    }
}

impl AuditSink for JsonlFileSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn write(&self, entry: &AuditLogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut state = self.state.lock();
        if self.rotate_bytes > 0
            && state.written > 0
            && state.written + line.len() as u64 > self.rotate_bytes
        {
            self.rotate(&mut state)?;
        }
        if state.file.is_none() {
            state.file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        let file = state
            .file
            .as_mut()
            .ok_or_else(|| WardenError::AuditLog("audit log file is not open".into()))?;
        file.write_all(&line)?;
        file.flush()?;
        state.written += line.len() as u64;
        Ok(())
    }

    fn last_entry(&self) -> Result<Option<AuditLogEntry>> {
        if let Some(entry) = last_line(&self.path)? {
            return Ok(Some(entry));
        }
        // The live file can be empty right after a rotation.
        match segments(&self.path)?.last() {
            Some(segment) => last_line(segment),
            None => Ok(None),
        }
    }
}

// ── In-memory ──────────────────────────────────────────────────

/// Keeps entries in memory. Can be told to fail, to exercise the
/// write-failure path.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<AuditLogEntry>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AuditSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn write(&self, entry: &AuditLogEntry) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WardenError::AuditLog("memory sink is failing".into()));
        }
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn last_entry(&self) -> Result<Option<AuditLogEntry>> {
        Ok(self.entries.lock().last().cloned())
    }
}

// ── Reading ────────────────────────────────────────────────────

fn segment_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Rotated segments of `path`, oldest first.
pub fn segments(path: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut n = 1;
    loop {
        let candidate = segment_path(path, n);
        if !candidate.exists() {
            break;
        }
        found.push(candidate);
        n += 1;
    }
    Ok(found)
}

fn read_file(path: &Path, out: &mut Vec<AuditLogEntry>) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|e| {
            WardenError::AuditLog(format!("{}:{}: {}", path.display(), i + 1, e))
        })?;
        out.push(entry);
    }
    Ok(())
}

fn last_line(path: &Path) -> Result<Option<AuditLogEntry>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut entries = Vec::new();
    read_file(path, &mut entries)?;
    Ok(entries.pop())
}

/// Every entry of the log at `path`: rotated segments in order, then the
/// live file.
pub fn read_log(path: &Path) -> Result<Vec<AuditLogEntry>> {
    let mut entries = Vec::new();
    for segment in segments(path)? {
        read_file(&segment, &mut entries)?;
    }
    if path.exists() {
        read_file(path, &mut entries)?;
    }
    Ok(entries)
}
