//! Transactional append-only record stores
//!
//! A store hands the existing records to a closure and appends whatever the
//! closure returns, all under one exclusive lock acquired with a bounded
//! wait. A lock that cannot be acquired in time is reported as
//! [`ForecastError::LockTimeout`]; records are never dropped silently.

use crate::error::{ForecastError, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Append-only store of records of type `R`
pub trait RecordStore<R>: Send + Sync {
    /// Snapshot of every stored record in append order
    fn load(&self) -> Result<Vec<R>>;

    /// Run `f` on the existing records and append its output atomically
    ///
    /// Returns the appended records. An error from `f` appends nothing.
    fn transact(&self, f: &mut dyn FnMut(&[R]) -> Result<Vec<R>>) -> Result<Vec<R>>;

    /// Append records unconditionally
    fn append(&self, records: Vec<R>) -> Result<Vec<R>> {
        let mut pending = Some(records);
        self.transact(&mut |_| Ok(pending.take().unwrap_or_default()))
    }
}

fn lock_timeout(resource: &str, timeout: Duration) -> ForecastError {
    warn!("Lock on {} not acquired within {:?}", resource, timeout);
    ForecastError::LockTimeout {
        resource: resource.to_string(),
        waited_ms: timeout.as_millis() as u64,
    }
}

/// In-memory store, used in tests and single-process setups
#[derive(Debug)]
pub struct MemoryStore<R> {
    name: String,
    records: Mutex<Vec<R>>,
    timeout: Duration,
}

impl<R> MemoryStore<R> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timeout(name, Duration::from_secs(5))
    }

    pub fn with_timeout(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(Vec::new()),
            timeout,
        }
    }

    /// Number of stored records, waiting at most the lock timeout
    pub fn len(&self) -> Result<usize> {
        self.records
            .try_lock_for(self.timeout)
            .map(|r| r.len())
            .ok_or_else(|| lock_timeout(&self.name, self.timeout))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<R: Clone + Send> RecordStore<R> for MemoryStore<R> {
    fn load(&self) -> Result<Vec<R>> {
        self.records
            .try_lock_for(self.timeout)
            .map(|r| r.clone())
            .ok_or_else(|| lock_timeout(&self.name, self.timeout))
    }

    fn transact(&self, f: &mut dyn FnMut(&[R]) -> Result<Vec<R>>) -> Result<Vec<R>> {
        let mut records = self
            .records
            .try_lock_for(self.timeout)
            .ok_or_else(|| lock_timeout(&self.name, self.timeout))?;
        let appended = f(&records)?;
        records.extend(appended.iter().cloned());
        Ok(appended)
    }
}

/// Removes the cross-process lock file when dropped
struct LockFileGuard {
    path: PathBuf,
}

impl Drop for LockFileGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release lock file {}: {}", self.path.display(), e);
        }
    }
}

/// JSON-lines file store
///
/// Writers in one process serialize on a mutex; writers in different
/// processes serialize on a lock file created exclusively next to the data
/// file.
#[derive(Debug)]
pub struct JsonlStore<R> {
    path: PathBuf,
    lock_path: PathBuf,
    timeout: Duration,
    local: Mutex<()>,
    _record: std::marker::PhantomData<fn() -> R>,
}

impl<R> JsonlStore<R> {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        let path = path.into();
        let mut lock_name = path.clone().into_os_string();
        lock_name.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_name),
            timeout,
            local: Mutex::new(()),
            _record: std::marker::PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Create the lock file, polling until `deadline`
    ///
    /// Readers never take this lock. A lock file left by a writer that
    /// crashed blocks writers until it is removed.
    fn acquire_file_lock(&self, deadline: Instant) -> Result<LockFileGuard> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(_) => {
                    return Ok(LockFileGuard {
                        path: self.lock_path.clone(),
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(lock_timeout(
                            &self.lock_path.display().to_string(),
                            self.timeout,
                        ));
                    }
                    debug!("Waiting for lock file {}", self.lock_path.display());
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<R: DeserializeOwned> JsonlStore<R> {
    /// Parse every line of the log
    ///
    /// Appends are newline-terminated, so an unterminated final line is a
    /// write still in flight in another process. With `skip_unterminated`
    /// such a line is dropped when it does not parse. Writers hold the lock
    /// and pass `false`.
    ///
    /// Also reports whether the file ends mid-line.
    fn read_all(&self, skip_unterminated: bool) -> Result<(Vec<R>, bool)> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Vec::new(), false)),
            Err(e) => return Err(e.into()),
        };

        // An append in flight may end mid-character
        let contents = String::from_utf8_lossy(&bytes);
        let (complete, tail) = match contents.rfind('\n') {
            Some(end) => contents.split_at(end + 1),
            None => ("", contents.as_ref()),
        };

        let mut records = complete
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<std::result::Result<Vec<R>, _>>()?;

        if !tail.trim().is_empty() {
            match serde_json::from_str(tail) {
                Ok(record) => records.push(record),
                Err(e) if skip_unterminated => {
                    debug!(
                        "Skipping unterminated line in {}: {}",
                        self.path.display(),
                        e
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok((records, !tail.is_empty()))
    }
}

impl<R> RecordStore<R> for JsonlStore<R>
where
    R: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Vec<R>> {
        let _local = self
            .local
            .try_lock_for(self.timeout)
            .ok_or_else(|| lock_timeout(&self.path.display().to_string(), self.timeout))?;
        self.read_all(true).map(|(records, _)| records)
    }

    fn transact(&self, f: &mut dyn FnMut(&[R]) -> Result<Vec<R>>) -> Result<Vec<R>> {
        let deadline = Instant::now() + self.timeout;
        let _local = self
            .local
            .try_lock_for(self.timeout)
            .ok_or_else(|| lock_timeout(&self.path.display().to_string(), self.timeout))?;
        let _file_lock = self.acquire_file_lock(deadline)?;

        let (existing, unterminated) = self.read_all(false)?;
        let appended = f(&existing)?;
        if appended.is_empty() {
            return Ok(appended);
        }

        let mut buffer = Vec::new();
        if unterminated {
            buffer.push(b'\n');
        }
        for record in &appended {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&buffer)?;
        file.sync_data()?;
        Ok(appended)
    }
}
