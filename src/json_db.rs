use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Notify, task::JoinHandle, time};
use tracing::{debug, info, warn};

const WAL_SUFFIX: &str = ".wal";

#[derive(Clone, Debug)]
pub struct JsonDbOptions {
    /// Delay to debounce writes. Default 50ms.
    pub write_delay: Duration,
    /// Whether to keep a write-ahead copy while replacing the file. Default true.
    pub enable_wal: bool,
}

impl Default for JsonDbOptions {
    fn default() -> Self {
        Self {
            write_delay: Duration::from_millis(50),
            enable_wal: true,
        }
    }
}

struct Mirror {
    path: PathBuf,
    wal_path: PathBuf,
    opts: JsonDbOptions,
}

impl Mirror {
    fn new(path: PathBuf, opts: JsonDbOptions) -> Self {
        let mut wal_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        wal_name.push(WAL_SUFFIX);
        let wal_path = path.with_file_name(wal_name);
        Self {
            path,
            wal_path,
            opts,
        }
    }

    /// Load the mirrored value. Anything unreadable falls back to `T::default()`.
    fn load<T: DeserializeOwned + Default>(&self) -> T {
        if self.opts.enable_wal && self.wal_path.exists() {
            match read_json::<T>(&self.wal_path) {
                Ok(value) => {
                    info!("Recovered {} from interrupted write", self.path.display());
                    return value;
                }
                Err(e) => warn!("Ignoring unreadable WAL {}: {:#}", self.wal_path.display(), e),
            }
        }

        if !self.path.exists() {
            info!("{} does not exist, starting empty", self.path.display());
            return T::default();
        }

        match read_json::<T>(&self.path) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not load {}, starting empty: {:#}", self.path.display(), e);
                T::default()
            }
        }
    }

    fn write_atomic(&self, json: &str) -> anyhow::Result<()> {
        if self.opts.enable_wal {
            std::fs::write(&self.wal_path, json).context("writing WAL")?;
        }

        // Exclusive lock on the main file while it is replaced
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("opening DB file {}", self.path.display()))?;
        fs2::FileExt::lock_exclusive(&f).context("locking DB file")?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).context("writing temp file")?;
        std::fs::rename(&tmp, &self.path).context("atomic rename")?;

        if self.opts.enable_wal {
            let _ = std::fs::remove_file(&self.wal_path);
        }

        drop(f);
        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("deserializing {}", path.display()))
}

struct Shared<T> {
    value: RwLock<T>,
    mirror: Option<Mirror>,
    pending: AtomicBool,
}

impl<T: Serialize> Shared<T> {
    fn write_snapshot(&self) -> anyhow::Result<()> {
        let Some(mirror) = &self.mirror else {
            return Ok(());
        };
        let json = {
            let guard = self.value.read();
            serde_json::to_string_pretty(&*guard)?
        };
        mirror.write_atomic(&json)
    }
}

/// A value held in memory and optionally mirrored to a JSON file.
///
/// Updates are applied in memory immediately; the file is rewritten by a
/// background task after a short debounce.
pub struct JsonDb<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    shared: Arc<Shared<T>>,
    write_notify: Arc<Notify>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T> JsonDb<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    /// Memory-only store, nothing touches disk.
    pub fn in_memory(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: RwLock::new(value),
                mirror: None,
                pending: AtomicBool::new(false),
            }),
            write_notify: Arc::new(Notify::new()),
            writer_handle: Mutex::new(None),
        }
    }

    /// Open the mirror at `path`. A missing or corrupt file yields `T::default()`.
    /// Must be called inside a tokio runtime.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::open_opts(path, JsonDbOptions::default())
    }

    pub fn open_opts<P: AsRef<Path>>(path: P, opts: JsonDbOptions) -> Self {
        let mirror = Mirror::new(path.as_ref().to_path_buf(), opts);
        info!("Loading {}", mirror.path.display());
        let initial = mirror.load::<T>();

        let db = Self {
            shared: Arc::new(Shared {
                value: RwLock::new(initial),
                mirror: Some(mirror),
                pending: AtomicBool::new(false),
            }),
            write_notify: Arc::new(Notify::new()),
            writer_handle: Mutex::new(None),
        };
        db.start_writer();
        db
    }

    pub fn is_mirrored(&self) -> bool {
        self.shared.mirror.is_some()
    }

    fn start_writer(&self) {
        let Some(write_delay) = self.shared.mirror.as_ref().map(|m| m.opts.write_delay) else {
            return;
        };
        let notify = self.write_notify.clone();
        let shared = self.shared.clone();

        let handle = tokio::spawn(async move {
            loop {
                notify.notified().await;
                time::sleep(write_delay).await;

                if !shared.pending.swap(false, Ordering::AcqRel) {
                    continue;
                }

                let task_shared = shared.clone();
                let result =
                    tokio::task::spawn_blocking(move || task_shared.write_snapshot()).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Background write failed: {:#}", e),
                    Err(e) => warn!("Background writer panicked: {}", e),
                }
            }
        });

        *self.writer_handle.lock() = Some(handle);
    }

    /// Read-only access under a read lock.
    pub fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.shared.value.read();
        f(&*guard)
    }

    /// Mutating access under the write lock. Schedules a write when mirrored.
    pub fn update<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let res = {
            let mut guard = self.shared.value.write();
            f(&mut *guard)
        };
        if self.is_mirrored() {
            self.shared.pending.store(true, Ordering::Release);
            self.write_notify.notify_one();
        }
        res
    }

    /// Write the current value to disk now.
    pub async fn flush(&self) -> anyhow::Result<()> {
        self.shared.pending.store(false, Ordering::Release);
        let shared = self.shared.clone();
        tokio::task::spawn_blocking(move || shared.write_snapshot()).await??;
        Ok(())
    }
}

impl<T> Drop for JsonDb<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(handle) = self.writer_handle.lock().take() {
            handle.abort();
        }
        if self.shared.mirror.is_some() {
            if let Err(e) = self.shared.write_snapshot() {
                warn!("Final write failed: {:#}", e);
            }
        }
    }
}
