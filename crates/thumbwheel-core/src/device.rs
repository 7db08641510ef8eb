//! Input device discovery and the background reader task

use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::event::{decode, RECORD_SIZE};
use crate::session::Signal;
use crate::{Error, Result};

/// Find the first entry of `dir` (by name) whose file name ends with `suffix`
pub fn discover(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(suffix))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Pick the device to read: explicit argument, then config, then discovery
pub fn resolve(explicit: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    let candidate = explicit
        .map(Path::to_path_buf)
        .or_else(|| config.device_path())
        .or_else(|| discover(&config.device.search_dir, &config.device.suffix));

    match candidate {
        Some(path) if path.exists() => Ok(path),
        Some(path) => {
            debug!("Input device does not exist: {}", path.display());
            Err(Error::NoDevice)
        }
        None => Err(Error::NoDevice),
    }
}

/// Read `path` until it closes, forwarding decoded events. Always finishes by
/// sending `Signal::DeviceClosed`.
pub fn spawn_reader(path: PathBuf, tx: mpsc::UnboundedSender<Signal>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = match read_events(&path, &tx).await {
            Ok(()) => "end of stream".to_string(),
            Err(e) => e.to_string(),
        };
        warn!("Stopped reading {}: {}", path.display(), reason);
        let _ = tx.send(Signal::DeviceClosed(reason));
    })
}

async fn read_events(path: &Path, tx: &mpsc::UnboundedSender<Signal>) -> Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| Error::Device {
            path: path.to_path_buf(),
            source,
        })?;

    let mut record = [0u8; RECORD_SIZE];
    loop {
        match file.read_exact(&mut record).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        if let Some(event) = decode(&record) {
            if tx.send(Signal::Pointer(event)).is_err() {
                // coordinator is gone
                return Ok(());
            }
        }
    }
}
