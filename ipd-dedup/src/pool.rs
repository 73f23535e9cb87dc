use std::{fs, path::Path, thread::ScopedJoinHandle};

use ipd_core::{DedupError, Result};

pub(crate) fn join<T>(handle: ScopedJoinHandle<'_, Result<T>>, name: &'static str) -> Result<T> {
    handle
        .join()
        .unwrap_or(Err(DedupError::WorkerPanicked(name)))
}

/// Keeps the first real failure; `Cancelled` only fills an empty slot.
pub(crate) fn record_failure(slot: &mut Option<DedupError>, err: DedupError) {
    let replace = match slot {
        None => true,
        Some(current) => current.is_cancelled() && !err.is_cancelled(),
    };
    if replace {
        *slot = Some(err);
    }
}

/// Best-effort removal of a file a failed run leaves behind.
pub(crate) fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("could not remove {}: {}", path.display(), e);
        }
    }
}

/// Removes every chunk or merge output still sitting in `dir`.
pub(crate) fn purge_run_files(dir: &Path) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("could not list {}: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let ours = (name.starts_with("chunk_") || name.starts_with("merged_"))
            && name.ends_with(".tmp");
        if ours {
            discard(&entry.path());
        }
    }
}
