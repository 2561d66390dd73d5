//! Crash-safe JSON file I/O.
//!
//! All rendezvous files go through this module: reads never fail (they fall
//! back to a `.backup` sibling, then to the caller's default), and writes are
//! atomic per path (temp file in the same directory, fsync, reparse-validate,
//! rename over the target).
//!
//! Each file path has its own lock; concurrent writers to the same path are
//! serialized while writers to different paths proceed in parallel.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use serde_json::Value;
use tracing::{debug, warn};

lazy_static! {
    static ref FILE_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> = Mutex::new(HashMap::new());
}

fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = FILE_LOCKS.lock().unwrap();
    locks
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".backup");
    PathBuf::from(name)
}

fn parse_file(path: &Path) -> Option<Value> {
    let content = fs::read_to_string(path).ok()?;
    if content.trim().is_empty() {
        return None;
    }
    serde_json::from_str(&content).ok()
}

fn read_json_unlocked(path: &Path, default: Value) -> Value {
    if !path.exists() {
        return default;
    }

    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => return default,
        Err(_) => return default,
        _ => {}
    }

    if let Some(value) = parse_file(path) {
        return value;
    }

    let backup = backup_path(path);
    warn!(
        "Failed to parse {:?}, falling back to backup {:?}",
        path, backup
    );
    if let Some(value) = parse_file(&backup) {
        return value;
    }

    default
}

fn write_json_unlocked(path: &Path, value: &Value, backup: bool) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let serialized = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;

    let mut temp = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("Failed to create temp file next to {:?}", path))?;
    temp.write_all(serialized.as_bytes())
        .context("Failed to write temp file")?;
    temp.flush().context("Failed to flush temp file")?;
    temp.as_file()
        .sync_all()
        .context("Failed to fsync temp file")?;

    // Validate what actually hit the disk before it replaces the target.
    let written = fs::read_to_string(temp.path()).context("Failed to re-read temp file")?;
    serde_json::from_str::<Value>(&written).context("Temp file failed JSON validation")?;

    if backup && path.exists() {
        let backup = backup_path(path);
        if let Err(e) = fs::copy(path, &backup) {
            warn!("Failed to write backup {:?}: {}", backup, e);
        }
    }

    temp.persist(path)
        .map_err(|e| anyhow::anyhow!("Failed to rename temp file over {:?}: {}", path, e.error))?;
    debug!("Wrote {:?} atomically", path);
    Ok(())
}

/// Read a JSON file, returning `default` on any failure.
///
/// Non-existent and zero-length files yield the default. A file that fails to
/// parse falls back to its `.backup` sibling; if that is also unreadable the
/// default is returned. This function never errors.
pub fn read_json(path: &Path, default: Value) -> Value {
    let lock = lock_for(path);
    let _guard = lock.lock().unwrap();
    read_json_unlocked(path, default)
}

/// Read a JSON file, distinguishing "nothing there" from "unreadable".
///
/// Missing and zero-length files are `Ok(None)`. A file that fails to parse
/// falls back to its `.backup` sibling; if that is also unreadable the read
/// is an error, so callers that hold state (the rendezvous watcher) can keep
/// their previous snapshot instead of swallowing a default.
pub fn read_json_checked(path: &Path) -> Result<Option<Value>> {
    let lock = lock_for(path);
    let _guard = lock.lock().unwrap();

    if !path.exists() {
        return Ok(None);
    }
    let meta = fs::metadata(path).with_context(|| format!("Failed to stat {:?}", path))?;
    if meta.len() == 0 {
        return Ok(None);
    }

    if let Some(value) = parse_file(path) {
        return Ok(Some(value));
    }

    let backup = backup_path(path);
    warn!(
        "Failed to parse {:?}, falling back to backup {:?}",
        path, backup
    );
    if let Some(value) = parse_file(&backup) {
        return Ok(Some(value));
    }

    anyhow::bail!("Neither {:?} nor its backup holds valid JSON", path)
}

/// Atomically replace `path` with the serialized `value`.
///
/// When `backup` is true and the target already exists, a copy is preserved
/// as `<path>.backup` before the rename.
pub fn write_json(path: &Path, value: &Value, backup: bool) -> Result<()> {
    let lock = lock_for(path);
    let _guard = lock.lock().unwrap();
    write_json_unlocked(path, value, backup)
}

/// Read-modify-write under the file's lock.
///
/// Externally observable as a single state transition. The transformation
/// must be pure; it receives the current value (or `default`) and returns
/// the value to persist.
pub fn atomic_update_json<F>(path: &Path, default: Value, update: F) -> Result<Value>
where
    F: FnOnce(Value) -> Value,
{
    let lock = lock_for(path);
    let _guard = lock.lock().unwrap();
    let current = read_json_unlocked(path, default);
    let updated = update(current);
    write_json_unlocked(path, &updated, true)?;
    Ok(updated)
}
