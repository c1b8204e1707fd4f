//! Atomic file persistence for pipeline artifacts.
//!
//! Every artifact a stage hands to the next one goes through these helpers:
//! the payload is written to a hidden temporary sibling and renamed into
//! place, so a reader never observes a half-written file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Temporary sibling used while `path` is being written.
///
/// `model.json` becomes `.model.json.tmp` so that two artifacts sharing a
/// stem (e.g. `train.csv` and `train.json`) never collide.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Atomically write pretty-printed JSON.
///
/// Creates parent directories if they don't exist.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    atomic_write_with(path, |w| {
        serde_json::to_writer_pretty(&mut *w, data).map_err(io::Error::other)?;
        w.write_all(b"\n")
    })
}

/// Atomically write raw bytes.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    atomic_write_with(path, |w| w.write_all(data))
}

/// Atomically write through a buffered writer.
///
/// The closure streams its output into the temporary file; the rename only
/// happens once the closure succeeded and the buffer was flushed. On error
/// the temporary file is removed and the target is left untouched.
pub fn atomic_write_with<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_sibling(path);
    let result = (|| {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    })();
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)
}

/// Copy `from` to `to` with the same temp-then-rename discipline.
pub fn atomic_copy(from: &Path, to: &Path) -> io::Result<()> {
    let data = std::fs::read(from)?;
    atomic_write(to, &data)
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let value = serde_json::from_reader(io::BufReader::new(file))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}
