// crates/pipescan-core/src/io.rs

//! Serialization helpers for [`ScanState`].
//!
//! JSON and CBOR read/write utilities with extension-based auto-detection.
//! Unknown/missing extensions are rejected for reads and default to JSON for
//! writes. In-memory CBOR helpers are included for wire embedding.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor};
use std::path::Path;

use crate::state::ScanState;

/// Ensure the parent directory for a file exists (no-op if none).
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", display(path)))?;
        }
    }
    Ok(())
}

/// Read a [`ScanState`] from **JSON**.
pub fn read_state_json<A, D, P>(path: P) -> Result<ScanState<A, D>>
where
    A: DeserializeOwned,
    D: DeserializeOwned,
    P: AsRef<Path>,
{
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let rdr = BufReader::new(f);
    let v = serde_json::from_reader(rdr).with_context(|| "deserialize JSON scan state")?;
    Ok(v)
}

/// Write a [`ScanState`] to **JSON** (pretty).
pub fn write_state_json<A, D, P>(path: P, v: &ScanState<A, D>) -> Result<()>
where
    A: Serialize,
    D: Serialize,
    P: AsRef<Path>,
{
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let w = BufWriter::new(f);
    serde_json::to_writer_pretty(w, v).with_context(|| "serialize JSON scan state")?;
    Ok(())
}

/// Read a [`ScanState`] from **CBOR**.
pub fn read_state_cbor<A, D, P>(path: P) -> Result<ScanState<A, D>>
where
    A: DeserializeOwned,
    D: DeserializeOwned,
    P: AsRef<Path>,
{
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let mut rdr = BufReader::new(f);
    let v = ciborium::de::from_reader(&mut rdr).with_context(|| "deserialize CBOR scan state")?;
    Ok(v)
}

/// Write a [`ScanState`] to **CBOR**.
pub fn write_state_cbor<A, D, P>(path: P, v: &ScanState<A, D>) -> Result<()>
where
    A: Serialize,
    D: Serialize,
    P: AsRef<Path>,
{
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let mut w = BufWriter::new(f);
    ciborium::ser::into_writer(v, &mut w).with_context(|| "serialize CBOR scan state")?;
    Ok(())
}

/// Auto-detect read by extension `.json` / `.cbor` (case-insensitive).
pub fn read_state_auto<A, D, P>(path: P) -> Result<ScanState<A, D>>
where
    A: DeserializeOwned,
    D: DeserializeOwned,
    P: AsRef<Path>,
{
    match ext_lower(path.as_ref()).as_deref() {
        Some("json") => read_state_json(path),
        Some("cbor") => read_state_cbor(path),
        Some(other) => Err(anyhow!(
            "unsupported state extension: {} (supported: .json, .cbor)",
            other
        )),
        None => Err(anyhow!("path has no extension (expected .json or .cbor)")),
    }
}

/// Auto-detect write (defaults to **JSON** if unknown or missing).
pub fn write_state_auto<A, D, P>(path: P, v: &ScanState<A, D>) -> Result<()>
where
    A: Serialize,
    D: Serialize,
    P: AsRef<Path>,
{
    match ext_lower(path.as_ref()).as_deref() {
        Some("cbor") => write_state_cbor(path, v),
        _ => write_state_json(path, v),
    }
}

/// Serialize any `T: Serialize` to **CBOR bytes**.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).with_context(|| "serialize CBOR (to_cbor)")?;
    Ok(buf)
}

/// Deserialize any `T: DeserializeOwned` from **CBOR bytes**.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut cur = Cursor::new(bytes);
    let v = ciborium::de::from_reader(&mut cur).with_context(|| "deserialize CBOR (from_cbor)")?;
    Ok(v)
}

/// Return the lowercase extension (without dot) if present.
fn ext_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
}

/// Human-friendly path display for error messages.
fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str, ext: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("pipescan_io_{name}_{nanos}.{ext}"));
        p
    }

    fn sample_state() -> ScanState<u64, u64> {
        let state = ScanState::empty(4, 1);
        let (_, state) = state.update(&[7, 8], &[]).unwrap();
        state
    }

    #[test]
    fn state_json_roundtrip() {
        let path = tmp_path("state", "json");
        let state = sample_state();
        write_state_auto(&path, &state).unwrap();
        let got: ScanState<u64, u64> = read_state_auto(&path).unwrap();
        assert_eq!(got, state);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn state_cbor_roundtrip() {
        let path = tmp_path("state", "cbor");
        let state = sample_state();
        write_state_auto(&path, &state).unwrap();
        let got: ScanState<u64, u64> = read_state_auto(&path).unwrap();
        assert_eq!(got, state);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn in_memory_cbor_roundtrip() {
        let state = sample_state();
        let bytes = to_cbor(&state).unwrap();
        let got: ScanState<u64, u64> = from_cbor(&bytes).unwrap();
        assert_eq!(got, state);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_state_auto::<u64, u64, _>("state.toml").unwrap_err();
        assert!(err.to_string().contains("unsupported state extension"));
    }
}
