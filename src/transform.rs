//! Preprocessing applied to an input before it is handed to the tools.

use crate::catalog::{Catalog, JsFileMetadata};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Repeats the angularjs bundle until it passes 10,000,000 bytes.
pub const ANGULAR_10X: &str = "angularjs 10x";

const TEN_MB: usize = 10 * 1000 * 1000;

/// Returns the path the tools should read for `input`.
///
/// Inputs without a transform are used as-is. Transformed inputs are
/// generated into `data_dir` under their declared bundle path.
pub fn resolve_input(catalog: &Catalog, input: &JsFileMetadata, data_dir: &Path) -> Result<PathBuf> {
    match input.transform.as_deref() {
        None => Ok(PathBuf::from(&input.bundle_path)),
        Some(ANGULAR_10X) => {
            let source = catalog.input("angularjs")?;
            repeat_until(
                Path::new(&source.bundle_path),
                &data_dir.join(&input.bundle_path),
                TEN_MB,
            )
        }
        Some(other) => Err(Error::UnknownTransform(other.to_string())),
    }
}

/// Concatenates `source` with itself until the result reaches `min_len`
/// bytes, writes it to `dest`, and returns `dest`.
pub fn repeat_until(source: &Path, dest: &Path, min_len: usize) -> Result<PathBuf> {
    let chunk = fs::read(source).map_err(|e| Error::io(source, e))?;
    let mut data = chunk.clone();
    if !chunk.is_empty() {
        while data.len() < min_len {
            data.extend_from_slice(&chunk);
        }
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(dest, &data).map_err(|e| Error::io(dest, e))?;
    Ok(dest.to_path_buf())
}
