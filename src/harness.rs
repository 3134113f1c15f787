//! Running external commands and measuring what they leave behind.

use crate::error::{Error, Result};
use crate::schema::Measurement;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Paths substituted into a tool's command template.
#[derive(Clone, Copy, Debug)]
pub struct Substitution<'a> {
    pub input: &'a str,
    pub output: &'a str,
    /// Empty when the input declares no externs.
    pub externs: &'a str,
}

/// Fills in `%%in%%`, `%%out%%` and `%%externs%%`.
pub fn substitute(template: &str, subst: &Substitution<'_>) -> String {
    template
        .replace("%%in%%", subst.input)
        .replace("%%out%%", subst.output)
        .replace("%%externs%%", subst.externs)
}

/// Runs `cmd` through `sh -c`, blocking until it exits.
///
/// Stdout goes straight to ours. Stderr is echoed line by line as it
/// arrives and also kept, so a failure can carry the shell's complaint.
pub fn exec(cmd: &str) -> Result<()> {
    let spawn_error = |source| Error::Spawn {
        cmd: cmd.to_string(),
        source,
    };
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    let mut captured = Vec::new();
    if let Some(pipe) = child.stderr.take() {
        let mut reader = BufReader::new(pipe);
        let mut line = Vec::new();
        let mut ours = io::stderr();
        while reader.read_until(b'\n', &mut line).map_err(spawn_error)? > 0 {
            let _ = ours.write_all(&line);
            captured.extend_from_slice(&line);
            line.clear();
        }
    }
    let status = child.wait().map_err(spawn_error)?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            cmd: cmd.to_string(),
            status,
            stderr: String::from_utf8_lossy(&captured).trim_end().to_string(),
        })
    }
}

#[derive(Debug)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    pub fn build_time(&self) -> Measurement {
        Measurement::millis(self.elapsed.as_secs_f64() * 1000.0)
    }
}

/// Wall-clock time of a single call.
pub fn time_fn<T>(f: impl FnOnce() -> T) -> Timed<T> {
    let start = Instant::now();
    let value = f();
    Timed {
        value,
        elapsed: start.elapsed(),
    }
}

pub fn file_size(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path).map_err(|e| Error::io(path, e))?.len())
}

/// Compresses `path` at level 9 with `binary`, keeping the original, and
/// returns the size of `<path>.<ext>`.
fn compressed_size(binary: &str, path: &Path, ext: &str) -> Result<u64> {
    exec(&format!("{binary} -k -9 -f {}", path.display()))?;
    let mut compressed = path.as_os_str().to_owned();
    compressed.push(".");
    compressed.push(ext);
    file_size(Path::new(&compressed))
}

pub fn gzip_size(gzip: &str, path: &Path) -> Result<u64> {
    compressed_size(gzip, path, "gz")
}

pub fn brotli_size(brotli: &str, path: &Path) -> Result<u64> {
    compressed_size(brotli, path, "br")
}

/// `first-contentful-paint` becomes `firstContentfulPaint`.
pub fn camel_case(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut upper_next = false;
    for c in id.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
