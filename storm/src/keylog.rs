use crate::error::HarnessError;
use rustls::KeyLog;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};

/// Truncates (or creates) the key log once, before any trial opens it for appending.
pub fn prepare(path: &Path) -> Result<(), HarnessError> {
    File::create(path).map_err(|error| HarnessError::CannotOpenKeyLog(path.into(), error))?;
    info!("Key log will be written to: {}", path.display());
    Ok(())
}

/// NSS key log writer shared by every connection of a single trial.
///
/// Each secret is written as one complete line with a single `write_all` on a file
/// opened in append mode, so trials appending to the same path never interleave
/// partial lines.
#[derive(Debug)]
pub struct KeyLogSink {
    path: PathBuf,
    file: Mutex<File>,
    lines: AtomicU64,
}

impl KeyLogSink {
    pub fn open(path: &Path) -> Result<Self, HarnessError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|error| HarnessError::CannotOpenKeyLog(path.into(), error))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            lines: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines.load(Ordering::Acquire)
    }

    pub fn flush(&self) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = file.flush() {
            error!("Failed to flush key log {}: {error}", self.path.display());
        }
    }

    fn format_line(label: &str, client_random: &[u8], secret: &[u8]) -> String {
        format!("{label} {} {}\n", hex::encode(client_random), hex::encode(secret))
    }
}

impl KeyLog for KeyLogSink {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        let line = Self::format_line(label, client_random, secret);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        match file.write_all(line.as_bytes()) {
            Ok(()) => {
                self.lines.fetch_add(1, Ordering::AcqRel);
            }
            Err(error) => error!("Failed to write key log {}: {error}", self.path.display()),
        }
    }
}
