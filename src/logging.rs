//! Process-wide log setup.
//!
//! Records go to stderr from the start. Once a run directory exists its
//! `logs/session.log` is attached and every later record is written to both.

use crate::error::{CaptureError, Result};
use chrono::Local;
use env_logger::{Builder, Env, Target};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

/// Handle to the file half of the log tee.
#[derive(Clone, Default)]
pub struct LogFile {
    file: Arc<Mutex<Option<File>>>,
}

impl LogFile {
    /// Append all further records to `path`.
    pub fn attach(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CaptureError::from_io(path, e))?;
        *self.file.lock() = Some(file);
        Ok(())
    }

    /// Flush and stop writing to the file.
    pub fn detach(&self) {
        if let Some(mut file) = self.file.lock().take() {
            let _ = file.flush();
        }
    }

    fn writer(&self) -> TeeWriter {
        TeeWriter {
            file: Arc::clone(&self.file),
        }
    }
}

/// stderr plus whatever file is attached.
struct TeeWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.lock().as_mut() {
            // A full disk must not take logging down with it
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.lock().as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Install the global logger (`RUST_LOG` overrides the `info` default).
///
/// Safe to call more than once; later calls return a detached handle.
pub fn init() -> LogFile {
    let log_file = LogFile::default();

    let result = Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} | {} | {} | {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(log_file.writer())))
        .try_init();

    if result.is_err() {
        log::debug!("Logger already initialized");
    }
    log_file
}
