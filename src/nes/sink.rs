//! Collaborators the core calls out to: a frame consumer and an error recorder.

use std::{
    cell::RefCell,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    rc::Rc,
    time::{SystemTime, UNIX_EPOCH},
};

/// Receives one finished RGBA frame (256x240x4 bytes) at the start of post-render.
pub trait FrameSink {
    fn present_frame(&mut self, rgba: &[u8]);
}

/// Records human-readable failure messages.
pub trait ErrorSink {
    fn record(&mut self, message: &str);
}

/// Appends `[<unix seconds>] message` lines to a text file.
pub struct FileErrorLog {
    path: PathBuf,
}

impl FileErrorLog {
    pub const DEFAULT_PATH: &'static str = "error.txt";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileErrorLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATH)
    }
}

impl ErrorSink for FileErrorLog {
    fn record(&mut self, message: &str) {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "[{stamp}] {message}"));
        if let Err(err) = result {
            log::warn!("could not append to {}: {err}", self.path.display());
        }
    }
}

/// Keeps recorded messages in memory, oldest first. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryErrorLog {
    messages: Rc<RefCell<Vec<String>>>,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl ErrorSink for MemoryErrorLog {
    fn record(&mut self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}
