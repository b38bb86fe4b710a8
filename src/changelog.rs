//! Per-resource audit trail.
//!
//! Providers record what they did (or would do) through a scoped
//! [`ResourceChange`] recorder. The scope flushes to the change log
//! exactly once, on every exit path, when it is dropped, including
//! while a provider failure is propagating. Output is either a bordered
//! plain-text block or an HTML fragment; the format is fixed once per
//! process and never mixed within a run.

use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

/// Output format for the audit trail, fixed once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Bordered plain-text blocks.
    #[default]
    Text,
    /// HTML fragments.
    Html,
}

/// Message severity within a resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Notice,
}

/// Full border width for text blocks.
const BORDER_WIDTH: usize = 79;

struct Inner {
    format: LogFormat,
    writer: Box<dyn Write + Send>,
}

/// The audit change log. Cheap to clone; all clones share one sink.
#[derive(Clone)]
pub struct ChangeLog {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for ChangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeLog").finish_non_exhaustive()
    }
}

impl ChangeLog {
    /// Creates a change log writing to standard output.
    #[must_use]
    pub fn new(format: LogFormat) -> Self {
        Self::with_writer(format, Box::new(std::io::stdout()))
    }

    /// Creates a change log writing to the given sink.
    #[must_use]
    pub fn with_writer(format: LogFormat, writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { format, writer })),
        }
    }

    /// Opens a recording scope for one resource's apply call.
    #[must_use]
    pub fn resource(&self, id: impl Into<String>) -> ResourceChange {
        ResourceChange {
            log: self.clone(),
            id: id.into(),
            messages: Vec::new(),
            flushed: false,
        }
    }

    fn write_line(&self, line: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            let _ = writeln!(inner.writer, "{line}");
        }
    }

    fn format(&self) -> LogFormat {
        self.inner.lock().map_or(LogFormat::Text, |i| i.format)
    }
}

/// Scoped recorder for one provider apply call.
///
/// Accumulates leveled messages and flushes them unconditionally when
/// dropped, whether the provider returned normally or its error is
/// unwinding through the engine.
pub struct ResourceChange {
    log: ChangeLog,
    id: String,
    messages: Vec<(Level, String)>,
    flushed: bool,
}

impl ResourceChange {
    /// Records an informational message.
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "audit", resource = %self.id, "{message}");
        self.messages.push((Level::Info, message));
    }

    /// Records a notice: something changed or needs operator attention.
    pub fn notice(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "audit", resource = %self.id, "{message}");
        self.messages.push((Level::Notice, message));
    }

    /// Returns the resource identity this scope records for.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.id
    }

    /// Returns true if no messages have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;

        if self.messages.is_empty() {
            return;
        }

        match self.log.format() {
            LogFormat::Text => self.flush_text(),
            LogFormat::Html => self.flush_html(),
        }
    }

    fn flush_text(&self) {
        // Header dashes centre the identity; long identities get a stub
        // border rather than overflowing the block width.
        let id_len = self.id.len();
        let dashes = if id_len < BORDER_WIDTH {
            ((BORDER_WIDTH - 2).saturating_sub(id_len) / 2).max(1)
        } else {
            4
        };
        let rule = "-".repeat(dashes);

        self.log.write_line(&format!("/{rule} {} {rule}", self.id));
        for (level, message) in &self.messages {
            match level {
                Level::Info => self.log.write_line(&format!("| {message}")),
                Level::Notice => self.log.write_line(&format!("|====> {message}")),
            }
        }
        self.log.write_line(&format!("\\{}", "-".repeat(BORDER_WIDTH)));
        self.log.write_line("");
    }

    fn flush_html(&self) {
        self.log.write_line(&format!("<h2>{}</h2>", self.id));
        self.log.write_line("<ol>");
        for (level, message) in &self.messages {
            match level {
                Level::Info => self.log.write_line(&format!("<li>{message}</li>")),
                Level::Notice => self.log.write_line(&format!("<li><b>{message}</b></li>")),
            }
        }
        self.log.write_line("</ol>");
    }
}

impl Drop for ResourceChange {
    fn drop(&mut self) {
        self.flush();
    }
}
