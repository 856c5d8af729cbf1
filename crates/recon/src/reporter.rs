//! Progress and diagnostic sink handed to every pipeline stage.

use log::Level;

pub trait Reporter {
    fn info(&mut self, message: &str);
    fn warn(&mut self, message: &str);
    fn debug(&mut self, _message: &str) {}
}

/// Forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn warn(&mut self, message: &str) {
        log::warn!("{message}");
    }

    fn debug(&mut self, message: &str) {
        log::debug!("{message}");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&mut self, _message: &str) {}
    fn warn(&mut self, _message: &str) {}
}

/// Keeps every message, in order.
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    pub entries: Vec<(Level, String)>,
}

impl MemoryReporter {
    pub fn messages(&self, level: Level) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.as_str())
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn info(&mut self, message: &str) {
        self.entries.push((Level::Info, message.to_string()));
    }

    fn warn(&mut self, message: &str) {
        self.entries.push((Level::Warn, message.to_string()));
    }

    fn debug(&mut self, message: &str) {
        self.entries.push((Level::Debug, message.to_string()));
    }
}
