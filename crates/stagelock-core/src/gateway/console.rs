//! Console gateway: one line per message on stdout

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::MessagingGateway;
use crate::domain::arbiter::notice::StatusView;
use crate::domain::arbiter::types::UserId;
use crate::error::Result;

/// Writes status, notices and direct messages as plain text lines
pub struct ConsoleGateway {
    out: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleGateway").finish_non_exhaustive()
    }
}

impl ConsoleGateway {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Lines printed for a status message
pub fn status_lines(status: &StatusView) -> Vec<String> {
    let mut lines: Vec<String> = status
        .text
        .lines()
        .filter(|l| !l.is_empty())
        .map(|l| format!("[{}] {}", status.resource, l))
        .collect();

    let actions: Vec<String> = status
        .affordances
        .iter()
        .map(|a| format!("{} ({})", a.action, a.label))
        .collect();
    lines.push(format!("[{}] actions: {}", status.resource, actions.join(", ")));
    lines
}

/// Lines printed for a direct message
pub fn direct_lines(user: &UserId, text: &str) -> Vec<String> {
    text.lines()
        .map(|l| format!("[dm @{}] {}", user, l.trim()))
        .collect()
}

#[async_trait]
impl MessagingGateway for ConsoleGateway {
    async fn post_status(&self, status: &StatusView) -> Result<()> {
        self.write_lines(&status_lines(status))
    }

    async fn post_notice(&self, resource: &str, text: &str) -> Result<()> {
        self.write_lines(&[format!("[{}] notice: {}", resource, text)])
    }

    async fn direct_message(&self, user: &UserId, text: &str) -> Result<()> {
        self.write_lines(&direct_lines(user, text))
    }

    fn name(&self) -> &'static str {
        "console"
    }
}
