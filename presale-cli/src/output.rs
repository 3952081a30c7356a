//! Operator-facing output
//!
//! Handlers never print directly. Every line goes through [`Output::emit`]
//! tagged with a [`Notice`], so the console can route warnings to stderr
//! while tests record each line together with its kind.

use crate::error::CliResult;

/// Kind of line a command reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Command results: tables, JSON documents, stage listings
    Plain,
    /// A write that took effect (seeding, purchase, early close)
    Success,
    Info,
    /// Something the operator should act on (extension, sold out)
    Warning,
    Error,
}

impl Notice {
    fn prefix(self) -> &'static str {
        match self {
            Notice::Plain => "",
            Notice::Success => "✅ ",
            Notice::Info => "ℹ️  ",
            Notice::Warning => "⚠️  ",
            Notice::Error => "❌ ",
        }
    }

    /// Line as the operator sees it
    pub fn render(self, msg: &str) -> String {
        format!("{}{}", self.prefix(), msg)
    }

    fn to_stderr(self) -> bool {
        matches!(self, Notice::Warning | Notice::Error)
    }
}

/// Sink for command output
pub trait Output: Send + Sync {
    fn emit(&self, notice: Notice, msg: &str) -> CliResult<()>;

    fn print(&self, msg: &str) -> CliResult<()> {
        self.emit(Notice::Plain, msg)
    }

    /// Pretty-printed JSON document (`--format json`)
    fn print_json(&self, data: &serde_json::Value) -> CliResult<()> {
        self.emit(Notice::Plain, &serde_json::to_string_pretty(data)?)
    }

    fn success(&self, msg: &str) -> CliResult<()> {
        self.emit(Notice::Success, msg)
    }

    fn info(&self, msg: &str) -> CliResult<()> {
        self.emit(Notice::Info, msg)
    }

    fn warning(&self, msg: &str) -> CliResult<()> {
        self.emit(Notice::Warning, msg)
    }

    fn error(&self, msg: &str) -> CliResult<()> {
        self.emit(Notice::Error, msg)
    }

    /// Underlined title above a stage table
    fn header(&self, title: &str) -> CliResult<()> {
        self.emit(
            Notice::Plain,
            &format!("\n{}\n{}", title, "=".repeat(title.chars().count())),
        )
    }
}

/// Terminal output; warnings and errors go to stderr so piped JSON stays clean
pub struct ConsoleOutput;

impl Output for ConsoleOutput {
    fn emit(&self, notice: Notice, msg: &str) -> CliResult<()> {
        if notice.to_stderr() {
            eprintln!("{}", notice.render(msg));
        } else {
            println!("{}", notice.render(msg));
        }
        Ok(())
    }
}
