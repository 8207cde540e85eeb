//! Terminal output for human and JSON modes
//!
//! In human mode results and progress go to stdout with a status glyph,
//! while warnings and errors go to stderr. In JSON mode stdout carries only
//! the command result printed through [`Console::print_json`], so it can be
//! piped into `jq`. Status messages become one JSON object per line on
//! stderr, and informational lines are dropped.

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Success,
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Info => "info",
            Level::Warn => "warning",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Prints command results and status messages in the selected format
#[derive(Debug, Clone, Copy)]
pub struct Console {
    format: OutputFormat,
    /// Suppresses informational lines in human mode
    quiet: bool,
}

impl Console {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn success(&self, message: &str) {
        self.emit(Level::Success, message);
    }

    pub fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }

    /// Prints a command result; only JSON mode has one
    pub fn print_json(&self, value: &serde_json::Value) {
        if self.format != OutputFormat::Json {
            return;
        }
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{}", serde_json::json!({"level": "error", "message": e.to_string()})),
        }
    }

    fn emit(&self, level: Level, message: &str) {
        match self.render(level, message) {
            Some((Stream::Stdout, line)) => println!("{line}"),
            Some((Stream::Stderr, line)) => eprintln!("{line}"),
            None => {}
        }
    }

    fn render(&self, level: Level, message: &str) -> Option<(Stream, String)> {
        match self.format {
            OutputFormat::Human => match level {
                Level::Success => Some((Stream::Stdout, format!("\u{2713} {message}"))),
                Level::Info if self.quiet => None,
                Level::Info => Some((Stream::Stdout, format!("  {message}"))),
                Level::Warn => Some((Stream::Stderr, format!("\u{26a0} Warning: {message}"))),
                Level::Error => Some((Stream::Stderr, format!("\u{2717} Error: {message}"))),
            },
            OutputFormat::Json => match level {
                Level::Info => None,
                _ => Some((
                    Stream::Stderr,
                    serde_json::json!({"level": level.as_str(), "message": message}).to_string(),
                )),
            },
        }
    }
}

/// Truncates `text` to `width` characters, marking the cut with an ellipsis
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}\u{2026}")
}
