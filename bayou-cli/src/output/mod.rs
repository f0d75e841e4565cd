//! Result rendering for the `bayou` binary.
//!
//! Commands build a serializable result and hand it to [`Output`], which
//! prints it as a table or as JSON. Tables wrap to the terminal width on a
//! TTY and are left whole when piped.

use std::io::IsTerminal;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Serialize;

mod json;
mod table;

pub use self::json::JsonOutput;
pub use self::table::TableOutput;

/// Width used when the terminal size cannot be read.
const FALLBACK_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Table width to wrap and truncate to; `None` prints cells in full.
    pub wrap: Option<usize>,
}

impl OutputConfig {
    pub fn detect(format: OutputFormat) -> Self {
        let wrap = std::io::stdout().is_terminal().then(|| {
            terminal_size::terminal_size()
                .map(|(w, _)| w.0 as usize)
                .unwrap_or(FALLBACK_WIDTH)
        });
        Self { format, wrap }
    }
}

/// A table column read from one key of each serialized row.
#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    pub key: String,
    pub max_width: Option<usize>,
    pub right: bool,
}

impl Column {
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            key: key.into(),
            max_width: None,
            right: false,
        }
    }

    pub fn truncated(mut self, width: usize) -> Self {
        self.max_width = Some(width);
        self
    }

    pub fn right_aligned(mut self) -> Self {
        self.right = true;
        self
    }
}

/// A command result that renders in either format.
pub trait Outputter: Serialize {
    fn to_table(&self, config: &OutputConfig) -> String;

    fn render(&self, config: &OutputConfig) -> String {
        match config.format {
            OutputFormat::Table => self.to_table(config),
            OutputFormat::Json => JsonOutput::format(self),
        }
    }
}

/// Results whose table does not depend on the terminal.
pub trait TableDisplay: Serialize {
    fn to_table(&self) -> String;
}

impl<T: TableDisplay> Outputter for T {
    fn to_table(&self, _config: &OutputConfig) -> String {
        TableDisplay::to_table(self)
    }
}

pub struct Output<T> {
    data: T,
    config: OutputConfig,
}

impl<T: Outputter> Output<T> {
    pub fn new(data: T, format: OutputFormat) -> Self {
        Self {
            data,
            config: OutputConfig::detect(format),
        }
    }

    pub fn render(&self) -> anyhow::Result<()> {
        println!("{}", self.data.render(&self.config));
        Ok(())
    }
}
