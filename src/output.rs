use std::io::{self, Write};

use serde::Serialize;

use crate::app::RunSummary;
use crate::sheet::SheetExtractionResult;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_extraction(result: &SheetExtractionResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_files(files: &[String]) -> io::Result<()> {
        Self::print_json(&files)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

/// Writes progress lines to stderr for interactive runs.
pub struct ConsoleProgress;

impl crate::app::ProgressSink for ConsoleProgress {
    fn event(&self, event: crate::app::ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}
