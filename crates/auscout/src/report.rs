//! Rendering batch reports for the terminal or for other programs.

use std::io::{self, Write};

use serde::Serialize;

use crate::batch::{BatchReport, BatchSummary, FileReport};

/// One line per file (`path: outcome`), then the summary.
pub fn write_text<W: Write>(out: &mut W, report: &BatchReport) -> io::Result<()> {
    for FileReport { path, outcome } in &report.outcomes {
        writeln!(out, "{}: {}", path.display(), outcome)?;
    }
    writeln!(out, "{}", report.summary())?;
    if let Some(reason) = &report.aborted {
        writeln!(out, "aborted: {}", reason)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    command: &'static str,
    #[serde(flatten)]
    summary: BatchSummary,
    aborted: Option<&'a str>,
}

/// JSON lines: one object per file, then one summary object.
pub fn write_json_lines<W: Write>(out: &mut W, report: &BatchReport) -> io::Result<()> {
    for file in &report.outcomes {
        serde_json::to_writer(&mut *out, file)?;
        writeln!(out)?;
    }
    let summary = SummaryLine {
        command: report.command.as_str(),
        summary: report.summary(),
        aborted: report.aborted.as_deref(),
    };
    serde_json::to_writer(&mut *out, &summary)?;
    writeln!(out)
}
