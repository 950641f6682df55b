//! Output formatting helpers for the `isync` CLI: JSON/table rendering and
//! the live progress line drawn from the Progress Bus.

use isync_engine::{ProgressEvent, ProgressStage};
use serde::Serialize;
use std::io::{self, Write};

use crate::styles;

/// Print a value as pretty-printed JSON to stdout.
///
/// Terminates the process with exit code 1 if serialization fails.
pub fn output_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            let _ = writeln!(handle, "{}", json);
        }
        Err(e) => {
            eprintln!("Error: failed to serialize JSON: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print a simple table with headers and rows, column widths computed from
/// the data for alignment.
pub fn output_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            let _ = write!(handle, "  ");
        }
        let _ = write!(handle, "{:<width$}", header, width = widths[i]);
    }
    let _ = writeln!(handle);

    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            let _ = write!(handle, "  ");
        }
        let _ = write!(handle, "{}", "-".repeat(*width));
    }
    let _ = writeln!(handle);

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                let _ = write!(handle, "  ");
            }
            if i < widths.len() {
                let _ = write!(handle, "{:<width$}", cell, width = widths[i]);
            } else {
                let _ = write!(handle, "{}", cell);
            }
        }
        let _ = writeln!(handle);
    }
}

fn stage_label(stage: ProgressStage) -> &'static str {
    match stage {
        ProgressStage::Fetching => "fetching",
        ProgressStage::Serializing => "serializing",
        ProgressStage::Committing => "committing",
        ProgressStage::Linking => "linking",
        ProgressStage::Done => "done",
        ProgressStage::Cancelled => "cancelled",
    }
}

/// Colors a fixed-width stage label: in-flight stages get the accent
/// color, terminal ones get pass/muted. Padded before coloring so the
/// embedded ANSI escapes don't throw off column alignment.
fn stage_colored(stage: ProgressStage) -> String {
    let padded = format!("{:<11}", stage_label(stage));
    match stage {
        ProgressStage::Done => styles::render_pass(&padded),
        ProgressStage::Cancelled => styles::render_muted(&padded),
        _ => styles::render_accent(&padded),
    }
}

/// Renders one Progress Bus event as a single overwritten stderr line.
///
/// Callers are expected to call this from the consumer thread reading
/// [`isync_engine::ProgressReceiver::iter`]; the carriage return keeps
/// successive events on one terminal line rather than scrolling.
pub fn render_progress_line(event: &ProgressEvent) {
    eprint!(
        "\r\x1b[K[{:>3}/{:<3}] {:>5.1}%  {} {}",
        event.processed_count,
        event.total,
        event.percentage,
        stage_colored(event.stage),
        event.identifier,
    );
    let _ = io::stderr().flush();
}

/// Clears the live progress line once the batch finishes.
pub fn clear_progress_line() {
    eprint!("\r\x1b[K");
    let _ = io::stderr().flush();
}
