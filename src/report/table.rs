//! Plain terminal tables for scan, cycle and library output.

use std::fmt::Write;

use super::ScanView;
use crate::library::LibraryTarget;
use crate::pipeline::{CycleReport, TreeOutcome};
use crate::util::{format_bytes, truncate};

const PATH_WIDTH: usize = 60;

pub fn render_scan(view: &ScanView<'_>) -> String {
    let mut out = String::new();
    let stats = view.stats;

    let _ = writeln!(out, "\n{}", view.root.display());
    out.push_str(&"-".repeat(40));
    out.push('\n');
    let _ = writeln!(out, "  {:20} {:>12}", "media files", view.files);
    let _ = writeln!(out, "  {:20} {:>12}", "total size", format_bytes(view.total_bytes));
    let _ = writeln!(out, "  {:20} {:>12}", "directories", stats.directories);
    let _ = writeln!(out, "  {:20} {:>12}", "auxiliary skipped", stats.auxiliary);
    let _ = writeln!(out, "  {:20} {:>12}", "below size floor", stats.skipped_small);
    if stats.errors + stats.transient_errors + stats.permission_denied > 0 {
        let _ = writeln!(
            out,
            "  {:20} {:>12}",
            "errors",
            format!("{} ({} transient)", stats.errors, stats.transient_errors)
        );
    }
    let _ = writeln!(
        out,
        "  {:20} {:>12}",
        "workers",
        format!("{} ({}+/{}-)", stats.final_workers, stats.grows, stats.shrinks)
    );

    if view.first_scan {
        let _ = writeln!(out, "\nfirst scan, every file is new");
    } else if view.added.is_empty() && view.removed.is_empty() && view.modified.is_empty() {
        let _ = writeln!(out, "\nNo changes detected.");
    } else {
        out.push('\n');
        for path in &view.added {
            let _ = writeln!(out, "  [new]  {}", truncate(&path.to_string_lossy(), PATH_WIDTH));
        }
        for path in &view.modified {
            let _ = writeln!(out, "  [mod]  {}", truncate(&path.to_string_lossy(), PATH_WIDTH));
        }
        for path in &view.removed {
            let _ = writeln!(out, "  [gone] {}", truncate(&path.to_string_lossy(), PATH_WIDTH));
        }
        let sign = if view.net_change >= 0 { "+" } else { "-" };
        let _ = writeln!(out, "\nnet change: {sign}{}", format_bytes(view.net_change.unsigned_abs()));
    }

    let _ = writeln!(out, "\nscan completed in {:.2}s", stats.duration_ms as f64 / 1000.0);
    if let Some(peak) = stats.peak_memory_bytes {
        let _ = writeln!(out, "peak memory: {}", format_bytes(peak as u64));
    }
    out
}

pub fn render_cycle(report: &CycleReport) -> String {
    let mut out = String::new();
    for (root, outcome) in &report.trees {
        let status = match outcome {
            TreeOutcome::Dispatched { files } => format!("dispatched {files}"),
            TreeOutcome::Unchanged => "unchanged".to_string(),
            TreeOutcome::Skipped { reason } => format!("skipped: {reason}"),
            TreeOutcome::Failed { class, message } => format!("failed [{class}]: {message}"),
            TreeOutcome::TimedOut => "timed out".to_string(),
        };
        let _ = writeln!(out, "  {:40} {}", truncate(&root.to_string_lossy(), 40), status);
    }
    let _ = writeln!(
        out,
        "\n{} ok, {} unchanged, {} failed, {} skipped, {} timed out in {:.2}s",
        report.succeeded,
        report.unchanged,
        report.failed,
        report.skipped,
        report.timed_out,
        report.elapsed_ms as f64 / 1000.0
    );
    out
}

pub fn render_libraries(libraries: &[LibraryTarget]) -> String {
    if libraries.is_empty() {
        return String::from("No libraries found.\n");
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:<6} {:<24} {:<8} Locations", "ID", "Name", "Type");
    out.push_str(&"-".repeat(60));
    out.push('\n');
    for library in libraries {
        let locations: Vec<String> = library
            .root_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let _ = writeln!(
            out,
            "{:<6} {:<24} {:<8} {}",
            library.id,
            truncate(&library.name, 24),
            library.media_type.as_str(),
            locations.join(", ")
        );
    }
    out
}
