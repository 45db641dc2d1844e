pub mod json;
pub mod table;

use std::path::PathBuf;

use serde::Serialize;

use crate::scan::{ScanReport, ScanStats};
use crate::store::diff::DiffResult;

/// What `scan` shows: the tree, its diff against the stored snapshot and
/// the scanner's counters.
#[derive(Debug, Serialize)]
pub struct ScanView<'a> {
    pub root: &'a std::path::Path,
    pub files: usize,
    pub total_bytes: u64,
    pub first_scan: bool,
    pub added: Vec<&'a PathBuf>,
    pub removed: Vec<&'a PathBuf>,
    pub modified: Vec<&'a PathBuf>,
    pub net_change: i64,
    pub stats: &'a ScanStats,
    pub diagnostics: &'a [String],
}

impl<'a> ScanView<'a> {
    pub fn new(report: &'a ScanReport, diff: &'a DiffResult, first_scan: bool) -> Self {
        ScanView {
            root: &report.snapshot.root,
            files: report.snapshot.file_count,
            total_bytes: report.snapshot.total_bytes(),
            first_scan,
            added: diff.added.iter().collect(),
            removed: diff.removed.iter().collect(),
            modified: diff.modified.iter().collect(),
            net_change: diff.net_change,
            stats: &report.stats,
            diagnostics: &report.diagnostics,
        }
    }
}

pub fn print_scan(view: &ScanView<'_>, as_json: bool, verbose: bool) {
    if as_json {
        println!("{}", json::render(view));
        return;
    }
    print!("{}", table::render_scan(view));
    print_diagnostics(view.diagnostics, verbose);
}

fn print_diagnostics(diagnostics: &[String], verbose: bool) {
    if diagnostics.is_empty() {
        return;
    }
    println!();
    if verbose {
        println!("Diagnostics:");
        println!("{}", "-".repeat(40));
        for diagnostic in diagnostics {
            println!("  {diagnostic}");
        }
    } else {
        println!("[diagnostic] {} issues, rerun with --verbose to list them", diagnostics.len());
    }
}
