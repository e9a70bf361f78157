//! Plain-text rendering of summaries and detail reports for chat front ends.

use std::fmt::Write;

use crate::lookup::{DetailReport, Summary};
use crate::models::{PlateRecord, SourceResult};

pub const EXPAND_HINT: &str = "React 👀 to this message for full descriptions.";

pub const HELP_TEXT: &str = "\
/plate [LICENSE PLATE] - Check a plate against the stopice.net and defrostmn.net databases
/details [ID] - Show full sighting details for a previous match
/help - Show this message
/quit - Leave the session";

/// One line per source, plus the expand hint when anything matched.
pub fn format_summary(summary: &Summary) -> String {
    let mut lines: Vec<String> = summary
        .sources
        .iter()
        .map(|s| match &s.result {
            SourceResult::Error(e) => format!("❌ {} — Error: {}", s.source, e.brief()),
            SourceResult::Match(record) => match brief_status(record) {
                Some(status) => format!("⚠️ {} — MATCH FOUND — {status}", s.source),
                None => format!("⚠️ {} — MATCH FOUND", s.source),
            },
            SourceResult::NoMatch => format!("✔️ {} — No match found.", s.source),
            SourceResult::Skipped => format!("➖ {} — Not checked (not configured).", s.source),
        })
        .collect();

    if summary.any_match() {
        lines.push(String::new());
        lines.push(EXPAND_HINT.to_string());
    }
    lines.join("\n")
}

/// Status values, tagged with their origins when sources disagree.
/// Falls back to the report count when no status was given.
fn brief_status(record: &PlateRecord) -> Option<String> {
    if !record.status.is_empty() {
        let conflicting = record.status.is_conflicting();
        let parts: Vec<String> = record
            .status
            .iter()
            .map(|a| {
                if conflicting {
                    format!("{} [{}]", a.value, a.origin_labels())
                } else {
                    a.value.clone()
                }
            })
            .collect();
        return Some(parts.join(" / "));
    }
    let total = record.report_count.values().max()?;
    Some(if *total == 1 {
        "1 report".to_string()
    } else {
        format!("{total} reports")
    })
}

pub fn format_detail(report: &DetailReport) -> String {
    let mut out = format!("Details for {}:", report.candidate);
    for outcome in &report.sources {
        let _ = write!(out, "\n\n--- {} ---", outcome.source);
        match &outcome.result {
            Err(e) => {
                let _ = write!(out, "\nError: {}", e.brief());
            }
            Ok(record) => write_record(&mut out, record),
        }
    }
    if report.retained {
        let _ = write!(out, "\n\nNo details could be fetched. Try again later.");
    }
    out
}

fn write_record(out: &mut String, record: &PlateRecord) {
    if record.sightings.is_empty() {
        out.push_str("\nNo sightings found on the detail page.");
    }
    let multi_origin = record.origins().len() > 1;
    for (i, sighting) in record.sightings.iter().enumerate() {
        let s = &sighting.value;
        let _ = write!(out, "\n\nSighting {}:", i + 1);
        let _ = write!(out, "\nDate: {}", s.time.as_deref().unwrap_or(&s.date));
        if !s.location.is_empty() {
            let _ = write!(out, "\nLocation: {}", s.location);
        }
        if let Some(vehicle) = s.vehicle.as_deref().filter(|v| !v.is_empty()) {
            let _ = write!(out, "\nVehicle: {vehicle}");
        }
        if let Some(description) = s.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(out, "\nDescription: {description}");
        }
        if multi_origin {
            let _ = write!(out, "\nReported in: {}", sighting.origin_labels());
        }
    }
    if let Some(detail) = &record.detail {
        let _ = write!(out, "\n\n{}", detail.url);
    }
}
