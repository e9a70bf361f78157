//! Search results page parser.
//!
//! The results page is not well-formed HTML (unclosed fonts, rows outside
//! tables), so it is read with patterns over the raw markup instead of a DOM.
//! Each result block starts at a grey 9pt date font; the block holds the
//! location after a `mapmarker.png` image and the description in the last
//! plain 9pt font.

use std::sync::LazyLock;

use platecheck_core::error::AppError;
use platecheck_core::models::{PlateRecord, Provenance, Sighting, normalize_plate};
use platecheck_core::traits::PageParser;
use regex::Regex;

static RESULT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--RESULT:(\d+)-->").expect("valid regex"));

static BLOCK_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<font\s+style=["']?font-size:9pt;?["']?\s+color=["']?#c0c0c0["']?\s*>"#)
        .expect("valid regex")
});

static DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*([^<\n]+)").expect("valid regex"));

static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\s+src=["']?mapmarker\.png["']?[^>]*>\s*(.+?)(?:<|\n)"#)
        .expect("valid regex")
});

static PLAIN_FONT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<font\s+style=["']?font-size:9pt;?["']?\s*>\s*([^<\n]+)"#)
        .expect("valid regex")
});

static MORE_RECORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+more records").expect("valid regex"));

/// Match count announced by the page, or `None` when the marker is missing.
pub fn result_count(html: &str) -> Option<u32> {
    RESULT_MARKER
        .captures(html)
        .and_then(|c| c[1].parse().ok())
}

/// One sighting per result block, in page order.
pub fn parse_blocks(html: &str) -> Vec<Sighting> {
    BLOCK_START
        .split(html)
        .skip(1)
        .filter_map(|block| {
            let block = block.split("<!--RESULT:").next().unwrap_or_default();

            let date = DATE
                .captures(block)
                .map(|c| c[1].trim().to_string())
                .filter(|d| !d.is_empty())?;

            let location = LOCATION
                .captures(block)
                .map(|c| c[1].trim().to_string())
                .unwrap_or_default();

            let description = PLAIN_FONT
                .captures_iter(block)
                .map(|c| c[1].trim().to_string())
                .filter(|text| {
                    let lower = text.to_lowercase();
                    !text.is_empty()
                        && !lower.contains("more records")
                        && !lower.contains("mapmarker")
                        && *text != location
                })
                .last();

            Some(Sighting {
                date,
                time: None,
                location,
                vehicle: None,
                description,
            })
        })
        .collect()
}

/// Total reports: the shown blocks plus any "N more records" note.
pub fn record_count(html: &str, shown: usize) -> u32 {
    let shown = u32::try_from(shown).unwrap_or(u32::MAX);
    MORE_RECORDS
        .captures(html)
        .and_then(|c| c[1].parse::<u32>().ok())
        .map_or(shown, |more| more.saturating_add(shown))
}

/// [`PageParser`] for the search results page.
///
/// A zero match count yields no records. A missing marker, or a positive
/// count with no readable block, is a [`AppError::MalformedResponse`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SearchPageParser;

impl PageParser for SearchPageParser {
    fn parse(&self, plate: &str, html: &str) -> Result<Vec<PlateRecord>, AppError> {
        let count = result_count(html).ok_or_else(|| {
            AppError::MalformedResponse("search page has no result marker".into())
        })?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let sightings = parse_blocks(html);
        if sightings.is_empty() {
            return Err(AppError::MalformedResponse(format!(
                "search page reports {count} result(s) but no result block could be read"
            )));
        }

        let mut record = PlateRecord::new(normalize_plate(plate));
        record
            .report_count
            .insert(record_count(html, sightings.len()), Provenance::SearchPage);
        for sighting in sightings {
            record.sightings.push(sighting, Provenance::SearchPage);
        }
        Ok(vec![record])
    }
}
