//! Detail page parser.
//!
//! The detail page lists every record for one plate. Fields are not grouped
//! per record in the markup, so each kind is collected in document order and
//! the lists are zipped by position.

use platecheck_core::error::AppError;
use platecheck_core::models::{PlateRecord, Provenance, Sighting, normalize_plate};
use platecheck_core::traits::PageParser;
use scraper::{ElementRef, Html, Selector};

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css)
        .map_err(|e| AppError::MalformedResponse(format!("invalid selector '{css}': {e}")))
}

/// Visible text with each text node trimmed and joined by single spaces.
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_layout_table(element: &ElementRef<'_>) -> bool {
    element.value().name() == "table" && element.value().attr("cellpadding") == Some("0")
}

/// Time stamp and vehicle attached to one `created:`/`added:` line.
struct Stamp {
    time: String,
    vehicle: String,
}

fn stamp_for(font: ElementRef<'_>) -> Stamp {
    // Only the font's own first text node: children carry "[update]" links.
    let direct = font
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|t| t.trim())
        .find(|t| !t.is_empty())
        .unwrap_or_default();
    let time = ["created:", "added:"]
        .iter()
        .find_map(|prefix| direct.strip_prefix(prefix))
        .map(|rest| rest.trim().to_string())
        .unwrap_or_default();

    let vehicle = font
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(is_layout_table)
        .and_then(|table| {
            table
                .prev_siblings()
                .filter_map(ElementRef::wrap)
                .find(is_layout_table)
        })
        .map(text_of)
        .unwrap_or_default();

    Stamp { time, vehicle }
}

/// Every sighting on a detail page, in page order.
pub fn parse_sightings(html: &str) -> Result<Vec<Sighting>, AppError> {
    let document = Html::parse_document(html);

    let dates: Vec<String> = document
        .select(&selector(r##"font[style*="font-size:18pt"][color="#555"]"##)?)
        .map(text_of)
        .collect();

    let locations: Vec<String> = document
        .select(&selector(r#"font[color="red"]"#)?)
        .map(text_of)
        .filter(|t| !t.is_empty() && t != "×")
        .collect();

    let descriptions: Vec<String> = document
        .select(&selector(r#"font[style*="font-size:14pt"]"#)?)
        .map(text_of)
        .filter(|t| {
            !t.is_empty() && !t.to_lowercase().contains("upcoming action") && t != "UNCONFIRMED"
        })
        .collect();

    let stamps: Vec<Stamp> = document
        .select(&selector(r#"font[style*="font-size:9pt"]"#)?)
        .filter(|font| {
            let text = text_of(*font);
            text.starts_with("created:") || text.starts_with("added:")
        })
        .map(stamp_for)
        .collect();

    let non_empty = |s: Option<&String>| s.filter(|s| !s.is_empty()).cloned();

    Ok(dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let stamp = stamps.get(i);
            Sighting {
                date,
                time: non_empty(stamp.map(|s| &s.time)),
                location: locations.get(i).cloned().unwrap_or_default(),
                vehicle: non_empty(stamp.map(|s| &s.vehicle)),
                description: non_empty(descriptions.get(i)),
            }
        })
        .collect())
}

/// [`PageParser`] for the detail page. A page with no dated record yields
/// a record with no sightings rather than an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetailPageParser;

impl PageParser for DetailPageParser {
    fn parse(&self, plate: &str, html: &str) -> Result<Vec<PlateRecord>, AppError> {
        let mut record = PlateRecord::new(normalize_plate(plate));
        for sighting in parse_sightings(html)? {
            record.sightings.push(sighting, Provenance::DetailPage);
        }
        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_PAGE: &str = r##"<html><body>
<div class="modal"><font color="red">×</font>
<font style="font-size:14pt;">Report an upcoming action</font></div>
<table cellpadding="0"><tr><td>
  <font style="font-size:18pt;" color="#555"><b>JAN 5 2026</b></font>
  <font color="red">Lake St &amp; Chicago Ave</font>
  <font style="font-size:14pt;">UNCONFIRMED</font>
  <font style="font-size:14pt;">Two agents in a grey SUV</font>
</td></tr></table>
<table cellpadding="0"><tr><td>GREY CHEVY TAHOE</td></tr></table>
<table cellpadding="0"><tr><td>
  <font style="font-size:9pt;">created: MON JAN 5 2026 10:00:00 CST
    <a href="#">2 records [update]</a></font>
</td></tr></table>
<table cellpadding="0"><tr><td>
  <font style="font-size:18pt;" color="#555"><b>JAN 9 2026</b></font>
  <font color="red">Bloomington</font>
  <font style="font-size:14pt;">Parked at the transit center</font>
</td></tr></table>
<table cellpadding="0"><tr><td>BLACK FORD EXPLORER</td></tr></table>
<table cellpadding="0"><tr><td>
  <font style="font-size:9pt;">added: FRI JAN 9 2026 08:30:00 CST</font>
</td></tr></table>
</body></html>"##;

    #[test]
    fn parses_every_record() {
        let sightings = parse_sightings(DETAIL_PAGE).unwrap();
        assert_eq!(sightings.len(), 2);

        assert_eq!(sightings[0].date, "JAN 5 2026");
        assert_eq!(sightings[0].location, "Lake St & Chicago Ave");
        assert_eq!(
            sightings[0].description.as_deref(),
            Some("Two agents in a grey SUV")
        );
        assert_eq!(
            sightings[0].time.as_deref(),
            Some("MON JAN 5 2026 10:00:00 CST")
        );
        assert_eq!(sightings[0].vehicle.as_deref(), Some("GREY CHEVY TAHOE"));

        assert_eq!(sightings[1].date, "JAN 9 2026");
        assert_eq!(sightings[1].location, "Bloomington");
        assert_eq!(
            sightings[1].time.as_deref(),
            Some("FRI JAN 9 2026 08:30:00 CST")
        );
        assert_eq!(sightings[1].vehicle.as_deref(), Some("BLACK FORD EXPLORER"));
    }

    #[test]
    fn vehicle_from_sibling_table() {
        let html = r##"
        <font style="font-size:18pt;" color="#555"><b>JAN 1 2026</b></font>
        <font color="red">SOMEWHERE</font>
        <font style="font-size:14pt;">A description</font>
        <table cellpadding="0"><tr><td>HONDA CIVIC</td></tr></table>
        <table cellpadding="0"><tr><td>
          <font style="font-size:9pt;">created: MON JAN 1 2026 12:00:00 PST</font>
        </td></tr></table>
        "##;
        let sightings = parse_sightings(html).unwrap();
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0].vehicle.as_deref(), Some("HONDA CIVIC"));
        assert_eq!(
            sightings[0].time.as_deref(),
            Some("MON JAN 1 2026 12:00:00 PST")
        );
    }

    #[test]
    fn missing_fields_stay_empty() {
        let html = r##"<font style="font-size:18pt;" color="#555">FEB 2 2026</font>"##;
        let sightings = parse_sightings(html).unwrap();
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0].location, "");
        assert!(sightings[0].time.is_none());
        assert!(sightings[0].vehicle.is_none());
        assert!(sightings[0].description.is_none());
    }

    #[test]
    fn record_keeps_page_order_and_repeated_reports() {
        let html = r##"
        <font style="font-size:18pt;" color="#555">JAN 9 2026</font><font color="red">A</font>
        <font style="font-size:18pt;" color="#555">JAN 10 2026</font><font color="red">B</font>
        <font style="font-size:18pt;" color="#555">JAN 10 2026</font><font color="red">B</font>
        "##;
        let records = DetailPageParser.parse("ABC1234", html).unwrap();
        let dates: Vec<&str> = records[0]
            .sightings
            .values()
            .map(|s| s.date.as_str())
            .collect();
        assert_eq!(dates, vec!["JAN 9 2026", "JAN 10 2026", "JAN 10 2026"]);
    }

    #[test]
    fn empty_page_has_no_sightings() {
        let records = DetailPageParser.parse("ABC1234", "").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].sightings.is_empty());
    }
}
