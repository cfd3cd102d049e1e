//! Parser for the tracking portal's result markup.
//!
//! The portal renders history as a flat list of rows: header rows carrying
//! only a Jalali date label, interleaved with data rows of four cells (step
//! number, description, location, time). A header's date applies to every
//! data row after it until the next header, so a single forward pass with a
//! running current-date is enough.

use super::TrackingEvent;
use crate::date_utils::{self, parse_jalali_phrase};
use chrono::{Datelike, NaiveDate};
use scraper::{ElementRef, Html, Selector};

const DATA_ROW_CLASS: &str = "newrowdata";
const NOT_FOUND_PHRASE: &str = "یافت نشد";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("invalid selector")
}

fn cell_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// True when the response body carries the portal's "no record found" banner.
pub fn has_not_found_banner(html: &str) -> bool {
    let document = Html::parse_document(html);
    let alert_sel = selector(".alert-danger, .alert-warning");

    document
        .select(&alert_sel)
        .any(|el| cell_text(el).contains(NOT_FOUND_PHRASE))
}

/// Extract all tracking events from a result page, sorted ascending by step
/// number. Data rows whose date header cannot be parsed get `fallback_date`.
pub fn parse_tracking_html(html: &str, fallback_date: NaiveDate) -> Vec<TrackingEvent> {
    let document = Html::parse_document(html);
    let row_sel = selector(".row, .newrowdata");
    let header_sel = selector(".newtdheader");
    let cell_sel = selector(".newtddata");

    let fallback = date_utils::format_gregorian_date(
        fallback_date.year(),
        fallback_date.month() as i32,
        fallback_date.day() as i32,
    );

    let mut current_date: Option<String> = None;
    let mut events = Vec::new();

    for row in document.select(&row_sel) {
        if let Some(header) = row.select(&header_sel).next() {
            let raw = cell_text(header);
            current_date = Some(parse_jalali_phrase(&raw).unwrap_or_else(|| fallback.clone()));
            continue;
        }

        if !row.value().classes().any(|c| c == DATA_ROW_CLASS) {
            continue;
        }

        let cells: Vec<String> = row.select(&cell_sel).map(cell_text).collect();
        if cells.len() < 4 {
            continue;
        }

        let Ok(step_number) = cells[0].parse::<u32>() else {
            continue;
        };
        if step_number == 0 || cells[1].is_empty() || cells[3].is_empty() {
            continue;
        }

        events.push(TrackingEvent {
            step_number,
            event_date: current_date.clone().unwrap_or_else(|| fallback.clone()),
            event_time: cells[3].clone(),
            description: cells[1].clone(),
            location: cells[2].clone(),
        });
    }

    events.sort_by_key(|e| e.step_number);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()
    }

    const RESULT_PAGE: &str = r#"
        <html><body>
        <div class="row">
            <div class="newtdheader">پنجشنبه 26 تیر ماه 1404</div>
        </div>
        <div class="row newrowdata">
            <div class="newtddata">3</div>
            <div class="newtddata">تحویل مرسوله به گیرنده</div>
            <div class="newtddata">تهران</div>
            <div class="newtddata">14:22:10</div>
        </div>
        <div class="row newrowdata">
            <div class="newtddata">1</div>
            <div class="newtddata">قبول مرسوله</div>
            <div class="newtddata">اصفهان</div>
            <div class="newtddata">09:01:00</div>
        </div>
        <div class="row">
            <div class="newtdheader">جمعه 27 تیر ماه 1404</div>
        </div>
        <div class="row newrowdata">
            <div class="newtddata">2</div>
            <div class="newtddata">ارسال به مقصد</div>
            <div class="newtddata"></div>
            <div class="newtddata">18:45:33</div>
        </div>
        </body></html>
    "#;

    #[test]
    fn sorts_by_step_and_groups_under_nearest_header() {
        let events = parse_tracking_html(RESULT_PAGE, fallback());

        assert_eq!(events.len(), 3);
        assert_eq!(
            events.iter().map(|e| e.step_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        // Steps 1 and 3 sit under the first header, step 2 under the second.
        assert_eq!(events[0].event_date, "2025-07-17");
        assert_eq!(events[1].event_date, "2025-07-18");
        assert_eq!(events[2].event_date, "2025-07-17");
        assert_eq!(events[0].description, "قبول مرسوله");
        assert_eq!(events[1].location, "");
        assert_eq!(events[2].event_time, "14:22:10");
    }

    #[test]
    fn unparseable_header_falls_back_to_given_date() {
        let html = r#"
            <div class="row"><div class="newtdheader">تاریخ نامشخص</div></div>
            <div class="row newrowdata">
                <div class="newtddata">1</div>
                <div class="newtddata">قبول مرسوله</div>
                <div class="newtddata">مشهد</div>
                <div class="newtddata">08:00:00</div>
            </div>
        "#;

        let events = parse_tracking_html(html, fallback());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_date, "2025-08-01");
    }

    #[test]
    fn data_row_before_any_header_gets_fallback_date() {
        let html = r#"
            <div class="row newrowdata">
                <div class="newtddata">1</div>
                <div class="newtddata">قبول مرسوله</div>
                <div class="newtddata">مشهد</div>
                <div class="newtddata">08:00:00</div>
            </div>
        "#;

        let events = parse_tracking_html(html, fallback());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_date, "2025-08-01");
    }

    #[test]
    fn skips_incomplete_rows() {
        let html = r#"
            <div class="row"><div class="newtdheader">پنجشنبه 26 تیر ماه 1404</div></div>
            <div class="row newrowdata">
                <div class="newtddata">1</div>
                <div class="newtddata">قبول مرسوله</div>
            </div>
            <div class="row newrowdata">
                <div class="newtddata">2</div>
                <div class="newtddata"></div>
                <div class="newtddata">تهران</div>
                <div class="newtddata">10:00:00</div>
            </div>
            <div class="row newrowdata">
                <div class="newtddata">شماره</div>
                <div class="newtddata">قبول مرسوله</div>
                <div class="newtddata">تهران</div>
                <div class="newtddata">10:00:00</div>
            </div>
        "#;

        assert!(parse_tracking_html(html, fallback()).is_empty());
    }

    #[test]
    fn empty_document_yields_no_events() {
        assert!(parse_tracking_html("<html><body></body></html>", fallback()).is_empty());
    }

    #[test]
    fn detects_not_found_banner() {
        let html = r#"<div class="alert alert-warning">موردی با این مشخصات یافت نشد</div>"#;
        assert!(has_not_found_banner(html));
    }

    #[test]
    fn ignores_unrelated_alerts() {
        let html = r#"<div class="alert alert-warning">لطفا کد را وارد کنید</div>"#;
        assert!(!has_not_found_banner(html));
        assert!(!has_not_found_banner("<html><body></body></html>"));
    }
}
