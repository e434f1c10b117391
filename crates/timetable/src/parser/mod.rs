//! Room timetable page parsing.
//!
//! The booking system publishes one HTML grid per room: one row per
//! weekday, one cell per slot. Two markups have been in use:
//! - legacy: the abbreviated day ("Mon") sits in the first cell of the row
//! - current: the full day name sits in a `th.day-header`, sometimes with a
//!   date after it ("Monday 20/10/2026")
//!
//! Only the row-day lookup differs between the two; cells are cleaned,
//! split and classified the same way.

mod blocks;
mod classify;
mod dates;

pub use blocks::split_blocks;
pub use classify::{
    classify, classify_with, is_module_line, is_time_range, session_keyword, split_module,
    CellFields, Rule, Slot, RULES,
};
pub use dates::{
    canonical_weekday, parse_canonical, resolve_next_occurrence, resolve_next_occurrence_from,
    CANONICAL_WEEKDAYS,
};

use crate::types::TimetableEntry;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

static DAY_HEADER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th.day-header").unwrap());
static SCHEDULE_TABLE_SELECTORS: LazyLock<[Selector; 3]> = LazyLock::new(|| {
    [
        Selector::parse("table.spreadsheet").unwrap(),
        Selector::parse("table.grid-border-args").unwrap(),
        Selector::parse("table").unwrap(),
    ]
});

/// Class tokens marking a slot that holds a booking.
const OCCUPIED_CLASSES: [&str; 3] = ["object-cell-border", "booked", "occupied"];

/// Which markup a timetable page uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Abbreviated day name in the first cell of each row
    Legacy,
    /// Full day name in a `th.day-header`, optional date suffix
    Current,
}

impl Layout {
    /// The current markup is recognised by its day header element.
    pub fn detect(document: &Html) -> Self {
        if document.select(&DAY_HEADER_SELECTOR).next().is_some() {
            Layout::Current
        } else {
            Layout::Legacy
        }
    }

    /// Canonical weekday of a row, or `None` for header/spacer rows.
    fn row_day(self, cells: &[ElementRef]) -> Option<&'static str> {
        match self {
            Layout::Legacy => {
                let text = element_text(cells.first()?);
                canonical_weekday(text.split_whitespace().next()?)
            }
            Layout::Current => {
                let header = cells.iter().find(|cell| is_day_header(cell))?;
                let text = element_text(header);
                let word = text.split_whitespace().next()?;
                CANONICAL_WEEKDAYS
                    .iter()
                    .copied()
                    .find(|day| day.eq_ignore_ascii_case(word))
            }
        }
    }

    /// Whether a cell can hold a booking at all (day labels cannot).
    fn is_slot(self, index: usize, cell: &ElementRef) -> bool {
        match self {
            Layout::Legacy => index > 0,
            Layout::Current => !is_day_header(cell),
        }
    }
}

/// Parses one room's timetable page into entries dated in the coming week.
pub fn parse_room_timetable(html: &str, room_name: &str) -> Vec<TimetableEntry> {
    parse_room_timetable_on(html, room_name, Local::now().date_naive())
}

/// Same as [`parse_room_timetable`], resolving weekdays relative to `today`.
pub fn parse_room_timetable_on(html: &str, room_name: &str, today: NaiveDate) -> Vec<TimetableEntry> {
    let document = Html::parse_document(html);
    let Some(table) = schedule_table(&document) else {
        debug!(room = %room_name, "No schedule table found");
        return Vec::new();
    };

    let layout = Layout::detect(&document);
    let mut entries = Vec::new();

    for (row_index, row) in direct_rows(table).into_iter().enumerate() {
        let cells = child_elements(row, &["td", "th"]);
        let Some(day) = layout.row_day(&cells) else {
            continue;
        };

        let date = match resolve_next_occurrence_from(day, today) {
            Ok(date) => date,
            Err(e) => {
                warn!(room = %room_name, row = row_index, error = %e, "Could not resolve row date");
                continue;
            }
        };

        for (col_index, cell) in cells.iter().enumerate() {
            if !layout.is_slot(col_index, cell) {
                continue;
            }
            let class_attr = cell.value().attr("class").unwrap_or_default();
            let clash = is_clash_cell(class_attr);
            if !clash && !is_occupied_cell(class_attr) {
                continue;
            }

            let text = cell_text(cell);
            for block in split_blocks(&text, clash) {
                if block.len() < 2 {
                    continue;
                }
                if let Some(entry) =
                    entry_from_block(&block, room_name, day, date, row_index, col_index)
                {
                    entries.push(entry);
                }
            }
        }
    }

    debug!(
        room = %room_name,
        layout = ?layout,
        entries = entries.len(),
        "Parsed room timetable"
    );
    entries
}

/// Builds an entry from one block, or logs why it cannot.
fn entry_from_block(
    block: &[String],
    room_name: &str,
    day: &str,
    date: NaiveDate,
    row: usize,
    col: usize,
) -> Option<TimetableEntry> {
    let fields = classify(block);
    let (Some(time_label), Some(module)) = (fields.time, fields.module) else {
        debug!(room = %room_name, row, col, block = ?block, "Block has no time or module, skipping");
        return None;
    };

    let Some((start_time, end_time)) = parse_time_range(&time_label) else {
        warn!(room = %room_name, row, col, time = %time_label, "Malformed time range, skipping block");
        return None;
    };

    let start = NaiveDateTime::new(date, start_time);
    let end = NaiveDateTime::new(date, end_time);
    if start >= end {
        warn!(room = %room_name, row, col, time = %time_label, "Time range does not move forward, skipping block");
        return None;
    }

    Some(TimetableEntry {
        room: room_name.to_string(),
        day: day.to_string(),
        start,
        end,
        time_label,
        module,
        lecturer: fields.lecturer,
        group: fields.group,
        session_type: fields.session_type,
        row,
        col,
    })
}

/// Splits `H:MM - H:MM` into two clock times.
pub fn parse_time_range(label: &str) -> Option<(NaiveTime, NaiveTime)> {
    let mut halves = label.split(['-', '–']);
    let start = parse_clock(halves.next()?)?;
    let end = parse_clock(halves.next()?)?;
    if halves.next().is_some() {
        return None;
    }
    Some((start, end))
}

fn parse_clock(text: &str) -> Option<NaiveTime> {
    let (hours, minutes) = text.trim().split_once(':')?;
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}

/// A clash cell has a class token containing "clash", in either layout
/// (`clash`, `object-cell-clash`, `cellClash` all count).
pub fn is_clash_cell(class_attr: &str) -> bool {
    class_attr
        .split_whitespace()
        .any(|token| token.to_ascii_lowercase().contains("clash"))
}

fn is_occupied_cell(class_attr: &str) -> bool {
    class_attr
        .split_whitespace()
        .any(|token| OCCUPIED_CLASSES.iter().any(|c| token.eq_ignore_ascii_case(c)))
}

fn is_day_header(cell: &ElementRef) -> bool {
    cell.value().name() == "th" && cell.value().classes().any(|c| c == "day-header")
}

fn schedule_table(document: &Html) -> Option<ElementRef<'_>> {
    SCHEDULE_TABLE_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next())
}

/// Rows of `table` itself, not of tables nested inside its cells.
fn direct_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in child_elements(table, &["tr", "thead", "tbody", "tfoot"]) {
        if child.value().name() == "tr" {
            rows.push(child);
        } else {
            rows.extend(child_elements(child, &["tr"]));
        }
    }
    rows
}

fn child_elements<'a>(parent: ElementRef<'a>, names: &[&str]) -> Vec<ElementRef<'a>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| names.contains(&el.value().name()))
        .collect()
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Elements that start and end their own line of cell text.
const LINE_BREAKING_ELEMENTS: [&str; 12] = [
    "br", "div", "p", "tr", "td", "th", "li", "ul", "ol", "table", "tbody", "thead",
];

/// Cell text with `<br>` and block boundaries turned into newlines, and each
/// line's whitespace collapsed.
fn cell_text(cell: &ElementRef) -> String {
    let mut raw = String::new();
    push_element_text(*cell, &mut raw);

    raw.replace('\u{a0}', " ")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_element_text(element: ElementRef<'_>, raw: &mut String) {
    for child in element.children() {
        match child.value() {
            // Source line breaks are plain whitespace in HTML
            Node::Text(text) => raw.push_str(&text.replace(['\n', '\r'], " ")),
            Node::Element(el) => {
                let Some(nested) = ElementRef::wrap(child) else {
                    continue;
                };
                let breaks_line = LINE_BREAKING_ELEMENTS.contains(&el.name());
                if breaks_line {
                    raw.push('\n');
                }
                push_element_text(nested, raw);
                if breaks_line {
                    raw.push('\n');
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Weekday};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        NaiveDateTime::new(date, NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    const CURRENT_PAGE: &str = r#"
        <html><body>
        <table class="spreadsheet">
          <tr><th class="col-label-one">Day</th><td>09:00</td><td>10:00</td><td>11:00</td></tr>
          <tr>
            <th class="day-header">Monday 19/10/2026</th>
            <td class="object-cell-border">09:00 - 10:00<br>CO2401 - Software Development<br>King, John<br>Practical (On Campus)</td>
            <td class="empty"></td>
            <td class="object-cell-border">not a booking</td>
          </tr>
          <tr>
            <th class="day-header">Wednesday</th>
            <td class="object-cell-border object-cell-clash">
              <b>Clash!</b><br>
              10:00 - 13:00<br>CO3519 - Artificial Intelligence<br>Lecture (On Campus)<br>
              10:00 - 13:00<br>CO3808 - Double Project<br>Dimitriadou, Athanasia<br>Project (Group: Final Year)
            </td>
          </tr>
          <tr><th class="day-header">Notes</th><td class="object-cell-border">09:00 - 10:00<br>XX1000 - Ghost</td></tr>
        </table>
        </body></html>"#;

    const LEGACY_PAGE: &str = r#"
        <table class="grid-border-args">
          <tbody>
            <tr><td class="col-label-one"></td><td class="col-label-one">9:00</td></tr>
            <tr>
              <td class="row-label-one">Tue</td>
              <td class="object-cell-border"><table><tr><td>9:00 - 11:00</td></tr><tr><td>MA1101: Calculus</td></tr><tr><td>SMITH, JANE</td></tr></table></td>
              <td class="object-cell-border">17:00 - 16:00<br>MA9999 - Backwards</td>
            </tr>
            <tr>
              <td class="row-label-one">Fri</td>
              <td class="clash">CLASH<br>14:00 - 15:00<br>BM2020 - Marketing<br>JSmith2<br>14:30 - 16:00<br>BM2021 - Finance</td>
            </tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_layout_detection() {
        assert_eq!(Layout::detect(&Html::parse_document(CURRENT_PAGE)), Layout::Current);
        assert_eq!(Layout::detect(&Html::parse_document(LEGACY_PAGE)), Layout::Legacy);
    }

    #[test]
    fn test_current_layout_plain_cell() {
        let entries = parse_room_timetable_on(CURRENT_PAGE, "BB101", monday());
        let first = &entries[0];

        assert_eq!(first.room, "BB101");
        assert_eq!(first.day, "Monday");
        assert_eq!(first.time_label, "09:00 - 10:00");
        assert_eq!(first.module, "CO2401 - Software Development");
        assert_eq!(first.lecturer.as_deref(), Some("King, John"));
        assert_eq!(first.group.as_deref(), Some("Practical (On Campus)"));
        assert_eq!(first.start, at(monday(), 9, 0));
        assert_eq!(first.end, at(monday(), 10, 0));
        assert_eq!((first.row, first.col), (1, 1));
    }

    #[test]
    fn test_current_layout_clash_cell() {
        let entries = parse_room_timetable_on(CURRENT_PAGE, "BB101", monday());
        // Monday booking + two clash bookings; the "Notes" row and the
        // single-line cell yield nothing
        assert_eq!(entries.len(), 3);

        let clash: Vec<_> = entries.iter().filter(|e| e.day == "Wednesday").collect();
        assert_eq!(clash.len(), 2);
        assert_eq!(clash[0].time_label, clash[1].time_label);
        assert_eq!(clash[0].start, at(NaiveDate::from_ymd_opt(2026, 10, 21).unwrap(), 10, 0));
        assert_ne!(clash[0].module, clash[1].module);
        assert_eq!(clash[0].lecturer, None);
        assert_eq!(clash[1].lecturer.as_deref(), Some("Dimitriadou, Athanasia"));
        assert_eq!(clash[1].session_type.as_deref(), Some("Project"));
    }

    #[test]
    fn test_legacy_layout() {
        let entries = parse_room_timetable_on(LEGACY_PAGE, "LE002", monday());
        let tuesday = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        let friday = NaiveDate::from_ymd_opt(2026, 10, 23).unwrap();

        // Backwards time range is skipped
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].day, "Tuesday");
        assert_eq!(entries[0].module, "MA1101: Calculus");
        assert_eq!(entries[0].lecturer.as_deref(), Some("SMITH, JANE"));
        assert_eq!(entries[0].start, at(tuesday, 9, 0));
        assert_eq!(entries[0].end, at(tuesday, 11, 0));

        assert_eq!(entries[1].start.weekday(), Weekday::Fri);
        assert_eq!(entries[1].lecturer.as_deref(), Some("JSmith2"));
        assert_eq!(entries[2].module, "BM2021 - Finance");
        assert_eq!(entries[2].end, at(friday, 16, 0));
    }

    #[test]
    fn test_page_without_table() {
        assert!(parse_room_timetable("<html><p>Room closed</p></html>", "X").is_empty());
    }

    #[test]
    fn test_clash_detection_rule() {
        assert!(is_clash_cell("clash"));
        assert!(is_clash_cell("object-cell-border object-cell-clash"));
        assert!(is_clash_cell("cellClash"));
        assert!(!is_clash_cell("object-cell-border"));
        assert!(!is_clash_cell(""));
    }

    #[test]
    fn test_parse_time_range() {
        let (start, end) = parse_time_range("9:05 – 10:30").unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(9, 5, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(10, 30, 0).unwrap());
        assert!(parse_time_range("25:00 - 26:00").is_none());
        assert!(parse_time_range("9:00").is_none());
    }

    #[test]
    fn test_cell_text_cleanup() {
        let html = "<table><tr><td id=\"c\">  Line&nbsp;one <br/>  <span>Line</span>   two<div>three</div></td></tr></table>";
        let document = Html::parse_document(html);
        let selector = Selector::parse("td#c").unwrap();
        let cell = document.select(&selector).next().unwrap();
        assert_eq!(cell_text(&cell), "Line one\nLine two\nthree");
    }

    #[test]
    fn test_text_after_closing_block_starts_new_line() {
        let page = r#"
            <table class="spreadsheet"><tr>
              <th class="day-header">Monday</th>
              <td class="object-cell-border"><p>09:00 - 10:00</p>CO2401 - Software Development<br>King, John</td>
            </tr></table>"#;
        let entries = parse_room_timetable_on(page, "BB101", monday());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].time_label, "09:00 - 10:00");
        assert_eq!(entries[0].module, "CO2401 - Software Development");
        assert_eq!(entries[0].lecturer.as_deref(), Some("King, John"));
    }

    #[test]
    fn test_nested_sibling_cells_are_separate_lines() {
        let page = r#"
            <table class="grid-border-args"><tr>
              <td class="row-label-one">Mon</td>
              <td class="object-cell-border"><table><tr><td>09:00 - 10:00</td><td>CO2401 - Software Development</td></tr></table></td>
            </tr></table>"#;
        let entries = parse_room_timetable_on(page, "LE002", monday());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start, at(monday(), 9, 0));
        assert_eq!(entries[0].module, "CO2401 - Software Development");
    }
}
