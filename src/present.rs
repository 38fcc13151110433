// src/present.rs
//! Reference renderers: a plain-text table for terminals and the HTML ratings panel.

use std::fmt::Write as _;
use std::io::Write as _;

use crate::config::HighlightConfig;
use crate::merge::EnrichedRecord;
use crate::sink::{RenderSink, RenderSnapshot, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RatingBand {
    Plain,
    Good,
    Great,
    Excellent,
}

impl RatingBand {
    pub fn color(self) -> &'static str {
        match self {
            RatingBand::Plain => "",
            RatingBand::Good => "#e6ffe6",
            RatingBand::Great => "#ccffcc",
            RatingBand::Excellent => "#99ff99",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountBand {
    Low,
    Normal,
    High,
}

impl CountBand {
    pub fn color(self) -> &'static str {
        match self {
            CountBand::Low => "#ffcccc",
            CountBand::Normal => "",
            CountBand::High => "#ccffcc",
        }
    }
}

/// Highest band whose threshold `rating` reaches; thresholds beyond the third are ignored.
pub fn rating_band(rating: f32, hl: &HighlightConfig) -> RatingBand {
    const BANDS: [RatingBand; 3] = [RatingBand::Good, RatingBand::Great, RatingBand::Excellent];
    hl.rating_thresholds
        .iter()
        .zip(BANDS)
        .filter(|(t, _)| rating >= **t)
        .map(|(_, b)| b)
        .max()
        .unwrap_or(RatingBand::Plain)
}

pub fn count_band(count: u64, hl: &HighlightConfig) -> CountBand {
    if count < hl.low_review_count {
        CountBand::Low
    } else if count > hl.high_review_count {
        CountBand::High
    } else {
        CountBand::Normal
    }
}

pub fn status_line(snapshot: &RenderSnapshot) -> String {
    match snapshot.status {
        Status::Paused => "Processing paused".to_string(),
        Status::Loading => format!(
            "Processing... ({} of {} books processed)",
            snapshot.progress.done, snapshot.progress.total
        ),
        Status::Idle | Status::Done if snapshot.records.is_empty() => {
            "No books processed yet".to_string()
        }
        Status::Idle | Status::Done => "Processing finished!".to_string(),
    }
}

fn year_cell(r: &EnrichedRecord) -> String {
    r.year.map(|y| y.to_string()).unwrap_or_else(|| "-".into())
}

/// Fixed-width table, one row per record, with `*`/`**`/`***` marking rating bands.
pub fn render_text_table(snapshot: &RenderSnapshot, hl: &HighlightConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", status_line(snapshot));
    let _ = writeln!(
        out,
        "{:<54} {:>10} {:>12} {:>12} {:<16} {:>5} {:>8}",
        "Title", "Rating", "Rating Count", "Review Count", "Category", "Year", "Price"
    );
    for r in &snapshot.records {
        let stars = match rating_band(r.rating, hl) {
            RatingBand::Plain => "",
            RatingBand::Good => "*",
            RatingBand::Great => "**",
            RatingBand::Excellent => "***",
        };
        let count_mark = match count_band(r.rating_count, hl) {
            CountBand::Low => "!",
            CountBand::Normal | CountBand::High => "",
        };
        let _ = writeln!(
            out,
            "{:<54} {:>10} {:>12} {:>12} {:<16} {:>5} {:>8}",
            r.title,
            format!("{:.2}{stars}", r.rating),
            format!("{}{count_mark}", r.rating_count),
            r.review_count,
            r.category,
            year_cell(r),
            r.price
        );
    }
    out
}

/// The floating ratings panel as an HTML fragment. All text is escaped.
pub fn render_html_panel(snapshot: &RenderSnapshot, hl: &HighlightConfig) -> String {
    use html_escape::{encode_double_quoted_attribute, encode_text};

    let mut out = String::new();
    out.push_str(r#"<div id="goodreads-ratings"><h3>Goodreads Ratings</h3>"#);
    let _ = write!(out, "<p>{}</p>", encode_text(&status_line(snapshot)));
    out.push_str(r#"<table style="border-collapse: collapse; width: 100%"><thead><tr>"#);
    for h in [
        "Title",
        "Rating",
        "Rating Count",
        "Review Count",
        "Category",
        "Year",
        "Price",
    ] {
        let _ = write!(out, "<th>{h}</th>");
    }
    out.push_str("</tr></thead><tbody>");
    for r in &snapshot.records {
        let _ = write!(
            out,
            r#"<tr><td><a href="{}" target="_blank" title="{}">{}</a></td>"#,
            encode_double_quoted_attribute(&r.external_url),
            encode_double_quoted_attribute(&r.full_title),
            encode_text(&r.title)
        );
        let _ = write!(
            out,
            r#"<td style="background-color: {}">{:.2} stars</td>"#,
            rating_band(r.rating, hl).color(),
            r.rating
        );
        let _ = write!(
            out,
            r#"<td style="background-color: {}">{}</td><td>{}</td>"#,
            count_band(r.rating_count, hl).color(),
            r.rating_count,
            r.review_count
        );
        let _ = write!(
            out,
            "<td>{}</td><td>{}</td><td>{}</td></tr>",
            encode_text(&r.category),
            year_cell(r),
            encode_text(&r.price)
        );
    }
    out.push_str("</tbody></table></div>");
    out
}

/// Prints the text table to stdout on every frame.
#[derive(Debug, Clone, Default)]
pub struct TerminalSink {
    highlights: HighlightConfig,
}

impl TerminalSink {
    pub fn new(highlights: HighlightConfig) -> Self {
        Self { highlights }
    }
}

impl RenderSink for TerminalSink {
    fn render(&self, snapshot: &RenderSnapshot) {
        let table = render_text_table(snapshot, &self.highlights);
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{table}") {
            tracing::warn!(target: "enrich", error = %e, "terminal render failed");
        }
    }
}
