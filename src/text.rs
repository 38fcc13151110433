// src/text.rs
//! Small text helpers shared by the page extractor and the remote parser.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Upper bound for any single extracted field.
const MAX_FIELD_CHARS: usize = 1500;

/// Normalize scraped text: decode entities, fold nbsp/whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Normalize “ ” ‘ ’ to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 3) Collapse whitespace (\s covers nbsp in Unicode mode)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap
    if out.chars().count() > MAX_FIELD_CHARS {
        out = out.chars().take(MAX_FIELD_CHARS).collect();
    }

    out
}

/// Leading count of a label like `"12,345 ratings"`. Unparsable input yields 0.
pub fn parse_count(s: &str) -> u64 {
    static RE_COUNT: OnceCell<Regex> = OnceCell::new();
    let re = RE_COUNT.get_or_init(|| Regex::new(r"^\s*([\d,]+)").expect("count regex"));
    re.captures(s)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace(',', ""))
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

/// First plausible publication year (1000..=2099) mentioned in `s`.
pub fn first_year(s: &str) -> Option<i32> {
    static RE_YEAR: OnceCell<Regex> = OnceCell::new();
    let re = RE_YEAR.get_or_init(|| Regex::new(r"\b(1\d{3}|20\d{2})\b").expect("year regex"));
    re.captures(s)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First currency amount in `s`, e.g. `"$2.99"` out of `"Kindle Price: $2.99 (Save 70%)"`.
pub fn find_price(s: &str) -> Option<String> {
    static RE_PRICE: OnceCell<Regex> = OnceCell::new();
    let re = RE_PRICE.get_or_init(|| {
        Regex::new(r"[$€£]\s?\d[\d,]*(?:\.\d{1,2})?").expect("price regex")
    });
    re.find(s).map(|m| m.as_str().replace(' ', ""))
}

/// Cut `s` to `max_chars` characters plus `...`; returns the display form and whether it was cut.
pub fn truncate_title(s: &str, max_chars: usize) -> (String, bool) {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars).collect();
        (format!("{head}..."), true)
    } else {
        (s.to_string(), false)
    }
}
