//! `<OS>-<Browser>` labels recorded on each paste, from the `User-Agent`
//! header.

use axum::http::{HeaderMap, header};

/// First match wins, so more specific tokens come first.
const OPERATING_SYSTEMS: &[(&str, &str)] = &[
    ("Windows", "Windows"),
    ("Android", "Android"),
    ("iPhone", "iOS"),
    ("iPad", "iOS"),
    ("iPod", "iOS"),
    ("CrOS", "ChromeOS"),
    ("Macintosh", "macOS"),
    ("Mac OS X", "macOS"),
    ("Linux", "Linux"),
];

/// Chromium derivatives also advertise `Chrome/` and `Safari/`, and Chrome
/// advertises `Safari/`, so those are checked last.
const BROWSERS: &[(&str, &str)] = &[
    ("Edg/", "Edge"),
    ("EdgA/", "Edge"),
    ("EdgiOS/", "Edge"),
    ("OPR/", "Opera"),
    ("Opera", "Opera"),
    ("Firefox/", "Firefox"),
    ("FxiOS/", "Firefox"),
    ("CriOS/", "Chrome"),
    ("Chrome/", "Chrome"),
    ("Safari/", "Safari"),
    ("curl/", "curl"),
];

fn lookup(user_agent: &str, table: &[(&str, &'static str)]) -> &'static str {
    table
        .iter()
        .find(|(token, _)| user_agent.contains(token))
        .map_or("", |(_, label)| *label)
}

/// Label for a raw `User-Agent` value. Unrecognized halves are left empty.
pub fn parse_user_agent(user_agent: &str) -> String {
    format!(
        "{}-{}",
        lookup(user_agent, OPERATING_SYSTEMS),
        lookup(user_agent, BROWSERS)
    )
}

/// Label for a request. Empty when there is no readable `User-Agent`.
pub fn device_label(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(parse_user_agent)
        .unwrap_or_default()
}
