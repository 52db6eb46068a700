//! Feed-address, date and text helpers shared by the registry, parser and query view

/// URL utilities for feed addresses
pub mod url {
    use url::Url;

    const FALLBACK_NAME: &str = "RSS Feed";

    /// Extract host name from URL
    pub fn host_name(url_str: &str) -> Option<String> {
        Url::parse(url_str)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.to_string()))
    }

    /// Short name shown next to a configured feed, e.g. `bbc.co.uk`
    pub fn display_name(url_str: &str) -> String {
        match host_name(url_str) {
            Some(host) => host.strip_prefix("www.").unwrap_or(&host).to_string(),
            None => FALLBACK_NAME.to_string(),
        }
    }

    /// Label used for articles when the feed carries no title of its own
    pub fn fallback_label(url_str: &str) -> String {
        host_name(url_str).unwrap_or_else(|| FALLBACK_NAME.to_string())
    }

    /// Validate feed URL format
    pub fn is_valid_rss_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => (url.scheme() == "http" || url.scheme() == "https") && url.host_str().is_some(),
            Err(_) => false,
        }
    }
}

/// Date rendering for article timestamps
pub mod time {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

    pub const DEFAULT_DISPLAY_FORMAT: &str = "%Y-%m-%d";

    /// Parse the timestamp shapes feeds and converters commonly emit
    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Some(dt.and_utc());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// Render a raw timestamp in UTC, or return it verbatim when unparsable
    pub fn format_date(raw: &str, format: &str) -> String {
        match parse_timestamp(raw) {
            Some(dt) => dt.format(format).to_string(),
            None => raw.to_string(),
        }
    }
}

/// Feed content utilities
pub mod feed {
    use html2text::render::text_renderer::TrivialDecorator;

    const WRAP_WIDTH: usize = 4096;

    /// Extract clean text content from HTML, as a single line
    pub fn extract_text_from_html(html: &str) -> String {
        if !html.contains(['<', '&']) {
            return collapse_whitespace(html);
        }

        let text = html2text::from_read_with_decorator(html.as_bytes(), WRAP_WIDTH, TrivialDecorator::new());
        collapse_whitespace(&text)
    }

    /// Plain-text preview of at most `max_chars` characters, with an ellipsis
    /// when cut short. `None` when the markup holds no text.
    pub fn snippet(html: &str, max_chars: usize) -> Option<String> {
        let text = extract_text_from_html(html);
        if text.is_empty() {
            return None;
        }

        match text.char_indices().nth(max_chars) {
            Some((cut, _)) => Some(format!("{}\u{2026}", text[..cut].trim_end())),
            None => Some(text),
        }
    }

    fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
