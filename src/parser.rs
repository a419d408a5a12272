use crate::{errors::ExpirationParseFailure, rules::Rule};
use chrono::{format::ParseErrorKind, DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::{debug, warn};

/// What a [`Rule`] could extract from one raw whois response.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub is_available: bool,
    pub expiration: Option<DateTime<Utc>>,
    /// Set when the expiration pattern matched but its capture could not be parsed.
    pub expiration_error: Option<ExpirationParseFailure>,
}

impl Extraction {
    fn available() -> Self {
        Self {
            is_available: true,
            expiration: None,
            expiration_error: None,
        }
    }

    fn registered(expiration: Option<DateTime<Utc>>) -> Self {
        Self {
            is_available: false,
            expiration,
            expiration_error: None,
        }
    }
}

/// Apply `rule` to a raw response.
///
/// Availability wins over anything else in the text. Failing that, the first capture
/// of the expiration pattern is parsed with the rule's format. A response that matches
/// neither pattern is treated as registered with an unknown expiration. Empty
/// availability matches do not count.
pub fn extract(raw: &str, rule: &Rule) -> Extraction {
    let available = rule
        .availability()
        .find_iter(raw)
        .any(|m| !m.as_str().is_empty());

    if available {
        debug!("Availability pattern matched for .{}", rule.tld());
        return Extraction::available();
    }

    let captured = rule
        .expiration()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty());

    let Some(captured) = captured else {
        debug!("No expiration found for .{}", rule.tld());
        return Extraction::registered(None);
    };

    match parse_timestamp(captured, rule.expiration_format()) {
        Ok(expiration) => Extraction::registered(Some(expiration)),
        Err(source) => {
            let failure = ExpirationParseFailure {
                captured: captured.to_string(),
                format: rule.expiration_format().to_string(),
                source,
            };
            warn!("Expiration for .{} left unknown: {}", rule.tld(), failure);
            Extraction {
                expiration_error: Some(failure),
                ..Extraction::registered(None)
            }
        }
    }
}

/// Parse `value` using a named format (`RFC3339`, `RFC2822`) or a chrono strftime pattern.
///
/// Strftime patterns are tried as an offset-aware timestamp, then as a naive
/// date-time in UTC, then as a bare date at midnight UTC.
pub fn parse_timestamp(value: &str, format: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let value = value.trim();

    if format.eq_ignore_ascii_case("rfc3339") {
        return DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc));
    }
    if format.eq_ignore_ascii_case("rfc2822") {
        return DateTime::parse_from_rfc2822(value).map(|dt| dt.with_timezone(&Utc));
    }

    // Each fallback needs fewer fields; any other error is the real one.
    match DateTime::parse_from_str(value, format) {
        Ok(dt) => return Ok(dt.with_timezone(&Utc)),
        Err(e) if e.kind() != ParseErrorKind::NotEnough => return Err(e),
        Err(_) => {}
    }

    match NaiveDateTime::parse_from_str(value, format) {
        Ok(naive_dt) => return Ok(DateTime::from_naive_utc_and_offset(naive_dt, Utc)),
        Err(e) if e.kind() != ParseErrorKind::NotEnough => return Err(e),
        Err(_) => {}
    }

    NaiveDate::parse_from_str(value, format).map(|naive_date| {
        DateTime::from_naive_utc_and_offset(naive_date.and_time(NaiveTime::default()), Utc)
    })
}
