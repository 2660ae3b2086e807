//! HTTP date parsing/formatting: the three formats `libhttp`'s `date.hpp`
//! tolerates (RFC 1123, RFC 850, ANSI C asctime), ported from `strptime`
//! format strings onto `chrono`'s equivalents. Every parsed date is
//! normalized to a unix timestamp so the rest of the crate (and the
//! proxy's cache) only ever compares plain `u64`s against
//! `flux::time::timestamp_secs()`.

use chrono::{NaiveDateTime, TimeZone, Utc};

pub const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
pub const RFC850_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S GMT";
pub const ANSI_C_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

const FORMATS: [&str; 3] = [RFC1123_FORMAT, RFC850_FORMAT, ANSI_C_FORMAT];

/// Parses an HTTP date header value, trying RFC 1123, then RFC 850, then
/// ANSI C asctime, in that order. Returns `None` if none match -- callers
/// decide what "unparseable" means for their header (see §4.F).
pub fn parse_http_date(value: &str) -> Option<u64> {
    FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(value, fmt)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).timestamp() as u64)
    })
}

/// Formats a unix timestamp canonically as RFC 1123 in UTC, the format
/// every typed date header is re-serialized as regardless of how it was
/// parsed.
pub fn format_rfc1123(timestamp: u64) -> String {
    Utc.timestamp_opt(timestamp as i64, 0)
        .single()
        .expect("unix timestamps in this crate's range are always valid")
        .format(RFC1123_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1123_round_trips() {
        let ts = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(format_rfc1123(ts), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn rfc850_parses() {
        let ts = parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").unwrap();
        assert_eq!(format_rfc1123(ts), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn ansi_c_parses() {
        let ts = parse_http_date("Sun Nov  6 08:49:37 1994").unwrap();
        assert_eq!(format_rfc1123(ts), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn garbage_does_not_parse() {
        assert_eq!(parse_http_date("not a date"), None);
    }
}
