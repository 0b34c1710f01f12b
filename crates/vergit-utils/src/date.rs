use bstr::{BStr, BString, ByteSlice};
use chrono::{DateTime, FixedOffset};

use crate::error::UtilError;
use crate::Result;

/// A git timestamp: seconds since the epoch plus the author's UTC offset.
///
/// The offset is kept in minutes. It never affects ordering — the instant
/// is absolute — but display must reproduce the zone the commit was made
/// in, so it is carried alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitDate {
    /// Seconds since Unix epoch.
    pub timestamp: i64,
    /// UTC offset in minutes (e.g. -360 for -0600).
    pub tz_offset: i32,
}

/// Supported date output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// ISO 8601 like: "2025-01-15 12:00:00 +0000"
    Iso,
    /// Short: "2025-01-15"
    Short,
    /// Raw: "1736942400 +0000"
    Raw,
    /// C git default: "Thu Feb 13 23:31:30 2009 +0000" in the stored zone
    Default,
}

/// Parse a `±HHMM` zone field (also tolerates a bare decimal like `0`).
fn zone_minutes(field: &str) -> Result<i32> {
    let (sign, digits) = match field.as_bytes().first() {
        Some(b'-') => (-1, &field[1..]),
        Some(b'+') => (1, &field[1..]),
        _ => (1, field),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UtilError::DateParse(format!("invalid timezone: '{field}'")));
    }
    let hhmm: i32 = digits
        .parse()
        .map_err(|_| UtilError::DateParse(format!("invalid timezone: '{field}'")))?;
    Ok(sign * (hhmm / 100 * 60 + hhmm % 100))
}

/// Render an offset in minutes back to git's `±HHMM` form.
fn zone_string(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let abs = minutes.unsigned_abs();
    format!("{sign}{:02}{:02}", abs / 60, abs % 60)
}

impl GitDate {
    /// Create a GitDate from a Unix timestamp and a UTC offset in minutes.
    pub fn new(timestamp: i64, tz_offset_minutes: i32) -> Self {
        Self {
            timestamp,
            tz_offset: tz_offset_minutes,
        }
    }

    /// Parse git's raw format: `<seconds> ±HHMM`, the zone optional.
    pub fn parse_raw(input: &str) -> Result<Self> {
        let mut fields = input.split_ascii_whitespace();

        let seconds = fields
            .next()
            .ok_or_else(|| UtilError::DateParse("empty date".into()))?;
        let timestamp: i64 = seconds
            .parse()
            .map_err(|_| UtilError::DateParse(format!("invalid timestamp: '{seconds}'")))?;

        let tz_offset = match fields.next() {
            Some(zone) => zone_minutes(zone)?,
            None => 0,
        };

        Ok(Self {
            timestamp,
            tz_offset,
        })
    }

    /// Format in the given style.
    pub fn format(&self, style: DateFormat) -> String {
        if let DateFormat::Raw = style {
            return format!("{} {}", self.timestamp, zone_string(self.tz_offset));
        }

        let shown = match self.to_datetime() {
            Some(dt) => dt,
            None => DateTime::UNIX_EPOCH.fixed_offset(),
        };
        match style {
            DateFormat::Iso => shown.format("%Y-%m-%d %H:%M:%S %z").to_string(),
            DateFormat::Short => shown.format("%Y-%m-%d").to_string(),
            DateFormat::Default => shown.format("%a %b %e %H:%M:%S %Y %z").to_string(),
            DateFormat::Raw => unreachable!(),
        }
    }

    /// The instant in the author's own zone.
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let zone = FixedOffset::east_opt(self.tz_offset * 60)?;
        DateTime::from_timestamp(self.timestamp, 0).map(|utc| utc.with_timezone(&zone))
    }
}

/// Author identity with timestamp, as found in commit and tag headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub date: GitDate,
}

impl Signature {
    /// Parse `Name <email> seconds ±HHMM`.
    ///
    /// The email delimiters anchor the split: the name is whatever sits
    /// before the first `<`, the date whatever follows the matching `>`.
    pub fn parse(input: &BStr) -> Result<Self> {
        let raw = input.as_bytes();

        let open = raw
            .find_byte(b'<')
            .ok_or_else(|| UtilError::DateParse("signature has no '<' delimiter".into()))?;
        let close = raw[open..]
            .find_byte(b'>')
            .map(|at| at + open)
            .ok_or_else(|| UtilError::DateParse("signature has no '>' delimiter".into()))?;

        let name = raw[..open].trim();
        let email = &raw[open + 1..close];

        let when = raw[close + 1..].trim();
        let when = std::str::from_utf8(when)
            .map_err(|_| UtilError::DateParse("non-UTF-8 date in signature".into()))?;
        let date = GitDate::parse_raw(when)?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            date,
        })
    }

    /// Render in git's canonical header form.
    pub fn to_bytes(&self) -> BString {
        let mut out = Vec::with_capacity(self.name.len() + self.email.len() + 24);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(self.date.format(DateFormat::Raw).as_bytes());
        BString::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_with_and_without_zone() {
        let d = GitDate::parse_raw("1234567890 +0000").unwrap();
        assert_eq!((d.timestamp, d.tz_offset), (1234567890, 0));

        let d = GitDate::parse_raw("1234567890").unwrap();
        assert_eq!((d.timestamp, d.tz_offset), (1234567890, 0));
    }

    #[test]
    fn zone_field_converts_to_minutes() {
        assert_eq!(GitDate::parse_raw("0 -0500").unwrap().tz_offset, -300);
        assert_eq!(GitDate::parse_raw("0 +0530").unwrap().tz_offset, 330);
        assert_eq!(GitDate::parse_raw("0 -0600").unwrap().tz_offset, -360);
        assert_eq!(GitDate::parse_raw("0 +0000").unwrap().tz_offset, 0);
    }

    #[test]
    fn negative_timestamps_parse() {
        // Pre-epoch dates exist in imported histories.
        let d = GitDate::parse_raw("-86400 +0000").unwrap();
        assert_eq!(d.timestamp, -86400);
    }

    #[test]
    fn garbage_rejected() {
        assert!(GitDate::parse_raw("").is_err());
        assert!(GitDate::parse_raw("not-a-date").is_err());
        assert!(GitDate::parse_raw("123 xyz").is_err());
        assert!(GitDate::parse_raw("123 +ab00").is_err());
    }

    #[test]
    fn raw_format_reproduces_the_zone() {
        assert_eq!(
            GitDate::new(1234567890, 0).format(DateFormat::Raw),
            "1234567890 +0000"
        );
        assert_eq!(
            GitDate::new(1234567890, -300).format(DateFormat::Raw),
            "1234567890 -0500"
        );
        assert_eq!(
            GitDate::new(1234567890, 330).format(DateFormat::Raw),
            "1234567890 +0530"
        );
    }

    #[test]
    fn iso_format_shows_local_wall_clock() {
        assert_eq!(
            GitDate::new(1736942400, 0).format(DateFormat::Iso),
            "2025-01-15 12:00:00 +0000"
        );
        // 2020-10-06 19:40:09 UTC is 13:40:09 six hours west.
        assert_eq!(
            GitDate::new(1602013209, -360).format(DateFormat::Iso),
            "2020-10-06 13:40:09 -0600"
        );
    }

    #[test]
    fn short_format() {
        assert_eq!(
            GitDate::new(1736942400, 0).format(DateFormat::Short),
            "2025-01-15"
        );
    }

    #[test]
    fn signature_parse_splits_on_email_delimiters() {
        let sig =
            Signature::parse(BStr::new(b"John Doe <john@example.com> 1234567890 +0000")).unwrap();
        assert_eq!(sig.name, BString::from("John Doe"));
        assert_eq!(sig.email, BString::from("john@example.com"));
        assert_eq!(sig.date.timestamp, 1234567890);
        assert_eq!(sig.date.tz_offset, 0);
    }

    #[test]
    fn signature_parse_tolerates_empty_parts() {
        let sig = Signature::parse(BStr::new(b"<> 7 +0000")).unwrap();
        assert!(sig.name.is_empty());
        assert!(sig.email.is_empty());
        assert_eq!(sig.date.timestamp, 7);
    }

    #[test]
    fn signature_missing_delimiters_rejected() {
        assert!(Signature::parse(BStr::new(b"John Doe 1234567890 +0000")).is_err());
        assert!(Signature::parse(BStr::new(b"John <john@example.com 1 +0000")).is_err());
    }

    #[test]
    fn signature_render_roundtrip() {
        let line = BStr::new(b"Jane Doe <jane@example.com> 1234567890 -0500");
        let sig = Signature::parse(line).unwrap();
        assert_eq!(sig.to_bytes().as_slice(), line.as_bytes());
    }
}
