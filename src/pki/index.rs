//! Parser for the CA tool's certificate database (`index.txt`).
//!
//! Each line is one issued certificate, tab separated:
//!
//! ```text
//! V	350101120000Z		01	unknown	/CN=server
//! R	350101120000Z	250301093000Z,keyCompromise	02	unknown	/CN=phone
//! ```
//!
//! The fields are status flag, expiry, revocation time (with an optional
//! reason), hex serial, file name and the slash-separated subject.

use std::str::FromStr;

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::error::{Result, VpnKitError};

/// Status flag of an index record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordStatus {
    Valid,
    Revoked,
    Expired,
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "V" => Ok(RecordStatus::Valid),
            "R" => Ok(RecordStatus::Revoked),
            "E" => Ok(RecordStatus::Expired),
            other => Err(format!("unknown status flag '{other}'")),
        }
    }
}

/// One record of the CA index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub status: RecordStatus,
    pub expires_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
    /// Revocation reason, when the CA tool recorded one.
    pub reason: Option<String>,
    /// Serial number in upper-case hex, as written by the CA tool.
    pub serial: String,
    /// Full subject, e.g. `/CN=phone`.
    pub subject: String,
    /// The `CN` component of the subject, empty if absent.
    pub common_name: String,
}

impl IndexEntry {
    /// Whether the certificate is past its expiry at `now`, or flagged expired.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.status == RecordStatus::Expired
            || (self.status == RecordStatus::Valid && self.expires_at <= now)
    }
}

/// Parses the full text of an index file.
///
/// Blank lines are skipped. Any other line that does not have the six
/// expected fields is an error carrying its 1-based line number.
pub fn parse_index(text: &str) -> Result<Vec<IndexEntry>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            parse_line(line).map_err(|reason| VpnKitError::IndexParse { line: i + 1, reason })
        })
        .collect()
}

fn parse_line(line: &str) -> std::result::Result<IndexEntry, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 6 {
        return Err(format!("expected 6 tab-separated fields, found {}", fields.len()));
    }

    let status: RecordStatus = fields[0].parse()?;
    let expires_at = parse_asn1_time(fields[1])?;

    let (revoked_at, reason) = match fields[2] {
        "" => (None, None),
        revocation => {
            let (when, reason) = match revocation.split_once(',') {
                Some((when, reason)) => (when, Some(reason.to_string())),
                None => (revocation, None),
            };
            (Some(parse_asn1_time(when)?), reason)
        }
    };
    if status == RecordStatus::Revoked && revoked_at.is_none() {
        return Err("revoked record without a revocation time".to_string());
    }

    let serial = fields[3];
    if serial.is_empty() || !serial.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid serial '{serial}'"));
    }

    let subject = fields[5];
    Ok(IndexEntry {
        status,
        expires_at,
        revoked_at,
        reason,
        serial: serial.to_ascii_uppercase(),
        subject: subject.to_string(),
        common_name: common_name(subject).unwrap_or_default().to_string(),
    })
}

/// Extracts the `CN` value from a `/K=V/K=V` subject.
pub fn common_name(subject: &str) -> Option<&str> {
    subject
        .split('/')
        .filter_map(|rdn| rdn.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("CN"))
        .map(|(_, value)| value)
}

/// Parses `YYMMDDHHMMSSZ` (UTCTime) or `YYYYMMDDHHMMSSZ` (GeneralizedTime).
fn parse_asn1_time(s: &str) -> std::result::Result<OffsetDateTime, String> {
    let invalid = || format!("invalid time '{s}'");

    let digits = s.strip_suffix('Z').ok_or_else(invalid)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let num = |range: std::ops::Range<usize>| -> u32 {
        digits[range].parse().unwrap_or_default()
    };

    let (year, rest) = match digits.len() {
        12 => {
            let yy = num(0..2) as i32;
            (if yy >= 50 { 1900 + yy } else { 2000 + yy }, 2)
        }
        14 => (num(0..4) as i32, 4),
        _ => return Err(invalid()),
    };

    let month = Month::try_from(num(rest..rest + 2) as u8).map_err(|_| invalid())?;
    let date = Date::from_calendar_date(year, month, num(rest + 2..rest + 4) as u8)
        .map_err(|_| invalid())?;
    let time = Time::from_hms(
        num(rest + 4..rest + 6) as u8,
        num(rest + 6..rest + 8) as u8,
        num(rest + 8..rest + 10) as u8,
    )
    .map_err(|_| invalid())?;

    Ok(PrimitiveDateTime::new(date, time).assume_utc())
}
