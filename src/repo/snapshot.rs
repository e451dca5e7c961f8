//! Snapshot write protocol
//!
//! Maven deploys a snapshot build as
//! `<artifact>-<YYYYMMDD>.<HHMMSS>-<build>[-<classifier>]<suffix>`. On
//! upload the name is normalized back to
//! `<artifact>-SNAPSHOT[-<classifier>]<suffix>` and the embedded timestamp
//! becomes the stored modification time, so each timestamped build fully
//! replaces the previous one. Staging is pure; the filesystem effects live
//! in the resolution engine.

use chrono::{DateTime, TimeZone, Utc};

/// Result of staging a snapshot upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWrite {
    /// Filename to store under, normalized for timestamped uploads
    pub file_name: String,

    /// Modification time to stamp on the stored file
    pub modified: DateTime<Utc>,

    /// Whether sibling files modified at other times must be pruned after
    /// the write; only timestamped uploads trigger cleanup
    pub cleanup: bool,
}

/// Stage an upload into a snapshot version directory.
///
/// `suffix` must already be validated against the accepted list. Filenames
/// that do not match the timestamped pattern are stored as-is with the
/// current time and no cleanup.
pub fn stage(file_name: &str, suffix: &str, now: DateTime<Utc>) -> StagedWrite {
    match parse_timestamped(file_name, suffix) {
        Some(parsed) => StagedWrite {
            file_name: match parsed.classifier {
                Some(classifier) => {
                    format!("{}-SNAPSHOT-{}{}", parsed.artifact, classifier, suffix)
                }
                None => format!("{}-SNAPSHOT{}", parsed.artifact, suffix),
            },
            modified: parsed.timestamp,
            cleanup: true,
        },
        None => StagedWrite {
            file_name: file_name.to_string(),
            modified: now,
            cleanup: false,
        },
    }
}

struct TimestampedName<'a> {
    artifact: &'a str,
    timestamp: DateTime<Utc>,
    classifier: Option<&'a str>,
}

/// Parse `<artifact>-<YYYYMMDD>.<HHMMSS>-<build>[-<classifier>]<suffix>`,
/// working backwards from the suffix
fn parse_timestamped<'a>(file_name: &'a str, suffix: &str) -> Option<TimestampedName<'a>> {
    let mut rest = file_name.strip_suffix(suffix)?;

    // optional trailing -<classifier>, letters only
    let mut classifier = None;
    if let Some(idx) = rest.rfind('-') {
        let tail = &rest[idx + 1..];
        if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_alphabetic()) {
            classifier = Some(tail);
            rest = &rest[..idx];
        }
    }

    // -<build number>
    let idx = rest.rfind('-')?;
    let build = &rest[idx + 1..];
    if build.is_empty() || !build.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest = &rest[..idx];

    // -<YYYYMMDD>.<HHMMSS>
    let idx = rest.rfind('-')?;
    let timestamp = parse_timestamp(&rest[idx + 1..])?;
    let artifact = &rest[..idx];
    if artifact.is_empty() {
        return None;
    }

    Some(TimestampedName {
        artifact,
        timestamp,
        classifier,
    })
}

/// Parse a fixed-width `YYYYMMDD.HHMMSS` timestamp as UTC
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let bytes = text.as_bytes();
    if bytes.len() != 15 || bytes[8] != b'.' {
        return None;
    }
    if !bytes[..8].iter().chain(&bytes[9..]).all(u8::is_ascii_digit) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| -> u32 { text[range].parse().unwrap_or(0) };
    Utc.with_ymd_and_hms(
        text[0..4].parse().ok()?,
        field(4..6),
        field(6..8),
        field(9..11),
        field(11..13),
        field(13..15),
    )
    .single()
}
