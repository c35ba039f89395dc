//! Archive filename convention.
//!
//! Generates destination filenames for assets moved out of the image
//! server's output directory.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};

/// Timestamp layout embedded in archived filenames (second precision).
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Generate the archived filename for a source asset.
///
/// Convention: `{tag}_{YYYYmmdd}_{HHMMSS}_{original}`
///
/// - `tag` = project tag with whitespace and path separators replaced by `_`,
///   omitted entirely when empty
/// - timestamp = wall-clock time of the sync, to the second
/// - `original` = source filename, unchanged
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use aigc_core::naming::archive_filename;
///
/// let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
/// assert_eq!(
///     archive_filename("Bili_Project", &ts, "ComfyUI_00001_.png"),
///     "Bili_Project_20260314_092653_ComfyUI_00001_.png",
/// );
/// ```
pub fn archive_filename<Tz>(project_tag: &str, timestamp: &DateTime<Tz>, original: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut name = String::new();

    let tag = sanitize_tag(project_tag);
    if !tag.is_empty() {
        name.push_str(&tag);
        name.push('_');
    }

    name.push_str(&timestamp.format(ARCHIVE_TIMESTAMP_FORMAT).to_string());
    name.push('_');
    name.push_str(original);
    name
}

/// Append a sub-second disambiguator before the extension.
///
/// `attempt == 0` yields `{stem}_{millis:03}.{ext}`; later attempts add a
/// counter, `{stem}_{millis:03}_{attempt}.{ext}`.
pub fn disambiguate(filename: &str, millis: u32, attempt: u32) -> String {
    let (stem, ext) = split_extension(filename);

    let mut name = format!("{stem}_{:03}", millis % 1000);
    if attempt > 0 {
        name.push('_');
        name.push_str(&attempt.to_string());
    }
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Make a project tag safe for use as a filename component.
pub fn sanitize_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Split `name.ext` into `("name", Some("ext"))`. Dotfiles have no extension.
fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => (&filename[..idx], Some(&filename[idx + 1..])),
        _ => (filename, None),
    }
}
