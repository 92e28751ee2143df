//! Parameter extraction from structured header values
//!
//! Header values such as `Content-Type` carry parameters after the media
//! type: `text/html; charset="euc-kr"; q=0.9`. Only the parameters are
//! searched; the leading media type is never a match.

/// Extract a named parameter from a `;`-delimited header value.
///
/// Names are matched case-sensitively after trimming. A single pair of
/// surrounding double quotes is stripped from the value. Segments without a
/// `=` and parameters with an empty value are skipped, so malformed input
/// yields `None` rather than an error.
pub fn extract_param(value: &str, param_name: &str) -> Option<String> {
    let mut segments = value.split(';');
    // media type
    segments.next()?;

    segments
        .filter_map(|segment| segment.split_once('='))
        .filter(|(name, _)| name.trim() == param_name)
        .map(|(_, raw)| raw.trim())
        .find(|raw| !raw.is_empty())
        .map(|raw| unquote(raw).to_string())
}

fn unquote(value: &str) -> &str {
    if value.len() > 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
