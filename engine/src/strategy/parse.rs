//! Model answer parsing
//!
//! Answers are single TAB-separated lines. Lines are trimmed of spaces and
//! carriage returns only, so empty trailing fields (`1\t0\t\t`) survive.

use sdk::errors::EngineError;
use sdk::types::{Binary, LabelFields, SpatialLevel};

const THINKING_CLOSE: &str = "</thinking>";

// Model spellings of "nothing here"
const EMPTY_MARKERS: [&str; 8] = ["", "-", "—", "无", "none", "n/a", "null", "na"];

fn trim_line(line: &str) -> &str {
    line.trim_matches(|c| c == ' ' || c == '\r')
}

fn is_empty_marker(field: &str) -> bool {
    EMPTY_MARKERS.contains(&field.trim().to_lowercase().as_str())
}

/// First line with visible content
pub fn first_line(text: &str) -> Option<&str> {
    text.lines()
        .map(trim_line)
        .find(|line| !line.trim().is_empty())
}

/// Answer payload of a reasoning response
///
/// Text after the last `</thinking>`; without the delimiter, the last
/// non-empty line containing a TAB; otherwise the whole response.
pub fn extract_answer(text: &str) -> &str {
    if let Some(pos) = text.rfind(THINKING_CLOSE) {
        let after = text[pos + THINKING_CLOSE.len()..].trim_matches(|c| c == ' ' || c == '\r' || c == '\n');
        if !after.is_empty() {
            return after;
        }
    }

    text.lines()
        .rev()
        .map(trim_line)
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.starts_with("<thinking>") && !line.starts_with(THINKING_CLOSE))
        .find(|line| line.contains('\t'))
        .unwrap_or(text)
}

/// A `1`/`0` answer
pub fn parse_binary(text: &str) -> Result<Binary, EngineError> {
    let line = first_line(text)
        .ok_or_else(|| EngineError::MalformedOutput("empty answer".to_string()))?;
    line.trim()
        .trim_end_matches(['.', '。'])
        .parse()
}

/// Spatial level and description, given the spatial-study answer
///
/// A spatial study needs a level from the closed set. For a non-spatial
/// study both fields are dropped whatever the model wrote.
pub fn parse_level_fields(
    level: Option<&str>,
    description: Option<&str>,
    spatial: Binary,
) -> Result<(Option<SpatialLevel>, String), EngineError> {
    if spatial == Binary::No {
        return Ok((None, String::new()));
    }

    let level = match level {
        Some(field) if !is_empty_marker(field) => field.trim().parse::<SpatialLevel>()?,
        _ => {
            return Err(EngineError::MalformedOutput(
                "spatial study without a spatial level".to_string(),
            ))
        }
    };

    let description = description
        .filter(|d| !is_empty_marker(d))
        .map(|d| d.trim().to_string())
        .unwrap_or_default();

    Ok((Some(level), description))
}

/// The step-3 answer `level<TAB>description`
pub fn parse_level_line(
    text: &str,
    spatial: Binary,
) -> Result<(Option<SpatialLevel>, String), EngineError> {
    let line = first_line(text).unwrap_or("");
    let mut parts = line.split('\t');
    parse_level_fields(parts.next(), parts.next(), spatial)
}

/// The 4-field answer line, filling `fields` as far as parsing gets
pub fn parse_label_line(text: &str, fields: &mut LabelFields) -> Result<(), EngineError> {
    let line = first_line(text)
        .ok_or_else(|| EngineError::MalformedOutput("empty answer".to_string()))?;
    let parts: Vec<&str> = line.split('\t').collect();

    if parts.len() < 2 {
        return Err(EngineError::MalformedOutput(format!(
            "expected TAB-separated fields, got {} field(s)",
            parts.len()
        )));
    }

    let urban_renewal: Binary = parts[0].trim().parse()?;
    fields.urban_renewal = Some(urban_renewal);

    let spatial: Binary = parts[1].trim().parse()?;
    fields.spatial_study = Some(spatial);

    let (level, description) =
        parse_level_fields(parts.get(2).copied(), parts.get(3).copied(), spatial)?;
    fields.spatial_level = level;
    fields.spatial_description = description;

    Ok(())
}
