//! Session keys
//!
//! A key names exactly one transcript document. Parallel-group keys are
//! unique per (task, record, strategy); serial-group keys are unique per
//! (task, strategy, segment).

use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::StrategyKind;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Characters of the title kept in the record slot
pub const SHORT_TITLE_CHARS: usize = 40;

static DISALLOWED: OnceLock<Regex> = OnceLock::new();
static UNDERSCORE_RUNS: OnceLock<Regex> = OnceLock::new();

/// Reduce free text to a portable path component
///
/// Keeps Unicode letters and digits, `-` and `_`; everything else becomes
/// `_`, runs collapse, and edge underscores are trimmed.
pub fn sanitize_component(text: &str, max_chars: Option<usize>) -> String {
    let disallowed =
        DISALLOWED.get_or_init(|| Regex::new(r"[^\p{L}\p{N}_-]+").expect("Invalid component pattern"));
    let runs = UNDERSCORE_RUNS.get_or_init(|| Regex::new(r"_{2,}").expect("Invalid run pattern"));

    let truncated: String = match max_chars {
        Some(max) => text.trim().chars().take(max).collect(),
        None => text.trim().to_string(),
    };

    let replaced = disallowed.replace_all(&truncated, "_");
    let collapsed = runs.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Deterministic location of one transcript
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    task: String,
    slot: Option<String>,
    name: String,
}

impl SessionKey {
    /// Key for one (record, strategy) pair: `{task}/{ordinal:04}_{short_title}/{strategy}`
    pub fn parallel(task: &str, ordinal: usize, title: &str, strategy: StrategyKind) -> Self {
        Self {
            task: sanitize_component(task, None),
            slot: Some(format!(
                "{:04}_{}",
                ordinal,
                sanitize_component(title, Some(SHORT_TITLE_CHARS))
            )),
            name: strategy.as_str().to_string(),
        }
    }

    /// Key for a long-lived session: `{task}/{strategy}`, or `{task}/{strategy}-{n}`
    /// once the session has rotated to segment `n > 1`
    pub fn serial(task: &str, strategy: StrategyKind, segment: u32) -> Self {
        let name = if segment <= 1 {
            strategy.as_str().to_string()
        } else {
            format!("{}-{}", strategy.as_str(), segment)
        };

        Self {
            task: sanitize_component(task, None),
            slot: None,
            name,
        }
    }

    /// Parse a key as printed by `Display` (`task/slot/name` or `task/name`)
    ///
    /// Rejects anything that could step outside the session root.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let trimmed = text.trim().trim_end_matches(".json");
        let path = Path::new(trimmed);

        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| {
                        EngineError::SessionStore(format!("invalid session key '{}'", text))
                    })?;
                    parts.push(part.to_string());
                }
                _ => {
                    return Err(EngineError::SessionStore(format!(
                        "invalid session key '{}'",
                        text
                    )))
                }
            }
        }

        match parts.as_slice() {
            [task, name] => Ok(Self {
                task: task.clone(),
                slot: None,
                name: name.clone(),
            }),
            [task, slot, name] => Ok(Self {
                task: task.clone(),
                slot: Some(slot.clone()),
                name: name.clone(),
            }),
            _ => Err(EngineError::SessionStore(format!(
                "session key '{}' must look like task/strategy or task/record/strategy",
                text
            ))),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Record slot (`{ordinal:04}_{short_title}`), absent for serial keys
    pub fn slot(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    /// Strategy name, with the segment suffix for rotated serial sessions
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_serial(&self) -> bool {
        self.slot.is_none()
    }

    /// Path of the transcript document relative to the session root
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.task);
        if let Some(slot) = &self.slot {
            path.push(slot);
        }
        path.push(format!("{}.json", self.name));
        path
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Some(slot) => write!(f, "{}/{}/{}", self.task, slot, self.name),
            None => write!(f, "{}/{}", self.task, self.name),
        }
    }
}
