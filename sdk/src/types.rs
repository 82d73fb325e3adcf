//! Records, strategy identities, and label results

use crate::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A scholarly record to annotate
///
/// Records are created once by a record source and are read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier (defaults to the ordinal when the input has none)
    #[serde(default)]
    pub id: String,

    /// 1-based position in input order
    #[serde(default)]
    pub ordinal: usize,

    /// Title text
    #[serde(default, alias = "Article Title")]
    pub title: String,

    /// Abstract text
    #[serde(default, rename = "abstract", alias = "Abstract")]
    pub abstract_text: String,
}

impl Record {
    /// Create a new record
    pub fn new(
        id: impl Into<String>,
        ordinal: usize,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            ordinal,
            title: title.into(),
            abstract_text: abstract_text.into(),
        }
    }

    /// True when the abstract is missing or whitespace only
    pub fn abstract_is_blank(&self) -> bool {
        self.abstract_text.trim().is_empty()
    }
}

/// Concurrency discipline of a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyGroup {
    /// One isolated session per (record, strategy), run in the worker pool
    Parallel,

    /// One long-lived session across all records, run on the control flow
    Serial,
}

impl fmt::Display for ConcurrencyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyGroup::Parallel => write!(f, "parallel"),
            ConcurrencyGroup::Serial => write!(f, "serial"),
        }
    }
}

/// Prompting strategy identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One request with the full rules and the record
    Single,

    /// Three requests in one per-record session
    Stepwise,

    /// Three requests per record in one session spanning all records
    StepwiseLong,

    /// Reasoning before the answer, answer parsed past the delimiter
    Cot,

    /// Initial answer, then critique-and-revise
    Reflection,
}

impl StrategyKind {
    /// All strategies, in menu order
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Single,
        StrategyKind::Stepwise,
        StrategyKind::StepwiseLong,
        StrategyKind::Cot,
        StrategyKind::Reflection,
    ];

    /// Stable lowercase name, used in session keys and file names
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Single => "single",
            StrategyKind::Stepwise => "stepwise",
            StrategyKind::StepwiseLong => "stepwise_long",
            StrategyKind::Cot => "cot",
            StrategyKind::Reflection => "reflection",
        }
    }

    /// Concurrency group this strategy belongs to
    pub fn group(&self) -> ConcurrencyGroup {
        match self {
            StrategyKind::StepwiseLong => ConcurrencyGroup::Serial,
            _ => ConcurrencyGroup::Parallel,
        }
    }

    /// One-line description for listings
    pub fn description(&self) -> &'static str {
        match self {
            StrategyKind::Single => "one request per record, isolated session",
            StrategyKind::Stepwise => "three steps per record, isolated session",
            StrategyKind::StepwiseLong => "three steps per record, one session across records",
            StrategyKind::Cot => "reasoning first, then the answer line",
            StrategyKind::Reflection => "answer, then self-critique and revision",
        }
    }

    /// Parse a comma separated strategy list
    ///
    /// Accepts names, the numeric menu aliases `1..5`, and `all`. Duplicates are
    /// removed while preserving the first occurrence.
    pub fn parse_list(input: &str) -> Result<Vec<StrategyKind>, EngineError> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::ALL.to_vec());
        }

        let mut selected = Vec::new();
        for part in trimmed.replace('，', ",").split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let kind: StrategyKind = part.parse()?;
            if !selected.contains(&kind) {
                selected.push(kind);
            }
        }

        if selected.is_empty() {
            return Err(EngineError::UnknownStrategy(input.to_string()));
        }
        Ok(selected)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "single" => Ok(StrategyKind::Single),
            "2" | "stepwise" => Ok(StrategyKind::Stepwise),
            "3" | "stepwise_long" | "stepwise-long" => Ok(StrategyKind::StepwiseLong),
            "4" | "cot" => Ok(StrategyKind::Cot),
            "5" | "reflection" => Ok(StrategyKind::Reflection),
            _ => Err(EngineError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Binary classification value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binary {
    #[serde(rename = "1")]
    Yes,
    #[serde(rename = "0")]
    No,
}

impl Binary {
    /// Digit form used in model answers and output files
    pub fn as_digit(&self) -> &'static str {
        match self {
            Binary::Yes => "1",
            Binary::No => "0",
        }
    }
}

impl FromStr for Binary {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "yes" | "y" | "true" | "是" => Ok(Binary::Yes),
            "0" | "no" | "n" | "false" | "否" => Ok(Binary::No),
            other => Err(EngineError::MalformedOutput(format!(
                "expected 1 or 0, got '{}'",
                other
            ))),
        }
    }
}

/// Closed 9-level ordinal set of spatial scales, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialLevel {
    Global,
    International,
    National,
    UrbanAgglomeration,
    Provincial,
    City,
    District,
    Subdistrict,
    Community,
}

impl SpatialLevel {
    /// All levels in ordinal order
    pub const ALL: [SpatialLevel; 9] = [
        SpatialLevel::Global,
        SpatialLevel::International,
        SpatialLevel::National,
        SpatialLevel::UrbanAgglomeration,
        SpatialLevel::Provincial,
        SpatialLevel::City,
        SpatialLevel::District,
        SpatialLevel::Subdistrict,
        SpatialLevel::Community,
    ];

    /// Position in the ordinal set (0 = coarsest)
    pub fn rank(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpatialLevel::Global => "global",
            SpatialLevel::International => "international",
            SpatialLevel::National => "national",
            SpatialLevel::UrbanAgglomeration => "urban_agglomeration",
            SpatialLevel::Provincial => "provincial",
            SpatialLevel::City => "city",
            SpatialLevel::District => "district",
            SpatialLevel::Subdistrict => "subdistrict",
            SpatialLevel::Community => "community",
        }
    }

    /// Chinese label as used by the annotation guidelines
    pub fn label_zh(&self) -> &'static str {
        match self {
            SpatialLevel::Global => "全球",
            SpatialLevel::International => "跨国",
            SpatialLevel::National => "国家",
            SpatialLevel::UrbanAgglomeration => "城市群",
            SpatialLevel::Provincial => "省级",
            SpatialLevel::City => "市级",
            SpatialLevel::District => "区县",
            SpatialLevel::Subdistrict => "街道",
            SpatialLevel::Community => "社区",
        }
    }
}

impl fmt::Display for SpatialLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpatialLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        let level = match normalized.as_str() {
            "global" | "全球" => SpatialLevel::Global,
            "international" | "cross_national" | "跨国" => SpatialLevel::International,
            "national" | "国家" | "国家级" => SpatialLevel::National,
            "urban_agglomeration" | "城市群" => SpatialLevel::UrbanAgglomeration,
            "provincial" | "province" | "state" | "省级" | "省级（州）" | "省级(州)" => {
                SpatialLevel::Provincial
            }
            "city" | "市级" => SpatialLevel::City,
            "district" | "county" | "区县" | "区级" | "县级" => SpatialLevel::District,
            "subdistrict" | "street" | "街道" => SpatialLevel::Subdistrict,
            "community" | "neighbourhood" | "neighborhood" | "社区" => SpatialLevel::Community,
            _ => {
                return Err(EngineError::MalformedOutput(format!(
                    "spatial level '{}' is not one of the 9 known levels",
                    s.trim()
                )))
            }
        };
        Ok(level)
    }
}

/// Typed label values produced by a strategy
///
/// Values stay `None` when a multi-step strategy stopped before reaching the
/// step that produces them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFields {
    /// Is the record an urban renewal study
    pub urban_renewal: Option<Binary>,

    /// Is the record a spatial study
    pub spatial_study: Option<Binary>,

    /// Spatial scale of the study area
    pub spatial_level: Option<SpatialLevel>,

    /// Free-text description of the study area
    #[serde(default)]
    pub spatial_description: String,
}

impl LabelFields {
    /// The deterministic "No" classification used when a record carries no
    /// usable text and the model answer could not be parsed
    pub fn negative_default() -> Self {
        Self {
            urban_renewal: Some(Binary::No),
            spatial_study: Some(Binary::No),
            spatial_level: None,
            spatial_description: String::new(),
        }
    }

    /// True when both classifications are present and a spatial study has a level
    pub fn is_complete(&self) -> bool {
        match (self.urban_renewal, self.spatial_study) {
            (Some(_), Some(Binary::No)) => true,
            (Some(_), Some(Binary::Yes)) => self.spatial_level.is_some(),
            _ => false,
        }
    }
}

/// Outcome of one (record, strategy) task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStatus {
    /// Parsed model answer
    Completed,

    /// Deterministic default applied to a record without usable text
    Defaulted,

    /// Recorded failure; fields may hold partial values
    Failed,
}

/// Failure category recorded on a failed label result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedOutput,
    TransientService,
    Provider,
    SessionConflict,
    Session,
    Internal,
}

impl From<&EngineError> for FailureKind {
    fn from(error: &EngineError) -> Self {
        match error {
            EngineError::MalformedOutput(_) => FailureKind::MalformedOutput,
            EngineError::TransientService(_) => FailureKind::TransientService,
            EngineError::Provider(_) => FailureKind::Provider,
            EngineError::SessionConflict(_) => FailureKind::SessionConflict,
            EngineError::SessionStore(_)
            | EngineError::Io(_)
            | EngineError::Serialization(_) => FailureKind::Session,
            _ => FailureKind::Internal,
        }
    }
}

/// Why a task failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&EngineError> for Failure {
    fn from(error: &EngineError) -> Self {
        Self::new(FailureKind::from(error), error.to_string())
    }
}

/// Structured output of one strategy for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelResult {
    pub record_id: String,
    pub ordinal: usize,
    pub strategy: StrategyKind,
    pub status: LabelStatus,
    pub fields: LabelFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// Session key of the transcript that produced this result
    pub trace: String,
}

impl LabelResult {
    /// A successfully parsed result
    pub fn completed(
        record: &Record,
        strategy: StrategyKind,
        fields: LabelFields,
        trace: impl Into<String>,
    ) -> Self {
        Self::build(record, strategy, LabelStatus::Completed, fields, None, trace)
    }

    /// The negative default for a record without usable text
    pub fn defaulted(record: &Record, strategy: StrategyKind, trace: impl Into<String>) -> Self {
        Self::build(
            record,
            strategy,
            LabelStatus::Defaulted,
            LabelFields::negative_default(),
            None,
            trace,
        )
    }

    /// A recorded failure, keeping whatever fields were parsed before it
    pub fn failed(
        record: &Record,
        strategy: StrategyKind,
        partial: LabelFields,
        failure: Failure,
        trace: impl Into<String>,
    ) -> Self {
        Self::build(
            record,
            strategy,
            LabelStatus::Failed,
            partial,
            Some(failure),
            trace,
        )
    }

    fn build(
        record: &Record,
        strategy: StrategyKind,
        status: LabelStatus,
        fields: LabelFields,
        failure: Option<Failure>,
        trace: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record.id.clone(),
            ordinal: record.ordinal,
            strategy,
            status,
            fields,
            failure,
            trace: trace.into(),
        }
    }

    /// True unless the task failed
    pub fn is_success(&self) -> bool {
        self.status != LabelStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_groups() {
        assert_eq!(StrategyKind::StepwiseLong.group(), ConcurrencyGroup::Serial);
        for kind in [
            StrategyKind::Single,
            StrategyKind::Stepwise,
            StrategyKind::Cot,
            StrategyKind::Reflection,
        ] {
            assert_eq!(kind.group(), ConcurrencyGroup::Parallel);
        }
    }

    #[test]
    fn test_strategy_from_str_aliases() {
        assert_eq!("1".parse::<StrategyKind>().unwrap(), StrategyKind::Single);
        assert_eq!("COT".parse::<StrategyKind>().unwrap(), StrategyKind::Cot);
        assert_eq!(
            "stepwise-long".parse::<StrategyKind>().unwrap(),
            StrategyKind::StepwiseLong
        );
        assert!("fancy".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_parse_list_dedupes_and_keeps_order() {
        let list = StrategyKind::parse_list("cot, single，4,1").unwrap();
        assert_eq!(list, vec![StrategyKind::Cot, StrategyKind::Single]);

        let all = StrategyKind::parse_list("ALL").unwrap();
        assert_eq!(all.len(), 5);

        assert!(StrategyKind::parse_list(" , ").is_err());
        assert!(StrategyKind::parse_list("single,bogus").is_err());
    }

    #[test]
    fn test_binary_parsing() {
        assert_eq!("1".parse::<Binary>().unwrap(), Binary::Yes);
        assert_eq!(" 否 ".parse::<Binary>().unwrap(), Binary::No);
        assert!("maybe".parse::<Binary>().is_err());
    }

    #[test]
    fn test_spatial_level_parsing() {
        assert_eq!("市级".parse::<SpatialLevel>().unwrap(), SpatialLevel::City);
        assert_eq!(
            "Urban Agglomeration".parse::<SpatialLevel>().unwrap(),
            SpatialLevel::UrbanAgglomeration
        );
        assert_eq!(
            "省级（州）".parse::<SpatialLevel>().unwrap(),
            SpatialLevel::Provincial
        );
        assert!("planet".parse::<SpatialLevel>().is_err());
    }

    #[test]
    fn test_spatial_level_ranks_are_ordinal() {
        for (i, level) in SpatialLevel::ALL.iter().enumerate() {
            assert_eq!(level.rank(), i);
            assert_eq!(level.as_str().parse::<SpatialLevel>().unwrap(), *level);
            assert_eq!(level.label_zh().parse::<SpatialLevel>().unwrap(), *level);
        }
    }

    #[test]
    fn test_label_fields_completeness() {
        assert!(LabelFields::negative_default().is_complete());

        let spatial_without_level = LabelFields {
            urban_renewal: Some(Binary::Yes),
            spatial_study: Some(Binary::Yes),
            spatial_level: None,
            spatial_description: String::new(),
        };
        assert!(!spatial_without_level.is_complete());
        assert!(!LabelFields::default().is_complete());
    }

    #[test]
    fn test_record_accepts_spreadsheet_headers() {
        let json = r#"{"Article Title": "Urban renewal in Murcia", "Abstract": "Three estates."}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.title, "Urban renewal in Murcia");
        assert_eq!(record.abstract_text, "Three estates.");
        assert!(!record.abstract_is_blank());
    }

    #[test]
    fn test_label_result_serialization() {
        let record = Record::new("r1", 1, "t", "a");
        let result = LabelResult::defaulted(&record, StrategyKind::Single, "task/0001_t/single");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""status":"defaulted""#));
        assert!(json.contains(r#""urban_renewal":"0""#));
        assert!(!json.contains("failure"));
    }
}
