//! Prompt book
//!
//! Builds the request text every strategy family sends. The built-in
//! templates can be replaced per family from a TOML file:
//!
//! ```toml
//! [single]
//! system = "..."
//! output_format = "..."
//! one_shot = "..."
//! few_shot = "..."
//!
//! [stepwise]
//! system = "..."
//!
//! [cot]
//! instruction = "..."
//!
//! [reflection]
//! critique = "..."
//! ```
//!
//! A family given in the file replaces the built-in family entirely, so an
//! override without exemplars runs every shot mode as zero-shot.

use sdk::errors::EngineError;
use sdk::types::{Record, SpatialLevel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Exemplar inclusion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotMode {
    /// Rules only
    #[default]
    Zero,

    /// Rules plus one worked example
    One,

    /// Rules plus several worked examples
    Few,
}

impl ShotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotMode::Zero => "zero",
            ShotMode::One => "one",
            ShotMode::Few => "few",
        }
    }
}

impl fmt::Display for ShotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShotMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zero" | "0" | "zero-shot" | "zero_shot" => Ok(ShotMode::Zero),
            "one" | "1" | "one-shot" | "one_shot" => Ok(ShotMode::One),
            "few" | "few-shot" | "few_shot" => Ok(ShotMode::Few),
            other => Err(EngineError::Config(format!(
                "unknown shot mode '{}', expected zero, one or few",
                other
            ))),
        }
    }
}

/// Rules and exemplars for one strategy family
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyTemplate {
    pub system: String,
    pub output_format: String,
    pub one_shot: String,
    pub few_shot: String,
}

/// Reasoning instruction appended for chain-of-thought
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CotTemplate {
    pub instruction: String,
}

/// Checklist sent in the second reflection pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionTemplate {
    pub critique: String,
}

/// Complete template set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub single: FamilyTemplate,
    pub stepwise: FamilyTemplate,
    pub cot: CotTemplate,
    pub reflection: ReflectionTemplate,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            single: FamilyTemplate {
                system: task_rules(),
                output_format: SINGLE_OUTPUT.to_string(),
                one_shot: SINGLE_ONE_SHOT.to_string(),
                few_shot: format!("{}{}", SINGLE_ONE_SHOT, SINGLE_FEW_SHOT_EXTRA),
            },
            stepwise: FamilyTemplate {
                system: task_rules(),
                output_format: STEP_OUTPUT.to_string(),
                one_shot: STEP_ONE_SHOT.to_string(),
                few_shot: format!("{}{}", STEP_ONE_SHOT, STEP_FEW_SHOT_EXTRA),
            },
            cot: CotTemplate {
                instruction: COT_INSTRUCTION.to_string(),
            },
            reflection: ReflectionTemplate {
                critique: REFLECTION_CRITIQUE.to_string(),
            },
        }
    }
}

fn task_rules() -> String {
    let levels: Vec<String> = SpatialLevel::ALL
        .iter()
        .map(|level| format!("  - {} ({})", level.as_str(), level.label_zh()))
        .collect();

    format!(
        "You annotate scholarly records (title and abstract) for a literature review.\n\
         \n\
         FIELDS:\n\
         1. Urban renewal study: 1 if the record studies urban renewal, regeneration, \
         redevelopment or retrofitting of existing urban areas, else 0.\n\
         2. Spatial study: 1 if the record analyses a concrete geographic study area, else 0.\n\
         3. Spatial level: for spatial studies only, the scale of the study area, one of:\n\
         {}\n\
         4. Spatial description: for spatial studies only, the study area as named in the \
         record (e.g. \"Tianhe District, Guangzhou\").\n\
         \n\
         RULES:\n\
         - Judge only from the title and abstract.\n\
         - When the abstract is missing and the title is not conclusive, answer 0.\n\
         - A study comparing several areas takes the level of its largest area.\n",
        levels.join("\n")
    )
}

const SINGLE_OUTPUT: &str = "\nOUTPUT REQUIREMENTS:\n\
- Output EXACTLY one line with 4 fields (TAB-separated): \
urban_renewal<TAB>spatial_study<TAB>spatial_level<TAB>spatial_description\n\
- Leave fields 3 and 4 empty when spatial_study is 0.\n\
- No headers, no explanations.\n";

const STEP_OUTPUT: &str = "\nYou will be asked one question at a time. Answer each \
question with exactly what it asks for and nothing else.\n";

const SINGLE_ONE_SHOT: &str = "\nEXAMPLE:\n\
[TITLE] Regenerating old industrial estates in Shenzhen\n\
[ABSTRACT] Using survey data from three estates in Nanshan District, we examine ...\n\
Answer: 1\t1\tdistrict\tNanshan District, Shenzhen\n";

const SINGLE_FEW_SHOT_EXTRA: &str = "\nEXAMPLE:\n\
[TITLE] A review of gentrification theory\n\
[ABSTRACT] This paper reviews four decades of debate on gentrification ...\n\
Answer: 1\t0\t\t\n\
\nEXAMPLE:\n\
[TITLE] Flood risk perception among coastal residents\n\
[ABSTRACT] A nationwide survey across the Netherlands ...\n\
Answer: 0\t1\tnational\tthe Netherlands\n";

const STEP_ONE_SHOT: &str = "\nEXAMPLE:\n\
[TITLE] Regenerating old industrial estates in Shenzhen\n\
[ABSTRACT] Using survey data from three estates in Nanshan District, we examine ...\n\
Step 1 answer: 1\n\
Step 2 answer: 1\n\
Step 3 answer: district\tNanshan District, Shenzhen\n";

const STEP_FEW_SHOT_EXTRA: &str = "\nEXAMPLE:\n\
[TITLE] A review of gentrification theory\n\
[ABSTRACT] This paper reviews four decades of debate on gentrification ...\n\
Step 1 answer: 1\n\
Step 2 answer: 0\n\
Step 3 answer: \t\n";

const COT_INSTRUCTION: &str = "OUTPUT REQUIREMENTS:\n\
- First reason step by step inside <thinking>...</thinking>.\n\
- After </thinking>, output EXACTLY one line with the 4 TAB-separated fields: \
urban_renewal<TAB>spatial_study<TAB>spatial_level<TAB>spatial_description\n\
- Leave fields 3 and 4 empty when spatial_study is 0.\n";

const REFLECTION_CRITIQUE: &str = "Review your previous answer against this checklist:\n\
1. Does the record really study urban renewal, or only mention it?\n\
2. Is there a concrete study area, or is the work theoretical or a review?\n\
3. Is the spatial level one of the allowed levels and does it match the study area?\n\
4. Is the spatial description taken from the record text?\n\
Then output ONLY the corrected final answer: one line with the 4 TAB-separated fields.";

/// Template set bound to a shot mode
#[derive(Debug, Clone, Default)]
pub struct PromptBook {
    templates: PromptTemplates,
    shot_mode: ShotMode,
}

impl PromptBook {
    pub fn new(templates: PromptTemplates, shot_mode: ShotMode) -> Self {
        Self {
            templates,
            shot_mode,
        }
    }

    /// Built-in templates
    pub fn builtin(shot_mode: ShotMode) -> Self {
        Self::new(PromptTemplates::default(), shot_mode)
    }

    /// Load templates from a TOML file, keeping built-ins for missing families
    pub fn from_file(path: &Path, shot_mode: ShotMode) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!(
                "Failed to read prompt templates {}: {}",
                path.display(),
                e
            ))
        })?;
        let templates: PromptTemplates = toml::from_str(&contents).map_err(|e| {
            EngineError::Config(format!("Failed to parse prompt templates: {}", e))
        })?;
        Ok(Self::new(templates, shot_mode))
    }

    pub fn shot_mode(&self) -> ShotMode {
        self.shot_mode
    }

    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    /// System prompt for `single` and the first reflection pass
    pub fn single_system(&self) -> String {
        let family = &self.templates.single;
        self.with_exemplars(format!("{}{}", family.system, family.output_format), family)
    }

    /// System prompt for `stepwise` and `stepwise_long`
    pub fn step_system(&self) -> String {
        let family = &self.templates.stepwise;
        self.with_exemplars(format!("{}{}", family.system, family.output_format), family)
    }

    /// System prompt for `cot`: the single rules with the reasoning output block
    pub fn cot_system(&self) -> String {
        let family = &self.templates.single;
        let rules = self.with_exemplars(family.system.clone(), family);
        format!("{}\n{}", rules, self.templates.cot.instruction)
    }

    pub fn reflection_system(&self) -> String {
        self.single_system()
    }

    pub fn reflection_critique(&self) -> &str {
        &self.templates.reflection.critique
    }

    /// `[TITLE] …\n[ABSTRACT] …`
    pub fn record_prompt(&self, record: &Record) -> String {
        format!(
            "[TITLE] {}\n[ABSTRACT] {}",
            record.title.trim(),
            record.abstract_text.trim()
        )
    }

    /// Question for step 1, 2 or 3, with the record text only when asked for
    pub fn step_prompt(&self, step: u8, record: &Record, include_record: bool) -> String {
        let context = if include_record {
            format!("{}\n", self.record_prompt(record))
        } else {
            String::new()
        };

        let question = match step {
            1 => "Step 1: Urban renewal study? Output only 1 or 0.",
            2 => "Step 2: Spatial study? Output only 1 or 0.",
            _ => "Step 3: Output spatial level and spatial description, TAB-separated.",
        };

        format!("{}{}", context, question)
    }

    fn with_exemplars(&self, base: String, family: &FamilyTemplate) -> String {
        let exemplars = match self.shot_mode {
            ShotMode::Zero => return base,
            ShotMode::One => &family.one_shot,
            ShotMode::Few => &family.few_shot,
        };

        if exemplars.trim().is_empty() {
            tracing::debug!(
                "No {}-shot exemplars configured, using the zero-shot prompt",
                self.shot_mode
            );
            return base;
        }

        format!("{}{}", base, exemplars)
    }
}
