use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::conversation_db::MathSolution;
use crate::error::TutorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathDomain {
    NumbersOperations,
    AlgebraFunctions,
    GeometryVectors,
    Trigonometry,
    Calculus,
    StatisticsProbability,
    LinearAlgebra,
}

impl MathDomain {
    pub const ALL: [MathDomain; 7] = [
        MathDomain::NumbersOperations,
        MathDomain::AlgebraFunctions,
        MathDomain::GeometryVectors,
        MathDomain::Trigonometry,
        MathDomain::Calculus,
        MathDomain::StatisticsProbability,
        MathDomain::LinearAlgebra,
    ];

    /// Wire name shared with the client.
    pub fn as_str(&self) -> &'static str {
        match self {
            MathDomain::NumbersOperations => "數與運算基礎",
            MathDomain::AlgebraFunctions => "代數與函數",
            MathDomain::GeometryVectors => "幾何與向量",
            MathDomain::Trigonometry => "三角學",
            MathDomain::Calculus => "微積分初步",
            MathDomain::StatisticsProbability => "數據分析與機率",
            MathDomain::LinearAlgebra => "線性代數初步",
        }
    }
}

impl FromStr for MathDomain {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MathDomain::ALL
            .into_iter()
            .find(|domain| domain.as_str() == s)
            .ok_or_else(|| TutorError::Validation(format!("Unknown math domain '{}'", s)))
    }
}

impl fmt::Display for MathDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Basic,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Basic, Difficulty::Intermediate, Difficulty::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Basic => "基礎",
            Difficulty::Intermediate => "中等",
            Difficulty::Advanced => "進階",
        }
    }
}

impl FromStr for Difficulty {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Difficulty::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| TutorError::Validation(format!("Unknown difficulty '{}'", s)))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse an optional wire value; blank counts as absent.
pub fn parse_optional<T: FromStr<Err = TutorError>>(value: Option<&str>) -> Result<Option<T>, TutorError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::parse)
        .transpose()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MathProblem {
    pub problem: String,
    pub domain: Option<String>,
    pub difficulty: Option<String>,
    #[serde(default)]
    pub specific_concepts: Vec<String>,
    /// Continue this session; a new one is started when absent.
    pub session_id: Option<String>,
}

/// Everything about an image upload except the bytes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageProblem {
    pub domain: Option<String>,
    pub difficulty: Option<String>,
    /// Comma separated.
    pub specific_concepts: Option<String>,
    pub additional_context: Option<String>,
    pub session_id: Option<String>,
}

impl ImageProblem {
    pub fn concepts(&self) -> Vec<String> {
        self.specific_concepts
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionRequest {
    pub session_id: String,
    pub question: String,
    pub step_number: Option<u32>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConceptRequest {
    pub concept_name: String,
    pub domain: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolvedProblem {
    pub session_id: String,
    pub solution: MathSolution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionAnswer {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptExplanation {
    pub concept_name: String,
    pub domain: String,
    pub explanation: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MathConversation {
    pub session_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptMatch {
    pub domain: &'static str,
    pub section: &'static str,
    pub concept: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConceptSearch {
    pub results: Vec<ConceptMatch>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainList {
    pub domains: Vec<&'static str>,
    pub difficulty_levels: Vec<&'static str>,
}

impl DomainList {
    pub fn all() -> Self {
        Self {
            domains: MathDomain::ALL.iter().map(MathDomain::as_str).collect(),
            difficulty_levels: Difficulty::ALL.iter().map(Difficulty::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TutorStatus {
    pub model: String,
    pub conversations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_parse_back() {
        for domain in MathDomain::ALL {
            assert_eq!(domain.as_str().parse::<MathDomain>().unwrap(), domain);
        }
        assert_eq!(" 中等 ".parse::<Difficulty>().unwrap(), Difficulty::Intermediate);
    }

    #[test]
    fn test_unknown_values_are_validation_errors() {
        assert!(matches!("algebra".parse::<MathDomain>(), Err(TutorError::Validation(_))));
        assert!(matches!(parse_optional::<Difficulty>(Some("hard")), Err(TutorError::Validation(_))));
        assert_eq!(parse_optional::<Difficulty>(Some("  ")).unwrap(), None);
        assert_eq!(parse_optional::<MathDomain>(None).unwrap(), None);
    }

    #[test]
    fn test_image_concepts_split_on_commas() {
        let problem = ImageProblem { specific_concepts: Some("判別式, ,因式分解".into()), ..Default::default() };
        assert_eq!(problem.concepts(), vec!["判別式".to_string(), "因式分解".to_string()]);
        assert!(ImageProblem::default().concepts().is_empty());
    }
}
