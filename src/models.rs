use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const STUDENT_ID: &str = "student_id";
pub const NAME: &str = "name";
pub const ACADEMIC_SCORE: &str = "academic_score";
pub const COCURRICULAR_SCORE: &str = "cocurricular_score";
pub const DISCIPLINE_SCORE: &str = "discipline_score";

pub const CANONICAL_COLUMNS: [&str; 5] = [
    STUDENT_ID,
    NAME,
    ACADEMIC_SCORE,
    COCURRICULAR_SCORE,
    DISCIPLINE_SCORE,
];

/// Columns written on export and recomputed on every load. The `overall_*`
/// spellings come from older exports.
pub const DERIVED_COLUMNS: [&str; 7] = [
    "composite_score",
    "academic_grade",
    "cocurricular_grade",
    "discipline_grade",
    "composite_grade",
    "overall_score",
    "overall_grade",
];

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        MIN_SCORE
    } else {
        value.clamp(MIN_SCORE, MAX_SCORE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Academic,
    Cocurricular,
    Discipline,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Academic, Metric::Cocurricular, Metric::Discipline];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Academic => "academic",
            Metric::Cocurricular => "cocurricular",
            Metric::Discipline => "discipline",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Metric::Academic => ACADEMIC_SCORE,
            Metric::Cocurricular => COCURRICULAR_SCORE,
            Metric::Discipline => DISCIPLINE_SCORE,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Letter grades, declared lowest first so the derived ordering matches
/// grade rank (`Grade::APlus > Grade::F`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "F")]
    F,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl Grade {
    /// Highest grade first.
    pub const ALL: [Grade; 12] = [
        Grade::APlus,
        Grade::A,
        Grade::AMinus,
        Grade::BPlus,
        Grade::B,
        Grade::BMinus,
        Grade::CPlus,
        Grade::C,
        Grade::CMinus,
        Grade::DPlus,
        Grade::D,
        Grade::F,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::DPlus => "D+",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Grade {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Grade::ALL
            .into_iter()
            .find(|grade| grade.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownGrade(s.to_string()))
    }
}

/// Fields derived by the grade calculator. Held as a unit so a record is
/// either fully graded or not graded at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Grading {
    pub composite_score: f64,
    pub academic_grade: Grade,
    pub cocurricular_grade: Grade,
    pub discipline_grade: Grade,
    pub composite_grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(rename = "student_id")]
    id: String,
    name: String,
    #[serde(rename = "academic_score")]
    academic: f64,
    #[serde(rename = "cocurricular_score")]
    cocurricular: f64,
    #[serde(rename = "discipline_score")]
    discipline: f64,
    #[serde(flatten)]
    grading: Option<Grading>,
    #[serde(flatten)]
    pub extra_attributes: BTreeMap<String, String>,
}

impl Record {
    /// Scores are clamped into [0, 100]; NaN becomes 0.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        academic: f64,
        cocurricular: f64,
        discipline: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            academic: clamp_score(academic),
            cocurricular: clamp_score(cocurricular),
            discipline: clamp_score(discipline),
            grading: None,
            extra_attributes: BTreeMap::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.extra_attributes = attributes;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Academic => self.academic,
            Metric::Cocurricular => self.cocurricular,
            Metric::Discipline => self.discipline,
        }
    }

    pub fn academic(&self) -> f64 {
        self.academic
    }

    pub fn cocurricular(&self) -> f64 {
        self.cocurricular
    }

    pub fn discipline(&self) -> f64 {
        self.discipline
    }

    pub fn grading(&self) -> Option<&Grading> {
        self.grading.as_ref()
    }

    pub fn is_graded(&self) -> bool {
        self.grading.is_some()
    }

    pub(crate) fn set_grading(&mut self, grading: Grading) {
        self.grading = Some(grading);
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.extra_attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra_attributes.insert(key.into(), value.into());
    }

    pub fn numeric(&self, field: NumericField) -> Option<f64> {
        match field {
            NumericField::Academic => Some(self.academic),
            NumericField::Cocurricular => Some(self.cocurricular),
            NumericField::Discipline => Some(self.discipline),
            NumericField::Composite => self.grading.map(|g| g.composite_score),
        }
    }

    pub fn grade(&self, field: GradeField) -> Option<Grade> {
        self.grading.map(|g| match field {
            GradeField::Academic => g.academic_grade,
            GradeField::Cocurricular => g.cocurricular_grade,
            GradeField::Discipline => g.discipline_grade,
            GradeField::Composite => g.composite_grade,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    Academic,
    Cocurricular,
    Discipline,
    Composite,
}

impl NumericField {
    pub const ALL: [NumericField; 4] = [
        NumericField::Academic,
        NumericField::Cocurricular,
        NumericField::Discipline,
        NumericField::Composite,
    ];

    pub fn column(self) -> &'static str {
        match self {
            NumericField::Academic => ACADEMIC_SCORE,
            NumericField::Cocurricular => COCURRICULAR_SCORE,
            NumericField::Discipline => DISCIPLINE_SCORE,
            NumericField::Composite => "composite_score",
        }
    }
}

impl From<Metric> for NumericField {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Academic => NumericField::Academic,
            Metric::Cocurricular => NumericField::Cocurricular,
            Metric::Discipline => NumericField::Discipline,
        }
    }
}

impl FromStr for NumericField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "academic" | "academic_score" => Ok(NumericField::Academic),
            "cocurricular" | "cocurricular_score" => Ok(NumericField::Cocurricular),
            "discipline" | "discipline_score" => Ok(NumericField::Discipline),
            "composite" | "composite_score" | "overall" | "overall_score" => {
                Ok(NumericField::Composite)
            }
            other => Err(format!("unknown score field {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GradeField {
    Academic,
    Cocurricular,
    Discipline,
    Composite,
}

impl GradeField {
    pub const ALL: [GradeField; 4] = [
        GradeField::Academic,
        GradeField::Cocurricular,
        GradeField::Discipline,
        GradeField::Composite,
    ];

    pub fn column(self) -> &'static str {
        match self {
            GradeField::Academic => "academic_grade",
            GradeField::Cocurricular => "cocurricular_grade",
            GradeField::Discipline => "discipline_grade",
            GradeField::Composite => "composite_grade",
        }
    }
}

impl FromStr for GradeField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "academic_grade" => Ok(GradeField::Academic),
            "cocurricular_grade" => Ok(GradeField::Cocurricular),
            "discipline_grade" => Ok(GradeField::Discipline),
            "composite_grade" | "overall_grade" => Ok(GradeField::Composite),
            other => Err(format!("unknown grade field {other:?}")),
        }
    }
}
