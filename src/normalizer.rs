//! Reconciles arbitrary roster layouts into the canonical five-column
//! schema.
//!
//! Column roles are guessed from header keywords (see [`detect_layout`]).
//! Sheets exported with title or banner rows above the real header are
//! handled by re-reading the grid with more leading rows skipped until the
//! guess looks right. Co-curricular and behavior columns may hold category
//! codes instead of numbers; those are translated through fixed score tables.
//! Nothing in here fails: gaps are filled with defaults and the validator
//! decides what survives.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::{
    ACADEMIC_SCORE, CANONICAL_COLUMNS, COCURRICULAR_SCORE, DERIVED_COLUMNS, DISCIPLINE_SCORE,
    NAME, STUDENT_ID,
};
use crate::table::{RawGrid, Table};

pub const DEFAULT_SCORE: f64 = 70.0;
pub const DEFAULT_BEHAVIOR_SCORE: f64 = 80.0;
pub const DEFAULT_SKIP_ATTEMPTS: usize = 9;
pub const UNKNOWN_NAME: &str = "Unknown";

const ID_KEYWORDS: [&str; 2] = ["id", "roll"];
const NAME_KEYWORDS: [&str; 1] = ["name"];
const COCURRICULAR_KEYWORDS: [&str; 4] = ["cca", "extra", "activity", "curricular"];
const DISCIPLINE_KEYWORDS: [&str; 3] = ["behav", "disc", "conduct"];
const ACADEMIC_KEYWORDS: [&str; 4] = ["acad", "score", "mark", "gpa"];
const TEN_POINT_MARKERS: [&str; 4] = ["gpa", "/10", "out of 10", "10 point"];

const ACTIVITY_SCORES: [(&str, f64); 10] = [
    ("MUSIC", 90.0),
    ("DRAMA", 85.0),
    ("SPORTS", 95.0),
    ("ART", 88.0),
    ("DESIGN", 86.0),
    ("DANCE", 87.0),
    ("ATHLETE", 95.0),
    ("DEBATE", 92.0),
    ("LITERATURE", 89.0),
    ("DESIGNING", 86.0),
];

const BEHAVIOR_SCORES: [(&str, f64); 6] = [
    ("A", 95.0),
    ("B", 85.0),
    ("C", 75.0),
    ("O", 80.0),
    ("E", 90.0),
    ("X", 70.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcademicScaleSetting {
    /// Rescale only when the academic header says it is out of ten.
    #[default]
    Auto,
    Percent,
    TenPoint,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizerSettings {
    pub default_score: f64,
    pub behavior_fallback: f64,
    pub max_skip_attempts: usize,
    pub academic_scale: AcademicScaleSetting,
    /// Merged over the built-in activity table; keys are case-insensitive.
    pub activity_scores: BTreeMap<String, f64>,
    /// Merged over the built-in behavior table; keys are case-insensitive.
    pub behavior_scores: BTreeMap<String, f64>,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            default_score: DEFAULT_SCORE,
            behavior_fallback: DEFAULT_BEHAVIOR_SCORE,
            max_skip_attempts: DEFAULT_SKIP_ATTEMPTS,
            academic_scale: AcademicScaleSetting::Auto,
            activity_scores: BTreeMap::new(),
            behavior_scores: BTreeMap::new(),
        }
    }
}

/// Which source column plays which canonical role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pub student_id: Option<usize>,
    pub name: Option<usize>,
    pub academic: Option<usize>,
    pub cocurricular: Option<usize>,
    pub discipline: Option<usize>,
    /// Roles found by exact name or keyword, not by position.
    pub keyword_matches: usize,
    /// Set when id or name was not found by name or keyword.
    pub positional_fallback: bool,
}

impl ColumnMapping {
    fn assigned(&self) -> [Option<usize>; 5] {
        [
            self.student_id,
            self.name,
            self.academic,
            self.cocurricular,
            self.discipline,
        ]
    }

    pub fn is_assigned(&self, column: usize) -> bool {
        self.assigned().contains(&Some(column))
    }

    /// Both identity columns were found by keyword.
    pub fn has_identity(&self) -> bool {
        self.student_id.is_some() && self.name.is_some() && !self.positional_fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcademicScale {
    Percent,
    TenPoint,
}

impl AcademicScale {
    fn factor(self) -> f64 {
        match self {
            AcademicScale::Percent => 1.0,
            AcademicScale::TenPoint => 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormat {
    pub academic_scale: AcademicScale,
}

fn contains_any(header: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| header.contains(keyword))
}

/// Two-letter keywords must stand alone as a word; "Candidate" and "Midterm"
/// are not id columns.
fn matches_keyword(header: &str, keyword: &str) -> bool {
    if keyword.len() > 2 {
        return header.contains(keyword);
    }
    header
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == keyword)
}

fn matches_any(header: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| matches_keyword(header, keyword))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    StudentId,
    Name,
    Cocurricular,
    Discipline,
    Academic,
}

impl Role {
    // "discipline_score" must reach discipline before its "score" suffix
    // reaches academic.
    const PRIORITY: [Role; 5] = [
        Role::StudentId,
        Role::Name,
        Role::Cocurricular,
        Role::Discipline,
        Role::Academic,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Role::StudentId => &ID_KEYWORDS,
            Role::Name => &NAME_KEYWORDS,
            Role::Cocurricular => &COCURRICULAR_KEYWORDS,
            Role::Discipline => &DISCIPLINE_KEYWORDS,
            Role::Academic => &ACADEMIC_KEYWORDS,
        }
    }

    fn slot(self, mapping: &mut ColumnMapping) -> &mut Option<usize> {
        match self {
            Role::StudentId => &mut mapping.student_id,
            Role::Name => &mut mapping.name,
            Role::Cocurricular => &mut mapping.cocurricular,
            Role::Discipline => &mut mapping.discipline,
            Role::Academic => &mut mapping.academic,
        }
    }
}

/// Guess column roles from header names.
///
/// Exact canonical names win. Every other header tries each role whose
/// keywords it contains and takes the first one still free, so "Extra Marks"
/// lands on academic once a co-curricular column is known. Derived columns
/// from earlier exports are never picked. A missing id falls back to the
/// first column and a missing name to the second, each only when that column
/// is not already taken.
pub fn detect_layout(table: &Table) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    let headers: Vec<String> = table
        .headers
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    for (idx, header) in headers.iter().enumerate() {
        let slot = match header.as_str() {
            STUDENT_ID => &mut mapping.student_id,
            NAME => &mut mapping.name,
            ACADEMIC_SCORE => &mut mapping.academic,
            COCURRICULAR_SCORE => &mut mapping.cocurricular,
            DISCIPLINE_SCORE => &mut mapping.discipline,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(idx);
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        if mapping.is_assigned(idx) || DERIVED_COLUMNS.contains(&header.as_str()) {
            continue;
        }
        let free = Role::PRIORITY
            .into_iter()
            .filter(|role| matches_any(header, role.keywords()))
            .find(|role| role.slot(&mut mapping).is_none());
        if let Some(role) = free {
            *role.slot(&mut mapping) = Some(idx);
        }
    }

    mapping.keyword_matches = mapping.assigned().iter().flatten().count();

    for (role, position) in [(Role::StudentId, 0), (Role::Name, 1)] {
        if role.slot(&mut mapping).is_some() {
            continue;
        }
        mapping.positional_fallback = true;
        if position < headers.len() && !mapping.is_assigned(position) {
            *role.slot(&mut mapping) = Some(position);
        }
    }

    mapping
}

/// Read the grid with 0, 1, 2, ... leading rows skipped until the header row
/// yields keyword-matched id and name columns among at least five columns.
/// When no attempt gets there, the attempt with the most keyword matches wins
/// (earliest on ties).
pub fn locate_header(grid: &RawGrid, max_attempts: usize) -> (Table, ColumnMapping) {
    let mut best: Option<(Table, ColumnMapping)> = None;

    for skip in 0..max_attempts.max(1) {
        if skip >= grid.rows.len() {
            break;
        }
        let table = grid.to_table(skip);
        let mapping = detect_layout(&table);
        debug!(skip, width = table.width(), ?mapping, "layout attempt");

        if mapping.has_identity() && table.width() >= CANONICAL_COLUMNS.len() {
            info!(skip, "header row located");
            return (table, mapping);
        }
        let better = best
            .as_ref()
            .map_or(true, |(_, kept)| mapping.keyword_matches > kept.keyword_matches);
        if better {
            best = Some((table, mapping));
        }
    }

    warn!(
        source = %grid.source_name,
        "no confident header row found, using best attempt"
    );
    best.unwrap_or_default()
}

/// Decide how to read the academic column. Rescaling happens only when the
/// settings demand it or the header explicitly says the column is out of ten.
pub fn detect_format(
    table: &Table,
    mapping: &ColumnMapping,
    setting: AcademicScaleSetting,
) -> SourceFormat {
    let academic_scale = match setting {
        AcademicScaleSetting::Percent => AcademicScale::Percent,
        AcademicScaleSetting::TenPoint => AcademicScale::TenPoint,
        AcademicScaleSetting::Auto => {
            let header = mapping
                .academic
                .and_then(|idx| table.headers.get(idx))
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or_default();
            if contains_any(&header, &TEN_POINT_MARKERS) {
                AcademicScale::TenPoint
            } else {
                AcademicScale::Percent
            }
        }
    };
    debug!(?academic_scale, "source format");
    SourceFormat { academic_scale }
}

/// True when every canonical column is present under its exact name.
pub fn is_canonical(table: &Table) -> bool {
    CANONICAL_COLUMNS
        .iter()
        .all(|column| table.column(column).is_some())
}

fn format_score(value: f64) -> String {
    format!("{value}")
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone)]
pub struct ScoreNormalizer {
    settings: NormalizerSettings,
    activity_scores: BTreeMap<String, f64>,
    behavior_scores: BTreeMap<String, f64>,
}

impl Default for ScoreNormalizer {
    fn default() -> Self {
        Self::new(NormalizerSettings::default())
    }
}

impl ScoreNormalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        let mut activity_scores: BTreeMap<String, f64> = ACTIVITY_SCORES
            .iter()
            .map(|(code, score)| (code.to_string(), *score))
            .collect();
        for (code, score) in &settings.activity_scores {
            activity_scores.insert(code.trim().to_ascii_uppercase(), *score);
        }

        let mut behavior_scores: BTreeMap<String, f64> = BEHAVIOR_SCORES
            .iter()
            .map(|(code, score)| (code.to_string(), *score))
            .collect();
        for (code, score) in &settings.behavior_scores {
            behavior_scores.insert(code.trim().to_ascii_uppercase(), *score);
        }

        Self {
            settings,
            activity_scores,
            behavior_scores,
        }
    }

    pub fn settings(&self) -> &NormalizerSettings {
        &self.settings
    }

    /// Score for a co-curricular cell. Numbers pass through; comma-separated
    /// activity codes average their table scores, unknown codes counting as
    /// the default score.
    pub fn activity_score(&self, value: &str) -> f64 {
        if let Some(number) = parse_number(value) {
            return number;
        }

        let scores: Vec<f64> = value
            .split(',')
            .map(|part| part.trim().to_ascii_uppercase())
            .filter(|part| !part.is_empty())
            .map(|code| {
                self.activity_scores
                    .get(&code)
                    .copied()
                    .unwrap_or(self.settings.default_score)
            })
            .collect();

        if scores.is_empty() {
            self.settings.default_score
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
    }

    pub fn behavior_score(&self, value: &str) -> f64 {
        if let Some(number) = parse_number(value) {
            return number;
        }
        self.behavior_scores
            .get(&value.trim().to_ascii_uppercase())
            .copied()
            .unwrap_or(self.settings.behavior_fallback)
    }

    /// Locate the header, map the columns and produce a canonical table.
    pub fn normalize(&self, grid: &RawGrid) -> Table {
        let (table, mapping) = locate_header(grid, self.settings.max_skip_attempts);
        let format = detect_format(&table, &mapping, self.settings.academic_scale);
        self.normalize_table(&table, &mapping, format)
    }

    pub fn normalize_table(
        &self,
        table: &Table,
        mapping: &ColumnMapping,
        format: SourceFormat,
    ) -> Table {
        for (column, idx) in [
            (ACADEMIC_SCORE, mapping.academic),
            (COCURRICULAR_SCORE, mapping.cocurricular),
            (DISCIPLINE_SCORE, mapping.discipline),
        ] {
            if idx.is_none() {
                warn!(
                    column,
                    default = self.settings.default_score,
                    "column not found, filling with default score"
                );
            }
        }
        if mapping.name.is_none() {
            warn!("name column not found, using placeholder names");
        }

        let extras: Vec<usize> = (0..table.width())
            .filter(|idx| !mapping.is_assigned(*idx))
            .collect();

        // Without an id column there is nothing to key records on; leave the
        // column out and let validation report it.
        if mapping.student_id.is_none() {
            warn!("no column usable as student id");
        }
        let mut headers: Vec<String> = CANONICAL_COLUMNS
            .iter()
            .filter(|c| mapping.student_id.is_some() || **c != STUDENT_ID)
            .map(|c| c.to_string())
            .collect();
        headers.extend(extras.iter().map(|idx| table.headers[*idx].clone()));
        let mut output = Table::new(headers);

        let default_score = format_score(self.settings.default_score);
        let mut dropped = 0usize;

        for row in 0..table.len() {
            let id = match mapping.student_id {
                Some(idx) => match table.cell(row, idx) {
                    Some(id) => Some(id.to_string()),
                    None => {
                        dropped += 1;
                        continue;
                    }
                },
                None => None,
            };
            let name = match mapping.name {
                Some(idx) => match table.cell(row, idx) {
                    Some(name) => name.to_string(),
                    None => {
                        dropped += 1;
                        continue;
                    }
                },
                None => UNKNOWN_NAME.to_string(),
            };

            let academic = match mapping.academic {
                Some(idx) => {
                    let raw = table.cell(row, idx).unwrap_or_default();
                    match parse_number(raw) {
                        Some(value) => format_score(value * format.academic_scale.factor()),
                        None => raw.to_string(),
                    }
                }
                None => default_score.clone(),
            };
            let cocurricular = match mapping.cocurricular {
                Some(idx) => format_score(
                    self.activity_score(table.cell(row, idx).unwrap_or_default()),
                ),
                None => default_score.clone(),
            };
            let discipline = match mapping.discipline {
                Some(idx) => format_score(
                    self.behavior_score(table.cell(row, idx).unwrap_or_default()),
                ),
                None => default_score.clone(),
            };

            let mut cells: Vec<String> = id.into_iter().collect();
            cells.extend([name, academic, cocurricular, discipline]);
            cells.extend(
                extras
                    .iter()
                    .map(|idx| table.rows[row].get(*idx).cloned().unwrap_or_default()),
            );
            output.rows.push(cells);
        }

        if dropped > 0 {
            warn!(dropped, "rows without id or name dropped during normalization");
        }
        info!(rows = output.len(), "normalized source table");
        output
    }
}
