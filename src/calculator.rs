use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::models::{Grade, Grading, Metric, Record};

pub const DEFAULT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub academic: f64,
    pub cocurricular: f64,
    pub discipline: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            academic: 0.5,
            cocurricular: 0.3,
            discipline: 0.2,
        }
    }
}

impl Weights {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Academic => self.academic,
            Metric::Cocurricular => self.cocurricular,
            Metric::Discipline => self.discipline,
        }
    }

    fn set(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::Academic => self.academic = value,
            Metric::Cocurricular => self.cocurricular = value,
            Metric::Discipline => self.discipline = value,
        }
    }

    pub fn total(&self) -> f64 {
        Metric::ALL.iter().map(|m| self.get(*m)).sum()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for metric in Metric::ALL {
            check_weight(metric, self.get(metric))?;
        }
        Ok(())
    }
}

fn check_weight(metric: Metric, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight {
            metric: metric.to_string(),
            value,
        })
    }
}

/// When `update_weights` rescales the weights so they sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Renormalize {
    Always,
    Never,
    WhenOff { tolerance: f64 },
}

impl Default for Renormalize {
    fn default() -> Self {
        Renormalize::WhenOff {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub threshold: f64,
    pub grade: Grade,
}

impl GradeBand {
    pub fn new(threshold: f64, grade: Grade) -> Self {
        Self { threshold, grade }
    }
}

/// Inclusive lower thresholds, highest first, always ending in a 0 band.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeScale {
    bands: Vec<GradeBand>,
}

impl GradeScale {
    pub fn new(mut bands: Vec<GradeBand>) -> Result<Self, ConfigError> {
        if bands.is_empty() {
            return Err(ConfigError::InvalidScale("no grade bands".to_string()));
        }
        if let Some(band) = bands.iter().find(|b| !b.threshold.is_finite()) {
            return Err(ConfigError::InvalidScale(format!(
                "threshold for {} is not a finite number",
                band.grade
            )));
        }
        bands.sort_by(|a, b| b.threshold.total_cmp(&a.threshold));
        for (idx, band) in bands.iter().enumerate() {
            if bands[..idx].iter().any(|other| other.grade == band.grade) {
                return Err(ConfigError::InvalidScale(format!(
                    "grade {} appears more than once",
                    band.grade
                )));
            }
        }
        let lowest = bands[bands.len() - 1].threshold;
        if lowest != 0.0 {
            return Err(ConfigError::InvalidScale(format!(
                "lowest threshold must be 0, got {lowest}"
            )));
        }
        Ok(Self { bands })
    }

    pub fn twelve_band() -> Self {
        Self {
            bands: vec![
                GradeBand::new(95.0, Grade::APlus),
                GradeBand::new(90.0, Grade::A),
                GradeBand::new(85.0, Grade::AMinus),
                GradeBand::new(80.0, Grade::BPlus),
                GradeBand::new(75.0, Grade::B),
                GradeBand::new(70.0, Grade::BMinus),
                GradeBand::new(65.0, Grade::CPlus),
                GradeBand::new(60.0, Grade::C),
                GradeBand::new(55.0, Grade::CMinus),
                GradeBand::new(50.0, Grade::DPlus),
                GradeBand::new(45.0, Grade::D),
                GradeBand::new(0.0, Grade::F),
            ],
        }
    }

    pub fn five_band() -> Self {
        Self {
            bands: vec![
                GradeBand::new(90.0, Grade::A),
                GradeBand::new(80.0, Grade::B),
                GradeBand::new(70.0, Grade::C),
                GradeBand::new(60.0, Grade::D),
                GradeBand::new(0.0, Grade::F),
            ],
        }
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    /// Grades in scale order, highest first.
    pub fn grades(&self) -> impl Iterator<Item = Grade> + '_ {
        self.bands.iter().map(|b| b.grade)
    }

    pub fn grade_for(&self, score: f64) -> Grade {
        self.bands
            .iter()
            .find(|band| band.threshold <= score)
            .or_else(|| self.bands.last())
            .map(|band| band.grade)
            .unwrap_or(Grade::F)
    }

    /// Overwrite thresholds of grades present in `updates`, add new grades,
    /// keep everything else.
    pub fn merged(&self, updates: &[GradeBand]) -> Result<Self, ConfigError> {
        let mut bands = self.bands.clone();
        for update in updates {
            match bands.iter_mut().find(|b| b.grade == update.grade) {
                Some(existing) => existing.threshold = update.threshold,
                None => bands.push(*update),
            }
        }
        Self::new(bands)
    }
}

impl Default for GradeScale {
    fn default() -> Self {
        Self::twelve_band()
    }
}

/// Turns raw scores into a composite score and letter grades. Holds only
/// configuration; graded records are handed back to the caller.
#[derive(Debug, Clone, Default)]
pub struct GradeCalculator {
    weights: Weights,
    scale: GradeScale,
    renormalize: Renormalize,
}

impl GradeCalculator {
    pub fn new(weights: Weights, scale: GradeScale) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self {
            weights,
            scale,
            renormalize: Renormalize::default(),
        })
    }

    pub fn with_renormalize(mut self, renormalize: Renormalize) -> Self {
        self.renormalize = renormalize;
        self
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn scale(&self) -> &GradeScale {
        &self.scale
    }

    pub fn compute_composite(&self, record: &Record) -> f64 {
        Metric::ALL
            .iter()
            .map(|metric| self.weights.get(*metric) * record.score(*metric))
            .sum()
    }

    pub fn score_to_grade(&self, score: f64) -> Grade {
        self.scale.grade_for(score)
    }

    pub fn grade_record(&self, mut record: Record) -> Record {
        let composite_score = self.compute_composite(&record);
        record.set_grading(Grading {
            composite_score,
            academic_grade: self.score_to_grade(record.academic()),
            cocurricular_grade: self.score_to_grade(record.cocurricular()),
            discipline_grade: self.score_to_grade(record.discipline()),
            composite_grade: self.score_to_grade(composite_score),
        });
        record
    }

    pub fn grade_batch(&self, records: Vec<Record>) -> Vec<Record> {
        records
            .into_iter()
            .map(|record| self.grade_record(record))
            .collect()
    }

    /// Merge `updates` into the current weights by metric, then renormalize
    /// according to the configured policy. Nothing changes if any update is
    /// invalid.
    pub fn update_weights<I>(&mut self, updates: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (Metric, f64)>,
    {
        let mut next = self.weights;
        for (metric, value) in updates {
            check_weight(metric, value)?;
            next.set(metric, value);
        }

        let total = next.total();
        let rescale = match self.renormalize {
            Renormalize::Always => true,
            Renormalize::Never => false,
            Renormalize::WhenOff { tolerance } => (total - 1.0).abs() > tolerance,
        };

        if rescale {
            if total > 0.0 {
                debug!(total, "renormalizing weights");
                for metric in Metric::ALL {
                    next.set(metric, next.get(metric) / total);
                }
            } else {
                warn!("all weights are zero, leaving them unnormalized");
            }
        }

        self.weights = next;
        Ok(())
    }

    /// Replace the grade scale wholesale.
    pub fn update_grade_scale(&mut self, scale: GradeScale) {
        self.scale = scale;
    }

    pub fn merge_grade_scale(&mut self, updates: &[GradeBand]) -> Result<(), ConfigError> {
        self.scale = self.scale.merged(updates)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::new("S001", "John Doe", 85.0, 75.0, 90.0)
    }

    #[test]
    fn composite_uses_default_weights() {
        let calc = GradeCalculator::default();
        let graded = calc.grade_record(sample());
        let grading = graded.grading().unwrap();
        assert!((grading.composite_score - 83.0).abs() < 1e-9);
        assert_eq!(grading.composite_grade, Grade::BPlus);
        assert_eq!(grading.academic_grade, Grade::AMinus);
        assert_eq!(grading.cocurricular_grade, Grade::B);
        assert_eq!(grading.discipline_grade, Grade::A);
    }

    #[test]
    fn thresholds_are_inclusive_lower_bounds() {
        let calc = GradeCalculator::default();
        assert_eq!(calc.score_to_grade(95.0), Grade::APlus);
        assert_eq!(calc.score_to_grade(94.999), Grade::A);
        assert_eq!(calc.score_to_grade(45.0), Grade::D);
        assert_eq!(calc.score_to_grade(44.99), Grade::F);
        assert_eq!(calc.score_to_grade(0.0), Grade::F);
        assert_eq!(calc.score_to_grade(100.0), Grade::APlus);
    }

    #[test]
    fn grades_never_decrease_with_score() {
        for scale in [GradeScale::twelve_band(), GradeScale::five_band()] {
            let mut previous = scale.grade_for(0.0);
            for step in 1..=1000 {
                let grade = scale.grade_for(step as f64 / 10.0);
                assert!(grade >= previous);
                previous = grade;
            }
        }
    }

    #[test]
    fn regrading_is_idempotent() {
        let calc = GradeCalculator::default();
        let once = calc.grade_batch(vec![sample(), Record::new("S2", "Ana", 40.0, 99.0, 61.0)]);
        let twice = calc.grade_batch(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn batch_preserves_order() {
        let calc = GradeCalculator::default();
        let graded = calc.grade_batch(vec![
            Record::new("b", "B", 10.0, 10.0, 10.0),
            Record::new("a", "A", 90.0, 90.0, 90.0),
        ]);
        let ids: Vec<&str> = graded.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(graded.iter().all(Record::is_graded));
    }

    #[test]
    fn update_weights_renormalizes_when_off() {
        let mut calc = GradeCalculator::default();
        calc.update_weights([(Metric::Academic, 1.5)]).unwrap();
        assert!((calc.weights().total() - 1.0).abs() < 1e-9);
        assert!((calc.weights().academic - 1.5 / 2.0).abs() < 1e-9);
    }

    #[test]
    fn update_weights_within_tolerance_is_kept() {
        let mut calc = GradeCalculator::default();
        calc.update_weights([(Metric::Academic, 0.505)]).unwrap();
        assert_eq!(calc.weights().academic, 0.505);
    }

    #[test]
    fn never_policy_keeps_raw_weights() {
        let mut calc = GradeCalculator::default().with_renormalize(Renormalize::Never);
        calc.update_weights([(Metric::Discipline, 1.0)]).unwrap();
        assert!((calc.weights().total() - 1.8).abs() < 1e-9);
    }

    #[test]
    fn always_policy_rescales_small_drift() {
        let mut calc = GradeCalculator::default().with_renormalize(Renormalize::Always);
        calc.update_weights([(Metric::Academic, 0.505)]).unwrap();
        assert!((calc.weights().total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn negative_weight_is_rejected_without_side_effects() {
        let mut calc = GradeCalculator::default();
        let err = calc
            .update_weights([(Metric::Academic, 0.9), (Metric::Discipline, -0.1)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWeight { .. }));
        assert_eq!(*calc.weights(), Weights::default());
    }

    #[test]
    fn zero_weights_are_not_divided() {
        let mut calc = GradeCalculator::default();
        calc.update_weights([
            (Metric::Academic, 0.0),
            (Metric::Cocurricular, 0.0),
            (Metric::Discipline, 0.0),
        ])
        .unwrap();
        assert_eq!(calc.weights().total(), 0.0);
    }

    #[test]
    fn scale_requires_zero_band() {
        let err = GradeScale::new(vec![GradeBand::new(50.0, Grade::A)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScale(_)));
        assert!(GradeScale::new(Vec::new()).is_err());
    }

    #[test]
    fn scale_rejects_duplicate_grades() {
        let err = GradeScale::new(vec![
            GradeBand::new(50.0, Grade::A),
            GradeBand::new(0.0, Grade::A),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScale(_)));
    }

    #[test]
    fn scale_is_sorted_on_construction() {
        let scale = GradeScale::new(vec![
            GradeBand::new(0.0, Grade::F),
            GradeBand::new(50.0, Grade::C),
            GradeBand::new(80.0, Grade::A),
        ])
        .unwrap();
        let grades: Vec<Grade> = scale.grades().collect();
        assert_eq!(grades, vec![Grade::A, Grade::C, Grade::F]);
        assert_eq!(scale.grade_for(79.0), Grade::C);
    }

    #[test]
    fn update_grade_scale_replaces_wholesale() {
        let mut calc = GradeCalculator::default();
        calc.update_grade_scale(GradeScale::five_band());
        assert_eq!(calc.score_to_grade(83.0), Grade::B);
        assert_eq!(calc.scale().bands().len(), 5);
    }

    #[test]
    fn merge_grade_scale_moves_existing_thresholds() {
        let mut calc = GradeCalculator::default();
        calc.merge_grade_scale(&[GradeBand::new(82.0, Grade::BPlus)])
            .unwrap();
        assert_eq!(calc.score_to_grade(81.0), Grade::B);
        assert_eq!(calc.score_to_grade(82.0), Grade::BPlus);
        assert_eq!(calc.scale().bands().len(), 12);
    }
}
