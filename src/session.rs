use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::calculator::{GradeBand, GradeCalculator, GradeScale};
use crate::config::Config;
use crate::error::{ConfigError, LoadError};
use crate::models::{Grade, Metric, Record};
use crate::normalizer::ScoreNormalizer;
use crate::pipeline;
use crate::repository::RecordRepository;
use crate::table::RawGrid;

/// Application state for one user session: its own calculator settings and
/// the record set currently on display.
#[derive(Debug, Clone)]
pub struct Session {
    calculator: GradeCalculator,
    normalizer: ScoreNormalizer,
    repository: RecordRepository,
    /// Extra columns of the loaded source, in source order.
    extra_columns: Vec<String>,
    improvement_grades: Vec<Grade>,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            calculator: config.calculator()?,
            normalizer: config.normalizer(),
            repository: RecordRepository::default(),
            extra_columns: Vec::new(),
            improvement_grades: config.grading.improvement_grades.clone(),
        })
    }

    pub fn calculator(&self) -> &GradeCalculator {
        &self.calculator
    }

    pub fn repository(&self) -> &RecordRepository {
        &self.repository
    }

    pub fn records(&self) -> &[Record] {
        self.repository.records()
    }

    pub fn improvement_grades(&self) -> &[Grade] {
        &self.improvement_grades
    }

    /// Load, grade and swap in a new record set. On error the previous set
    /// stays in place.
    pub fn load_path(&mut self, path: &Path) -> Result<usize, LoadError> {
        let grid = RawGrid::from_path(path)?;
        self.load_grid(&grid)
    }

    pub fn load_grid(&mut self, grid: &RawGrid) -> Result<usize, LoadError> {
        let table = pipeline::load_grid(grid, &self.normalizer)?;
        let records = pipeline::to_records(&table, &self.calculator);
        let count = records.len();
        self.repository.replace(records);
        self.extra_columns = table.extra_columns;
        info!(count, "session records replaced");
        Ok(count)
    }

    pub fn update_weights<I>(&mut self, updates: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (Metric, f64)>,
    {
        self.calculator.update_weights(updates)?;
        self.regrade();
        Ok(())
    }

    pub fn update_grade_scale(&mut self, scale: GradeScale) {
        self.calculator.update_grade_scale(scale);
        self.regrade();
    }

    pub fn merge_grade_scale(&mut self, updates: &[GradeBand]) -> Result<(), ConfigError> {
        self.calculator.merge_grade_scale(updates)?;
        self.regrade();
        Ok(())
    }

    fn regrade(&mut self) {
        let records = self.repository.replace(Vec::new());
        self.repository.replace(self.calculator.grade_batch(records));
    }

    pub fn export_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        pipeline::write_csv(self.records(), &self.extra_columns, writer)
    }

    pub fn export_json<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        pipeline::write_json(self.records(), writer)
    }
}
