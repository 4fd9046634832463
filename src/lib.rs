//! Student performance grading: normalizes roster spreadsheets into a
//! canonical schema, computes weighted composite scores and letter grades,
//! and answers filter/sort queries over the graded set.

pub mod calculator;
pub mod config;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod report;
pub mod repository;
pub mod session;
pub mod stats;
pub mod table;
pub mod validator;

pub use calculator::{GradeBand, GradeCalculator, GradeScale, Renormalize, Weights};
pub use config::Config;
pub use error::{ConfigError, LoadError};
pub use models::{Grade, GradeField, Grading, Metric, NumericField, Record};
pub use normalizer::{detect_layout, ColumnMapping, ScoreNormalizer};
pub use pipeline::{load, to_records, to_table};
pub use repository::{FilterSpec, RecordRepository, SortKey};
pub use session::Session;
pub use table::{RawGrid, Table};
pub use validator::{validate, CanonicalTable};
