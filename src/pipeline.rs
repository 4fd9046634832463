use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use crate::calculator::GradeCalculator;
use crate::error::LoadError;
use crate::models::{GradeField, Record, CANONICAL_COLUMNS};
use crate::normalizer::{is_canonical, ScoreNormalizer};
use crate::table::{RawGrid, Table};
use crate::validator::{validate, CanonicalTable};

/// Read a delimited file and produce a validated canonical table.
pub fn load(path: &Path, normalizer: &ScoreNormalizer) -> Result<CanonicalTable, LoadError> {
    let grid = RawGrid::from_path(path)?;
    load_grid(&grid, normalizer)
}

/// Canonical sources go straight to validation; anything else is normalized
/// first.
pub fn load_grid(grid: &RawGrid, normalizer: &ScoreNormalizer) -> Result<CanonicalTable, LoadError> {
    let direct = grid.to_table(0);
    let table = if is_canonical(&direct) {
        debug!(source = %grid.source_name, "canonical layout");
        direct
    } else {
        debug!(source = %grid.source_name, "non-canonical layout, normalizing");
        normalizer.normalize(grid)
    };

    let canonical = validate(&table)?;
    info!(
        source = %grid.source_name,
        rows = canonical.len(),
        "loaded roster"
    );
    Ok(canonical)
}

pub fn to_records(table: &CanonicalTable, calculator: &GradeCalculator) -> Vec<Record> {
    let records = table
        .rows
        .iter()
        .map(|row| {
            Record::new(
                row.student_id.clone(),
                row.name.clone(),
                row.academic,
                row.cocurricular,
                row.discipline,
            )
            .with_attributes(row.extras.clone())
        })
        .collect();
    calculator.grade_batch(records)
}

/// Inverse of [`to_records`]: canonical columns, derived columns, then extra
/// attributes. `column_order` (usually the source's extra columns) fixes the
/// order of the extras it names; keys it misses follow in first-seen order.
/// Ungraded records leave the derived cells empty.
pub fn to_table(records: &[Record], column_order: &[String]) -> Table {
    let mut extra_columns: Vec<&str> = column_order.iter().map(String::as_str).collect();
    for record in records {
        for key in record.extra_attributes.keys() {
            if !extra_columns.contains(&key.as_str()) {
                extra_columns.push(key);
            }
        }
    }

    let mut headers: Vec<String> = CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect();
    headers.push("composite_score".to_string());
    headers.extend(GradeField::ALL.iter().map(|f| f.column().to_string()));
    headers.extend(extra_columns.iter().map(|c| c.to_string()));

    let mut table = Table::new(headers);
    for record in records {
        let mut row = vec![
            record.id().to_string(),
            record.name().to_string(),
            record.academic().to_string(),
            record.cocurricular().to_string(),
            record.discipline().to_string(),
        ];
        match record.grading() {
            Some(grading) => {
                row.push(grading.composite_score.to_string());
                row.extend(
                    GradeField::ALL
                        .iter()
                        .map(|field| record.grade(*field).map(|g| g.to_string()).unwrap_or_default()),
                );
            }
            None => row.extend(std::iter::repeat(String::new()).take(1 + GradeField::ALL.len())),
        }
        row.extend(
            extra_columns
                .iter()
                .map(|key| record.attribute(key).unwrap_or_default().to_string()),
        );
        table.rows.push(row);
    }
    table
}

pub fn write_csv<W: Write>(
    records: &[Record],
    column_order: &[String],
    writer: W,
) -> csv::Result<()> {
    to_table(records, column_order).write_csv(writer)
}

pub fn write_json<W: Write>(records: &[Record], writer: W) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, records)
}
