use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::models::{
    clamp_score, ACADEMIC_SCORE, CANONICAL_COLUMNS, COCURRICULAR_SCORE, DERIVED_COLUMNS,
    DISCIPLINE_SCORE, NAME, STUDENT_ID,
};
use crate::table::Table;

/// One validated input row: identity present, scores numeric and clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    pub student_id: String,
    pub name: String,
    pub academic: f64,
    pub cocurricular: f64,
    pub discipline: f64,
    /// Passthrough columns; empty cells are left out.
    pub extras: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalTable {
    pub rows: Vec<CanonicalRow>,
    /// Passthrough column names in source order.
    pub extra_columns: Vec<String>,
}

impl CanonicalTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn coerce_score(value: Option<&str>) -> Option<f64> {
    value?.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Enforce the canonical schema.
///
/// Fails only when a required column is absent. Rows with an empty id or
/// name, or a score that is empty or not a number, are dropped. Scores are
/// clamped into [0, 100]. Derived columns from earlier exports are discarded.
pub fn validate(table: &Table) -> Result<CanonicalTable, LoadError> {
    let missing: Vec<String> = CANONICAL_COLUMNS
        .iter()
        .filter(|column| table.column(column).is_none())
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::Schema { missing });
    }

    let column = |name: &str| table.column(name).unwrap_or_default();
    let id_col = column(STUDENT_ID);
    let name_col = column(NAME);
    let score_cols = [
        column(ACADEMIC_SCORE),
        column(COCURRICULAR_SCORE),
        column(DISCIPLINE_SCORE),
    ];

    let extra_cols: Vec<(usize, String)> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, header)| {
            let lowered = header.trim().to_ascii_lowercase();
            !CANONICAL_COLUMNS.contains(&lowered.as_str())
                && !DERIVED_COLUMNS.contains(&lowered.as_str())
        })
        .map(|(idx, header)| (idx, header.trim().to_string()))
        .collect();

    let mut rows = Vec::with_capacity(table.len());
    let mut dropped = 0usize;
    let mut clamped = 0usize;

    for row in 0..table.len() {
        let (Some(student_id), Some(name)) = (table.cell(row, id_col), table.cell(row, name_col))
        else {
            dropped += 1;
            continue;
        };
        let scores = score_cols.map(|col| coerce_score(table.cell(row, col)));
        let [Some(academic), Some(cocurricular), Some(discipline)] = scores else {
            debug!(student_id, "row dropped: missing or non-numeric score");
            dropped += 1;
            continue;
        };

        for score in [academic, cocurricular, discipline] {
            if clamp_score(score) != score {
                clamped += 1;
            }
        }

        let extras = extra_cols
            .iter()
            .filter_map(|(idx, header)| {
                table
                    .cell(row, *idx)
                    .map(|value| (header.clone(), value.to_string()))
            })
            .collect();

        rows.push(CanonicalRow {
            student_id: student_id.to_string(),
            name: name.to_string(),
            academic: clamp_score(academic),
            cocurricular: clamp_score(cocurricular),
            discipline: clamp_score(discipline),
            extras,
        });
    }

    if dropped > 0 {
        warn!(dropped, "incomplete rows dropped during validation");
    }
    if clamped > 0 {
        debug!(clamped, "scores clamped into range");
    }
    info!(rows = rows.len(), "validated table");

    Ok(CanonicalTable {
        rows,
        extra_columns: extra_cols.into_iter().map(|(_, header)| header).collect(),
    })
}
