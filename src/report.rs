use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::calculator::GradeScale;
use crate::models::{Grade, GradeField, NumericField, Record};
use crate::stats;

fn field_label(field: NumericField) -> &'static str {
    match field {
        NumericField::Academic => "Academic",
        NumericField::Cocurricular => "Co-curricular",
        NumericField::Discipline => "Discipline",
        NumericField::Composite => "Composite",
    }
}

fn student_line(record: &Record) -> String {
    match record.grading() {
        Some(grading) => format!(
            "{} ({}) composite {:.2}, grade {}",
            record.name(),
            record.id(),
            grading.composite_score,
            grading.composite_grade
        ),
        None => format!("{} ({}) not graded", record.name(), record.id()),
    }
}

pub fn build_report(
    source: &str,
    records: &[Record],
    scale: &GradeScale,
    improvement_grades: &[Grade],
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Performance Report");
    let _ = writeln!(
        output,
        "Generated from {} on {}",
        source,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Summary");

    if records.is_empty() {
        let _ = writeln!(output, "No student records loaded.");
        return output;
    }

    let _ = writeln!(output, "- Total students: {}", records.len());
    for (field, summary) in stats::summarize(records) {
        let _ = writeln!(
            output,
            "- {}: mean {:.2}, median {:.2}, std dev {}, range {:.2} to {:.2}",
            field_label(field),
            summary.mean,
            summary.median,
            summary
                .std_dev
                .map(|sd| format!("{sd:.2}"))
                .unwrap_or_else(|| "n/a".to_string()),
            summary.min,
            summary.max
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Composite Grade Distribution");
    for (grade, count) in stats::grade_distribution(records, GradeField::Composite, scale) {
        if count > 0 {
            let _ = writeln!(output, "- {grade}: {count}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Students");
    for record in stats::top_performers(records, 5) {
        let _ = writeln!(output, "- {}", student_line(record));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Improvement");
    let struggling = stats::needing_improvement(records, improvement_grades);
    if struggling.is_empty() {
        let _ = writeln!(output, "No students in the improvement bands.");
    } else {
        for record in struggling {
            let _ = writeln!(output, "- {}", student_line(record));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Largest Score Gaps");
    for (record, gap) in stats::largest_gaps(records, 5) {
        let _ = writeln!(
            output,
            "- {} ({}): gap {:.2} (academic {:.2}, co-curricular {:.2}, discipline {:.2})",
            record.name(),
            record.id(),
            gap,
            record.academic(),
            record.cocurricular(),
            record.discipline()
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Insights");
    match stats::strongest_predictor(records) {
        Some((metric, r)) => {
            let _ = writeln!(
                output,
                "- {metric} scores track the composite most closely (r = {r:.4})."
            );
        }
        None => {
            let _ = writeln!(output, "- Not enough variation to compute correlations.");
        }
    }

    output
}
