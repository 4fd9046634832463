use serde::Serialize;

use crate::calculator::GradeScale;
use crate::models::{Grade, GradeField, Metric, NumericField, Record};
use crate::repository::{self, FilterSpec, SortKey};

pub const IMPROVEMENT_GRADES: [Grade; 3] = [Grade::DPlus, Grade::D, Grade::F];

/// Spread between best and worst metric above which a profile asks for a
/// focused plan instead of calling the student balanced.
pub const FOCUS_GAP: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` below two values.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

pub fn describe(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std_dev = sample_std_dev(values, mean);

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };

    Some(Summary {
        count,
        mean,
        std_dev,
        min: sorted[0],
        median,
        max: sorted[count - 1],
    })
}

fn sample_std_dev(values: &[f64], mean: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

fn values(records: &[Record], field: NumericField) -> Vec<f64> {
    records.iter().filter_map(|r| r.numeric(field)).collect()
}

/// Summary per numeric field, skipping fields with no values.
pub fn summarize(records: &[Record]) -> Vec<(NumericField, Summary)> {
    NumericField::ALL
        .iter()
        .filter_map(|field| describe(&values(records, *field)).map(|s| (*field, s)))
        .collect()
}

/// Count per grade in scale order, zero counts included.
pub fn grade_distribution(
    records: &[Record],
    field: GradeField,
    scale: &GradeScale,
) -> Vec<(Grade, usize)> {
    scale
        .grades()
        .map(|grade| {
            let count = records
                .iter()
                .filter(|r| r.grade(field) == Some(grade))
                .count();
            (grade, count)
        })
        .collect()
}

/// Pearson correlation over records that have both fields. `None` when there
/// are fewer than two such records or either side has no variance.
pub fn correlation(records: &[Record], a: NumericField, b: NumericField) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|r| Some((r.numeric(a)?, r.numeric(b)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in &pairs {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// The raw metric most correlated (by magnitude) with the composite score.
pub fn strongest_predictor(records: &[Record]) -> Option<(Metric, f64)> {
    Metric::ALL
        .iter()
        .filter_map(|metric| {
            correlation(records, (*metric).into(), NumericField::Composite).map(|r| (*metric, r))
        })
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
}

/// Spread between a record's best and worst raw metric.
pub fn score_gap(record: &Record) -> f64 {
    let scores = Metric::ALL.map(|m| record.score(m));
    let max = scores.iter().copied().fold(f64::MIN, f64::max);
    let min = scores.iter().copied().fold(f64::MAX, f64::min);
    max - min
}

fn metric_spread(record: &Record) -> f64 {
    let scores = Metric::ALL.map(|m| record.score(m));
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    sample_std_dev(&scores, mean).unwrap_or_default()
}

pub fn largest_gaps(records: &[Record], limit: usize) -> Vec<(&Record, f64)> {
    let mut gaps: Vec<(&Record, f64)> = records.iter().map(|r| (r, score_gap(r))).collect();
    gaps.sort_by(|a, b| b.1.total_cmp(&a.1));
    gaps.truncate(limit);
    gaps
}

pub fn top_performers(records: &[Record], limit: usize) -> Vec<&Record> {
    let mut top = repository::sort(
        records.iter().collect(),
        &SortKey::Score(NumericField::Composite),
        false,
    );
    top.truncate(limit);
    top
}

/// Records whose composite grade is in `grades`, weakest first.
pub fn needing_improvement<'a>(records: &'a [Record], grades: &[Grade]) -> Vec<&'a Record> {
    let spec = FilterSpec::new().grades(GradeField::Composite, grades.iter().copied());
    repository::sort(
        repository::filter(records, &spec),
        &SortKey::Score(NumericField::Composite),
        true,
    )
}

/// Records with the most even scores across the three metrics.
pub fn balanced_performers(records: &[Record], limit: usize) -> Vec<&Record> {
    let mut ranked: Vec<(&Record, f64)> = records.iter().map(|r| (r, metric_spread(r))).collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked.into_iter().take(limit).map(|(r, _)| r).collect()
}

/// Mean composite score of the records holding each composite grade, in
/// scale order. Grades nobody holds are left out.
pub fn average_score_by_grade(records: &[Record], scale: &GradeScale) -> Vec<(Grade, f64)> {
    scale
        .grades()
        .filter_map(|grade| {
            let scores: Vec<f64> = records
                .iter()
                .filter(|r| r.grade(GradeField::Composite) == Some(grade))
                .filter_map(|r| r.numeric(NumericField::Composite))
                .collect();
            describe(&scores).map(|summary| (grade, summary.mean))
        })
        .collect()
}

/// Percent of records scoring strictly below `record`, per field. Fields the
/// record has no value for are skipped.
pub fn percentile_ranks(records: &[Record], record: &Record) -> Vec<(NumericField, f64)> {
    NumericField::ALL
        .iter()
        .filter_map(|field| {
            let own = record.numeric(*field)?;
            let pool = values(records, *field);
            if pool.is_empty() {
                return None;
            }
            let lower = pool.iter().filter(|v| **v < own).count();
            Some((*field, lower as f64 * 100.0 / pool.len() as f64))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Standing {
    NeedsIntervention,
    Developing,
    Good,
    Excellent,
}

impl Standing {
    pub fn for_score(score: f64) -> Self {
        if score < 60.0 {
            Standing::NeedsIntervention
        } else if score < 75.0 {
            Standing::Developing
        } else if score < 90.0 {
            Standing::Good
        } else {
            Standing::Excellent
        }
    }

    pub fn advice(self, metric: Metric) -> &'static str {
        match (metric, self) {
            (Metric::Academic, Standing::NeedsIntervention) => {
                "Arrange academic intervention or extra tutoring."
            }
            (Metric::Academic, Standing::Developing) => {
                "Academic work needs improvement; focus study on weak subjects."
            }
            (Metric::Academic, Standing::Good) => {
                "Good academic standing with room to grow in specific subjects."
            }
            (Metric::Academic, Standing::Excellent) => {
                "Excellent academic results; consider enrichment programs."
            }
            (Metric::Cocurricular, Standing::NeedsIntervention) => {
                "Encourage more co-curricular participation to build soft skills."
            }
            (Metric::Cocurricular, Standing::Developing) => {
                "Steer towards activities that match the student's interests."
            }
            (Metric::Cocurricular, Standing::Good) => {
                "Solid co-curricular involvement; consider a leadership role."
            }
            (Metric::Cocurricular, Standing::Excellent) => {
                "Outstanding co-curricular record; encourage mentoring juniors."
            }
            (Metric::Discipline, Standing::NeedsIntervention) => {
                "Behavior needs significant improvement; consider an intervention plan."
            }
            (Metric::Discipline, Standing::Developing) => {
                "Occasional behavior issues; regular counseling may help."
            }
            (Metric::Discipline, Standing::Good) => {
                "Generally good conduct; keep up positive reinforcement."
            }
            (Metric::Discipline, Standing::Excellent) => {
                "Exemplary conduct; a candidate for prefect or monitor roles."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Focus {
    Balanced,
    Gap {
        strongest: Metric,
        weakest: Metric,
        gap: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendations {
    pub standings: Vec<(Metric, Standing)>,
    pub focus: Focus,
}

pub fn recommendations(record: &Record) -> Recommendations {
    let standings = Metric::ALL
        .iter()
        .map(|metric| (*metric, Standing::for_score(record.score(*metric))))
        .collect();

    // First metric wins ties on both ends.
    let mut strongest = Metric::Academic;
    let mut weakest = Metric::Academic;
    for metric in Metric::ALL {
        if record.score(metric) > record.score(strongest) {
            strongest = metric;
        }
        if record.score(metric) < record.score(weakest) {
            weakest = metric;
        }
    }
    let gap = score_gap(record);
    let focus = if gap > FOCUS_GAP {
        Focus::Gap {
            strongest,
            weakest,
            gap,
        }
    } else {
        Focus::Balanced
    };

    Recommendations { standings, focus }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub field: NumericField,
    pub student: f64,
    pub class_average: f64,
    pub top_student: Option<f64>,
    pub percentile: f64,
}

/// One student measured against the class: per-field averages, the top
/// composite scorer and percentile ranks, plus recommendations.
#[derive(Debug, Clone)]
pub struct Profile<'a> {
    pub record: &'a Record,
    pub top_student: Option<&'a Record>,
    pub comparisons: Vec<Comparison>,
    pub recommendations: Recommendations,
}

pub fn profile<'a>(records: &'a [Record], id: &str) -> Option<Profile<'a>> {
    let record = records.iter().find(|r| r.id() == id)?;
    let top_student = top_performers(records, 1)
        .into_iter()
        .next()
        .filter(|r| r.is_graded());

    let comparisons = percentile_ranks(records, record)
        .into_iter()
        .filter_map(|(field, percentile)| {
            Some(Comparison {
                field,
                student: record.numeric(field)?,
                class_average: describe(&values(records, field))?.mean,
                top_student: top_student.and_then(|top| top.numeric(field)),
                percentile,
            })
        })
        .collect();

    Some(Profile {
        record,
        top_student,
        comparisons,
        recommendations: recommendations(record),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::GradeCalculator;

    fn graded(rows: &[(&str, f64, f64, f64)]) -> Vec<Record> {
        let calc = GradeCalculator::default();
        calc.grade_batch(
            rows.iter()
                .map(|(id, a, c, d)| Record::new(*id, *id, *a, *c, *d))
                .collect(),
        )
    }

    #[test]
    fn describe_matches_hand_computation() {
        let summary = describe(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(summary.count, 8);
        assert!((summary.mean - 5.0).abs() < 1e-9);
        assert!((summary.std_dev.unwrap() - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
        assert_eq!(summary.median, 4.5);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 9.0);
        assert!(describe(&[]).is_none());
        assert_eq!(describe(&[3.0]).unwrap().std_dev, None);
    }

    #[test]
    fn distribution_covers_whole_scale() {
        let records = graded(&[
            ("a", 90.0, 90.0, 90.0),
            ("b", 91.0, 91.0, 91.0),
            ("c", 10.0, 10.0, 10.0),
        ]);
        let dist = grade_distribution(&records, GradeField::Composite, &GradeScale::twelve_band());
        assert_eq!(dist.len(), 12);
        assert_eq!(dist[1], (Grade::A, 2));
        assert_eq!(dist[11], (Grade::F, 1));
        assert_eq!(dist.iter().map(|d| d.1).sum::<usize>(), 3);
    }

    #[test]
    fn correlation_detects_linear_relationships() {
        let records = graded(&[
            ("a", 10.0, 20.0, 90.0),
            ("b", 20.0, 40.0, 80.0),
            ("c", 30.0, 60.0, 70.0),
        ]);
        let r = correlation(&records, NumericField::Academic, NumericField::Cocurricular).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
        let r = correlation(&records, NumericField::Academic, NumericField::Discipline).unwrap();
        assert!((r + 1.0).abs() < 1e-9);
    }

    #[test]
    fn correlation_needs_variance() {
        let records = graded(&[("a", 50.0, 20.0, 90.0), ("b", 50.0, 40.0, 80.0)]);
        assert!(correlation(&records, NumericField::Academic, NumericField::Cocurricular).is_none());
        assert!(correlation(&records[..1], NumericField::Cocurricular, NumericField::Discipline).is_none());
    }

    #[test]
    fn gaps_and_balance() {
        let records = graded(&[("even", 70.0, 71.0, 69.0), ("spiky", 95.0, 30.0, 60.0)]);
        assert_eq!(score_gap(&records[1]), 65.0);
        assert_eq!(largest_gaps(&records, 1)[0].0.id(), "spiky");
        assert_eq!(balanced_performers(&records, 1)[0].id(), "even");
    }

    #[test]
    fn quick_actions_rank_by_composite() {
        let records = graded(&[
            ("mid", 70.0, 70.0, 70.0),
            ("low", 20.0, 30.0, 40.0),
            ("top", 99.0, 99.0, 99.0),
            ("weak", 48.0, 48.0, 48.0),
        ]);
        let top: Vec<&str> = top_performers(&records, 2).iter().map(|r| r.id()).collect();
        assert_eq!(top, vec!["top", "mid"]);
        let needs: Vec<&str> = needing_improvement(&records, &IMPROVEMENT_GRADES)
            .iter()
            .map(|r| r.id())
            .collect();
        assert_eq!(needs, vec!["low", "weak"]);
    }

    #[test]
    fn academic_drives_default_composite() {
        let records = graded(&[("a", 10.0, 50.0, 50.0), ("b", 90.0, 40.0, 60.0), ("c", 50.0, 60.0, 40.0)]);
        let (metric, r) = strongest_predictor(&records).unwrap();
        assert_eq!(metric, Metric::Academic);
        assert!(r > 0.9);
    }

    #[test]
    fn average_score_per_grade_skips_empty_grades() {
        let records = graded(&[
            ("a", 90.0, 90.0, 90.0),
            ("b", 91.0, 91.0, 91.0),
            ("c", 10.0, 10.0, 10.0),
        ]);
        let averages = average_score_by_grade(&records, &GradeScale::twelve_band());
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].0, Grade::A);
        assert!((averages[0].1 - 90.5).abs() < 1e-9);
        assert_eq!(averages[1].0, Grade::F);
        assert!((averages[1].1 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn percentile_counts_strictly_lower_scores() {
        let records = graded(&[
            ("a", 50.0, 50.0, 50.0),
            ("b", 70.0, 70.0, 70.0),
            ("c", 90.0, 90.0, 90.0),
            ("d", 70.0, 70.0, 70.0),
        ]);
        let ranks = percentile_ranks(&records, &records[1]);
        assert_eq!(ranks.len(), 4);
        assert_eq!(ranks[0], (NumericField::Academic, 25.0));
        assert_eq!(ranks[3].1, 25.0);
        assert_eq!(percentile_ranks(&records, &records[2])[0].1, 75.0);
        assert_eq!(percentile_ranks(&records, &records[0])[0].1, 0.0);

        let ungraded = Record::new("x", "x", 60.0, 60.0, 60.0);
        let ranks = percentile_ranks(&records, &ungraded);
        assert_eq!(ranks.len(), 3, "no composite to rank");
    }

    #[test]
    fn profile_compares_against_class_and_top_student() {
        let records = graded(&[
            ("a", 50.0, 50.0, 50.0),
            ("b", 70.0, 70.0, 70.0),
            ("c", 90.0, 90.0, 90.0),
            ("d", 70.0, 70.0, 70.0),
        ]);
        let profile = profile(&records, "b").unwrap();
        assert_eq!(profile.record.id(), "b");
        assert_eq!(profile.top_student.unwrap().id(), "c");
        let academic = profile.comparisons[0];
        assert_eq!(academic.field, NumericField::Academic);
        assert_eq!(academic.student, 70.0);
        assert!((academic.class_average - 70.0).abs() < 1e-9);
        assert_eq!(academic.top_student, Some(90.0));
        assert_eq!(academic.percentile, 25.0);
        assert_eq!(profile.recommendations.focus, Focus::Balanced);

        assert!(super::profile(&records, "nobody").is_none());
    }

    #[test]
    fn standings_follow_thresholds() {
        assert_eq!(Standing::for_score(59.9), Standing::NeedsIntervention);
        assert_eq!(Standing::for_score(60.0), Standing::Developing);
        assert_eq!(Standing::for_score(75.0), Standing::Good);
        assert_eq!(Standing::for_score(89.99), Standing::Good);
        assert_eq!(Standing::for_score(90.0), Standing::Excellent);
        assert_ne!(
            Standing::Good.advice(Metric::Academic),
            Standing::Good.advice(Metric::Discipline)
        );
    }

    #[test]
    fn wide_gap_calls_for_focus() {
        let spiky = Record::new("s", "Spiky", 95.0, 40.0, 72.0);
        let recs = recommendations(&spiky);
        assert_eq!(
            recs.standings,
            vec![
                (Metric::Academic, Standing::Excellent),
                (Metric::Cocurricular, Standing::NeedsIntervention),
                (Metric::Discipline, Standing::Developing),
            ]
        );
        assert_eq!(
            recs.focus,
            Focus::Gap {
                strongest: Metric::Academic,
                weakest: Metric::Cocurricular,
                gap: 55.0,
            }
        );

        let even = Record::new("e", "Even", 80.0, 75.0, 60.0);
        assert_eq!(recommendations(&even).focus, Focus::Balanced);
    }
}
