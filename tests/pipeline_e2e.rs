// tests/pipeline_e2e.rs
use std::fs;

use gradebook::models::{Grade, GradeField, Metric, NumericField};
use gradebook::repository::{FilterSpec, SortKey};
use gradebook::stats::{self, Focus};
use gradebook::{load, to_records, Config, GradeCalculator, LoadError, ScoreNormalizer, Session};

const CANONICAL: &str = "\
student_id,name,academic_score,cocurricular_score,discipline_score,class,section
S001,John Doe,85,75,90,10,A
S002,Jane Smith,92,80,88,10,B
S003,Alex Johnson,78,92,85,9,A
S004,Sam Lee,,70,70,9,B
S005,Priya Nair,105,-3,60,9,B
";

const LEGACY: &str = "\
SPRING TERM RESULTS,,,,,
Grade 9 / Section B,,,,,
Roll No,Student Name,GPA,CCA,BEHAVIOR,Overall
1,Ana Ruiz,8.5,\"MUSIC,SPORTS\",A,88
2,Ben Cole,6,KNITTING,X,64
,Ghost Row,9,ART,B,90
4,Cam Diaz,7.2,DEBATE,q,71
";

#[test]
fn canonical_roster_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.csv");
    fs::write(&path, CANONICAL).unwrap();

    let table = load(&path, &ScoreNormalizer::default()).unwrap();
    assert_eq!(table.len(), 4, "row with empty academic score is dropped");
    assert_eq!(table.extra_columns, vec!["class", "section"]);

    let records = to_records(&table, &GradeCalculator::default());
    let john = &records[0];
    let grading = john.grading().unwrap();
    assert!((grading.composite_score - 83.0).abs() < 1e-9);
    assert_eq!(grading.composite_grade, Grade::BPlus);
    assert_eq!(john.attribute("section"), Some("A"));

    let priya = records.iter().find(|r| r.id() == "S005").unwrap();
    assert_eq!(priya.academic(), 100.0);
    assert_eq!(priya.cocurricular(), 0.0);
}

#[test]
fn legacy_sheet_is_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.csv");
    fs::write(&path, LEGACY).unwrap();

    let table = load(&path, &ScoreNormalizer::default()).unwrap();
    let ids: Vec<&str> = table.rows.iter().map(|r| r.student_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "4"]);

    let ana = &table.rows[0];
    assert_eq!(ana.name, "Ana Ruiz");
    assert_eq!(ana.academic, 85.0);
    assert_eq!(ana.cocurricular, 92.5);
    assert_eq!(ana.discipline, 95.0);
    assert_eq!(ana.extras.get("Overall").map(String::as_str), Some("88"));

    let ben = &table.rows[1];
    assert_eq!(ben.academic, 60.0);
    assert_eq!(ben.cocurricular, 70.0);
    assert_eq!(ben.discipline, 70.0);

    let cam = &table.rows[2];
    assert_eq!(cam.cocurricular, 92.0);
    assert_eq!(cam.discipline, 80.0);
}

#[test]
fn spreadsheet_binary_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.xlsx");
    fs::write(&path, b"PK\x03\x04not really a workbook").unwrap();

    let err = load(&path, &ScoreNormalizer::default()).unwrap_err();
    assert!(matches!(err, LoadError::Format { .. }));
    assert_eq!(err.kind(), "format error");
}

#[test]
fn exported_file_reloads_to_same_records() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("roster.csv");
    let export = dir.path().join("graded.csv");
    fs::write(&input, CANONICAL).unwrap();

    let mut session = Session::new(&Config::default()).unwrap();
    session.load_path(&input).unwrap();
    session
        .export_csv(fs::File::create(&export).unwrap())
        .unwrap();

    let mut reloaded = Session::new(&Config::default()).unwrap();
    reloaded.load_path(&export).unwrap();
    assert_eq!(reloaded.records(), session.records());
}

#[test]
fn session_queries_filter_and_sort() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.csv");
    fs::write(&path, CANONICAL).unwrap();

    let mut session = Session::new(&Config::default()).unwrap();
    session.load_path(&path).unwrap();
    let repo = session.repository();

    let spec = FilterSpec::new()
        .attribute("class", "10")
        .range(NumericField::Composite, Some(80.0), None);
    let key = SortKey::Score(NumericField::Composite);
    let ids: Vec<&str> = repo
        .query(&spec, Some(&key), false)
        .iter()
        .map(|r| r.id())
        .collect();
    assert_eq!(ids, vec!["S002", "S001"]);

    let spec = FilterSpec::new().grades(GradeField::Composite, [Grade::BPlus]);
    let ids: Vec<&str> = repo.filter(&spec).iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["S001", "S003"]);
}

#[test]
fn config_file_drives_weights_and_scale() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("gradebook.toml");
    fs::write(
        &config_path,
        "[weights]\nacademic = 1.0\ncocurricular = 0.0\ndiscipline = 0.0\n\n[grading]\nscale = \"five_band\"\n",
    )
    .unwrap();
    let roster = dir.path().join("roster.csv");
    fs::write(&roster, CANONICAL).unwrap();

    let config = Config::resolve(Some(&config_path)).unwrap();
    let mut session = Session::new(&config).unwrap();
    session.load_path(&roster).unwrap();

    let john = session.repository().get("S001").unwrap();
    let grading = john.grading().unwrap();
    assert_eq!(grading.composite_score, 85.0);
    assert_eq!(grading.composite_grade, Grade::B);
}

#[test]
fn profile_ranks_student_against_roster() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.csv");
    fs::write(&path, CANONICAL).unwrap();

    let mut session = Session::new(&Config::default()).unwrap();
    session.load_path(&path).unwrap();

    let profile = stats::profile(session.records(), "S005").unwrap();
    assert_eq!(profile.top_student.unwrap().id(), "S002");
    assert_eq!(profile.comparisons[0].field, NumericField::Academic);
    assert_eq!(profile.comparisons[0].percentile, 75.0);
    assert!(matches!(
        profile.recommendations.focus,
        Focus::Gap {
            strongest: Metric::Academic,
            weakest: Metric::Cocurricular,
            ..
        }
    ));
}
