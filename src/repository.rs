use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::models::{Grade, GradeField, NumericField, Record};

/// Constraints for [`filter`]; every constraint must hold for a record to
/// match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub ranges: Vec<RangeConstraint>,
    pub grades: Vec<(GradeField, BTreeSet<Grade>)>,
    pub attributes: Vec<(String, String)>,
}

/// Inclusive bounds on a numeric field. A missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeConstraint {
    pub field: NumericField,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(mut self, field: NumericField, min: Option<f64>, max: Option<f64>) -> Self {
        self.ranges.push(RangeConstraint { field, min, max });
        self
    }

    pub fn grades<I>(mut self, field: GradeField, grades: I) -> Self
    where
        I: IntoIterator<Item = Grade>,
    {
        self.grades.push((field, grades.into_iter().collect()));
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.grades.is_empty() && self.attributes.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        let in_range = self.ranges.iter().all(|range| {
            record.numeric(range.field).is_some_and(|value| {
                range.min.map_or(true, |min| value >= min)
                    && range.max.map_or(true, |max| value <= max)
            })
        });
        let in_grades = self.grades.iter().all(|(field, allowed)| {
            record
                .grade(*field)
                .is_some_and(|grade| allowed.contains(&grade))
        });
        let attributes_equal = self
            .attributes
            .iter()
            .all(|(key, value)| record.attribute(key) == Some(value.as_str()));

        in_range && in_grades && attributes_equal
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Name,
    Score(NumericField),
    Grade(GradeField),
    Attribute(String),
}

impl FromStr for SortKey {
    type Err = std::convert::Infallible;

    /// Unrecognized names sort by the extra attribute of that name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let key = match lowered.as_str() {
            "student_id" | "id" => SortKey::Id,
            "name" => SortKey::Name,
            _ => {
                if let Ok(field) = lowered.parse::<NumericField>() {
                    SortKey::Score(field)
                } else if let Ok(field) = lowered.parse::<GradeField>() {
                    SortKey::Grade(field)
                } else {
                    SortKey::Attribute(s.trim().to_string())
                }
            }
        };
        Ok(key)
    }
}

/// Attribute sort key: missing sorts lowest, then numbers, then text.
#[derive(Debug, PartialEq, PartialOrd)]
enum AttributeKey<'a> {
    Missing,
    Number(f64),
    Text(&'a str),
}

fn attribute_key<'a>(record: &'a Record, key: &str) -> AttributeKey<'a> {
    match record.attribute(key) {
        None | Some("") => AttributeKey::Missing,
        Some(value) => match value.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => AttributeKey::Number(number),
            _ => AttributeKey::Text(value),
        },
    }
}

fn compare(a: &Record, b: &Record, key: &SortKey) -> Ordering {
    match key {
        SortKey::Id => a.id().cmp(b.id()),
        SortKey::Name => a.name().cmp(b.name()),
        SortKey::Score(field) => match (a.numeric(*field), b.numeric(*field)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (x, y) => x.is_some().cmp(&y.is_some()),
        },
        SortKey::Grade(field) => a.grade(*field).cmp(&b.grade(*field)),
        SortKey::Attribute(name) => attribute_key(a, name)
            .partial_cmp(&attribute_key(b, name))
            .unwrap_or(Ordering::Equal),
    }
}

pub fn filter<'a, I>(records: I, spec: &FilterSpec) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter(|record| spec.matches(record))
        .collect()
}

/// Stable sort; equal keys keep their input order in both directions.
pub fn sort<'a>(mut records: Vec<&'a Record>, key: &SortKey, ascending: bool) -> Vec<&'a Record> {
    records.sort_by(|a, b| {
        let ordering = compare(a, b, key);
        if ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
    records
}

/// The graded record set of one session.
#[derive(Debug, Clone, Default)]
pub struct RecordRepository {
    records: Vec<Record>,
}

impl RecordRepository {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Swap in a freshly loaded record set, returning the previous one.
    pub fn replace(&mut self, records: Vec<Record>) -> Vec<Record> {
        std::mem::replace(&mut self.records, records)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub fn filter(&self, spec: &FilterSpec) -> Vec<&Record> {
        filter(&self.records, spec)
    }

    pub fn sorted(&self, key: &SortKey, ascending: bool) -> Vec<&Record> {
        sort(self.records.iter().collect(), key, ascending)
    }

    pub fn query(&self, spec: &FilterSpec, key: Option<&SortKey>, ascending: bool) -> Vec<&Record> {
        let matched = self.filter(spec);
        match key {
            Some(key) => sort(matched, key, ascending),
            None => matched,
        }
    }
}
