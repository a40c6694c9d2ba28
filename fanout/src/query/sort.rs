use crate::index::{Document, Mapping};
use crate::query::QueryError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Pseudo-field sorting by relevance
pub const SCORE_FIELD: &str = "_score";
/// Pseudo-field sorting by shard-level doc id
pub const DOC_FIELD: &str = "_doc";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Where documents without a value for the sort field go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValue {
    #[default]
    Last,
    First,
    Custom(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub missing: MissingValue,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
            missing: MissingValue::Last,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
            missing: MissingValue::Last,
        }
    }

    /// Value substituted for documents without one
    pub fn missing_value(&self) -> i64 {
        match (self.missing, self.order) {
            (MissingValue::Custom(v), _) => v,
            (MissingValue::Last, SortOrder::Asc) | (MissingValue::First, SortOrder::Desc) => {
                i64::MAX
            }
            (MissingValue::First, SortOrder::Asc) | (MissingValue::Last, SortOrder::Desc) => {
                i64::MIN
            }
        }
    }
}

/// Sort value of one hit for one sort field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortValue {
    Long(i64),
    Score(f32),
}

impl SortValue {
    pub fn as_long(&self) -> Option<i64> {
        match self {
            SortValue::Long(v) => Some(*v),
            SortValue::Score(_) => None,
        }
    }

    fn cmp_natural(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Long(a), SortValue::Long(b)) => a.cmp(b),
            (SortValue::Score(a), SortValue::Score(b)) => a.total_cmp(b),
            (SortValue::Long(a), SortValue::Score(b)) => (*a as f64).total_cmp(&(*b as f64)),
            (SortValue::Score(a), SortValue::Long(b)) => (*a as f64).total_cmp(&(*b as f64)),
        }
    }
}

/// Ordered list of sort fields. Empty means relevance order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec {
    fields: Vec<SortField>,
}

impl SortSpec {
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields }
    }

    pub fn by(field: SortField) -> Self {
        Self {
            fields: vec![field],
        }
    }

    pub fn then(mut self, field: SortField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn leading(&self) -> Option<&SortField> {
        self.fields.first()
    }

    /// Whether hits carry explicit sort values
    pub fn is_field_sort(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn needs_scores(&self) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f.field == SCORE_FIELD)
    }

    /// Fields must be `_score`, `_doc`, long fields or unmapped
    pub fn validate(&self, mapping: &Mapping) -> Result<(), QueryError> {
        for field in &self.fields {
            if field.field == SCORE_FIELD || field.field == DOC_FIELD {
                continue;
            }
            if let Some(m) = mapping.get(&field.field) {
                if m.field_type != crate::index::FieldType::Long {
                    return Err(QueryError::UnsupportedSort(format!(
                        "cannot sort on field [{}] of type {:?}",
                        field.field, m.field_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// Sort values of a hit, one per sort field
    pub fn values_for(&self, doc: &Document, doc_id: u32, score: f32) -> Vec<SortValue> {
        self.fields
            .iter()
            .map(|f| match f.field.as_str() {
                SCORE_FIELD => SortValue::Score(score),
                DOC_FIELD => SortValue::Long(doc_id as i64),
                name => SortValue::Long(doc.long(name).unwrap_or_else(|| f.missing_value())),
            })
            .collect()
    }
}

/// Anything the comparator can rank
pub trait Ranked {
    fn shard_index(&self) -> u32;
    fn doc(&self) -> u32;
    fn score(&self) -> f32;
    fn sort_values(&self) -> &[SortValue];
}

/// Total order over hits for one sort specification.
///
/// Relevance order is score descending. Field order compares sort values
/// field by field. Ties break on shard index, then doc id.
#[derive(Debug, Clone)]
pub struct SortComparator {
    orders: Vec<SortOrder>,
}

impl SortComparator {
    pub fn new(sort: &SortSpec) -> Self {
        Self {
            orders: sort.fields.iter().map(|f| f.order).collect(),
        }
    }

    pub fn is_relevance(&self) -> bool {
        self.orders.is_empty()
    }

    /// Compare sort values only; `Less` means `a` ranks first
    pub fn compare_values(&self, a: &[SortValue], b: &[SortValue]) -> Ordering {
        for (i, order) in self.orders.iter().enumerate() {
            let (Some(x), Some(y)) = (a.get(i), b.get(i)) else {
                break;
            };
            let ord = match order {
                SortOrder::Asc => x.cmp_natural(y),
                SortOrder::Desc => y.cmp_natural(x),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// `Less` means `a` ranks before `b`
    pub fn compare<A: Ranked, B: Ranked>(&self, a: &A, b: &B) -> Ordering {
        let primary = if self.is_relevance() {
            b.score().total_cmp(&a.score())
        } else {
            self.compare_values(a.sort_values(), b.sort_values())
        };
        primary
            .then_with(|| a.shard_index().cmp(&b.shard_index()))
            .then_with(|| a.doc().cmp(&b.doc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hit(u32, u32, f32, Vec<SortValue>);

    impl Ranked for Hit {
        fn shard_index(&self) -> u32 {
            self.0
        }
        fn doc(&self) -> u32 {
            self.1
        }
        fn score(&self) -> f32 {
            self.2
        }
        fn sort_values(&self) -> &[SortValue] {
            &self.3
        }
    }

    #[test]
    fn test_missing_value_resolution() {
        assert_eq!(SortField::asc("a").missing_value(), i64::MAX);
        assert_eq!(SortField::desc("a").missing_value(), i64::MIN);
        let mut first = SortField::asc("a");
        first.missing = MissingValue::First;
        assert_eq!(first.missing_value(), i64::MIN);
        first.missing = MissingValue::Custom(7);
        assert_eq!(first.missing_value(), 7);
    }

    #[test]
    fn test_relevance_order_with_tie_break() {
        let cmp = SortComparator::new(&SortSpec::default());
        let a = Hit(0, 5, 2.0, vec![]);
        let b = Hit(0, 1, 1.0, vec![]);
        let c = Hit(1, 0, 2.0, vec![]);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare(&a, &c), Ordering::Less);
        assert_eq!(cmp.compare(&c, &a), Ordering::Greater);
    }

    #[test]
    fn test_field_order() {
        let spec = SortSpec::by(SortField::desc("price")).then(SortField::asc("rank"));
        let cmp = SortComparator::new(&spec);
        let a = Hit(0, 0, 0.0, vec![SortValue::Long(10), SortValue::Long(3)]);
        let b = Hit(0, 1, 0.0, vec![SortValue::Long(10), SortValue::Long(1)]);
        let c = Hit(0, 2, 0.0, vec![SortValue::Long(20), SortValue::Long(9)]);
        assert_eq!(cmp.compare(&c, &a), Ordering::Less);
        assert_eq!(cmp.compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_values_for_document() {
        let spec = SortSpec::by(SortField::asc("price"))
            .then(SortField::desc(SCORE_FIELD))
            .then(SortField::asc(DOC_FIELD));
        let doc = Document::new("x");
        let values = spec.values_for(&doc, 4, 1.5);
        assert_eq!(
            values,
            vec![SortValue::Long(i64::MAX), SortValue::Score(1.5), SortValue::Long(4)]
        );
        assert!(spec.needs_scores());
    }

    #[test]
    fn test_keyword_sort_rejected() {
        let mapping = Mapping::new().with_keyword("color").with_long("price");
        assert!(SortSpec::by(SortField::asc("color")).validate(&mapping).is_err());
        assert!(SortSpec::by(SortField::asc("price")).validate(&mapping).is_ok());
        assert!(SortSpec::by(SortField::asc("unmapped")).validate(&mapping).is_ok());
    }

    #[test]
    fn test_sort_spec_json() {
        let spec: SortSpec =
            serde_json::from_str(r#"[{"field": "price", "order": "desc"}, {"field": "_doc"}]"#)
                .unwrap();
        assert_eq!(spec.len(), 2);
        assert_eq!(spec.leading().unwrap().order, SortOrder::Desc);
    }
}
