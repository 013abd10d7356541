use std::cmp::Ordering;

use common::DocumentId;
use serde_json::{Map, Value};

/// Selection criteria for documents within a collection.
///
/// Conditions are combined with AND. Equality conditions are meant for
/// scalar fields (strings, numbers, booleans).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Fields that must equal the given value.
    pub equals: Map<String, Value>,

    /// Fields that must not equal the given value. A missing field counts
    /// as "not equal".
    pub not_equals: Vec<(String, Value)>,

    /// Fields whose value must be one of the listed candidates.
    pub any_of: Vec<(String, Vec<Value>)>,
}

impl Filter {
    /// Creates a filter matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter matching the document with the given id.
    pub fn by_id(id: DocumentId) -> Self {
        Self::new().eq("id", id)
    }

    /// Requires `field` to equal `value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Requires `field` to differ from `value`.
    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.not_equals.push((field.into(), value.into()));
        self
    }

    /// Requires `field` to be one of `values`.
    pub fn any_of<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.any_of
            .push((field.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Returns true if the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.not_equals.is_empty() && self.any_of.is_empty()
    }

    /// Evaluates the filter against a document body.
    pub fn matches(&self, doc: &Value) -> bool {
        let equals = self
            .equals
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value));
        let not_equals = self
            .not_equals
            .iter()
            .all(|(field, value)| doc.get(field) != Some(value));
        let any_of = self.any_of.iter().all(|(field, candidates)| {
            doc.get(field)
                .is_some_and(|actual| candidates.contains(actual))
        });
        equals && not_equals && any_of
    }
}

/// A partial update applied to matched documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    /// Fields overwritten on every matched document.
    pub set: Map<String, Value>,

    /// Fields written only when an upsert inserts a new document.
    pub set_on_insert: Map<String, Value>,
}

impl Patch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites `field` with `value`.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// Writes `field` only when the document is created by an upsert.
    pub fn set_on_insert(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_on_insert.insert(field.into(), value.into());
        self
    }

    /// Returns true if the patch touches the `id` field.
    pub fn touches_id(&self) -> bool {
        self.set.contains_key("id") || self.set_on_insert.contains_key("id")
    }

    /// Applies the `set` fields to an existing document body.
    pub fn apply(&self, doc: &mut Value) {
        if let Value::Object(fields) = doc {
            for (field, value) in &self.set {
                fields.insert(field.clone(), value.clone());
            }
        }
    }

    /// Builds the body of a document created by an upsert.
    ///
    /// Equality fields of the filter come first, then `set_on_insert`,
    /// then `set`, so explicit sets win.
    pub fn build_upsert(&self, filter: &Filter, id: DocumentId) -> Value {
        let mut fields = filter.equals.clone();
        for (field, value) in &self.set_on_insert {
            fields.insert(field.clone(), value.clone());
        }
        for (field, value) in &self.set {
            fields.insert(field.clone(), value.clone());
        }
        fields
            .entry("id".to_string())
            .or_insert_with(|| Value::from(id));
        Value::Object(fields)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// What a sort clause orders by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// A top-level document field.
    Field(String),
    /// Insertion order, as tracked by the store.
    Inserted,
}

/// A single sort clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub key: SortKey,
    pub direction: Direction,
}

impl Sort {
    /// Orders by `field`, smallest first.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            key: SortKey::Field(field.into()),
            direction: Direction::Ascending,
        }
    }

    /// Orders by `field`, largest first.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            key: SortKey::Field(field.into()),
            direction: Direction::Descending,
        }
    }

    /// Orders by insertion, most recently inserted first.
    pub fn newest_first() -> Self {
        Self {
            key: SortKey::Inserted,
            direction: Direction::Descending,
        }
    }

    /// Orders by insertion, oldest first.
    pub fn oldest_first() -> Self {
        Self {
            key: SortKey::Inserted,
            direction: Direction::Ascending,
        }
    }
}

/// Options for `find`: ordering and pagination.
///
/// Ties left by the sort clauses are broken by insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<Sort>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Creates options with no ordering or pagination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sort clause.
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    /// Skips this many documents before returning results.
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Limits the number of documents returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for `update_one`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    /// Creates options that only update existing documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options that insert when nothing matches.
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Declares that no two documents of a collection may share the values of
/// `fields`, among the documents matching `partial`.
///
/// Documents missing any of the fields (or holding `null`) are not indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueIndex {
    pub name: String,
    pub fields: Vec<String>,
    pub partial: Filter,
}

impl UniqueIndex {
    /// Creates an index over `fields` covering the whole collection.
    pub fn new<F: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = F>,
    ) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            partial: Filter::new(),
        }
    }

    /// Restricts the index to documents matching `filter`.
    pub fn partial(mut self, filter: Filter) -> Self {
        self.partial = filter;
        self
    }

    /// Returns the indexed key of a document, or None if it is not indexed.
    pub fn key_of(&self, doc: &Value) -> Option<Vec<Value>> {
        if !self.partial.matches(doc) {
            return None;
        }
        self.fields
            .iter()
            .map(|field| doc.get(field).filter(|value| !value.is_null()).cloned())
            .collect()
    }
}

/// Result of grouping a numeric field: count, mean and the collected values.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSummary {
    /// Number of matched documents.
    pub count: u64,
    /// Mean of the numeric values, 0 when none are numeric.
    pub average: f64,
    /// Every numeric value of the field, in insertion order.
    pub values: Vec<f64>,
}

impl FieldSummary {
    /// Summarizes the given values for `count` matched documents.
    pub fn from_values(count: u64, values: Vec<f64>) -> Self {
        let average = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        Self {
            count,
            average,
            values,
        }
    }
}

/// Total order over optional JSON values used for in-memory sorting.
///
/// Missing < null < string < number < bool < array < object, mirroring
/// the type ordering of PostgreSQL `jsonb`.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::Bool(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
