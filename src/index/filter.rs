//! Tagged-variant filter predicate tree for index queries.
//!
//! Filters are an explicit tree (equality, negation, set membership,
//! conjunction) rather than an open-ended JSON map, so the "merge caller
//! filter with source-document exclusion" step in candidate retrieval is a
//! total, unit-testable transformation instead of ad hoc key inspection.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::DocumentId;

/// Payload field that carries the owning document's id on every point.
pub const DOCUMENT_ID_FIELD: &str = "document_id";

/// A scalar value a filter condition can compare against.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl FilterValue {
    /// Compare against a JSON payload value.
    pub fn matches_json(&self, value: &Value) -> bool {
        match (self, value) {
            (FilterValue::Text(s), Value::String(v)) => s == v,
            (FilterValue::Integer(i), Value::Number(n)) => n.as_i64() == Some(*i),
            (FilterValue::Bool(b), Value::Bool(v)) => b == v,
            _ => false,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<DocumentId> for FilterValue {
    fn from(id: DocumentId) -> Self {
        FilterValue::Text(id.to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Integer(i)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

/// Structured predicate evaluated by the vector index.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value.
    Eq { field: String, value: FilterValue },
    /// Field does not equal value.
    Ne { field: String, value: FilterValue },
    /// Field is one of the given values. An empty set matches nothing.
    In {
        field: String,
        values: Vec<FilterValue>,
    },
    /// All children must match. An empty conjunction matches everything.
    And(Vec<Filter>),
    /// Matches no point. Normal form for an `In` set that emptied out.
    MatchNone,
}

impl Filter {
    /// Equality shorthand.
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Negated-equality shorthand.
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Set-membership shorthand.
    pub fn is_in(field: impl Into<String>, values: Vec<FilterValue>) -> Self {
        Filter::In {
            field: field.into(),
            values,
        }
    }

    /// Restrict to a set of document ids.
    pub fn documents(ids: impl IntoIterator<Item = DocumentId>) -> Self {
        Filter::In {
            field: DOCUMENT_ID_FIELD.to_string(),
            values: ids.into_iter().map(FilterValue::from).collect(),
        }
    }

    /// Whether this filter can never match any point.
    pub fn matches_nothing(&self) -> bool {
        match self {
            Filter::MatchNone => true,
            Filter::In { values, .. } => values.is_empty(),
            Filter::And(children) => children.iter().any(Filter::matches_nothing),
            _ => false,
        }
    }

    /// Evaluate against a point payload. Used by the in-memory backend and
    /// mirrored by the qdrant condition mapping.
    pub fn matches(&self, payload: &BTreeMap<String, Value>) -> bool {
        match self {
            Filter::Eq { field, value } => payload
                .get(field)
                .is_some_and(|json| value.matches_json(json)),
            Filter::Ne { field, value } => !payload
                .get(field)
                .is_some_and(|json| value.matches_json(json)),
            Filter::In { field, values } => payload
                .get(field)
                .is_some_and(|json| values.iter().any(|v| v.matches_json(json))),
            Filter::And(children) => children.iter().all(|c| c.matches(payload)),
            Filter::MatchNone => false,
        }
    }
}

/// Merge a caller-supplied filter with the unconditional exclusion of the
/// source document from its own results.
///
/// Total transformation over every tree shape:
/// - no caller filter: just `document_id != source`;
/// - an `In` constraint on the document-id field has the source id removed
///   (the caller's id set is otherwise preserved, not overwritten);
/// - an `In` set that resolves empty normalizes to [`Filter::MatchNone`],
///   which must yield zero candidates deterministically, never "no filter";
/// - anything else is AND-ed with the exclusion.
pub fn exclude_document(caller: Option<Filter>, source: DocumentId) -> Filter {
    let exclusion = Filter::ne(DOCUMENT_ID_FIELD, source);
    let Some(caller) = caller else {
        return exclusion;
    };
    let rewritten = strip_document_id(caller, source);
    if rewritten.matches_nothing() {
        return Filter::MatchNone;
    }
    match rewritten {
        // The rewritten id set can no longer contain the source, but other
        // branches of the caller filter still need the exclusion conjunct.
        Filter::And(mut children) => {
            children.push(exclusion);
            Filter::And(children)
        }
        other => Filter::And(vec![other, exclusion]),
    }
}

fn strip_document_id(filter: Filter, source: DocumentId) -> Filter {
    let source_value = FilterValue::from(source);
    match filter {
        Filter::In { field, mut values } if field == DOCUMENT_ID_FIELD => {
            values.retain(|v| *v != source_value);
            if values.is_empty() {
                Filter::MatchNone
            } else {
                Filter::In { field, values }
            }
        }
        Filter::Eq { field, value } if field == DOCUMENT_ID_FIELD && value == source_value => {
            Filter::MatchNone
        }
        Filter::And(children) => {
            let rewritten: Vec<Filter> = children
                .into_iter()
                .map(|c| strip_document_id(c, source))
                .collect();
            if rewritten.iter().any(Filter::matches_nothing) {
                Filter::MatchNone
            } else {
                Filter::And(rewritten)
            }
        }
        other => other,
    }
}
