//! Qdrant-backed vector index.
//!
//! Talks gRPC to a qdrant collection holding one point per chunk, with the
//! owning `document_id` in each point's payload.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, DeletePointsBuilder, Filter as QdrantFilter, PointsIdsList, Query,
    QueryPointsBuilder,
};
use serde_json::Value;

use super::filter::{Filter, FilterValue};
use super::{IndexError, IndexResult, ScoredPoint, SearchRequest, VectorIndex};
use crate::config::VectorIndexConfig;

/// [`VectorIndex`] backed by a qdrant collection.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    /// Connect using the configured endpoint and collection.
    pub fn connect(config: &VectorIndexConfig) -> IndexResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(key) = &config.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| IndexError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(&self, request: SearchRequest) -> IndexResult<Vec<ScoredPoint>> {
        // A filter that matches nothing never reaches the server; qdrant has
        // no native match-none predicate.
        if request
            .filter
            .as_ref()
            .is_some_and(Filter::matches_nothing)
        {
            return Ok(Vec::new());
        }

        let mut query = QueryPointsBuilder::new(self.collection.clone())
            .query(Query::new_nearest(request.vector))
            .limit(request.limit as u64)
            .with_payload(request.with_payload);
        if let Some(filter) = &request.filter {
            query = query.filter(to_qdrant_filter(filter));
        }

        let response = self
            .client
            .query(query)
            .await
            .map_err(|e| IndexError::Backend(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredPoint {
                id: point
                    .id
                    .and_then(|id| id.point_id_options)
                    .map(|id| match id {
                        PointIdOptions::Uuid(s) => s,
                        PointIdOptions::Num(n) => n.to_string(),
                    })
                    .unwrap_or_default(),
                score: point.score,
                payload: point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, qdrant_value_to_json(v)))
                    .collect(),
            })
            .collect())
    }

    async fn delete_points(&self, ids: &[String]) -> IndexResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.client
            .delete_points(
                DeletePointsBuilder::new(self.collection.clone())
                    .points(PointsIdsList {
                        ids: ids.iter().cloned().map(Into::into).collect(),
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| IndexError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &Filter) -> IndexResult<()> {
        if filter.matches_nothing() {
            return Ok(());
        }
        self.client
            .delete_points(
                DeletePointsBuilder::new(self.collection.clone())
                    .points(to_qdrant_filter(filter))
                    .wait(true),
            )
            .await
            .map_err(|e| IndexError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// Map the predicate tree onto qdrant's must/must_not/should conditions.
///
/// [`Filter::MatchNone`] is rejected before this point by the callers above.
fn to_qdrant_filter(filter: &Filter) -> QdrantFilter {
    match filter {
        Filter::And(children) => QdrantFilter {
            must: children.iter().map(to_condition).collect(),
            ..Default::default()
        },
        Filter::Ne { field, value } => QdrantFilter {
            must_not: vec![match_condition(field, value)],
            ..Default::default()
        },
        other => QdrantFilter {
            must: vec![to_condition(other)],
            ..Default::default()
        },
    }
}

fn to_condition(filter: &Filter) -> Condition {
    match filter {
        Filter::Eq { field, value } => match_condition(field, value),
        Filter::Ne { .. } | Filter::And(_) | Filter::MatchNone => {
            Condition::from(to_qdrant_filter(filter))
        }
        Filter::In { field, values } => {
            // Homogeneous sets map to qdrant's match-any; mixed sets fall
            // back to a should-of-equalities.
            let texts: Vec<String> = values
                .iter()
                .filter_map(|v| match v {
                    FilterValue::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            if texts.len() == values.len() {
                return Condition::matches(field.clone(), texts);
            }
            let integers: Vec<i64> = values
                .iter()
                .filter_map(|v| match v {
                    FilterValue::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect();
            if integers.len() == values.len() {
                return Condition::matches(field.clone(), integers);
            }
            Condition::from(QdrantFilter {
                should: values.iter().map(|v| match_condition(field, v)).collect(),
                ..Default::default()
            })
        }
    }
}

fn match_condition(field: &str, value: &FilterValue) -> Condition {
    match value {
        FilterValue::Text(s) => Condition::matches(field.to_string(), s.clone()),
        FilterValue::Integer(i) => Condition::matches(field.to_string(), *i),
        FilterValue::Bool(b) => Condition::matches(field.to_string(), *b),
    }
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> Value {
    match value.kind {
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => Value::from(d),
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::filter::DOCUMENT_ID_FIELD;
    use crate::types::DocumentId;

    #[test]
    fn test_ne_maps_to_must_not() {
        let id = DocumentId::random();
        let mapped = to_qdrant_filter(&Filter::ne(DOCUMENT_ID_FIELD, id));
        assert!(mapped.must.is_empty());
        assert_eq!(mapped.must_not.len(), 1);
    }

    #[test]
    fn test_and_flattens_into_must() {
        let mapped = to_qdrant_filter(&Filter::And(vec![
            Filter::eq("owner", "alice"),
            Filter::ne("status", "deleted"),
        ]));
        assert_eq!(mapped.must.len(), 2);
    }

    #[test]
    fn test_text_set_uses_match_any() {
        let ids = [DocumentId::random(), DocumentId::random()];
        let mapped = to_qdrant_filter(&Filter::documents(ids));
        assert_eq!(mapped.must.len(), 1);
    }

    #[test]
    fn test_payload_conversion_covers_scalars() {
        use qdrant_client::qdrant::Value as QValue;
        let v = QValue {
            kind: Some(Kind::StringValue("doc-1".to_string())),
        };
        assert_eq!(qdrant_value_to_json(v), Value::String("doc-1".to_string()));
        let v = QValue {
            kind: Some(Kind::IntegerValue(7)),
        };
        assert_eq!(qdrant_value_to_json(v), Value::from(7));
    }
}
