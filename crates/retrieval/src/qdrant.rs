//! Qdrant-backed `VectorIndex`
//!
//! Search and scroll against a Qdrant collection, with the store-agnostic
//! payload filter translated into Qdrant's filter grammar. Payloads are
//! requested, vectors are not. Qdrant has no text-target discover
//! operation, so the trait's `Unsupported` default stands and the keyword
//! adapter's scroll path is the only lexical source.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        condition::ConditionOneOf, r#match::MatchValue as QdrantMatchValue, value::Kind,
        Condition, FieldCondition, Filter, Match, PointId, RepeatedStrings, ScrollPointsBuilder,
        SearchPointsBuilder,
    },
    Qdrant,
};

use rag_agent_config::QdrantSettings;
use rag_agent_core::{
    Error, FilterCondition, MatchValue, PayloadFilter, ScoredPoint, ScrollPage, ScrollRequest,
    VectorIndex, VectorQuery,
};

#[derive(Debug, Clone)]
pub struct QdrantIndexConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl From<&QdrantSettings> for QdrantIndexConfig {
    fn from(settings: &QdrantSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
        }
    }
}

pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    pub fn new(config: QdrantIndexConfig) -> Result<Self, Error> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
            tracing::info!("Qdrant connection using API key authentication");
        }
        let client = builder
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>, Error> {
        let mut builder =
            SearchPointsBuilder::new(collection, query.vector, query.limit as u64)
                .with_payload(true);

        if let Some(filter) = query.filter {
            builder = builder.filter(into_qdrant_filter(&filter));
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredPoint {
                id: decode_point_id(point.id),
                score: point.score as f64,
                payload: payload_to_json(point.payload),
            })
            .collect())
    }

    async fn scroll(&self, collection: &str, request: ScrollRequest) -> Result<ScrollPage, Error> {
        let mut builder = ScrollPointsBuilder::new(collection)
            .filter(into_qdrant_filter(&request.filter))
            .limit(request.limit as u32)
            .with_payload(true)
            .with_vectors(false);

        if let Some(offset) = request.offset {
            builder = builder.offset(PointId::from(offset));
        }

        let response = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        let points = response
            .result
            .into_iter()
            .map(|point| ScoredPoint {
                id: decode_point_id(point.id),
                score: 0.0,
                payload: payload_to_json(point.payload),
            })
            .collect();

        Ok(ScrollPage {
            points,
            next_offset: response.next_page_offset.map(decode_point_id_value),
        })
    }
}

/// Translate the store-agnostic filter into Qdrant's grammar.
fn into_qdrant_filter(filter: &PayloadFilter) -> Filter {
    Filter {
        must: filter.must.iter().map(into_qdrant_condition).collect(),
        should: filter.should.iter().map(into_qdrant_condition).collect(),
        must_not: filter.must_not.iter().map(into_qdrant_condition).collect(),
        ..Default::default()
    }
}

fn into_qdrant_condition(condition: &FilterCondition) -> Condition {
    let FilterCondition::Match { key, value } = condition;
    let match_value = match value {
        MatchValue::Keyword(keyword) => QdrantMatchValue::Keyword(keyword.clone()),
        MatchValue::AnyOf(keywords) => QdrantMatchValue::Keywords(RepeatedStrings {
            strings: keywords.clone(),
        }),
        MatchValue::Text(text) => QdrantMatchValue::Text(text.clone()),
    };

    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.clone(),
            r#match: Some(Match {
                match_value: Some(match_value),
            }),
            ..Default::default()
        })),
    }
}

fn decode_point_id(id: Option<PointId>) -> String {
    id.map(decode_point_id_value).unwrap_or_default()
}

fn decode_point_id_value(id: PointId) -> String {
    match id.point_id_options {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)) => uuid,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// Convert a Qdrant payload map into a JSON object for payload decoding.
fn payload_to_json(payload: HashMap<String, qdrant_client::qdrant::Value>) -> serde_json::Value {
    serde_json::Value::Object(
        payload
            .into_iter()
            .map(|(key, value)| (key, value_to_json(value)))
            .collect(),
    )
}

fn value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(object)) => serde_json::Value::Object(
            object
                .fields
                .into_iter()
                .map(|(key, value)| (key, value_to_json(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_translation_branches() {
        let filter = PayloadFilter::new()
            .must(FilterCondition::keyword("tenant", "t1"))
            .must(FilterCondition::any_of(
                "acl",
                vec!["u1".into(), "public".into()],
            ))
            .must(FilterCondition::text("content", "refund"))
            .must_not(FilterCondition::keyword("docId", "d-blocked"));

        let qdrant_filter = into_qdrant_filter(&filter);
        assert_eq!(qdrant_filter.must.len(), 3);
        assert_eq!(qdrant_filter.must_not.len(), 1);
        assert!(qdrant_filter.should.is_empty());

        match &qdrant_filter.must[1].condition_one_of {
            Some(ConditionOneOf::Field(field)) => {
                assert_eq!(field.key, "acl");
                match field.r#match.as_ref().and_then(|m| m.match_value.as_ref()) {
                    Some(QdrantMatchValue::Keywords(strings)) => {
                        assert_eq!(strings.strings, vec!["u1", "public"]);
                    }
                    other => panic!("expected keywords match, got {other:?}"),
                }
            }
            other => panic!("expected field condition, got {other:?}"),
        }
    }

    #[test]
    fn test_value_to_json_nested() {
        use qdrant_client::qdrant::{ListValue, Value};

        let value = Value {
            kind: Some(Kind::ListValue(ListValue {
                values: vec![
                    Value {
                        kind: Some(Kind::StringValue("public".to_string())),
                    },
                    Value {
                        kind: Some(Kind::StringValue("g1".to_string())),
                    },
                ],
            })),
        };
        assert_eq!(value_to_json(value), serde_json::json!(["public", "g1"]));
    }

    #[test]
    fn test_point_id_decoding() {
        let uuid = PointId::from("abc-123".to_string());
        assert_eq!(decode_point_id(Some(uuid)), "abc-123");

        let num = PointId::from(42u64);
        assert_eq!(decode_point_id(Some(num)), "42");

        assert_eq!(decode_point_id(None), "");
    }
}
