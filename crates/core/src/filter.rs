//! Payload-filter grammar
//!
//! The store-agnostic filter passed to the vector index: a conjunction of
//! `must` conditions with optional `should`/`must_not` branches. Leaves
//! match a payload key against a keyword, any of a keyword set, or full-text
//! content. Adapters translate this into the store's native filter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchValue {
    /// Exact keyword match.
    Keyword(String),
    /// Match if the payload value equals (or, for array payloads,
    /// contains) any of the given keywords.
    AnyOf(Vec<String>),
    /// Full-text match against the payload value.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCondition {
    Match { key: String, value: MatchValue },
}

impl FilterCondition {
    pub fn keyword(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Match {
            key: key.into(),
            value: MatchValue::Keyword(value.into()),
        }
    }

    pub fn any_of(key: impl Into<String>, values: Vec<String>) -> Self {
        Self::Match {
            key: key.into(),
            value: MatchValue::AnyOf(values),
        }
    }

    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Match {
            key: key.into(),
            value: MatchValue::Text(value.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PayloadFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<FilterCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<FilterCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<FilterCondition>,
}

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, condition: FilterCondition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn must_not(mut self, condition: FilterCondition) -> Self {
        self.must_not.push(condition);
        self
    }

    /// Merge another filter's branches into this one (conjunction).
    pub fn merge(mut self, other: PayloadFilter) -> Self {
        self.must.extend(other.must);
        self.should.extend(other.should);
        self.must_not.extend(other.must_not);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }
}
