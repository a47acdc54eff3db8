//! Query options and their canonical cache-key form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resource record: a JSON object keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// Sort directive for a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Options for a list query: projection, conjunctive equality filters,
/// ordering, and a row limit.
///
/// Filters whose value is `Null` or an empty string are treated as "no
/// constraint" and dropped before the query reaches the backend or the cache
/// key, so an unset dropdown never filters a list down to nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub select: Option<String>,
    /// BTreeMap so two option sets with the same filters in a different
    /// insertion order canonicalize to the same cache key.
    pub filters: BTreeMap<String, Value>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(column.into(), value.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filters that actually constrain the query. `Null` and empty-string
    /// values are skipped.
    pub fn effective_filters(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.filters.iter().filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            _ => Some((k.as_str(), v)),
        })
    }

    /// Canonical cache key for this query against a resource. Two
    /// semantically identical option sets always produce the same key.
    pub fn cache_key(&self, resource: &str) -> String {
        let mut key = String::from(resource);
        if let Some(select) = &self.select {
            key.push_str("|select=");
            key.push_str(select);
        }
        for (column, value) in self.effective_filters() {
            key.push('|');
            key.push_str(column);
            key.push_str("=eq.");
            key.push_str(&render_filter_value(value));
        }
        if let Some(order) = &self.order_by {
            key.push_str("|order=");
            key.push_str(&order.column);
            key.push_str(if order.ascending { ".asc" } else { ".desc" });
        }
        if let Some(limit) = self.limit {
            key.push_str("|limit=");
            key.push_str(&limit.to_string());
        }
        key
    }
}

/// Render a filter value the way it appears on the wire: strings unquoted,
/// everything else in JSON form.
pub(crate) fn render_filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
