//! Typed list queries for the document store.
//!
//! Filters are the three shapes the server understands: equality, membership and
//! exclusion. They serialize to Frappe filter triples such as
//! `["status", "in", ["PO Approved", "Dispatched"]]`.

use serde::ser::Serializer;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A scalar value a filter compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl FilterValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Int(i) => Value::from(*i),
            Self::Bool(b) => Value::from(if *b { 1 } else { 0 }),
        }
    }

    /// Compares against a document field the way the server does: numbers and
    /// strings loosely, booleans as 0/1.
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match (self, field) {
            (Self::Text(expected), Some(Value::String(actual))) => expected == actual,
            (Self::Text(expected), Some(Value::Number(n))) => expected == &n.to_string(),
            (Self::Int(expected), Some(Value::Number(n))) => n.as_i64() == Some(*expected),
            (Self::Int(expected), Some(Value::String(s))) => s == &expected.to_string(),
            (Self::Bool(expected), Some(Value::Bool(b))) => expected == b,
            (Self::Bool(expected), Some(Value::Number(n))) => {
                n.as_i64() == Some(if *expected { 1 } else { 0 })
            }
            _ => false,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FilterValue),
    In(String, Vec<FilterValue>),
    NotIn(String, Vec<FilterValue>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn is_in<V, I>(field: impl Into<String>, values: I) -> Self
    where
        V: Into<FilterValue>,
        I: IntoIterator<Item = V>,
    {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<V, I>(field: impl Into<String>, values: I) -> Self
    where
        V: Into<FilterValue>,
        I: IntoIterator<Item = V>,
    {
        Self::NotIn(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq(field, _) | Self::In(field, _) | Self::NotIn(field, _) => field,
        }
    }

    pub fn operator(&self) -> &'static str {
        match self {
            Self::Eq(..) => "=",
            Self::In(..) => "in",
            Self::NotIn(..) => "not in",
        }
    }

    /// Evaluates the filter against a JSON document.
    pub fn matches(&self, doc: &Value) -> bool {
        let actual = doc.get(self.field());
        match self {
            Self::Eq(_, value) => value.matches(actual),
            Self::In(_, values) => values.iter().any(|v| v.matches(actual)),
            Self::NotIn(_, values) => !values.iter().any(|v| v.matches(actual)),
        }
    }

    pub fn to_json(&self) -> Value {
        let value = match self {
            Self::Eq(_, v) => v.to_json(),
            Self::In(_, vs) | Self::NotIn(_, vs) => {
                Value::Array(vs.iter().map(FilterValue::to_json).collect())
            }
        };
        Value::Array(vec![
            Value::String(self.field().to_string()),
            Value::String(self.operator().to_string()),
            value,
        ])
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = match self.order {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        };
        write!(f, "{} {}", self.field, order)
    }
}

/// List request: projected fields, filters, ordering and a page size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub fields: Vec<String>,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            order,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// `fields` parameter as the server expects it; all fields when none given.
    pub fn fields_param(&self) -> String {
        if self.fields.is_empty() {
            "[\"*\"]".to_string()
        } else {
            Value::Array(self.fields.iter().cloned().map(Value::String).collect()).to_string()
        }
    }

    pub fn filters_param(&self) -> String {
        filters_param(&self.filters)
    }
}

pub fn filters_param(filters: &[Filter]) -> String {
    Value::Array(filters.iter().map(Filter::to_json).collect()).to_string()
}
