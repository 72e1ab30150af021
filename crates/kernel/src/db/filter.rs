//! Abstract filter conditions.
//!
//! A [`FilterCondition`] is an ordered list of entries: field predicates and
//! the `$and`/`$or` combinators. Conditions can be built in code or parsed
//! from the JSON shape used on the wire:
//!
//! ```ignore
//! { "status": "published", "views": { "$gte": 5, "$lte": 10 },
//!   "$or": [ { "title": { "$iLike": "%rust%" } }, { "pinned": true } ] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while parsing a filter from JSON.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter must be a JSON object")]
    NotAnObject,

    #[error("'{key}' must hold an array of filter objects")]
    InvalidCombinator { key: String },
}

/// A recursive filter condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct FilterCondition {
    entries: Vec<FilterEntry>,
}

/// One entry of a filter condition, in input order.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEntry {
    And(Vec<FilterCondition>),
    Or(Vec<FilterCondition>),
    Field { name: String, predicate: FieldPredicate },
}

/// Predicate applied to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPredicate {
    /// Direct equality against a literal value.
    Value(Value),
    /// One or more comparison operators, combined with AND.
    Operators(FieldOperators),
}

/// The supported comparison operators for one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOperators {
    pub eq: Option<Value>,
    pub ne: Option<Value>,
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
    pub in_list: Option<Vec<Value>>,
    pub not_in: Option<Vec<Value>>,
    pub like: Option<String>,
    pub i_like: Option<String>,
    pub is_null: Option<bool>,
}

impl FieldOperators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, value: impl Into<Value>) -> Self {
        self.eq = Some(value.into());
        self
    }

    pub fn ne(mut self, value: impl Into<Value>) -> Self {
        self.ne = Some(value.into());
        self
    }

    pub fn gt(mut self, value: impl Into<Value>) -> Self {
        self.gt = Some(value.into());
        self
    }

    pub fn gte(mut self, value: impl Into<Value>) -> Self {
        self.gte = Some(value.into());
        self
    }

    pub fn lt(mut self, value: impl Into<Value>) -> Self {
        self.lt = Some(value.into());
        self
    }

    pub fn lte(mut self, value: impl Into<Value>) -> Self {
        self.lte = Some(value.into());
        self
    }

    pub fn in_list<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_list = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn not_in<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.not_in = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn like(mut self, pattern: impl Into<String>) -> Self {
        self.like = Some(pattern.into());
        self
    }

    pub fn i_like(mut self, pattern: impl Into<String>) -> Self {
        self.i_like = Some(pattern.into());
        self
    }

    pub fn is_null(mut self, is_null: bool) -> Self {
        self.is_null = Some(is_null);
        self
    }

    /// True when no operator is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse the `$`-operators out of a JSON object.
    ///
    /// Keys outside the operator set are ignored; `$like`/`$iLike` need a
    /// string and `$isNull` a boolean, otherwise they are ignored too.
    fn from_object(object: &Map<String, Value>) -> Self {
        let mut ops = Self::new();
        for (key, value) in object {
            match key.as_str() {
                "$eq" => ops.eq = Some(value.clone()),
                "$ne" => ops.ne = Some(value.clone()),
                "$gt" => ops.gt = Some(value.clone()),
                "$gte" => ops.gte = Some(value.clone()),
                "$lt" => ops.lt = Some(value.clone()),
                "$lte" => ops.lte = Some(value.clone()),
                "$in" => ops.in_list = Some(as_list(value)),
                "$notIn" => ops.not_in = Some(as_list(value)),
                "$like" => ops.like = value.as_str().map(str::to_string),
                "$iLike" => ops.i_like = value.as_str().map(str::to_string),
                "$isNull" => ops.is_null = value.as_bool(),
                _ => {}
            }
        }
        ops
    }

    fn to_object(&self) -> Map<String, Value> {
        let mut object = Map::new();
        let scalars = [
            ("$eq", &self.eq),
            ("$ne", &self.ne),
            ("$gt", &self.gt),
            ("$gte", &self.gte),
            ("$lt", &self.lt),
            ("$lte", &self.lte),
        ];
        for (key, value) in scalars {
            if let Some(v) = value {
                object.insert(key.to_string(), v.clone());
            }
        }
        if let Some(list) = &self.in_list {
            object.insert("$in".to_string(), Value::Array(list.clone()));
        }
        if let Some(list) = &self.not_in {
            object.insert("$notIn".to_string(), Value::Array(list.clone()));
        }
        if let Some(pattern) = &self.like {
            object.insert("$like".to_string(), Value::String(pattern.clone()));
        }
        if let Some(pattern) = &self.i_like {
            object.insert("$iLike".to_string(), Value::String(pattern.clone()));
        }
        if let Some(is_null) = self.is_null {
            object.insert("$isNull".to_string(), Value::Bool(is_null));
        }
        object
    }
}

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

impl FilterCondition {
    /// Create an empty condition (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a direct equality predicate.
    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push(FilterEntry::Field {
            name: field.into(),
            predicate: FieldPredicate::Value(value.into()),
        });
        self
    }

    /// Add an operator predicate.
    pub fn field(mut self, field: impl Into<String>, ops: FieldOperators) -> Self {
        self.entries.push(FilterEntry::Field {
            name: field.into(),
            predicate: FieldPredicate::Operators(ops),
        });
        self
    }

    /// Add an `$and` group.
    pub fn and(mut self, conditions: Vec<FilterCondition>) -> Self {
        self.entries.push(FilterEntry::And(conditions));
        self
    }

    /// Add an `$or` group.
    pub fn or(mut self, conditions: Vec<FilterCondition>) -> Self {
        self.entries.push(FilterEntry::Or(conditions));
        self
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a condition from its JSON representation.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let object = value.as_object().ok_or(FilterError::NotAnObject)?;
        let mut entries = Vec::with_capacity(object.len());

        for (key, value) in object {
            match key.as_str() {
                "$and" | "$or" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| FilterError::InvalidCombinator { key: key.clone() })?;
                    let nested = items
                        .iter()
                        .map(|item| {
                            Self::from_json(item)
                                .map_err(|_| FilterError::InvalidCombinator { key: key.clone() })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    entries.push(if key == "$and" {
                        FilterEntry::And(nested)
                    } else {
                        FilterEntry::Or(nested)
                    });
                }
                _ => {
                    let predicate = match value {
                        Value::Object(object) => {
                            let ops = FieldOperators::from_object(object);
                            if ops.is_empty() {
                                FieldPredicate::Value(value.clone())
                            } else {
                                FieldPredicate::Operators(ops)
                            }
                        }
                        other => FieldPredicate::Value(other.clone()),
                    };
                    entries.push(FilterEntry::Field {
                        name: key.clone(),
                        predicate,
                    });
                }
            }
        }

        Ok(Self { entries })
    }

    /// Render the condition back into its JSON representation.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for entry in &self.entries {
            match entry {
                FilterEntry::And(items) => {
                    object.insert(
                        "$and".to_string(),
                        Value::Array(items.iter().map(Self::to_json).collect()),
                    );
                }
                FilterEntry::Or(items) => {
                    object.insert(
                        "$or".to_string(),
                        Value::Array(items.iter().map(Self::to_json).collect()),
                    );
                }
                FilterEntry::Field { name, predicate } => {
                    let value = match predicate {
                        FieldPredicate::Value(v) => v.clone(),
                        FieldPredicate::Operators(ops) => Value::Object(ops.to_object()),
                    };
                    object.insert(name.clone(), value);
                }
            }
        }
        Value::Object(object)
    }
}

impl TryFrom<Value> for FilterCondition {
    type Error = FilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

impl From<FilterCondition> for Value {
    fn from(condition: FilterCondition) -> Self {
        condition.to_json()
    }
}
