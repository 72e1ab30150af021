//! Native query arguments understood by storage delegates.
//!
//! These are the compiled form of repository requests. They serialize to the
//! JSON shape a delegate receives, e.g.
//! `{"where": {"age": {"gte": 5}}, "orderBy": [{"name": "asc"}], "take": 10}`.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::types::Record;

/// Compiled where clause.
pub type WhereClause = Map<String, Value>;

/// Explicit inclusion projection: field name to `true`.
pub type Select = BTreeMap<String, bool>;

/// Nested relation inclusion tree.
pub type IncludeTree = BTreeMap<String, IncludeNode>;

/// Sort direction for one order-by entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One order-by entry, serialized as `{field: "asc" | "desc"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, &self.direction)?;
        map.end()
    }
}

/// A node in the relation inclusion tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeNode {
    /// Include the relation as-is (`true`).
    Leaf,
    /// Include the relation and some of its own relations (`{"include": {...}}`).
    Nested(IncludeTree),
}

impl Serialize for IncludeNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf => serializer.serialize_bool(true),
            Self::Nested(tree) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("include", tree)?;
                map.end()
            }
        }
    }
}

/// Arguments for `find_many`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindManyArgs {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<OrderBy>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Select>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<IncludeTree>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub take: Option<u64>,
}

/// Arguments for `find_first`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FindFirstArgs {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Select>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<IncludeTree>,
}

/// Arguments for `create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateArgs {
    pub data: Record,
}

/// Arguments for `create_many`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateManyArgs {
    pub data: Vec<Record>,
}

/// Arguments for `update` and `update_many`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateArgs {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,

    pub data: Record,
}

/// Arguments for `delete` and `delete_many`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteArgs {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,
}

/// Arguments for `count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CountArgs {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,
}
