//! Filter compiler.
//!
//! Pure translation from repository request shapes (filters, sort lists,
//! projections, pagination) into the native query arguments in
//! [`super::query`]. Nothing here holds state; every repository call compiles
//! its request fresh.

use serde_json::{Map, Value};

use super::filter::{FieldOperators, FieldPredicate, FilterCondition, FilterEntry};
use super::query::{IncludeNode, IncludeTree, OrderBy, Select, SortDirection, WhereClause};
use super::types::TargetKey;

/// Compile a filter condition into a native where clause.
///
/// `$and`/`$or` become `AND`/`OR` arrays in input order, operator objects
/// become one native comparison object per field, literals compile to
/// direct equality.
pub fn build_where(filter: Option<&FilterCondition>) -> Option<WhereClause> {
    filter.map(compile_condition)
}

fn compile_condition(condition: &FilterCondition) -> WhereClause {
    let mut clause = WhereClause::new();

    for entry in condition.entries() {
        match entry {
            FilterEntry::And(items) => {
                clause.insert("AND".to_string(), compile_group(items));
            }
            FilterEntry::Or(items) => {
                clause.insert("OR".to_string(), compile_group(items));
            }
            FilterEntry::Field { name, predicate } => {
                let value = match predicate {
                    FieldPredicate::Value(value) => value.clone(),
                    FieldPredicate::Operators(ops) => Value::Object(compile_operators(ops)),
                };
                clause.insert(name.clone(), value);
            }
        }
    }

    clause
}

fn compile_group(items: &[FilterCondition]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|item| Value::Object(compile_condition(item)))
            .collect(),
    )
}

/// Combine every operator on one field into a single comparison object.
///
/// `$iLike` wins over `$like` and `$isNull` wins over `$eq`/`$ne`, matching
/// the order the native keys are written.
fn compile_operators(ops: &FieldOperators) -> Map<String, Value> {
    let mut native = Map::new();

    if let Some(v) = &ops.eq {
        native.insert("equals".to_string(), v.clone());
    }
    if let Some(v) = &ops.ne {
        native.insert("not".to_string(), v.clone());
    }
    if let Some(v) = &ops.gt {
        native.insert("gt".to_string(), v.clone());
    }
    if let Some(v) = &ops.gte {
        native.insert("gte".to_string(), v.clone());
    }
    if let Some(v) = &ops.lt {
        native.insert("lt".to_string(), v.clone());
    }
    if let Some(v) = &ops.lte {
        native.insert("lte".to_string(), v.clone());
    }
    if let Some(list) = &ops.in_list {
        native.insert("in".to_string(), Value::Array(list.clone()));
    }
    if let Some(list) = &ops.not_in {
        native.insert("notIn".to_string(), Value::Array(list.clone()));
    }
    if let Some(pattern) = &ops.like {
        native.insert("contains".to_string(), Value::String(strip_wildcards(pattern)));
    }
    if let Some(pattern) = &ops.i_like {
        native.insert("contains".to_string(), Value::String(strip_wildcards(pattern)));
        native.insert("mode".to_string(), Value::String("insensitive".to_string()));
    }
    if let Some(is_null) = ops.is_null {
        if is_null {
            native.insert("equals".to_string(), Value::Null);
        } else {
            native.insert("not".to_string(), Value::Null);
        }
    }

    native
}

// Only `%` is stripped; `_` and escape characters pass through untouched.
fn strip_wildcards(pattern: &str) -> String {
    pattern.replace('%', "")
}

/// Compile a sort list; a leading `-` means descending.
pub fn build_order_by(sort: &[String]) -> Option<Vec<OrderBy>> {
    if sort.is_empty() {
        return None;
    }

    Some(
        sort.iter()
            .map(|field| match field.strip_prefix('-') {
                Some(name) => OrderBy {
                    field: name.to_string(),
                    direction: SortDirection::Desc,
                },
                None => OrderBy {
                    field: field.clone(),
                    direction: SortDirection::Asc,
                },
            })
            .collect(),
    )
}

/// Compile a field list into an explicit inclusion projection.
pub fn build_select(fields: &[String]) -> Option<Select> {
    if fields.is_empty() {
        return None;
    }
    Some(fields.iter().map(|f| (f.clone(), true)).collect())
}

/// Compile relation paths into a nested inclusion tree.
///
/// `"creator.profile"` becomes `{creator: {include: {profile: true}}}`.
pub fn build_include(appends: &[String]) -> Option<IncludeTree> {
    if appends.is_empty() {
        return None;
    }

    let mut root = IncludeTree::new();
    for path in appends {
        let parts: Vec<&str> = path.split('.').collect();
        insert_path(&mut root, &parts);
    }
    Some(root)
}

fn insert_path(tree: &mut IncludeTree, parts: &[&str]) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };

    if rest.is_empty() {
        // A shorter path never collapses an existing nested node.
        tree.entry((*head).to_string()).or_insert(IncludeNode::Leaf);
        return;
    }

    let node = tree
        .entry((*head).to_string())
        .or_insert_with(|| IncludeNode::Nested(IncludeTree::new()));
    if matches!(node, IncludeNode::Leaf) {
        *node = IncludeNode::Nested(IncludeTree::new());
    }
    if let IncludeNode::Nested(children) = node {
        insert_path(children, rest);
    }
}

/// Compiled projection: at most one of `select`/`include` is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub select: Option<Select>,
    pub include: Option<IncludeTree>,
}

/// Compile `fields` and `appends` together.
///
/// The native query cannot carry both a projection and an inclusion tree, so
/// when fields are requested the relation names are merged into the
/// projection instead.
pub fn build_projection(fields: &[String], appends: &[String]) -> Projection {
    match build_select(fields) {
        Some(mut select) => {
            for relation in appends {
                select.insert(relation.clone(), true);
            }
            Projection {
                select: Some(select),
                include: None,
            }
        }
        None => Projection {
            select: None,
            include: build_include(appends),
        },
    }
}

/// Compiled pagination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

/// Compile pagination; `page`/`page_size` win over `offset`/`limit`.
///
/// A page of zero or a page size of zero is treated as absent. The skip
/// saturates instead of overflowing for absurdly large pages.
pub fn build_pagination(
    page: Option<u64>,
    page_size: Option<u64>,
    offset: Option<u64>,
    limit: Option<u64>,
) -> Pagination {
    match (page, page_size) {
        (Some(page), Some(size)) if page > 0 && size > 0 => Pagination {
            skip: Some((page - 1).saturating_mul(size)),
            take: Some(size),
        },
        _ => Pagination {
            skip: offset,
            take: limit,
        },
    }
}

/// Where clause for a primary-key lookup.
pub fn build_key_where(key: &TargetKey) -> WhereClause {
    let mut clause = WhereClause::new();
    clause.insert("id".to_string(), Value::from(key.clone()));
    clause
}

/// Key lookup takes precedence over the filter.
pub fn build_target_where(
    key: Option<&TargetKey>,
    filter: Option<&FilterCondition>,
) -> Option<WhereClause> {
    match key {
        Some(key) => Some(build_key_where(key)),
        None => build_where(filter),
    }
}
