//! In-process store.
//!
//! A reference implementation of the storage contract that keeps every
//! collection as a vector of JSON records and evaluates the compiled native
//! query directly (`where`, `orderBy`, `skip`/`take`, `select`). Relation
//! inclusion is accepted but not resolved. Used by tests and by the CLI dry
//! run.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use uuid::Uuid;

use super::query::{
    CountArgs, CreateArgs, CreateManyArgs, DeleteArgs, FindFirstArgs, FindManyArgs, OrderBy,
    Select, SortDirection, UpdateArgs, WhereClause,
};
use super::store::{PendingOperation, Store, StoreDelegate, StoreHandle, StoreTransaction};
use super::types::{BatchCount, Record};

type Tables = HashMap<String, Vec<Record>>;

/// Native comparison keys a field clause may carry.
const NATIVE_OPERATORS: &[&str] = &[
    "equals", "not", "gt", "gte", "lt", "lte", "in", "notIn", "contains", "mode",
];

/// In-memory storage engine.
///
/// Tables must be created up front unless the store was built with
/// [`MemoryStore::with_auto_tables`]; without a table there is no delegate.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    auto_tables: bool,
    connected: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create tables on first delegate lookup.
    pub fn with_auto_tables(mut self) -> Self {
        self.auto_tables = true;
        self
    }

    /// Builder form of [`MemoryStore::create_table`].
    pub fn with_table(self, name: &str) -> Self {
        self.create_table(name);
        self
    }

    /// Create an empty table if it does not exist yet.
    pub fn create_table(&self, name: &str) {
        self.tables.write().entry(name.to_string()).or_default();
    }

    /// Number of rows currently stored in a table.
    pub fn row_count(&self, name: &str) -> usize {
        self.tables.read().get(name).map(|rows| rows.len()).unwrap_or(0)
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl StoreHandle for MemoryStore {
    fn delegate(&self, collection: &str) -> Option<Arc<dyn StoreDelegate>> {
        resolve_delegate(&self.tables, self.auto_tables, collection)
    }

    async fn batch(&self, operations: Vec<PendingOperation>) -> Result<Vec<Value>> {
        run_batch(&self.tables, self.auto_tables, operations)
    }

    async fn raw_query(&self, query: &str, _params: Vec<Value>) -> Result<Vec<Value>> {
        bail!("memory store does not support raw queries: {query}")
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let snapshot = self.tables.read().clone();
        Ok(Box::new(MemoryTransaction {
            target: Arc::clone(&self.tables),
            working: Arc::new(RwLock::new(snapshot.clone())),
            snapshot,
            auto_tables: self.auto_tables,
            finished: Mutex::new(false),
        }))
    }
}

/// Transaction over a private copy of the tables.
///
/// Commit writes back only the tables the transaction changed; tables it
/// left alone keep whatever other writers stored meanwhile.
struct MemoryTransaction {
    target: Arc<RwLock<Tables>>,
    working: Arc<RwLock<Tables>>,
    snapshot: Tables,
    auto_tables: bool,
    finished: Mutex<bool>,
}

impl MemoryTransaction {
    fn finish(&self) -> Result<()> {
        let mut finished = self.finished.lock();
        if *finished {
            bail!("transaction already finished");
        }
        *finished = true;
        Ok(())
    }
}

#[async_trait]
impl StoreHandle for MemoryTransaction {
    fn delegate(&self, collection: &str) -> Option<Arc<dyn StoreDelegate>> {
        resolve_delegate(&self.working, self.auto_tables, collection)
    }

    async fn batch(&self, operations: Vec<PendingOperation>) -> Result<Vec<Value>> {
        run_batch(&self.working, self.auto_tables, operations)
    }

    async fn raw_query(&self, query: &str, _params: Vec<Value>) -> Result<Vec<Value>> {
        bail!("memory store does not support raw queries: {query}")
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn commit(&self) -> Result<()> {
        self.finish()?;
        let working = self.working.read();
        let mut target = self.target.write();
        for (name, rows) in working.iter() {
            let changed = match self.snapshot.get(name) {
                Some(before) => before != rows,
                None => !rows.is_empty(),
            };
            if changed {
                target.insert(name.clone(), rows.clone());
            } else {
                target.entry(name.clone()).or_default();
            }
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.finish()
    }
}

fn resolve_delegate(
    tables: &Arc<RwLock<Tables>>,
    auto_tables: bool,
    collection: &str,
) -> Option<Arc<dyn StoreDelegate>> {
    if auto_tables {
        tables.write().entry(collection.to_string()).or_default();
    } else if !tables.read().contains_key(collection) {
        return None;
    }

    Some(Arc::new(MemoryDelegate {
        tables: Arc::clone(tables),
        collection: collection.to_string(),
    }))
}

/// Apply every operation to a copy and swap it in only if all succeed.
fn run_batch(
    tables: &Arc<RwLock<Tables>>,
    auto_tables: bool,
    operations: Vec<PendingOperation>,
) -> Result<Vec<Value>> {
    let mut guard = tables.write();
    let mut scratch = guard.clone();
    let mut results = Vec::with_capacity(operations.len());

    for operation in operations {
        let name = operation.collection().to_string();
        if auto_tables {
            scratch.entry(name.clone()).or_default();
        }
        let table = scratch
            .get_mut(&name)
            .ok_or_else(|| anyhow!("unknown table '{name}'"))?;

        let result = match operation {
            PendingOperation::Create { args, .. } => insert(table, args.data),
            PendingOperation::CreateMany { args, .. } => {
                count_value(insert_many(table, args.data))
            }
            PendingOperation::Update { args, .. } => {
                update_one(table, args.where_clause.as_ref(), &args.data, &name)?
            }
            PendingOperation::UpdateMany { args, .. } => {
                count_value(update_all(table, args.where_clause.as_ref(), &args.data))
            }
            PendingOperation::Delete { args, .. } => {
                delete_one(table, args.where_clause.as_ref(), &name)?
            }
            PendingOperation::DeleteMany { args, .. } => {
                count_value(delete_all(table, args.where_clause.as_ref()))
            }
        };
        results.push(result);
    }

    *guard = scratch;
    Ok(results)
}

fn count_value(count: u64) -> Value {
    serde_json::json!({ "count": count })
}

/// Delegate over one table.
struct MemoryDelegate {
    tables: Arc<RwLock<Tables>>,
    collection: String,
}

impl MemoryDelegate {
    fn read<T>(&self, f: impl FnOnce(&[Record]) -> T) -> Result<T> {
        let tables = self.tables.read();
        let table = tables
            .get(&self.collection)
            .ok_or_else(|| anyhow!("table '{}' was dropped", self.collection))?;
        Ok(f(table))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Vec<Record>) -> Result<T>) -> Result<T> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(&self.collection)
            .ok_or_else(|| anyhow!("table '{}' was dropped", self.collection))?;
        f(table)
    }
}

#[async_trait]
impl StoreDelegate for MemoryDelegate {
    async fn find_many(&self, args: FindManyArgs) -> Result<Vec<Value>> {
        self.read(|rows| {
            let mut matched: Vec<&Record> = rows
                .iter()
                .filter(|row| matches_where(row, args.where_clause.as_ref()))
                .collect();

            if let Some(order_by) = &args.order_by {
                matched.sort_by(|a, b| compare_rows(a, b, order_by));
            }

            let skip = args
                .skip
                .map(|s| usize::try_from(s).unwrap_or(usize::MAX))
                .unwrap_or(0);
            let take = args
                .take
                .map(|t| usize::try_from(t).unwrap_or(usize::MAX))
                .unwrap_or(usize::MAX);

            matched
                .into_iter()
                .skip(skip)
                .take(take)
                .map(|row| project(row, args.select.as_ref()))
                .collect()
        })
    }

    async fn find_first(&self, args: FindFirstArgs) -> Result<Option<Value>> {
        self.read(|rows| {
            rows.iter()
                .find(|row| matches_where(row, args.where_clause.as_ref()))
                .map(|row| project(row, args.select.as_ref()))
        })
    }

    async fn create(&self, args: CreateArgs) -> Result<Value> {
        self.write(|rows| Ok(insert(rows, args.data)))
    }

    async fn create_many(&self, args: CreateManyArgs) -> Result<BatchCount> {
        self.write(|rows| {
            Ok(BatchCount {
                count: insert_many(rows, args.data),
            })
        })
    }

    async fn update(&self, args: UpdateArgs) -> Result<Value> {
        self.write(|rows| {
            update_one(rows, args.where_clause.as_ref(), &args.data, &self.collection)
        })
    }

    async fn update_many(&self, args: UpdateArgs) -> Result<BatchCount> {
        self.write(|rows| {
            Ok(BatchCount {
                count: update_all(rows, args.where_clause.as_ref(), &args.data),
            })
        })
    }

    async fn delete(&self, args: DeleteArgs) -> Result<Value> {
        self.write(|rows| delete_one(rows, args.where_clause.as_ref(), &self.collection))
    }

    async fn delete_many(&self, args: DeleteArgs) -> Result<BatchCount> {
        self.write(|rows| {
            Ok(BatchCount {
                count: delete_all(rows, args.where_clause.as_ref()),
            })
        })
    }

    async fn count(&self, args: CountArgs) -> Result<u64> {
        self.read(|rows| {
            rows.iter()
                .filter(|row| matches_where(row, args.where_clause.as_ref()))
                .count() as u64
        })
    }
}

fn insert(rows: &mut Vec<Record>, mut data: Record) -> Value {
    if !data.contains_key("id") {
        data.insert("id".to_string(), Value::String(Uuid::now_v7().to_string()));
    }
    rows.push(data.clone());
    Value::Object(data)
}

fn insert_many(rows: &mut Vec<Record>, data: Vec<Record>) -> u64 {
    let mut count = 0;
    for record in data {
        insert(rows, record);
        count += 1;
    }
    count
}

fn update_one(
    rows: &mut [Record],
    where_clause: Option<&WhereClause>,
    data: &Record,
    collection: &str,
) -> Result<Value> {
    let row = rows
        .iter_mut()
        .find(|row| matches_where(row, where_clause))
        .ok_or_else(|| anyhow!("no '{collection}' record matches the update"))?;
    merge(row, data);
    Ok(Value::Object(row.clone()))
}

fn update_all(rows: &mut [Record], where_clause: Option<&WhereClause>, data: &Record) -> u64 {
    let mut count = 0;
    for row in rows.iter_mut().filter(|row| matches_where(row, where_clause)) {
        merge(row, data);
        count += 1;
    }
    count
}

fn delete_one(
    rows: &mut Vec<Record>,
    where_clause: Option<&WhereClause>,
    collection: &str,
) -> Result<Value> {
    let index = rows
        .iter()
        .position(|row| matches_where(row, where_clause))
        .ok_or_else(|| anyhow!("no '{collection}' record matches the delete"))?;
    Ok(Value::Object(rows.remove(index)))
}

fn delete_all(rows: &mut Vec<Record>, where_clause: Option<&WhereClause>) -> u64 {
    let before = rows.len();
    rows.retain(|row| !matches_where(row, where_clause));
    (before - rows.len()) as u64
}

fn merge(row: &mut Record, data: &Record) {
    for (key, value) in data {
        row.insert(key.clone(), value.clone());
    }
}

fn project(row: &Record, select: Option<&Select>) -> Value {
    match select {
        Some(select) => Value::Object(
            row.iter()
                .filter(|(key, _)| select.get(key.as_str()).copied().unwrap_or(false))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        None => Value::Object(row.clone()),
    }
}

fn matches_where(row: &Record, where_clause: Option<&WhereClause>) -> bool {
    where_clause.is_none_or(|clause| matches_clause(row, clause))
}

fn matches_clause(row: &Record, clause: &WhereClause) -> bool {
    clause.iter().all(|(key, condition)| match key.as_str() {
        "AND" => sub_clauses(condition).all(|sub| matches_clause(row, sub)),
        "OR" => sub_clauses(condition).any(|sub| matches_clause(row, sub)),
        "NOT" => !sub_clauses(condition).any(|sub| matches_clause(row, sub)),
        field => matches_field(row.get(field).unwrap_or(&Value::Null), condition),
    })
}

fn sub_clauses(condition: &Value) -> impl Iterator<Item = &WhereClause> {
    let items: &[Value] = match condition {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    };
    items.iter().filter_map(Value::as_object)
}

fn matches_field(value: &Value, condition: &Value) -> bool {
    let ops = match condition {
        Value::Object(ops)
            if !ops.is_empty() && ops.keys().all(|k| NATIVE_OPERATORS.contains(&k.as_str())) =>
        {
            ops
        }
        literal => return loose_eq(value, literal),
    };

    let insensitive = ops.get("mode").and_then(Value::as_str) == Some("insensitive");

    ops.iter().all(|(op, operand)| match op.as_str() {
        "equals" => loose_eq(value, operand),
        "not" => !loose_eq(value, operand),
        "gt" => compare(value, operand) == Some(Ordering::Greater),
        "gte" => matches!(
            compare(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "lt" => compare(value, operand) == Some(Ordering::Less),
        "lte" => matches!(
            compare(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "in" => operand
            .as_array()
            .is_some_and(|list| list.iter().any(|item| loose_eq(value, item))),
        "notIn" => operand
            .as_array()
            .is_none_or(|list| !list.iter().any(|item| loose_eq(value, item))),
        "contains" => contains(value, operand, insensitive),
        _ => true,
    })
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(value: &Value, needle: &Value, insensitive: bool) -> bool {
    let (Some(haystack), Some(needle)) = (value.as_str(), needle.as_str()) else {
        return false;
    };
    if insensitive {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    } else {
        haystack.contains(needle)
    }
}

// Nulls sort first; values of different kinds compare equal.
fn compare_rows(a: &Record, b: &Record, order_by: &[OrderBy]) -> Ordering {
    for entry in order_by {
        let left = a.get(&entry.field).unwrap_or(&Value::Null);
        let right = b.get(&entry.field).unwrap_or(&Value::Null);
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => compare(left, right).unwrap_or(Ordering::Equal),
        };
        let ordering = match entry.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
