//! Collection schema and repository request types.
//!
//! Collections are declared by plugins during bootstrap and describe a named
//! group of records. The request shapes (`FindOptions`, `CreateOptions`, ...)
//! are the public contract every domain service uses to reach persisted state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::filter::FilterCondition;

/// A single record as exchanged with the storage delegate.
pub type Record = Map<String, Value>;

/// Field kinds understood by the schema registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Text,
    Integer,
    BigInt,
    Float,
    Decimal,
    Boolean,
    Date,
    Datetime,
    Json,
    Uuid,
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

impl FieldType {
    /// Whether this field kind points at another collection.
    pub fn is_relation(self) -> bool {
        matches!(
            self,
            Self::BelongsTo | Self::HasOne | Self::HasMany | Self::BelongsToMany
        )
    }
}

/// Field definition within a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Field kind.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Field name.
    pub name: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub unique: bool,

    /// Default value applied by the storage engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Target collection name (relations only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Join collection for `belongsToMany`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,

    /// Free-form field options passed through to the storage engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl FieldDefinition {
    /// Create a field of the given kind.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_type,
            name: name.into(),
            required: false,
            unique: false,
            default: None,
            target: None,
            through: None,
            foreign_key: None,
            options: None,
        }
    }

    /// Create a relation field pointing at `target`.
    pub fn relation(
        name: impl Into<String>,
        field_type: FieldType,
        target: impl Into<String>,
    ) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::new(name, field_type)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn through(mut self, collection: impl Into<String>) -> Self {
        self.through = Some(collection.into());
        self
    }

    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Fields covered by the index, in order.
    pub fields: Vec<String>,

    #[serde(default)]
    pub unique: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Schema declaration for one named collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDefinition {
    /// Collection name (unique key in the registry).
    pub name: String,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,

    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,

    /// Whether the storage engine maintains `createdAt`/`updatedAt`.
    #[serde(default)]
    pub timestamps: bool,

    /// Whether the storage engine uses a `deletedAt` marker instead of deleting.
    #[serde(default)]
    pub soft_delete: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CollectionDefinition {
    /// Create an empty collection definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
            timestamps: false,
            soft_delete: false,
            description: None,
        }
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Look up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Primary key value used by `filter_by_tk` lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetKey {
    Int(i64),
    Str(String),
}

impl From<i64> for TargetKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for TargetKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for TargetKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<uuid::Uuid> for TargetKey {
    fn from(value: uuid::Uuid) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<TargetKey> for Value {
    fn from(key: TargetKey) -> Self {
        match key {
            TargetKey::Int(i) => Value::from(i),
            TargetKey::Str(s) => Value::String(s),
        }
    }
}

/// Options for `find` and `find_and_count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterCondition>,

    /// Projection; empty means all fields.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,

    /// Relation paths to include, dot-separated for nesting.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub appends: Vec<String>,

    /// Sort fields; a leading `-` means descending.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,

    /// Page number (1-indexed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FilterCondition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn appends<I, S>(mut self, appends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.appends = appends.into_iter().map(Into::into).collect();
        self
    }

    pub fn sort<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort = sort.into_iter().map(Into::into).collect();
        self
    }

    /// Paginate by page number and page size.
    pub fn page(mut self, page: u64, page_size: u64) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for `find_one` and `find_by_tk`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOneOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterCondition>,

    /// Primary key lookup; takes precedence over `filter`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_by_tk: Option<TargetKey>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub appends: Vec<String>,
}

impl FindOneOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FilterCondition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn by_tk(mut self, key: impl Into<TargetKey>) -> Self {
        self.filter_by_tk = Some(key.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn appends<I, S>(mut self, appends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.appends = appends.into_iter().map(Into::into).collect();
        self
    }
}

/// Options for `create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateOptions {
    pub values: Record,
}

impl CreateOptions {
    /// Build create options from a JSON object; non-objects yield empty values.
    pub fn new(values: Value) -> Self {
        Self {
            values: into_record(values),
        }
    }
}

/// Options for `update` and `update_many`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_by_tk: Option<TargetKey>,

    pub values: Record,
}

impl UpdateOptions {
    pub fn new(values: Value) -> Self {
        Self {
            filter: None,
            filter_by_tk: None,
            values: into_record(values),
        }
    }

    pub fn filter(mut self, filter: FilterCondition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn by_tk(mut self, key: impl Into<TargetKey>) -> Self {
        self.filter_by_tk = Some(key.into());
        self
    }
}

/// Options for `destroy` and `destroy_many`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DestroyOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterCondition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_by_tk: Option<TargetKey>,
}

impl DestroyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FilterCondition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn by_tk(mut self, key: impl Into<TargetKey>) -> Self {
        self.filter_by_tk = Some(key.into());
        self
    }
}

/// A page of results plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResult<T> {
    /// Map each row, keeping the pagination metadata.
    pub fn map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PaginatedResult<U>, E> {
        Ok(PaginatedResult {
            data: self.data.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        })
    }
}

/// Number of rows affected by a bulk operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCount {
    pub count: u64,
}

pub(crate) fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}
