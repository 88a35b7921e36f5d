// Avro record schema for billing report rows
//
// A schema is built from the header of a payload: one sourced field per header
// column (typed through a fixed override table) followed by the seven derived
// fields in a fixed order. The same structure is serialized as the Avro schema
// JSON embedded in the output and drives field iteration in the transformer and
// the encoder.

use std::collections::{HashMap, HashSet};

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::columns::{derived, report};
use crate::error::{ConvertError, Result};

/// Record name used when none is configured
pub const DEFAULT_RECORD_NAME: &str = "BillingReport";

/// Value kind of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Long,
    Double,
    String,
    Boolean,
    OptionalLong,
    OptionalDouble,
    OptionalString,
}

impl FieldKind {
    /// Whether the field may be written as null
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            Self::OptionalLong | Self::OptionalDouble | Self::OptionalString
        )
    }

    /// Avro primitive name of the non-null branch
    pub fn primitive(self) -> &'static str {
        match self {
            Self::Long | Self::OptionalLong => "long",
            Self::Double | Self::OptionalDouble => "double",
            Self::String | Self::OptionalString => "string",
            Self::Boolean => "boolean",
        }
    }
}

/// Report columns with a non-string type
const TYPE_OVERRIDES: &[(&str, FieldKind)] = &[
    (report::PAYER_ACCOUNT_ID, FieldKind::Long),
    (report::LINKED_ACCOUNT_ID, FieldKind::Long),
    (report::SUBSCRIPTION_ID, FieldKind::OptionalLong),
    (report::PRICING_PLAN_ID, FieldKind::OptionalLong),
    (report::USAGE_QUANTITY, FieldKind::OptionalDouble),
    (report::BLENDED_RATE, FieldKind::OptionalDouble),
    (report::BLENDED_COST, FieldKind::OptionalDouble),
    (report::UN_BLENDED_RATE, FieldKind::OptionalDouble),
    (report::UN_BLENDED_COST, FieldKind::OptionalDouble),
];

/// Derived fields, in the order they are appended to every schema
const DERIVED_FIELDS: [(&str, FieldKind); derived::COUNT] = [
    (derived::SERVICE, FieldKind::OptionalString),
    (derived::INSTANCE_USAGE, FieldKind::OptionalString),
    (derived::INSTANCE_TYPE, FieldKind::OptionalString),
    (derived::INSTANCE_CLASS, FieldKind::OptionalString),
    (derived::SUBSCRIPTION_PREPAY, FieldKind::Boolean),
    (derived::SUBSCRIPTION_CHARGE, FieldKind::Boolean),
    (derived::START_DATE, FieldKind::Long),
];

/// Kind of a report column, `String` unless overridden
pub fn column_kind(column: &str) -> FieldKind {
    TYPE_OVERRIDES
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, kind)| *kind)
        .unwrap_or(FieldKind::String)
}

/// Turn a header name into a legal Avro field name.
///
/// Colons (used by tag columns such as `user:Name`) and any other character
/// outside `[A-Za-z0-9_]` become `_`.
pub fn sanitize_field_name(column: &str) -> String {
    let mut name: String = column
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }

    name
}

/// Ordered column names from the first line of a payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Name → position map for this header
    pub fn index(&self) -> ColumnIndex {
        ColumnIndex::new(self)
    }

    /// Merge several headers into one, keeping first-seen column order.
    ///
    /// The first header is kept whole (duplicates included); later headers
    /// contribute columns the merged header does not have yet.
    pub fn union<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = &'a Header>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (i, header) in headers.into_iter().enumerate() {
            for column in &header.columns {
                if i == 0 || !seen.contains(column) {
                    columns.push(column.clone());
                }
            }
            seen.extend(header.columns.iter().cloned());
        }

        Self { columns }
    }
}

/// Column name → positions lookup for one header
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    positions: HashMap<String, Vec<usize>>,
}

impl ColumnIndex {
    fn new(header: &Header) -> Self {
        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, column) in header.columns.iter().enumerate() {
            positions.entry(column.clone()).or_default().push(idx);
        }
        Self { positions }
    }

    /// First position of `column`
    pub fn position(&self, column: &str) -> Option<usize> {
        self.nth_position(column, 0)
    }

    /// Position of the `occurrence`-th column named `column`
    pub fn nth_position(&self, column: &str, occurrence: usize) -> Option<usize> {
        self.positions
            .get(column)
            .and_then(|found| found.get(occurrence))
            .copied()
    }
}

/// One field of the output record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Avro field name (sanitized, unique within the schema)
    pub name: String,
    /// Report column the value is read from; the field name for derived fields
    pub column: String,
    pub kind: FieldKind,
    /// `true` when copied from an input column, `false` when computed
    pub sourced: bool,
}

impl Serialize for FieldSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut field = serializer.serialize_map(Some(2))?;
        field.serialize_entry("name", &self.name)?;
        if self.kind.is_optional() {
            field.serialize_entry("type", &["null", self.kind.primitive()])?;
        } else {
            field.serialize_entry("type", self.kind.primitive())?;
        }
        field.end()
    }
}

/// Named record schema: sourced fields in header order, then derived fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub record_name: String,
    pub fields: Vec<FieldSpec>,
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_struct("Schema", 3)?;
        record.serialize_field("type", "record")?;
        record.serialize_field("name", &self.record_name)?;
        record.serialize_field("fields", &self.fields)?;
        record.end()
    }
}

impl Schema {
    /// Number of sourced fields (the header length)
    pub fn sourced_len(&self) -> usize {
        self.fields.len() - derived::COUNT
    }

    pub fn sourced_fields(&self) -> &[FieldSpec] {
        &self.fields[..self.sourced_len()]
    }

    pub fn derived_fields(&self) -> &[FieldSpec] {
        &self.fields[self.sourced_len()..]
    }

    /// Position of the field named `name`
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Header made of the sourced columns, in field order
    pub fn source_header(&self) -> Header {
        Header::new(self.sourced_fields().iter().map(|f| f.column.clone()))
    }

    /// Merge the schemas of several payloads into one output schema.
    ///
    /// Sourced columns are unioned in first-seen order and the derived fields
    /// come last. Fails with [`ConvertError::EmptyInput`] when `schemas` is
    /// empty.
    pub fn reconcile(schemas: &[Schema]) -> Result<Schema> {
        let Some(first) = schemas.first() else {
            return Err(ConvertError::EmptyInput);
        };
        if schemas.len() == 1 {
            return Ok(first.clone());
        }
        let headers: Vec<Header> = schemas.iter().map(Schema::source_header).collect();
        build_schema(&first.record_name, &Header::union(&headers))
    }

    /// Avro schema JSON, as embedded in the container header
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ConvertError::Schema(e.to_string()))
    }

    /// Parse the schema JSON with `apache_avro`, rejecting illegal names
    pub fn to_avro(&self) -> Result<apache_avro::Schema> {
        // apache_avro panics on some illegal names instead of returning an error
        if let Some(bad) = std::iter::once(&self.record_name)
            .chain(self.fields.iter().map(|f| &f.name))
            .find(|name| !is_avro_name(name))
        {
            return Err(ConvertError::Schema(format!(
                "'{}' is not a valid Avro name ([A-Za-z_][A-Za-z0-9_]*)",
                bad
            )));
        }
        let json = self.to_json()?;
        apache_avro::Schema::parse_str(&json).map_err(|e| ConvertError::Schema(e.to_string()))
    }
}

/// Whether `name` is a legal Avro record or field name
pub fn is_avro_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build the output schema for a header.
///
/// A header without columns yields [`ConvertError::EmptyInput`].
pub fn build_schema(record_name: &str, header: &Header) -> Result<Schema> {
    if header.is_empty() {
        return Err(ConvertError::EmptyInput);
    }

    let mut used: HashSet<String> = DERIVED_FIELDS
        .iter()
        .map(|(name, _)| name.to_string())
        .collect();

    let mut fields = Vec::with_capacity(header.len() + derived::COUNT);

    for column in header.columns() {
        let name = unique_name(sanitize_field_name(column), &mut used);
        fields.push(FieldSpec {
            name,
            column: column.clone(),
            kind: column_kind(column),
            sourced: true,
        });
    }

    fields.extend(DERIVED_FIELDS.iter().map(|(name, kind)| FieldSpec {
        name: name.to_string(),
        column: name.to_string(),
        kind: *kind,
        sourced: false,
    }));

    Ok(Schema {
        record_name: record_name.to_string(),
        fields,
    })
}

fn unique_name(base: String, used: &mut HashSet<String>) -> String {
    let mut name = base.clone();
    let mut suffix = 2;
    while used.contains(&name) {
        name = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    used.insert(name.clone());
    name
}
