// Row → typed record conversion
//
// Sourced fields are coerced from the raw cell by kind; derived fields are
// computed from the logical report columns. Columns are looked up by name in the
// payload header, so payloads with a reordered or partial header still bind.

use std::fmt;

use csv::StringRecord;

use crate::classify::classify_service;
use crate::columns::literal::{EC2_PRODUCT, RUN_INSTANCES};
use crate::columns::{derived, report};
use crate::schema::{ColumnIndex, FieldKind, Header, Schema};

/// A typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Long(i64),
    Double(f64),
    String(String),
    Boolean(bool),
}

/// One converted row, aligned with the fields of its schema.
///
/// `None` marks an unset field.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecord<'s> {
    schema: &'s Schema,
    values: Vec<Option<TypedValue>>,
}

impl<'s> TypedRecord<'s> {
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Values in schema field order
    pub fn values(&self) -> &[Option<TypedValue>] {
        &self.values
    }

    /// Value of the field named `name`, if the field exists and is set
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.schema
            .field_position(name)
            .and_then(|idx| self.values[idx].as_ref())
    }

    /// The StartDate field (0 when it could not be derived)
    pub fn start_date(&self) -> i64 {
        match self.values.last() {
            Some(Some(TypedValue::Long(date))) => *date,
            _ => 0,
        }
    }
}

/// Why a cell could not be coerced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    InvalidInteger,
    InvalidFloat,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInteger => f.write_str("invalid integer"),
            Self::InvalidFloat => f.write_str("invalid float"),
        }
    }
}

/// A cell that failed to coerce; the field is left unset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFailure {
    /// 1-based line number within the payload (the header is line 1)
    pub line: u64,
    pub field: String,
    pub value: String,
    pub reason: FailureReason,
}

impl fmt::Display for CoercionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: field {}: {} '{}'",
            self.line, self.field, self.reason, self.value
        )
    }
}

/// Result of transforming one row
#[derive(Debug)]
pub struct Transformed<'s> {
    pub record: TypedRecord<'s>,
    pub failures: Vec<CoercionFailure>,
}

/// Positions of the columns the derived fields read
#[derive(Debug, Clone, Copy)]
struct LogicalColumns {
    product_name: Option<usize>,
    operation: Option<usize>,
    usage_type: Option<usize>,
    resource_id: Option<usize>,
    rate_id: Option<usize>,
    usage_start_date: Option<usize>,
}

impl LogicalColumns {
    fn resolve(index: &ColumnIndex) -> Self {
        Self {
            product_name: index.position(report::PRODUCT_NAME),
            operation: index.position(report::OPERATION),
            usage_type: index.position(report::USAGE_TYPE),
            resource_id: index.position(report::RESOURCE_ID),
            rate_id: index.position(report::RATE_ID),
            usage_start_date: index.position(report::USAGE_START_DATE),
        }
    }
}

/// Converts rows of one payload into records of a schema.
#[derive(Debug, Clone)]
pub struct RecordTransformer<'s> {
    schema: &'s Schema,
    /// Row position of each sourced field; `None` when the payload lacks it
    positions: Vec<Option<usize>>,
    logical: LogicalColumns,
    width: usize,
}

impl<'s> RecordTransformer<'s> {
    /// Bind `schema` to the header of one payload.
    ///
    /// A sourced field binds to the n-th column of its name, where n counts the
    /// earlier fields reading the same column, so repeated header names map
    /// one to one.
    pub fn new(schema: &'s Schema, header: &Header) -> Self {
        let index = header.index();
        let sourced = schema.sourced_fields();
        let mut positions = Vec::with_capacity(sourced.len());

        for (i, field) in sourced.iter().enumerate() {
            let occurrence = sourced[..i]
                .iter()
                .filter(|earlier| earlier.column == field.column)
                .count();
            positions.push(index.nth_position(&field.column, occurrence));
        }

        Self {
            schema,
            positions,
            logical: LogicalColumns::resolve(&index),
            width: header.len(),
        }
    }

    /// Number of cells a well-formed row has
    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether a row's cell count differs from the header's
    pub fn is_ragged(&self, row: &StringRecord) -> bool {
        row.len() != self.width
    }

    /// Transform one row. Missing cells read as empty.
    pub fn transform(&self, line: u64, row: &StringRecord) -> Transformed<'s> {
        let mut values = Vec::with_capacity(self.schema.fields.len());
        let mut failures = Vec::new();

        for (field, position) in self.schema.sourced_fields().iter().zip(&self.positions) {
            let raw = cell(row, *position);
            match coerce(field.kind, raw) {
                Ok(value) => values.push(value),
                Err(reason) => {
                    tracing::error!(
                        line,
                        field = %field.name,
                        value = raw,
                        %reason,
                        "Failed to convert field"
                    );
                    failures.push(CoercionFailure {
                        line,
                        field: field.name.clone(),
                        value: raw.to_string(),
                        reason,
                    });
                    values.push(None);
                }
            }
        }

        self.derive(row, &mut values);

        Transformed {
            record: TypedRecord {
                schema: self.schema,
                values,
            },
            failures,
        }
    }

    fn derive(&self, row: &StringRecord, values: &mut Vec<Option<TypedValue>>) {
        let product_name = cell(row, self.logical.product_name);
        let operation = cell(row, self.logical.operation);
        let usage_type = cell(row, self.logical.usage_type);

        let service = classify_service(product_name, operation, usage_type);
        values.push(Some(TypedValue::String(service.to_string())));

        match split_instance(operation, usage_type) {
            Some(instance) => {
                values.push(Some(TypedValue::String(instance.usage.to_string())));
                values.push(Some(TypedValue::String(instance.instance_type.to_string())));
                values.push(Some(TypedValue::String(instance.class.to_string())));
            }
            None => values.extend([None, None, None]),
        }

        let (prepay, charge) = if product_name == EC2_PRODUCT {
            (
                operation == RUN_INSTANCES && cell(row, self.logical.resource_id).is_empty(),
                cell(row, self.logical.rate_id) == "0",
            )
        } else {
            (false, false)
        };
        values.push(Some(TypedValue::Boolean(prepay)));
        values.push(Some(TypedValue::Boolean(charge)));

        let date = start_date(cell(row, self.logical.usage_start_date));
        values.push(Some(TypedValue::Long(date)));

        debug_assert_eq!(values.len(), self.schema.fields.len());
        debug_assert_eq!(self.schema.fields[values.len() - 1].name, derived::START_DATE);
    }
}

fn cell(row: &StringRecord, position: Option<usize>) -> &str {
    position.and_then(|idx| row.get(idx)).unwrap_or("")
}

fn coerce(kind: FieldKind, raw: &str) -> Result<Option<TypedValue>, FailureReason> {
    if raw.is_empty() {
        return Ok(match kind {
            FieldKind::Long => Some(TypedValue::Long(0)),
            FieldKind::Double => Some(TypedValue::Double(0.0)),
            FieldKind::Boolean => Some(TypedValue::Boolean(false)),
            FieldKind::String => Some(TypedValue::String(String::new())),
            FieldKind::OptionalLong | FieldKind::OptionalDouble | FieldKind::OptionalString => {
                None
            }
        });
    }

    match kind {
        FieldKind::Long | FieldKind::OptionalLong => raw
            .parse::<i64>()
            .map(|v| Some(TypedValue::Long(v)))
            .map_err(|_| FailureReason::InvalidInteger),
        FieldKind::Double | FieldKind::OptionalDouble => raw
            .parse::<f64>()
            .map(|v| Some(TypedValue::Double(v)))
            .map_err(|_| FailureReason::InvalidFloat),
        // No column override is boolean; only derived fields are
        FieldKind::Boolean => Ok(Some(TypedValue::Boolean(raw == "true"))),
        FieldKind::String | FieldKind::OptionalString => {
            Ok(Some(TypedValue::String(raw.to_string())))
        }
    }
}

/// Instance details split out of a `RunInstances` usage type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceUsage<'a> {
    pub usage: &'a str,
    pub instance_type: &'a str,
    pub class: &'a str,
}

/// Split `BoxUsage:m4.large` into usage, type and class.
///
/// Only applies to `RunInstances` lines whose usage type has exactly one `:`.
pub fn split_instance<'a>(operation: &str, usage_type: &'a str) -> Option<InstanceUsage<'a>> {
    if operation != RUN_INSTANCES {
        return None;
    }

    let (usage, instance_type) = usage_type.split_once(':')?;
    if instance_type.contains(':') {
        return None;
    }

    let class = instance_type
        .split_once('.')
        .map_or(instance_type, |(class, _)| class);

    Some(InstanceUsage {
        usage,
        instance_type,
        class,
    })
}

/// `2023-05-01 00:00:00` → `20230501`; anything unparseable gives 0.
pub fn start_date(raw: &str) -> i64 {
    let day = raw.split(' ').next().unwrap_or_default();
    day.replace('-', "").parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{build_schema, DEFAULT_RECORD_NAME};

    fn header() -> Header {
        Header::new(report::CANONICAL)
    }

    fn row(pairs: &[(&str, &str)]) -> StringRecord {
        let index = header().index();
        let mut cells = vec![""; report::CANONICAL.len()];
        for (column, value) in pairs {
            cells[index.position(column).unwrap()] = *value;
        }
        StringRecord::from(cells)
    }

    #[test]
    fn test_ec2_run_instances_row() {
        let header = header();
        let schema = build_schema(DEFAULT_RECORD_NAME, &header).unwrap();
        let transformer = RecordTransformer::new(&schema, &header);

        let out = transformer.transform(
            2,
            &row(&[
                (report::PRODUCT_NAME, EC2_PRODUCT),
                (report::OPERATION, "RunInstances"),
                (report::USAGE_TYPE, "BoxUsage:m4.large"),
                (report::RATE_ID, "0"),
                (report::USAGE_START_DATE, "2023-05-01 00:00:00"),
                (report::PAYER_ACCOUNT_ID, "123456789012"),
            ]),
        );

        assert!(out.failures.is_empty());
        let record = out.record;
        let s = |v: &str| Some(TypedValue::String(v.to_string()));
        assert_eq!(record.get("Service").cloned(), s("EC2-Instances"));
        assert_eq!(record.get("InstanceUsage").cloned(), s("BoxUsage"));
        assert_eq!(record.get("InstanceType").cloned(), s("m4.large"));
        assert_eq!(record.get("InstanceClass").cloned(), s("m4"));
        assert_eq!(record.get("SubscriptionPrepay"), Some(&TypedValue::Boolean(true)));
        assert_eq!(record.get("SubscriptionCharge"), Some(&TypedValue::Boolean(true)));
        assert_eq!(record.get("PayerAccountId"), Some(&TypedValue::Long(123456789012)));
        assert_eq!(record.start_date(), 20230501);
    }

    #[test]
    fn test_coercion_table() {
        assert_eq!(coerce(FieldKind::OptionalLong, ""), Ok(None));
        assert_eq!(coerce(FieldKind::OptionalDouble, ""), Ok(None));
        assert_eq!(coerce(FieldKind::Long, ""), Ok(Some(TypedValue::Long(0))));
        assert_eq!(coerce(FieldKind::Double, ""), Ok(Some(TypedValue::Double(0.0))));
        assert_eq!(coerce(FieldKind::String, ""), Ok(Some(TypedValue::String(String::new()))));
        assert_eq!(coerce(FieldKind::OptionalLong, "42"), Ok(Some(TypedValue::Long(42))));
        assert_eq!(coerce(FieldKind::OptionalDouble, "0.5"), Ok(Some(TypedValue::Double(0.5))));
        assert_eq!(coerce(FieldKind::Long, "x"), Err(FailureReason::InvalidInteger));
        assert_eq!(coerce(FieldKind::OptionalDouble, "1,5"), Err(FailureReason::InvalidFloat));
    }

    #[test]
    fn test_bad_cell_is_reported_and_row_survives() {
        let header = header();
        let schema = build_schema(DEFAULT_RECORD_NAME, &header).unwrap();
        let transformer = RecordTransformer::new(&schema, &header);

        let out = transformer.transform(
            7,
            &row(&[
                (report::PRODUCT_NAME, "AWS Lambda"),
                (report::USAGE_QUANTITY, "lots"),
                (report::LINKED_ACCOUNT_ID, "n/a"),
            ]),
        );

        assert_eq!(out.failures.len(), 2);
        assert_eq!(out.failures[0].field, "LinkedAccountId");
        assert_eq!(out.failures[0].reason, FailureReason::InvalidInteger);
        assert_eq!(out.failures[0].line, 7);
        assert_eq!(out.failures[1].field, "UsageQuantity");
        assert_eq!(out.failures[1].reason, FailureReason::InvalidFloat);

        assert_eq!(out.record.get("LinkedAccountId"), None);
        assert_eq!(out.record.get("UsageQuantity"), None);
        assert_eq!(
            out.record.get("Service"),
            Some(&TypedValue::String("Lambda".to_string()))
        );
    }

    #[test]
    fn test_non_ec2_subscription_flags_are_false() {
        let header = header();
        let schema = build_schema(DEFAULT_RECORD_NAME, &header).unwrap();
        let transformer = RecordTransformer::new(&schema, &header);

        let out = transformer.transform(
            2,
            &row(&[
                (report::PRODUCT_NAME, "Amazon RDS Service"),
                (report::OPERATION, "RunInstances"),
                (report::RATE_ID, "0"),
            ]),
        );

        assert_eq!(out.record.get("SubscriptionPrepay"), Some(&TypedValue::Boolean(false)));
        assert_eq!(out.record.get("SubscriptionCharge"), Some(&TypedValue::Boolean(false)));
    }

    #[test]
    fn test_columns_resolved_by_name() {
        let header = Header::new([report::USAGE_TYPE, report::OPERATION, report::PRODUCT_NAME]);
        let schema = build_schema(DEFAULT_RECORD_NAME, &header).unwrap();
        let transformer = RecordTransformer::new(&schema, &header);

        let out = transformer.transform(
            2,
            &StringRecord::from(vec!["SpotUsage:c4.xlarge", "RunInstances", EC2_PRODUCT]),
        );
        assert_eq!(
            out.record.get("Service"),
            Some(&TypedValue::String("EC2-Spot".to_string()))
        );
        assert_eq!(out.record.start_date(), 0);
    }

    #[test]
    fn test_short_row_reads_missing_cells_as_empty() {
        let header = Header::new([report::PRODUCT_NAME, report::SUBSCRIPTION_ID, "user:Team"]);
        let schema = build_schema(DEFAULT_RECORD_NAME, &header).unwrap();
        let transformer = RecordTransformer::new(&schema, &header);

        let short = StringRecord::from(vec!["Amazon CloudFront"]);
        assert!(transformer.is_ragged(&short));

        let out = transformer.transform(3, &short);
        assert!(out.failures.is_empty());
        assert_eq!(out.record.get("SubscriptionId"), None);
        assert_eq!(out.record.get("user_Team"), Some(&TypedValue::String(String::new())));
    }

    #[test]
    fn test_reconciled_schema_binds_partial_header() {
        let wide = Header::new([report::PRODUCT_NAME, "user:x", "user:y"]);
        let narrow = Header::new(["user:y", report::PRODUCT_NAME]);
        let schema = build_schema(DEFAULT_RECORD_NAME, &wide).unwrap();
        let transformer = RecordTransformer::new(&schema, &narrow);

        let out = transformer.transform(2, &StringRecord::from(vec!["yes", "AWS Glue"]));
        assert_eq!(out.record.get("ProductName"), Some(&TypedValue::String("AWS Glue".into())));
        assert_eq!(out.record.get("user_x"), Some(&TypedValue::String(String::new())));
        assert_eq!(out.record.get("user_y"), Some(&TypedValue::String("yes".into())));
    }

    #[test]
    fn test_duplicate_columns_bind_in_order() {
        let header = Header::new(["Tag", "Tag"]);
        let schema = build_schema(DEFAULT_RECORD_NAME, &header).unwrap();
        let transformer = RecordTransformer::new(&schema, &header);

        let out = transformer.transform(2, &StringRecord::from(vec!["a", "b"]));
        assert_eq!(out.record.get("Tag"), Some(&TypedValue::String("a".into())));
        assert_eq!(out.record.get("Tag_2"), Some(&TypedValue::String("b".into())));
    }

    #[test]
    fn test_split_instance() {
        let split = split_instance("RunInstances", "BoxUsage:m4.large").unwrap();
        assert_eq!(split.usage, "BoxUsage");
        assert_eq!(split.instance_type, "m4.large");
        assert_eq!(split.class, "m4");

        assert_eq!(split_instance("RunInstances:0002", "BoxUsage:m4.large"), None);
        assert_eq!(split_instance("RunInstances", "BoxUsage"), None);
        assert_eq!(split_instance("RunInstances", "A:B:C"), None);
        assert_eq!(split_instance("RunInstances", "HeavyUsage:t2").map(|s| s.class), Some("t2"));
    }

    #[test]
    fn test_start_date() {
        assert_eq!(start_date("2023-05-01 00:00:00"), 20230501);
        assert_eq!(start_date("2016-11-30"), 20161130);
        assert_eq!(start_date(""), 0);
        assert_eq!(start_date("yesterday"), 0);
    }
}
