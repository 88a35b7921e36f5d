// Integration tests for dbr2avro-core
//
// Tests the complete workflow from report bytes (plain, zipped, gzipped) to a
// decoded Avro container

use std::collections::HashMap;
use std::io::{Cursor, Write};

use apache_avro::types::Value;
use apache_avro::Reader;
use dbr2avro_core::columns::report;
use dbr2avro_core::{convert_to_vec, ConvertOptions, EncoderOptions};
use zip::write::SimpleFileOptions;

const HEADER: &str = "InvoiceID,PayerAccountId,LinkedAccountId,RecordType,RecordId,ProductName,RateId,SubscriptionId,PricingPlanId,UsageType,Operation,AvailabilityZone,ReservedInstance,ItemDescription,UsageStartDate,UsageEndDate,UsageQuantity,BlendedRate,BlendedCost,UnBlendedRate,UnBlendedCost,ResourceId,resourceTags:user:Name";

/// Build one CSV line in canonical column order from (column, value) pairs
fn line(pairs: &[(&str, &str)]) -> String {
    let columns: Vec<&str> = HEADER.split(',').collect();
    let mut cells = vec![String::new(); columns.len()];
    for (column, value) in pairs {
        let idx = columns.iter().position(|c| c == column).unwrap();
        cells[idx] = value.to_string();
    }
    cells.join(",")
}

fn sample_report(rows: usize) -> String {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for i in 0..rows {
        let row = line(&[
            (report::PAYER_ACCOUNT_ID, "123456789012"),
            (report::LINKED_ACCOUNT_ID, "210987654321"),
            (report::RECORD_TYPE, "LineItem"),
            (report::RECORD_ID, format!("{}", 1000 + i).as_str()),
            (report::PRODUCT_NAME, "Amazon Elastic Compute Cloud"),
            (report::RATE_ID, "0"),
            (report::SUBSCRIPTION_ID, "77"),
            (report::USAGE_TYPE, "BoxUsage:m4.large"),
            (report::OPERATION, "RunInstances"),
            (report::USAGE_START_DATE, "2023-05-01 00:00:00"),
            (report::USAGE_QUANTITY, "1.0"),
            (report::UN_BLENDED_COST, "0.1"),
            ("resourceTags:user:Name", "web"),
        ]);
        csv.push_str(&row);
        csv.push('\n');
    }
    csv
}

fn decode(bytes: &[u8]) -> Vec<HashMap<String, Value>> {
    Reader::new(bytes)
        .unwrap()
        .map(|value| match value.unwrap() {
            Value::Record(fields) => fields.into_iter().collect(),
            other => panic!("expected record, got {:?}", other),
        })
        .collect()
}

fn string(v: &str) -> Value {
    Value::String(v.to_string())
}

fn some(v: Value) -> Value {
    Value::Union(1, Box::new(v))
}

#[test]
fn test_end_to_end_plain_csv() {
    let csv = sample_report(30);
    let conversion = convert_to_vec("report.csv", csv.as_bytes(), &ConvertOptions::default())
        .expect("Failed to convert report");

    assert_eq!(conversion.summary.rows_read, 30);
    assert_eq!(conversion.summary.rows_written, 30);
    assert!(conversion.summary.is_clean());

    let records = decode(&conversion.outputs[0].writer);
    assert_eq!(records.len(), 30);

    let first = &records[0];
    assert_eq!(first["PayerAccountId"], Value::Long(123456789012));
    assert_eq!(first["SubscriptionId"], some(Value::Long(77)));
    assert_eq!(first["PricingPlanId"], Value::Union(0, Box::new(Value::Null)));
    assert_eq!(first["UsageQuantity"], some(Value::Double(1.0)));
    assert_eq!(first["resourceTags_user_Name"], string("web"));
    assert_eq!(first["Service"], some(string("EC2-Instances")));
    assert_eq!(first["InstanceUsage"], some(string("BoxUsage")));
    assert_eq!(first["InstanceType"], some(string("m4.large")));
    assert_eq!(first["InstanceClass"], some(string("m4")));
    assert_eq!(first["SubscriptionPrepay"], Value::Boolean(true));
    assert_eq!(first["SubscriptionCharge"], Value::Boolean(true));
    assert_eq!(first["StartDate"], Value::Long(20230501));
}

#[test]
fn test_schema_types_in_output() {
    let csv = sample_report(1);
    let conversion =
        convert_to_vec("report.csv", csv.as_bytes(), &ConvertOptions::default()).unwrap();

    let reader = Reader::new(&conversion.outputs[0].writer[..]).unwrap();
    let schema = reader.writer_schema().canonical_form();
    assert!(schema.contains(r#"{"name":"InvoiceID","type":"string"}"#));
    assert!(schema.contains(r#"{"name":"resourceTags_user_Name","type":"string"}"#));
    assert!(schema.contains(r#"{"name":"BlendedCost","type":["null","double"]}"#));
    assert!(schema.contains(r#"{"name":"StartDate","type":"long"}"#));
}

#[test]
fn test_output_is_byte_identical_across_runs() {
    let csv = sample_report(50);
    let options = ConvertOptions::default();
    let a = convert_to_vec("report.csv", csv.as_bytes(), &options).unwrap();
    let b = convert_to_vec("report.csv", csv.as_bytes(), &options).unwrap();
    assert_eq!(a.outputs[0].writer, b.outputs[0].writer);
}

#[test]
fn test_block_size_does_not_change_records() {
    let csv = sample_report(40);
    let small = ConvertOptions {
        encoder: EncoderOptions {
            max_block_records: 3,
            ..EncoderOptions::default()
        },
        ..ConvertOptions::default()
    };
    let a = convert_to_vec("report.csv", csv.as_bytes(), &small).unwrap();
    let b = convert_to_vec("report.csv", csv.as_bytes(), &ConvertOptions::default()).unwrap();

    assert_ne!(a.outputs[0].writer, b.outputs[0].writer);
    assert_eq!(decode(&a.outputs[0].writer), decode(&b.outputs[0].writer));
}

#[test]
fn test_zip_entries_concatenate_in_order() {
    let first = format!(
        "{}\n{}\n{}\n",
        HEADER,
        line(&[(report::RECORD_ID, "a1"), (report::PRODUCT_NAME, "AWS Lambda")]),
        line(&[(report::RECORD_ID, "a2"), (report::PRODUCT_NAME, "AWS Lambda")]),
    );
    let second = format!(
        "{}\n{}\n",
        HEADER,
        line(&[(report::RECORD_ID, "b1"), (report::PRODUCT_NAME, "Amazon RDS Service"), (report::USAGE_TYPE, "Aurora:StorageUsage")]),
    );

    let mut archive = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut archive));
        let options = SimpleFileOptions::default();
        zip.start_file("part-1.csv", options).unwrap();
        zip.write_all(first.as_bytes()).unwrap();
        zip.start_file("part-2.csv", options).unwrap();
        zip.write_all(second.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    let conversion =
        convert_to_vec("bill.csv.zip", &archive, &ConvertOptions::default()).unwrap();
    assert_eq!(conversion.summary.payloads, 2);
    assert_eq!(conversion.outputs.len(), 1);

    let records = decode(&conversion.outputs[0].writer);
    let ids: Vec<&Value> = records.iter().map(|r| &r["RecordId"]).collect();
    assert_eq!(ids, vec![&string("a1"), &string("a2"), &string("b1")]);
    assert_eq!(records[0]["Service"], some(string("Lambda")));
    assert_eq!(records[2]["Service"], some(string("RDS:Aurora")));
}

#[test]
fn test_zip_entries_with_different_headers_share_one_schema() {
    let first = "ProductName,user:Team\nAWS Lambda,core\n";
    let second = "user:Owner,ProductName\nalice,AWS Glue\n";

    let mut archive = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut archive));
        zip.start_file("a.csv", SimpleFileOptions::default()).unwrap();
        zip.write_all(first.as_bytes()).unwrap();
        zip.start_file("b.csv", SimpleFileOptions::default()).unwrap();
        zip.write_all(second.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    let conversion = convert_to_vec("bill.zip", &archive, &ConvertOptions::default()).unwrap();
    let records = decode(&conversion.outputs[0].writer);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["user_Team"], string("core"));
    assert_eq!(records[0]["user_Owner"], string(""));
    assert_eq!(records[1]["user_Team"], string(""));
    assert_eq!(records[1]["user_Owner"], string("alice"));
    assert_eq!(records[1]["ProductName"], string("AWS Glue"));
}

#[test]
fn test_gzip_source() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let csv = sample_report(5);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(csv.as_bytes()).unwrap();
    let gz = encoder.finish().unwrap();

    let conversion = convert_to_vec("report.csv.gz", &gz, &ConvertOptions::default()).unwrap();
    assert_eq!(decode(&conversion.outputs[0].writer).len(), 5);
}

#[test]
fn test_concatenated_gzip_members_convert_fully() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut gz = Vec::new();
    for part in ["ProductName\nAWS Lambda\n", "AWS Glue\nAWS Batch\n"] {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(part.as_bytes()).unwrap();
        gz.extend(encoder.finish().unwrap());
    }

    let conversion = convert_to_vec("r.csv.gz", &gz, &ConvertOptions::default()).unwrap();
    assert_eq!(conversion.summary.rows_written, 3);
    let records = decode(&conversion.outputs[0].writer);
    assert_eq!(records[2]["ProductName"], string("AWS Batch"));
}

#[test]
fn test_coercion_failures_are_counted_not_fatal() {
    let csv = format!(
        "{}\n{}\n{}\n",
        HEADER,
        line(&[(report::PRODUCT_NAME, "AWS Lambda"), (report::BLENDED_COST, "abc")]),
        line(&[(report::PRODUCT_NAME, "AWS Lambda"), (report::PAYER_ACCOUNT_ID, "12x")]),
    );
    let conversion =
        convert_to_vec("report.csv", csv.as_bytes(), &ConvertOptions::default()).unwrap();

    assert_eq!(conversion.summary.rows_written, 2);
    assert_eq!(conversion.summary.coercion_failures, 2);
    assert_eq!(conversion.summary.failure_samples[0].field, "BlendedCost");
    assert_eq!(conversion.summary.failure_samples[0].line, 2);
    assert_eq!(conversion.summary.failure_samples[1].field, "PayerAccountId");
    assert_eq!(conversion.summary.failure_samples[1].line, 3);

    let records = decode(&conversion.outputs[0].writer);
    assert_eq!(records[0]["BlendedCost"], Value::Union(0, Box::new(Value::Null)));
    assert_eq!(records[1]["PayerAccountId"], Value::Long(0));
}

#[test]
fn test_empty_product_is_unknown_service() {
    let csv = format!("{}\n{}\n", HEADER, line(&[(report::RECORD_TYPE, "InvoiceTotal")]));
    let conversion =
        convert_to_vec("report.csv", csv.as_bytes(), &ConvertOptions::default()).unwrap();

    let records = decode(&conversion.outputs[0].writer);
    assert_eq!(records[0]["Service"], some(string("Unknown")));
    assert_eq!(records[0]["StartDate"], Value::Long(0));
    assert_eq!(records[0]["SubscriptionPrepay"], Value::Boolean(false));
}

#[test]
fn test_corrupt_archive_is_an_error() {
    let result = convert_to_vec("bill.csv.zip", b"PK\x03\x04 garbage", &ConvertOptions::default());
    assert!(result.is_err());
}
