// Source → Avro conversion
//
// Pure conversion logic: a buffered source goes in, finished containers come
// out through writers supplied by the caller. No storage or network I/O here.
//
// All payload headers are read before the first encoder is opened, so a
// multi-entry archive produces a single schema per output.

use std::borrow::Cow;
use std::io::{self, Write};

use csv::{ByteRecord, ReaderBuilder, StringRecord};

use crate::archive::{extract, Payload, SkippedEntry};
use crate::avro::{BlockEncoder, EncoderOptions};
use crate::error::{ConvertError, Result};
use crate::partition::PartitionedSink;
use crate::schema::{build_schema, Header, Schema, DEFAULT_RECORD_NAME};
use crate::summary::ConversionSummary;
use crate::transform::{RecordTransformer, TypedRecord};

/// Conversion settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub record_name: String,
    pub encoder: EncoderOptions,
    /// Write one container per StartDate instead of a single one
    pub partition: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            record_name: DEFAULT_RECORD_NAME.to_string(),
            encoder: EncoderOptions::default(),
            partition: false,
        }
    }
}

/// One finished container
#[derive(Debug)]
pub struct Output<W> {
    /// Partition key, `None` for unpartitioned output
    pub partition: Option<String>,
    pub writer: W,
}

/// Result of converting one source
#[derive(Debug)]
pub struct Conversion<W> {
    pub summary: ConversionSummary,
    /// The output schema; `None` when no payload had a header
    pub schema: Option<Schema>,
    /// Finished containers, in partition key order
    pub outputs: Vec<Output<W>>,
}

/// A payload whose header has been read
struct Prepared<'a> {
    payload: Payload<'a>,
    header: Header,
    schema: Schema,
}

enum Sink<W, F> {
    Single(BlockEncoder<W>),
    Partitioned(PartitionedSink<W, F>),
}

impl<W, F> Sink<W, F>
where
    W: Write,
    F: FnMut(Option<&str>) -> io::Result<W>,
{
    fn open(schema: &Schema, options: &ConvertOptions, mut open: F) -> Result<Self> {
        if options.partition {
            Ok(Self::Partitioned(PartitionedSink::new(schema, options.encoder, open)))
        } else {
            let writer = open(None)?;
            Ok(Self::Single(BlockEncoder::new(schema, writer, options.encoder)?))
        }
    }

    fn append(&mut self, record: &TypedRecord<'_>) -> Result<()> {
        match self {
            Self::Single(encoder) => encoder.append(record),
            Self::Partitioned(sink) => sink.append(record),
        }
    }

    fn finish(self) -> Result<Vec<Output<W>>> {
        match self {
            Self::Single(encoder) => Ok(vec![Output {
                partition: None,
                writer: encoder.finish()?,
            }]),
            Self::Partitioned(sink) => sink.finish(),
        }
    }
}

fn csv_reader(data: &[u8]) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data)
}

/// Decode a raw row, replacing invalid UTF-8 with U+FFFD.
///
/// Returns the row and the number of cells that needed replacement.
fn decode_row(raw: &ByteRecord) -> (StringRecord, u64) {
    let mut lossy = 0;
    let mut row: StringRecord = raw
        .iter()
        .map(|cell| {
            let text = String::from_utf8_lossy(cell);
            if matches!(text, Cow::Owned(_)) {
                lossy += 1;
            }
            text
        })
        .collect();
    row.set_position(raw.position().cloned());
    (row, lossy)
}

/// Convert a buffered source into Avro containers.
///
/// `open` is called once per output (with the partition key when
/// partitioning) and must return the writer the container goes to. When no
/// payload has a header, `open` is never called.
pub fn convert<W, F>(
    source_name: &str,
    bytes: &[u8],
    options: &ConvertOptions,
    open: F,
) -> Result<Conversion<W>>
where
    W: Write,
    F: FnMut(Option<&str>) -> io::Result<W>,
{
    let mut summary = ConversionSummary::default();
    let prepared = prepare(source_name, bytes, &options.record_name, &mut summary)?;

    let schemas: Vec<Schema> = prepared.iter().map(|p| p.schema.clone()).collect();
    let schema = match Schema::reconcile(&schemas) {
        Ok(schema) => schema,
        Err(ConvertError::EmptyInput) => {
            tracing::warn!(source = source_name, "No payload with a header, nothing to write");
            return Ok(Conversion {
                summary,
                schema: None,
                outputs: Vec::new(),
            });
        }
        Err(e) => return Err(e),
    };

    let mut sink = Sink::open(&schema, options, open)?;

    for Prepared { payload, header, .. } in &prepared {
        let written_before = summary.rows_written;
        let transformer = RecordTransformer::new(&schema, header);
        let mut reader = csv_reader(&payload.data);

        for (i, raw) in reader.byte_records().enumerate() {
            summary.rows_read += 1;
            let raw = match raw {
                Ok(raw) => raw,
                Err(e) => {
                    summary.malformed_rows += 1;
                    tracing::warn!(payload = %payload.name, error = %e, "Skipping unreadable row");
                    continue;
                }
            };

            let (row, lossy) = decode_row(&raw);
            let line = row.position().map_or(i as u64 + 2, |p| p.line());
            if lossy > 0 {
                summary.lossy_cells += lossy;
                tracing::warn!(
                    payload = %payload.name,
                    line,
                    cells = lossy,
                    "Replaced invalid UTF-8 in row"
                );
            }

            if transformer.is_ragged(&row) {
                summary.malformed_rows += 1;
                tracing::warn!(
                    payload = %payload.name,
                    line,
                    cells = row.len(),
                    expected = transformer.width(),
                    "Row width does not match header"
                );
            }

            let transformed = transformer.transform(line, &row);
            summary.record_failures(transformed.failures);
            sink.append(&transformed.record)?;
            summary.rows_written += 1;
        }

        tracing::info!(
            payload = %payload.name,
            rows = summary.rows_written - written_before,
            "Converted payload"
        );
    }

    let outputs = sink.finish()?;
    if options.partition {
        summary.partitions = outputs.iter().filter_map(|o| o.partition.clone()).collect();
    }

    Ok(Conversion {
        summary,
        schema: Some(schema),
        outputs,
    })
}

/// Convert into one or more in-memory buffers
pub fn convert_to_vec(
    source_name: &str,
    bytes: &[u8],
    options: &ConvertOptions,
) -> Result<Conversion<Vec<u8>>> {
    convert(source_name, bytes, options, |_| Ok(Vec::new()))
}

/// Extract payloads and read their headers, in entry order
fn prepare<'a>(
    source_name: &str,
    bytes: &'a [u8],
    record_name: &str,
    summary: &mut ConversionSummary,
) -> Result<Vec<Prepared<'a>>> {
    let mut prepared = Vec::new();

    for item in extract(source_name, bytes)? {
        let payload = match item {
            Ok(payload) => payload,
            Err(skipped) => {
                summary.skipped_entries.push(skipped);
                continue;
            }
        };
        summary.payloads += 1;

        let header = match csv_reader(&payload.data).byte_headers() {
            Ok(header) => Header::new(header.iter().map(String::from_utf8_lossy)),
            Err(e) => {
                tracing::warn!(payload = %payload.name, error = %e, "Unreadable header line");
                summary.skipped_entries.push(SkippedEntry {
                    name: payload.name.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let schema = match build_schema(record_name, &header) {
            Ok(schema) => schema,
            Err(ConvertError::EmptyInput) => {
                tracing::warn!(payload = %payload.name, "Payload is empty, skipping");
                summary.empty_payloads += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(payload = %payload.name, columns = header.len(), "Read header");
        prepared.push(Prepared {
            payload,
            header,
            schema,
        });
    }

    Ok(prepared)
}
