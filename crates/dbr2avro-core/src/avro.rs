//! Avro Object Container File encoder
//!
//! Writes the container by hand so the output is a pure function of schema,
//! records and block size: the metadata map is written in a fixed order and the
//! sync marker is derived from the schema JSON. Record bodies are encoded with
//! `apache_avro::to_avro_datum` and each block is compressed with raw deflate.

use std::io::Write;

use apache_avro::types::Value;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{ConvertError, Result};
use crate::schema::{FieldKind, Schema};
use crate::transform::{TypedRecord, TypedValue};

/// Records per block used when none is configured
pub const DEFAULT_MAX_BLOCK_RECORDS: usize = 13;

const MAGIC: &[u8; 4] = b"Obj\x01";
const CODEC: &str = "deflate";
const SYNC_LEN: usize = 16;

/// Encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Records buffered before a block is compressed and written
    pub max_block_records: usize,
    /// Deflate level, 0-9
    pub compression_level: u32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            max_block_records: DEFAULT_MAX_BLOCK_RECORDS,
            compression_level: 6,
        }
    }
}

/// Streams records of one schema into a deflate-compressed container.
pub struct BlockEncoder<W> {
    schema: Schema,
    avro_schema: apache_avro::Schema,
    writer: W,
    sync: [u8; SYNC_LEN],
    options: EncoderOptions,
    block: Vec<u8>,
    block_records: usize,
    records: u64,
    blocks: u64,
}

impl<W: Write> BlockEncoder<W> {
    /// Validate the schema and write the container header.
    pub fn new(schema: &Schema, mut writer: W, options: EncoderOptions) -> Result<Self> {
        if options.max_block_records == 0 {
            return Err(ConvertError::Encode(
                "max_block_records must be greater than 0".to_string(),
            ));
        }

        let json = schema.to_json()?;
        let avro_schema = schema.to_avro()?;
        let sync = sync_marker(&json);

        let mut header = Vec::with_capacity(json.len() + 64);
        header.extend_from_slice(MAGIC);
        write_long(&mut header, 2);
        write_bytes(&mut header, b"avro.schema");
        write_bytes(&mut header, json.as_bytes());
        write_bytes(&mut header, b"avro.codec");
        write_bytes(&mut header, CODEC.as_bytes());
        write_long(&mut header, 0);
        header.extend_from_slice(&sync);
        writer.write_all(&header)?;

        Ok(Self {
            schema: schema.clone(),
            avro_schema,
            writer,
            sync,
            options,
            block: Vec::new(),
            block_records: 0,
            records: 0,
            blocks: 0,
        })
    }

    /// Append one record, writing a block when the buffer is full.
    pub fn append(&mut self, record: &TypedRecord<'_>) -> Result<()> {
        let value = self.to_value(record)?;
        let datum = apache_avro::to_avro_datum(&self.avro_schema, value)?;
        self.block.extend_from_slice(&datum);
        self.block_records += 1;
        self.records += 1;

        if self.block_records >= self.options.max_block_records {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Records appended so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Write any buffered records and return the underlying writer.
    ///
    /// A container with zero records is still complete: header only.
    pub fn finish(mut self) -> Result<W> {
        self.flush_block()?;
        self.writer.flush()?;
        tracing::debug!(
            records = self.records,
            blocks = self.blocks,
            "Finished Avro container"
        );
        Ok(self.writer)
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_records == 0 {
            return Ok(());
        }

        let mut deflate = DeflateEncoder::new(
            Vec::with_capacity(self.block.len() / 2),
            Compression::new(self.options.compression_level),
        );
        deflate.write_all(&self.block)?;
        let compressed = deflate.finish()?;

        let mut prefix = Vec::with_capacity(20);
        write_long(&mut prefix, self.block_records as i64);
        write_long(&mut prefix, compressed.len() as i64);

        self.writer.write_all(&prefix)?;
        self.writer.write_all(&compressed)?;
        self.writer.write_all(&self.sync)?;

        self.blocks += 1;
        self.block.clear();
        self.block_records = 0;
        Ok(())
    }

    fn to_value(&self, record: &TypedRecord<'_>) -> Result<Value> {
        if record.values().len() != self.schema.fields.len() {
            return Err(ConvertError::Encode(format!(
                "record has {} values, schema has {} fields",
                record.values().len(),
                self.schema.fields.len()
            )));
        }

        let fields = self
            .schema
            .fields
            .iter()
            .zip(record.values())
            .map(|(field, value)| {
                let value = match (field.kind.is_optional(), value) {
                    (true, None) => Value::Union(0, Box::new(Value::Null)),
                    (true, Some(v)) => Value::Union(1, Box::new(plain(v))),
                    (false, Some(v)) => plain(v),
                    (false, None) => zero(field.kind),
                };
                (field.name.clone(), value)
            })
            .collect();

        Ok(Value::Record(fields))
    }
}

fn plain(value: &TypedValue) -> Value {
    match value {
        TypedValue::Long(v) => Value::Long(*v),
        TypedValue::Double(v) => Value::Double(*v),
        TypedValue::String(v) => Value::String(v.clone()),
        TypedValue::Boolean(v) => Value::Boolean(*v),
    }
}

/// Value written for a required field left unset by a failed coercion
fn zero(kind: FieldKind) -> Value {
    match kind {
        FieldKind::Long | FieldKind::OptionalLong => Value::Long(0),
        FieldKind::Double | FieldKind::OptionalDouble => Value::Double(0.0),
        FieldKind::Boolean => Value::Boolean(false),
        FieldKind::String | FieldKind::OptionalString => Value::String(String::new()),
    }
}

fn sync_marker(schema_json: &str) -> [u8; SYNC_LEN] {
    let hash = blake3::hash(schema_json.as_bytes());
    let mut sync = [0u8; SYNC_LEN];
    sync.copy_from_slice(&hash.as_bytes()[..SYNC_LEN]);
    sync
}

/// Zigzag varint, as Avro encodes `long`
fn write_long(buf: &mut Vec<u8>, n: i64) {
    let mut z = ((n << 1) ^ (n >> 63)) as u64;
    while z >= 0x80 {
        buf.push((z as u8) | 0x80);
        z >>= 7;
    }
    buf.push(z as u8);
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_long(buf, bytes.len() as i64);
    buf.extend_from_slice(bytes);
}
