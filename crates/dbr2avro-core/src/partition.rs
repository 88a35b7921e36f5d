// Date partitioning of converted records
//
// Each record is routed by its StartDate into its own container:
// {dest_dir}/{stem}/date={YYYYMMDD}.{ext}

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::avro::{BlockEncoder, EncoderOptions};
use crate::error::Result;
use crate::pipeline::Output;
use crate::schema::Schema;
use crate::transform::TypedRecord;

/// Key for records whose StartDate could not be derived
pub const UNKNOWN_PARTITION: &str = "date=unknown";

/// Partition key for a StartDate value
pub fn partition_key(start_date: i64) -> String {
    if start_date <= 0 {
        UNKNOWN_PARTITION.to_string()
    } else {
        format!("date={:08}", start_date)
    }
}

/// Destination path of one partition.
///
/// `out/report.avro` with `date=20230501` becomes
/// `out/report/date=20230501.avro`.
pub fn partition_path(dest: &str, key: &str) -> String {
    let (dir, file) = match dest.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, dest),
    };

    let (stem, ext) = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (file, "avro"),
    };

    match dir {
        Some(dir) => format!("{}/{}/{}.{}", dir, stem, key, ext),
        None => format!("{}/{}.{}", stem, key, ext),
    }
}

/// Fans records out to one encoder per partition key.
///
/// Encoders are opened on first use through `open`, so only dates that occur
/// produce output.
pub(crate) struct PartitionedSink<W, F> {
    schema: Schema,
    options: EncoderOptions,
    open: F,
    encoders: BTreeMap<String, BlockEncoder<W>>,
}

impl<W, F> PartitionedSink<W, F>
where
    W: Write,
    F: FnMut(Option<&str>) -> io::Result<W>,
{
    pub(crate) fn new(schema: &Schema, options: EncoderOptions, open: F) -> Self {
        Self {
            schema: schema.clone(),
            options,
            open,
            encoders: BTreeMap::new(),
        }
    }

    pub(crate) fn append(&mut self, record: &TypedRecord<'_>) -> Result<()> {
        let key = partition_key(record.start_date());
        if !self.encoders.contains_key(&key) {
            tracing::debug!(partition = %key, "Opening partition");
            let writer = (self.open)(Some(&key))?;
            let encoder = BlockEncoder::new(&self.schema, writer, self.options)?;
            self.encoders.insert(key.clone(), encoder);
        }

        match self.encoders.get_mut(&key) {
            Some(encoder) => encoder.append(record),
            None => Ok(()),
        }
    }

    /// Finish every partition, in key order
    pub(crate) fn finish(self) -> Result<Vec<Output<W>>> {
        self.encoders
            .into_iter()
            .map(|(key, encoder)| {
                Ok(Output {
                    partition: Some(key),
                    writer: encoder.finish()?,
                })
            })
            .collect()
    }
}
