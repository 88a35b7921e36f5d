//! Local staging for encoded output
//!
//! Output is encoded into a temporary file and only published once the encoder
//! has finished. The file is removed when the staged output is dropped, on
//! success and on every error path.

use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// A temporary file that encoded output is written into
pub struct StagedOutput {
    writer: BufWriter<NamedTempFile>,
}

impl StagedOutput {
    /// Create a staged output in `dir`, or the system temp dir when `None`
    pub fn new(dir: Option<&Path>) -> io::Result<Self> {
        let file = match dir {
            Some(dir) => tempfile::Builder::new()
                .prefix("dbr2avro-")
                .suffix(".avro")
                .tempfile_in(dir)?,
            None => tempfile::Builder::new()
                .prefix("dbr2avro-")
                .suffix(".avro")
                .tempfile()?,
        };
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        self.writer.get_ref().path()
    }

    /// Flush buffered bytes and hand back the temporary file
    pub fn into_file(self) -> io::Result<NamedTempFile> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

impl Write for StagedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
