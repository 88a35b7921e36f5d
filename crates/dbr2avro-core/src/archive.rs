//! Payload extraction from source buffers
//!
//! A source is either a plain CSV report, a zip archive holding one or more
//! reports, or a gzip-compressed report. [`extract`] turns the buffered source
//! into a lazy sequence of payloads in entry order.

use std::borrow::Cow;
use std::io::{Cursor, Read};

use flate2::read::MultiGzDecoder;
use zip::ZipArchive;

use crate::error::{ConvertError, Result};

/// Container format, chosen from the source name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Gzip,
    Plain,
}

impl ArchiveKind {
    pub fn detect(source_name: &str) -> Self {
        let lower = source_name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Self::Zip
        } else if lower.ends_with(".gz") {
            Self::Gzip
        } else {
            Self::Plain
        }
    }
}

/// One report payload: an archive entry or the whole source
#[derive(Debug, Clone)]
pub struct Payload<'a> {
    /// Entry name, or the source name for non-archive sources
    pub name: String,
    pub data: Cow<'a, [u8]>,
}

/// An archive entry that could not be opened or read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

/// Lazy sequence of payloads from one source.
///
/// Archive entries are read one at a time as the iterator advances. Entries
/// that fail are yielded as `Err(SkippedEntry)` and iteration continues.
pub struct Payloads<'a> {
    inner: Inner<'a>,
}

enum Inner<'a> {
    Zip {
        archive: ZipArchive<Cursor<&'a [u8]>>,
        next: usize,
    },
    Single(Option<Payload<'a>>),
}

/// Open a buffered source as a sequence of payloads.
///
/// Fails only when the container itself cannot be opened.
pub fn extract<'a>(source_name: &str, bytes: &'a [u8]) -> Result<Payloads<'a>> {
    let inner = match ArchiveKind::detect(source_name) {
        ArchiveKind::Zip => {
            let archive = ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| ConvertError::archive(source_name, e))?;
            tracing::debug!(source = source_name, entries = archive.len(), "Opened zip archive");
            Inner::Zip { archive, next: 0 }
        }
        ArchiveKind::Gzip => {
            let mut data = Vec::new();
            // Concatenated members decode as one stream, like `gunzip -c`
            MultiGzDecoder::new(bytes)
                .read_to_end(&mut data)
                .map_err(|e| ConvertError::archive(source_name, e))?;
            let name = source_name
                .strip_suffix(".gz")
                .or_else(|| source_name.strip_suffix(".GZ"))
                .unwrap_or(source_name);
            Inner::Single(Some(Payload {
                name: name.to_string(),
                data: Cow::Owned(data),
            }))
        }
        ArchiveKind::Plain => Inner::Single(Some(Payload {
            name: source_name.to_string(),
            data: Cow::Borrowed(bytes),
        })),
    };

    Ok(Payloads { inner })
}

impl<'a> Iterator for Payloads<'a> {
    type Item = std::result::Result<Payload<'a>, SkippedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Single(payload) => payload.take().map(Ok),
            Inner::Zip { archive, next } => loop {
                if *next >= archive.len() {
                    return None;
                }
                let idx = *next;
                *next += 1;

                let mut entry = match archive.by_index(idx) {
                    Ok(entry) => entry,
                    Err(e) => return Some(Err(skip(format!("entry #{}", idx), e))),
                };
                if entry.is_dir() {
                    continue;
                }

                let name = entry.name().to_string();
                let mut data = Vec::new();
                return Some(match entry.read_to_end(&mut data) {
                    Ok(_) => Ok(Payload {
                        name,
                        data: Cow::Owned(data),
                    }),
                    Err(e) => Err(skip(name, e)),
                });
            },
        }
    }
}

fn skip(name: String, reason: impl ToString) -> SkippedEntry {
    let reason = reason.to_string();
    tracing::warn!(entry = %name, %reason, "Skipping unreadable archive entry");
    SkippedEntry { name, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for (name, content) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_detect() {
        assert_eq!(ArchiveKind::detect("a/b/report.csv.zip"), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::detect("REPORT.ZIP"), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::detect("report.csv.gz"), ArchiveKind::Gzip);
        assert_eq!(ArchiveKind::detect("report.csv"), ArchiveKind::Plain);
    }

    #[test]
    fn test_plain_source_is_borrowed() {
        let bytes = b"A,B\n1,2\n";
        let payloads: Vec<_> = extract("report.csv", bytes).unwrap().collect();
        assert_eq!(payloads.len(), 1);
        let payload = payloads[0].as_ref().unwrap();
        assert_eq!(payload.name, "report.csv");
        assert!(matches!(payload.data, Cow::Borrowed(_)));
        assert_eq!(&payload.data[..], bytes);
    }

    #[test]
    fn test_zip_entries_in_order() {
        let bytes = zip_of(&[("one.csv", "A\n1\n"), ("two.csv", "A\n2\n")]);
        let names: Vec<String> = extract("bill.csv.zip", &bytes)
            .unwrap()
            .map(|p| p.unwrap().name)
            .collect();
        assert_eq!(names, vec!["one.csv", "two.csv"]);
    }

    #[test]
    fn test_zip_directories_are_skipped() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.add_directory("nested/", SimpleFileOptions::default()).unwrap();
            zip.start_file("nested/r.csv", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"A\n1\n").unwrap();
            zip.finish().unwrap();
        }
        let payloads: Vec<_> = extract("x.zip", &buf).unwrap().collect();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].as_ref().unwrap().name, "nested/r.csv");
    }

    #[test]
    fn test_corrupt_zip_is_fatal() {
        let err = extract("x.zip", b"definitely not a zip").err().unwrap();
        assert!(matches!(err, ConvertError::Archive { .. }));
    }

    #[test]
    fn test_gzip_source() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"A,B\n1,2\n").unwrap();
        let bytes = encoder.finish().unwrap();

        let payloads: Vec<_> = extract("report.csv.gz", &bytes).unwrap().collect();
        let payload = payloads[0].as_ref().unwrap();
        assert_eq!(payload.name, "report.csv");
        assert_eq!(&payload.data[..], b"A,B\n1,2\n");

        assert!(extract("report.csv.gz", b"nope").is_err());
    }

    #[test]
    fn test_multi_member_gzip_source() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut bytes = Vec::new();
        for part in [&b"ProductName\nAWS Lambda\n"[..], b"AWS Glue\nAWS Batch\n"] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part).unwrap();
            bytes.extend(encoder.finish().unwrap());
        }

        let payloads: Vec<_> = extract("report.csv.gz", &bytes).unwrap().collect();
        assert_eq!(payloads.len(), 1);
        assert_eq!(
            &payloads[0].as_ref().unwrap().data[..],
            b"ProductName\nAWS Lambda\nAWS Glue\nAWS Batch\n"
        );
    }
}
