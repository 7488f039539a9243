use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder};

use crate::error::{PipelineError, Result};

/// One row of the source dataset: column name to raw text, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceRecord {
    fields: Vec<(String, Option<String>)>,
}

impl SourceRecord {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.map(Into::into)))
                .collect(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Sequential reader over a delimited, Latin-1 encoded table with a header row.
pub struct CsvSource<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    record: ByteRecord,
}

impl CsvSource<File> {
    pub fn open(path: &Path, delimiter: char) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PipelineError::Config(format!("Failed to open source file '{}': {}", path.display(), e))
        })?;
        Self::from_reader(file, delimiter)
    }
}

impl<R: Read> CsvSource<R> {
    pub fn from_reader(inner: R, delimiter: char) -> Result<Self> {
        let delimiter = u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| PipelineError::Config(format!("Delimiter {:?} is not ASCII", delimiter)))?;

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(inner);

        let headers = reader.byte_headers()?.iter().map(decode_latin1).collect();

        Ok(Self {
            reader,
            headers,
            record: ByteRecord::new(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for CsvSource<R> {
    type Item = Result<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                // short rows leave trailing columns absent, extra fields are dropped
                let fields = self
                    .headers
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), self.record.get(i).map(decode_latin1)))
                    .collect();
                Some(Ok(SourceRecord { fields }))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// ISO-8859-1 maps every byte to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
