//! Incremental renderers for decoded records.
//!
//! A writer sees the stream through five hooks; every hook defaults to a no-op
//! so each format only implements what it needs. Writers never buffer a whole
//! record, let alone the whole stream.

use std::fmt::{Display, Formatter};
use std::io::Write;
use std::str::FromStr;

use crate::record::DecodedItem;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("tag {0} has no field mapping")]
    UnsupportedField(u64),
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WriteError {
    /// Item errors only cost the item; everything else is a sink failure.
    pub fn is_item_error(&self) -> bool {
        matches!(self, WriteError::UnsupportedField(_))
    }
}

pub trait OutputWriter: Send {
    fn stream_start(&mut self, _out: &mut dyn Write) -> Result<(), WriteError> {
        Ok(())
    }

    fn entry_start(&mut self, _out: &mut dyn Write, _entry_index: u64) -> Result<(), WriteError> {
        Ok(())
    }

    /// Must write nothing when it returns [`WriteError::UnsupportedField`].
    fn item(
        &mut self,
        _out: &mut dyn Write,
        _item: &DecodedItem,
        _entry_index: u64,
        _item_index: u64,
    ) -> Result<(), WriteError> {
        Ok(())
    }

    fn entry_end(&mut self, _out: &mut dyn Write, _entry_index: u64) -> Result<(), WriteError> {
        Ok(())
    }

    fn stream_end(&mut self, _out: &mut dyn Write) -> Result<(), WriteError> {
        Ok(())
    }
}

fn field_name(item: &DecodedItem) -> Result<&'static str, WriteError> {
    item.name.ok_or(WriteError::UnsupportedField(item.tag))
}

#[derive(Default)]
pub struct TextWriter;

impl OutputWriter for TextWriter {
    fn entry_start(&mut self, out: &mut dyn Write, entry_index: u64) -> Result<(), WriteError> {
        writeln!(out, "> KLV Packet #{}", entry_index)?;
        Ok(())
    }

    fn item(
        &mut self,
        out: &mut dyn Write,
        item: &DecodedItem,
        _entry_index: u64,
        _item_index: u64,
    ) -> Result<(), WriteError> {
        let name = field_name(item)?;
        writeln!(out, "\t [{}] {}: {}", item.tag, name, item.value)?;
        Ok(())
    }
}

pub struct CsvWriter {
    builder: csv::WriterBuilder,
}

impl Default for CsvWriter {
    fn default() -> Self {
        let mut builder = csv::WriterBuilder::new();
        builder
            .terminator(csv::Terminator::Any(b'\n'))
            .buffer_capacity(256);
        Self { builder }
    }
}

impl CsvWriter {
    fn row(&self, out: &mut dyn Write, fields: [&str; 4]) -> Result<(), WriteError> {
        let mut w = self.builder.from_writer(out);
        w.write_record(fields)?;
        w.flush()?;
        Ok(())
    }
}

impl OutputWriter for CsvWriter {
    fn stream_start(&mut self, out: &mut dyn Write) -> Result<(), WriteError> {
        self.row(out, ["#", "tag", "field", "value"])
    }

    fn item(
        &mut self,
        out: &mut dyn Write,
        item: &DecodedItem,
        entry_index: u64,
        _item_index: u64,
    ) -> Result<(), WriteError> {
        let name = field_name(item)?;
        self.row(
            out,
            [
                &entry_index.to_string(),
                &item.tag.to_string(),
                name,
                &item.value.to_string(),
            ],
        )
    }
}

/// Streams one JSON array of `{"items": [...]}` objects. The document is only
/// complete once [`OutputWriter::stream_end`] ran.
pub struct JsonWriter {
    first_entry: bool,
    first_item: bool,
}

impl Default for JsonWriter {
    fn default() -> Self {
        Self {
            first_entry: true,
            first_item: true,
        }
    }
}

impl OutputWriter for JsonWriter {
    fn stream_start(&mut self, out: &mut dyn Write) -> Result<(), WriteError> {
        out.write_all(b"[\n")?;
        Ok(())
    }

    fn entry_start(&mut self, out: &mut dyn Write, _entry_index: u64) -> Result<(), WriteError> {
        if !self.first_entry {
            out.write_all(b",\n")?;
        }
        out.write_all(b"\t{\n\t\t\"items\": [\n")?;
        self.first_entry = false;
        self.first_item = true;
        Ok(())
    }

    fn item(
        &mut self,
        out: &mut dyn Write,
        item: &DecodedItem,
        _entry_index: u64,
        _item_index: u64,
    ) -> Result<(), WriteError> {
        let name = field_name(item)?;
        let field = serde_json::to_string(name)?;
        let value = serde_json::to_string(&item.value.to_json())?;

        let separator = if self.first_item { "" } else { ",\n" };
        write!(
            out,
            "{}\t\t\t{{\n\t\t\t\t\"tag\": {},\n\t\t\t\t\"field\": {},\n\t\t\t\t\"value\": {}\n\t\t\t}}",
            separator, item.tag, field, value
        )?;
        self.first_item = false;
        Ok(())
    }

    fn entry_end(&mut self, out: &mut dyn Write, _entry_index: u64) -> Result<(), WriteError> {
        out.write_all(b"\n\t\t]\n\t}")?;
        Ok(())
    }

    fn stream_end(&mut self, out: &mut dyn Write) -> Result<(), WriteError> {
        out.write_all(b"\n]\n")?;
        out.flush()?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn writer(self) -> Box<dyn OutputWriter> {
        match self {
            OutputFormat::Text => Box::new(TextWriter),
            OutputFormat::Csv => Box::new(CsvWriter::default()),
            OutputFormat::Json => Box::new(JsonWriter::default()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown output format {0:?}, expected one of: text, csv, json")]
pub struct UnknownFormat(pub String);

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        let name = match self {
            OutputFormat::Text => "text",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
