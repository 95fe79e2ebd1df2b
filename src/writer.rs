use std::fs::File;
use std::io;
use std::io::Write;
use std::mem;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use memchr::{memchr, memchr3};

use crate::codec::{Codec, StdCodec};
use crate::error::{Error, Result};
use crate::validate_config;

/// A single field value, dispatched once by the writer.
///
/// `From` impls exist for the common Rust types, so most callers never name
/// this type and instead pass values straight to
/// [`Writer::write_field`]. `Option<T>` maps `None` to `Field::Null`.
#[derive(Clone, Copy, Debug)]
pub enum Field<'a> {
    /// An absent field. Emits zero characters.
    Null,
    /// A string field, escaped as needed.
    Str(&'a str),
    /// An integer field.
    Int(i64),
    /// A floating point field.
    Float(f64),
    /// A boolean field.
    Bool(bool),
    /// A single character field.
    Char(char),
    /// A binary field. Base64 encoded and always wrapped in quotes.
    Bytes(&'a [u8]),
    /// A timestamp field, rendered as epoch milliseconds.
    Timestamp(DateTime<Utc>),
}

impl<'a> From<&'a str> for Field<'a> {
    fn from(v: &'a str) -> Field<'a> {
        Field::Str(v)
    }
}

impl<'a> From<&'a String> for Field<'a> {
    fn from(v: &'a String) -> Field<'a> {
        Field::Str(v)
    }
}

impl<'a> From<i32> for Field<'a> {
    fn from(v: i32) -> Field<'a> {
        Field::Int(v as i64)
    }
}

impl<'a> From<i64> for Field<'a> {
    fn from(v: i64) -> Field<'a> {
        Field::Int(v)
    }
}

impl<'a> From<f32> for Field<'a> {
    fn from(v: f32) -> Field<'a> {
        Field::Float(v as f64)
    }
}

impl<'a> From<f64> for Field<'a> {
    fn from(v: f64) -> Field<'a> {
        Field::Float(v)
    }
}

impl<'a> From<bool> for Field<'a> {
    fn from(v: bool) -> Field<'a> {
        Field::Bool(v)
    }
}

impl<'a> From<char> for Field<'a> {
    fn from(v: char) -> Field<'a> {
        Field::Char(v)
    }
}

impl<'a> From<&'a [u8]> for Field<'a> {
    fn from(v: &'a [u8]) -> Field<'a> {
        Field::Bytes(v)
    }
}

impl<'a> From<&'a Vec<u8>> for Field<'a> {
    fn from(v: &'a Vec<u8>) -> Field<'a> {
        Field::Bytes(v)
    }
}

impl<'a> From<DateTime<Utc>> for Field<'a> {
    fn from(v: DateTime<Utc>) -> Field<'a> {
        Field::Timestamp(v)
    }
}

impl<'a, T: Into<Field<'a>>> From<Option<T>> for Field<'a> {
    fn from(v: Option<T>) -> Field<'a> {
        match v {
            None => Field::Null,
            Some(v) => v.into(),
        }
    }
}

/// A builder for configuring a CSV writer.
#[derive(Clone)]
pub struct WriterBuilder {
    delimiter: u8,
    quote: u8,
    comment: u8,
    quote_empty: bool,
    codec: Arc<dyn Codec>,
}

impl Default for WriterBuilder {
    fn default() -> WriterBuilder {
        WriterBuilder {
            delimiter: b',',
            quote: b'"',
            comment: b'#',
            quote_empty: true,
            codec: Arc::new(StdCodec),
        }
    }
}

impl WriterBuilder {
    /// Create a new builder with the default configuration: comma separated,
    /// double-quote escaped, `#` comments, empty strings quoted.
    pub fn new() -> WriterBuilder {
        WriterBuilder::default()
    }

    /// The field separator to use. The default is `b','`.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut WriterBuilder {
        self.delimiter = delimiter;
        self
    }

    /// The quote character to use. The default is `b'"'`.
    pub fn quote(&mut self, quote: u8) -> &mut WriterBuilder {
        self.quote = quote;
        self
    }

    /// The comment character used by `write_comment`. The default is `b'#'`.
    pub fn comment(&mut self, comment: u8) -> &mut WriterBuilder {
        self.comment = comment;
        self
    }

    /// Whether an empty (non-null) string field is written as an explicit
    /// quoted-empty marker (`""`). Enabled by default; this is what keeps
    /// empty strings distinguishable from nulls on read-back.
    pub fn quote_empty_strings(&mut self, yes: bool) -> &mut WriterBuilder {
        self.quote_empty = yes;
        self
    }

    /// The codec used to render typed field values.
    pub fn codec(&mut self, codec: Arc<dyn Codec>) -> &mut WriterBuilder {
        self.codec = codec;
        self
    }

    /// Build a writer that writes to `wtr`.
    ///
    /// Returns a usage error if the separator, quote and comment characters
    /// do not all differ.
    pub fn from_writer<W: io::Write>(&self, wtr: W) -> Result<Writer<W>> {
        validate_config(self.delimiter, self.quote, self.comment)?;
        Ok(self.build(wtr))
    }

    /// Build a writer that writes to the file at `path`, creating it if
    /// needed and truncating it otherwise.
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Writer<File>> {
        self.from_writer(File::create(path)?)
    }

    fn build<W: io::Write>(&self, wtr: W) -> Writer<W> {
        Writer {
            wtr: io::BufWriter::new(wtr),
            delimiter: self.delimiter,
            quote: self.quote,
            comment: self.comment,
            quote_empty: self.quote_empty,
            codec: self.codec.clone(),
            fields_written: 0,
            record_number: 0,
            scratch: String::new(),
        }
    }
}

/// A CSV writer (the escaper).
///
/// Emits one record per `begin_record`/`write_field`.../`end_record`
/// bracket. A string field is wrapped in quotes, with internal quotes
/// doubled, if and only if it contains a quote, the field separator or a
/// line feed; otherwise it is emitted verbatim.
///
/// # Example
///
/// ```
/// use csvstream::Writer;
///
/// let mut wtr = Writer::from_memory();
/// wtr.begin_record();
/// wtr.write_field("abc").unwrap();
/// wtr.write_field(1234).unwrap();
/// wtr.end_record().unwrap();
/// assert_eq!(wtr.into_string(), "abc,1234\n");
/// ```
pub struct Writer<W: io::Write> {
    wtr: io::BufWriter<W>,
    delimiter: u8,
    quote: u8,
    comment: u8,
    quote_empty: bool,
    codec: Arc<dyn Codec>,
    fields_written: u64,
    record_number: u64,
    scratch: String,
}

impl<W: io::Write> Writer<W> {
    /// Create a writer with the default configuration.
    pub fn from_writer(wtr: W) -> Writer<W> {
        WriterBuilder::new().build(wtr)
    }

    /// Start a new record. Resets the field count and bumps the record
    /// number.
    pub fn begin_record(&mut self) {
        self.fields_written = 0;
        self.record_number += 1;
    }

    /// Terminate the current record with a single line feed.
    pub fn end_record(&mut self) -> Result<()> {
        self.fields_written = 0;
        self.write_bytes(b"\n")
    }

    /// Write one field. A separator is emitted before every field except
    /// the first in a record.
    pub fn write_field<'a, F: Into<Field<'a>>>(
        &mut self,
        field: F,
    ) -> Result<()> {
        let field = field.into();
        self.delimit()?;
        match field {
            Field::Null => Ok(()),
            Field::Str(s) => self.write_escaped(s),
            Field::Bool(v) => {
                self.write_rendered(|c, out| c.fmt_bool(v, out), false)
            }
            Field::Int(v) => {
                self.write_rendered(|c, out| c.fmt_int(v, out), false)
            }
            Field::Float(v) => {
                self.write_rendered(|c, out| c.fmt_float(v, out), false)
            }
            Field::Char(v) => {
                self.write_rendered(|c, out| c.fmt_char(v, out), false)
            }
            Field::Timestamp(v) => {
                self.write_rendered(|c, out| c.fmt_timestamp(v, out), false)
            }
            Field::Bytes(v) => {
                self.write_rendered(|c, out| c.encode_bytes(v, out), true)
            }
        }
    }

    /// Write a whole record atomically: begin, every field, end.
    pub fn write_record<'a, I>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Field<'a>>,
    {
        self.begin_record();
        for field in fields {
            self.write_field(field)?;
        }
        self.end_record()
    }

    /// Write one or more comment lines preceding the current record.
    ///
    /// The text is split on embedded line breaks and every line is prefixed
    /// with the comment character. This is a usage error once a field has
    /// been written for the current record.
    pub fn write_comment(&mut self, text: &str) -> Result<()> {
        if self.fields_written > 0 {
            return Err(Error::Usage(
                "cannot write a record comment after fields have been \
                 written for the current record"
                    .to_string(),
            ));
        }
        for line in text.split('\n') {
            self.write_bytes(&[self.comment])?;
            self.write_bytes(line.as_bytes())?;
            self.write_bytes(b"\n")?;
        }
        Ok(())
    }

    /// Write a string verbatim, without any escaping.
    ///
    /// The caller asserts the value contains no separator, quote or line
    /// feed characters.
    pub fn write_raw(&mut self, s: &str) -> Result<()> {
        self.delimit()?;
        if s.is_empty() {
            if self.quote_empty {
                self.write_bytes(&[self.quote, self.quote])?;
            }
            return Ok(());
        }
        self.write_bytes(s.as_bytes())
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        self.wtr.flush().map_err(Error::Io)
    }

    /// The number of records started so far.
    pub fn record_number(&self) -> u64 {
        self.record_number
    }

    fn delimit(&mut self) -> Result<()> {
        if self.fields_written > 0 {
            self.write_bytes(&[self.delimiter])?;
        }
        self.fields_written += 1;
        Ok(())
    }

    fn write_rendered<F>(&mut self, render: F, quoted: bool) -> Result<()>
    where
        F: FnOnce(&dyn Codec, &mut String),
    {
        let codec = self.codec.clone();
        let mut scratch = mem::take(&mut self.scratch);
        scratch.clear();
        render(&*codec, &mut scratch);
        let res = if quoted {
            self.write_quoted_verbatim(scratch.as_bytes())
        } else {
            self.write_bytes(scratch.as_bytes())
        };
        self.scratch = scratch;
        res
    }

    fn write_escaped(&mut self, s: &str) -> Result<()> {
        if s.is_empty() {
            if self.quote_empty {
                self.write_bytes(&[self.quote, self.quote])?;
            }
            return Ok(());
        }
        let bytes = s.as_bytes();
        if memchr3(self.quote, self.delimiter, b'\n', bytes).is_none() {
            return self.write_bytes(bytes);
        }
        self.write_bytes(&[self.quote])?;
        let mut rest = bytes;
        while let Some(i) = memchr(self.quote, rest) {
            self.write_bytes(&rest[..i])?;
            self.write_bytes(&[self.quote, self.quote])?;
            rest = &rest[i + 1..];
        }
        self.write_bytes(rest)?;
        self.write_bytes(&[self.quote])
    }

    fn write_quoted_verbatim(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_bytes(&[self.quote])?;
        self.write_bytes(bytes)?;
        self.write_bytes(&[self.quote])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.wtr.write_all(bytes).map_err(Error::Io)
    }
}

impl Writer<Vec<u8>> {
    /// Create a writer that accumulates CSV text in memory.
    pub fn from_memory() -> Writer<Vec<u8>> {
        Writer::from_writer(Vec::with_capacity(1024))
    }

    /// Return the accumulated CSV text.
    pub fn into_string(self) -> String {
        match self.wtr.into_inner() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            // A Vec sink cannot fail to flush.
            Err(_) => String::new(),
        }
    }
}

/// A writer wrapped in a mutex, for interleaved concurrent producers.
///
/// Every method locks for the duration of one whole record operation, so
/// concurrent callers never observe a partially written record.
pub struct SharedWriter<W: io::Write> {
    inner: Arc<Mutex<Writer<W>>>,
}

impl<W: io::Write> Clone for SharedWriter<W> {
    fn clone(&self) -> SharedWriter<W> {
        SharedWriter { inner: self.inner.clone() }
    }
}

impl<W: io::Write> SharedWriter<W> {
    /// Wrap a writer for shared use.
    pub fn new(wtr: Writer<W>) -> SharedWriter<W> {
        SharedWriter { inner: Arc::new(Mutex::new(wtr)) }
    }

    /// Write a whole record under the lock.
    pub fn write_record<'a, I>(&self, fields: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Field<'a>>,
    {
        self.lock().write_record(fields)
    }

    /// Write comment lines under the lock.
    pub fn write_comment(&self, text: &str) -> Result<()> {
        self.lock().write_comment(text)
    }

    /// Flush the underlying sink.
    pub fn flush(&self) -> Result<()> {
        self.lock().flush()
    }

    /// The number of records started so far.
    pub fn record_number(&self) -> u64 {
        self.lock().record_number()
    }

    fn lock(&self) -> MutexGuard<Writer<W>> {
        // A poisoned writer is still structurally sound; the worst case is
        // a torn record from the panicked holder.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::TimeZone;
    use chrono::Utc;

    use super::{Field, SharedWriter, Writer, WriterBuilder};
    use crate::error::Error;

    fn write_fields<'a, I>(fields: I) -> String
    where
        I: IntoIterator,
        I::Item: Into<Field<'a>>,
    {
        let mut wtr = Writer::from_memory();
        for f in fields {
            wtr.write_field(f).unwrap();
        }
        wtr.into_string()
    }

    #[test]
    fn plain_fields() {
        assert_eq!(write_fields(vec!["a", "b", "c"]), "a,b,c");
    }

    #[test]
    fn null_fields_emit_nothing() {
        assert_eq!(
            write_fields(vec![Some("a"), None, Some("c")]),
            "a,,c"
        );
        assert_eq!(write_fields(vec![None::<&str>, None]), ",");
    }

    #[test]
    fn empty_string_is_quoted() {
        assert_eq!(write_fields(vec!["a", "", "c"]), "a,\"\",c");
    }

    #[test]
    fn empty_string_unquoted_when_disabled() {
        let mut builder = WriterBuilder::new();
        builder.quote_empty_strings(false);
        let mut wtr = builder.from_writer(Vec::new()).unwrap();
        wtr.write_field("a").unwrap();
        wtr.write_field("").unwrap();
        wtr.write_field("c").unwrap();
        assert_eq!(wtr.into_string(), "a,,c");
    }

    #[test]
    fn escapes_separator_quote_and_newline() {
        assert_eq!(write_fields(vec!["b,"]), "\"b,\"");
        assert_eq!(write_fields(vec!["\"b\""]), "\"\"\"b\"\"\"");
        assert_eq!(write_fields(vec!["b\nc"]), "\"b\nc\"");
        assert_eq!(write_fields(vec!["plain"]), "plain");
    }

    #[test]
    fn typed_fields() {
        let dt = Utc.timestamp_millis_opt(1_000).unwrap();
        let mut wtr = Writer::from_memory();
        wtr.write_field(42i64).unwrap();
        wtr.write_field(1.5f64).unwrap();
        wtr.write_field(true).unwrap();
        wtr.write_field('x').unwrap();
        wtr.write_field(dt).unwrap();
        assert_eq!(wtr.into_string(), "42,1.5,t,x,1000");
    }

    #[test]
    fn bytes_are_base64_and_always_quoted() {
        let mut wtr = Writer::from_memory();
        wtr.write_field(&b"csv"[..]).unwrap();
        assert_eq!(wtr.into_string(), "\"Y3N2\"");
    }

    #[test]
    fn records_and_numbering() {
        let mut wtr = Writer::from_memory();
        assert_eq!(wtr.record_number(), 0);
        wtr.write_record(vec!["a", "b"]).unwrap();
        wtr.write_record(vec!["c"]).unwrap();
        assert_eq!(wtr.record_number(), 2);
        assert_eq!(wtr.into_string(), "a,b\nc\n");
    }

    #[test]
    fn comment_lines() {
        let mut wtr = Writer::from_memory();
        wtr.write_comment("one\ntwo").unwrap();
        wtr.write_record(vec!["a"]).unwrap();
        assert_eq!(wtr.into_string(), "#one\n#two\na\n");
    }

    #[test]
    fn comment_mid_record_is_usage_error() {
        let mut wtr = Writer::from_memory();
        wtr.begin_record();
        wtr.write_field("a").unwrap();
        match wtr.write_comment("nope") {
            Err(Error::Usage(_)) => {}
            other => panic!("expected usage error, got {:?}", other.err()),
        }
        // A fresh record makes comments legal again.
        wtr.end_record().unwrap();
        wtr.write_comment("ok").unwrap();
    }

    #[test]
    fn raw_passthrough() {
        let mut wtr = Writer::from_memory();
        wtr.write_field("a").unwrap();
        wtr.write_raw("not,escaped").unwrap();
        assert_eq!(wtr.into_string(), "a,not,escaped");
    }

    #[test]
    fn custom_delimiter_and_quote() {
        let mut builder = WriterBuilder::new();
        builder.delimiter(b';').quote(b'\'');
        let mut wtr = builder.from_writer(Vec::new()).unwrap();
        wtr.write_field("a;b").unwrap();
        wtr.write_field("c'd").unwrap();
        assert_eq!(wtr.into_string(), "'a;b';'c''d'");
    }

    #[test]
    fn rejects_clashing_configuration() {
        let mut builder = WriterBuilder::new();
        builder.delimiter(b'"');
        assert!(builder.from_writer(Vec::new()).is_err());

        let mut builder = WriterBuilder::new();
        builder.comment(b',');
        assert!(builder.from_writer(Vec::new()).is_err());
    }

    #[test]
    fn shared_writer_writes_whole_records() {
        let wtr = SharedWriter::new(Writer::from_writer(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..4 {
            let wtr = wtr.clone();
            handles.push(thread::spawn(move || {
                wtr.write_record(vec![i as i64, i as i64]).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(wtr.record_number(), 4);
        drop(Arc::try_unwrap(wtr.inner).ok());
    }
}
