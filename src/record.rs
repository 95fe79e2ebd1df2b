use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::codec::{Codec, CodecError, StdCodec};
use crate::error::{ConvertError, Error, Result};
use crate::writer::Writer;

/// One CSV record: an ordered sequence of nullable fields.
///
/// A field is `None` when it was absent (empty without quotes) and
/// `Some(..)` otherwise; an explicitly quoted empty field is `Some("")`.
/// Records carry the 0-based record number assigned by the reader when the
/// record completed, which shows up in diagnostics.
///
/// Typed accessors come in three forms: strict (`read_i64`), which fails on
/// a null field; defaulted (`read_i64_or`), which substitutes a caller
/// supplied value for null; and nullable (`read_i64_opt`), which maps null
/// to `None`. All of them delegate parsing to the record's [`Codec`] and
/// wrap failures into an error naming the field index, the raw value and
/// the record re-serialized as CSV text.
#[derive(Clone)]
pub struct Record {
    fields: Vec<Option<String>>,
    number: u64,
    offset: usize,
    codec: Arc<dyn Codec>,
}

impl Default for Record {
    fn default() -> Record {
        Record::new()
    }
}

impl Record {
    /// Create a new empty record using the default codec.
    pub fn new() -> Record {
        Record::with_codec(Arc::new(StdCodec))
    }

    /// Create a record directly from a field vector.
    pub fn from_fields(fields: Vec<Option<String>>) -> Record {
        let mut rec = Record::new();
        rec.fields = fields;
        rec
    }

    pub(crate) fn with_codec(codec: Arc<dyn Codec>) -> Record {
        Record { fields: Vec::new(), number: 0, offset: 0, codec: codec }
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Vec<Option<String>> {
        &mut self.fields
    }

    pub(crate) fn set_number(&mut self, number: u64) {
        self.number = number;
        self.offset = 0;
    }

    pub(crate) fn set_codec(&mut self, codec: Arc<dyn Codec>) {
        self.codec = codec;
    }

    /// The raw field at index `i`, adjusted by the record's offset.
    ///
    /// Returns `None` both for a null field and for an index past the end
    /// of the record.
    pub fn get(&self, i: usize) -> Option<&str> {
        self.fields
            .get(self.offset.saturating_add(i))
            .and_then(|f| f.as_deref())
    }

    /// The number of fields visible through the current offset.
    pub fn len(&self) -> usize {
        self.fields.len().saturating_sub(self.offset)
    }

    /// True if no fields are visible.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The 0-based record number assigned when the record completed.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// View this record as "the fields remaining after position `k`",
    /// without copying. Offsets accumulate.
    pub fn with_offset(mut self, k: usize) -> Record {
        self.offset = self.offset.saturating_add(k);
        self
    }

    /// Iterate over the visible fields.
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> {
        let start = self.offset.min(self.fields.len());
        self.fields[start..].iter().map(|f| f.as_deref())
    }

    /// Re-serialize the visible fields as one CSV line (no terminator),
    /// using the default writer configuration.
    pub fn to_csv_string(&self) -> String {
        let mut wtr = Writer::from_memory();
        for field in self.iter() {
            // An in-memory sink cannot fail.
            let _ = wtr.write_field(field);
        }
        wtr.into_string()
    }

    /// The string at field `i`. Fails if the field is null or missing.
    pub fn read_str(&self, i: usize) -> Result<&str> {
        match self.get(i) {
            Some(s) => Ok(s),
            None => Err(self.null_err(i, "string")),
        }
    }

    /// The string at field `i`, or `default` if null or missing.
    pub fn read_str_or<'a>(&'a self, i: usize, default: &'a str) -> &'a str {
        self.get(i).unwrap_or(default)
    }

    /// The string at field `i`, or `None` if null or missing.
    pub fn read_str_opt(&self, i: usize) -> Option<&str> {
        self.get(i)
    }

    /// The boolean at field `i`. Fails if the field is null or missing.
    pub fn read_bool(&self, i: usize) -> Result<bool> {
        self.read_req(i, "bool", |c, s| c.parse_bool(s))
    }

    /// The boolean at field `i`, or `default` if null or missing.
    pub fn read_bool_or(&self, i: usize, default: bool) -> Result<bool> {
        Ok(self.read_bool_opt(i)?.unwrap_or(default))
    }

    /// The boolean at field `i`, or `None` if null or missing.
    pub fn read_bool_opt(&self, i: usize) -> Result<Option<bool>> {
        self.read_opt(i, "bool", |c, s| c.parse_bool(s))
    }

    /// The character at field `i`. Fails if the field is null or missing.
    pub fn read_char(&self, i: usize) -> Result<char> {
        self.read_req(i, "char", |c, s| c.parse_char(s))
    }

    /// The character at field `i`, or `default` if null or missing.
    pub fn read_char_or(&self, i: usize, default: char) -> Result<char> {
        Ok(self.read_char_opt(i)?.unwrap_or(default))
    }

    /// The character at field `i`, or `None` if null or missing.
    pub fn read_char_opt(&self, i: usize) -> Result<Option<char>> {
        self.read_opt(i, "char", |c, s| c.parse_char(s))
    }

    /// The 32-bit integer at field `i`, with a range check on top of the
    /// codec's integer parse. Fails if the field is null or missing.
    pub fn read_i32(&self, i: usize) -> Result<i32> {
        self.read_req(i, "i32", parse_i32)
    }

    /// The 32-bit integer at field `i`, or `default` if null or missing.
    pub fn read_i32_or(&self, i: usize, default: i32) -> Result<i32> {
        Ok(self.read_i32_opt(i)?.unwrap_or(default))
    }

    /// The 32-bit integer at field `i`, or `None` if null or missing.
    pub fn read_i32_opt(&self, i: usize) -> Result<Option<i32>> {
        self.read_opt(i, "i32", parse_i32)
    }

    /// The integer at field `i`. Fails if the field is null or missing.
    pub fn read_i64(&self, i: usize) -> Result<i64> {
        self.read_req(i, "i64", |c, s| c.parse_int(s))
    }

    /// The integer at field `i`, or `default` if null or missing.
    pub fn read_i64_or(&self, i: usize, default: i64) -> Result<i64> {
        Ok(self.read_i64_opt(i)?.unwrap_or(default))
    }

    /// The integer at field `i`, or `None` if null or missing.
    pub fn read_i64_opt(&self, i: usize) -> Result<Option<i64>> {
        self.read_opt(i, "i64", |c, s| c.parse_int(s))
    }

    /// The 32-bit float at field `i`. Fails if the field is null or missing.
    pub fn read_f32(&self, i: usize) -> Result<f32> {
        self.read_req(i, "f32", |c, s| c.parse_float(s).map(|v| v as f32))
    }

    /// The 32-bit float at field `i`, or `default` if null or missing.
    pub fn read_f32_or(&self, i: usize, default: f32) -> Result<f32> {
        Ok(self.read_f32_opt(i)?.unwrap_or(default))
    }

    /// The 32-bit float at field `i`, or `None` if null or missing.
    pub fn read_f32_opt(&self, i: usize) -> Result<Option<f32>> {
        self.read_opt(i, "f32", |c, s| c.parse_float(s).map(|v| v as f32))
    }

    /// The float at field `i`. Fails if the field is null or missing.
    pub fn read_f64(&self, i: usize) -> Result<f64> {
        self.read_req(i, "f64", |c, s| c.parse_float(s))
    }

    /// The float at field `i`, or `default` if null or missing.
    pub fn read_f64_or(&self, i: usize, default: f64) -> Result<f64> {
        Ok(self.read_f64_opt(i)?.unwrap_or(default))
    }

    /// The float at field `i`, or `None` if null or missing.
    pub fn read_f64_opt(&self, i: usize) -> Result<Option<f64>> {
        self.read_opt(i, "f64", |c, s| c.parse_float(s))
    }

    /// The decoded byte array at field `i`. Fails if the field is null or
    /// missing.
    pub fn read_bytes(&self, i: usize) -> Result<Vec<u8>> {
        self.read_req(i, "bytes", |c, s| c.decode_bytes(s))
    }

    /// The decoded byte array at field `i`, or `default` if null or missing.
    pub fn read_bytes_or(&self, i: usize, default: Vec<u8>) -> Result<Vec<u8>> {
        Ok(self.read_bytes_opt(i)?.unwrap_or(default))
    }

    /// The decoded byte array at field `i`, or `None` if null or missing.
    pub fn read_bytes_opt(&self, i: usize) -> Result<Option<Vec<u8>>> {
        self.read_opt(i, "bytes", |c, s| c.decode_bytes(s))
    }

    /// The timestamp at field `i`. Fails if the field is null or missing.
    pub fn read_timestamp(&self, i: usize) -> Result<DateTime<Utc>> {
        self.read_req(i, "timestamp", |c, s| c.parse_timestamp(s))
    }

    /// The timestamp at field `i`, or `default` if null or missing.
    pub fn read_timestamp_or(
        &self,
        i: usize,
        default: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        Ok(self.read_timestamp_opt(i)?.unwrap_or(default))
    }

    /// The timestamp at field `i`, or `None` if null or missing.
    pub fn read_timestamp_opt(
        &self,
        i: usize,
    ) -> Result<Option<DateTime<Utc>>> {
        self.read_opt(i, "timestamp", |c, s| c.parse_timestamp(s))
    }

    fn read_opt<T, F>(
        &self,
        i: usize,
        ty: &'static str,
        parse: F,
    ) -> Result<Option<T>>
    where
        F: Fn(&dyn Codec, &str) -> std::result::Result<T, CodecError>,
    {
        match self.get(i) {
            None => Ok(None),
            Some(s) => parse(&*self.codec, s).map(Some).map_err(|err| {
                Error::Convert(ConvertError::new(
                    i,
                    s,
                    ty,
                    err.expected().to_string(),
                    self.to_csv_string(),
                ))
            }),
        }
    }

    fn read_req<T, F>(&self, i: usize, ty: &'static str, parse: F) -> Result<T>
    where
        F: Fn(&dyn Codec, &str) -> std::result::Result<T, CodecError>,
    {
        match self.read_opt(i, ty, parse)? {
            Some(v) => Ok(v),
            None => Err(self.null_err(i, ty)),
        }
    }

    fn null_err(&self, i: usize, ty: &'static str) -> Error {
        Error::Convert(ConvertError::new(
            i,
            "",
            ty,
            "a non-null field".to_string(),
            self.to_csv_string(),
        ))
    }
}

fn parse_i32(
    codec: &dyn Codec,
    s: &str,
) -> std::result::Result<i32, CodecError> {
    let v = codec.parse_int(s)?;
    if v < i64::from(i32::MIN) || v > i64::from(i32::MAX) {
        return Err(CodecError::new("a 32-bit integer"));
    }
    Ok(v as i32)
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Record")
            .field("number", &self.number)
            .field("offset", &self.offset)
            .field("fields", &self.fields)
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Record) -> bool {
        self.iter().eq(other.iter())
    }
}
