use std::fs::File;
use std::io;
use std::mem;
use std::path::Path;
use std::str;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec::{Codec, StdCodec};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::validate_config;

const BUF_SIZE: usize = 1024 * 8;

/// A builder for configuring a CSV reader.
///
/// This configures the separator, quote and comment characters, the
/// per-record character budget and the buffer trim thresholds.
#[derive(Clone)]
pub struct ReaderBuilder {
    delimiter: u8,
    quote: u8,
    comment: u8,
    comments_enabled: bool,
    max_record_size: u64,
    field_capacity: usize,
    max_field_capacity: usize,
    fields_capacity: usize,
    max_fields_capacity: usize,
    codec: Arc<dyn Codec>,
}

impl Default for ReaderBuilder {
    fn default() -> ReaderBuilder {
        ReaderBuilder {
            delimiter: b',',
            quote: b'"',
            comment: b'#',
            comments_enabled: true,
            max_record_size: 10_000_000,
            field_capacity: 100,
            max_field_capacity: 500,
            fields_capacity: 15,
            max_fields_capacity: 45,
            codec: Arc::new(StdCodec),
        }
    }
}

impl ReaderBuilder {
    /// Create a new builder with the default configuration: comma separated,
    /// double-quote escaped, `#` comments enabled, a 10 million character
    /// record budget.
    pub fn new() -> ReaderBuilder {
        ReaderBuilder::default()
    }

    /// The field separator to use. The default is `b','`.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut ReaderBuilder {
        self.delimiter = delimiter;
        self
    }

    /// The quote character to use. The default is `b'"'`.
    pub fn quote(&mut self, quote: u8) -> &mut ReaderBuilder {
        self.quote = quote;
        self
    }

    /// The comment character. A line starting with it is discarded whole.
    /// The default is `b'#'`.
    pub fn comment(&mut self, comment: u8) -> &mut ReaderBuilder {
        self.comment = comment;
        self
    }

    /// Whether comment lines are recognized at all. Enabled by default.
    pub fn comments_enabled(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.comments_enabled = yes;
        self
    }

    /// The largest number of characters a single record may contain.
    ///
    /// This protects against unbounded memory growth when reading a record
    /// whose terminator never arrives.
    pub fn max_record_size(&mut self, max: u64) -> &mut ReaderBuilder {
        self.max_record_size = max;
        self
    }

    /// Baseline capacity of the field text buffer.
    pub fn field_capacity(&mut self, cap: usize) -> &mut ReaderBuilder {
        self.field_capacity = cap;
        self
    }

    /// If the field text buffer grows past this, it is shrunk back to the
    /// baseline after the record.
    pub fn max_field_capacity(&mut self, cap: usize) -> &mut ReaderBuilder {
        self.max_field_capacity = cap;
        self
    }

    /// Baseline capacity of the field list buffer.
    pub fn fields_capacity(&mut self, cap: usize) -> &mut ReaderBuilder {
        self.fields_capacity = cap;
        self
    }

    /// If the field list buffer grows past this, it is shrunk back to the
    /// baseline after the record.
    pub fn max_fields_capacity(&mut self, cap: usize) -> &mut ReaderBuilder {
        self.max_fields_capacity = cap;
        self
    }

    /// The codec handed to every record this reader produces.
    pub fn codec(&mut self, codec: Arc<dyn Codec>) -> &mut ReaderBuilder {
        self.codec = codec;
        self
    }

    /// Build a reader that reads from `rdr`.
    ///
    /// Returns a usage error if the separator and quote characters clash,
    /// or if the comment character clashes with either while comments are
    /// enabled.
    pub fn from_reader<R: io::Read>(&self, rdr: R) -> Result<Reader<R>> {
        if self.comments_enabled {
            validate_config(self.delimiter, self.quote, self.comment)?;
        } else if self.delimiter == self.quote {
            return Err(Error::Usage(
                "the field separator and quote character must differ"
                    .to_string(),
            ));
        }
        Ok(self.build(rdr))
    }

    /// Build a reader that reads from the file at `path`.
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Reader<File>> {
        self.from_reader(File::open(path)?)
    }

    fn build<R: io::Read>(&self, rdr: R) -> Reader<R> {
        Reader {
            rdr: rdr,
            buf: vec![0; BUF_SIZE],
            bufi: 0,
            buf_len: 0,
            delimiter: self.delimiter,
            quote: self.quote,
            comment: self.comment,
            comments_enabled: self.comments_enabled,
            max_record_size: self.max_record_size,
            field_capacity: self.field_capacity,
            max_field_capacity: self.max_field_capacity,
            fields_capacity: self.fields_capacity,
            max_fields_capacity: self.max_fields_capacity,
            codec: self.codec.clone(),
            record_number: 0,
            exhausted: false,
            in_quote: false,
            quote_run: 0,
            saw_quote: false,
            field: Vec::with_capacity(self.field_capacity),
            fields: Vec::with_capacity(self.fields_capacity),
        }
    }
}

/// A CSV reader (the tokenizer).
///
/// Produces one record per call, advancing through the source one character
/// at a time. Reads are blocking; there is no internal concurrency.
///
/// The record passed to [`read_record`](Reader::read_record) is overwritten
/// in place, so a long-lived record can be reused across calls without
/// reallocating. Borrow it between calls to extract what you need; the next
/// call replaces its contents.
///
/// # Example
///
/// ```
/// use csvstream::Reader;
///
/// let mut rdr = Reader::from_string("a,b,c\nd,e\n");
/// let mut rec = csvstream::Record::new();
/// while rdr.read_record(&mut rec).unwrap() {
///     println!("record {} has {} fields", rec.number(), rec.len());
/// }
/// ```
pub struct Reader<R> {
    rdr: R,
    buf: Vec<u8>,
    bufi: usize,
    buf_len: usize,

    delimiter: u8,
    quote: u8,
    comment: u8,
    comments_enabled: bool,
    max_record_size: u64,
    field_capacity: usize,
    max_field_capacity: usize,
    fields_capacity: usize,
    max_fields_capacity: usize,
    codec: Arc<dyn Codec>,

    record_number: u64,
    exhausted: bool,
    in_quote: bool,
    quote_run: usize,
    saw_quote: bool,
    field: Vec<u8>,
    fields: Vec<Option<String>>,
}

impl<R: io::Read> Reader<R> {
    /// Create a reader with the default configuration.
    pub fn from_reader(rdr: R) -> Reader<R> {
        ReaderBuilder::new().build(rdr)
    }
}

impl Reader<io::Cursor<Vec<u8>>> {
    /// Create a reader over an in-memory string.
    pub fn from_string<S: Into<String>>(s: S) -> Reader<io::Cursor<Vec<u8>>> {
        Reader::from_reader(io::Cursor::new(s.into().into_bytes()))
    }
}

impl<R: io::Read> Reader<R> {
    /// Read the next record into `rec`, replacing its contents.
    ///
    /// Returns `false` once the source is exhausted and every record has
    /// been returned.
    pub fn read_record(&mut self, rec: &mut Record) -> Result<bool> {
        self.read_one(0, rec)
    }

    /// Read the next record after first discarding `skip_lines` whole lines
    /// and then `skip_records` whole records. The last record read lands in
    /// `rec`.
    pub fn read_record_skip(
        &mut self,
        skip_lines: usize,
        skip_records: usize,
        rec: &mut Record,
    ) -> Result<bool> {
        let mut more = self.read_one(skip_lines, rec)?;
        for _ in 0..skip_records {
            more = self.read_one(0, rec)?;
        }
        Ok(more)
    }

    /// An iterator over owned record snapshots.
    pub fn records(&mut self) -> Records<R> {
        Records { rdr: self, errored: false }
    }

    /// True once the underlying source has been exhausted.
    pub fn is_done(&self) -> bool {
        self.exhausted
    }

    /// The number of records completed so far.
    pub fn records_read(&self) -> u64 {
        self.record_number
    }

    fn read_one(&mut self, skip_lines: usize, rec: &mut Record) -> Result<bool> {
        let res = self.tokenize_record(skip_lines);
        let out = match res {
            Ok(true) => {
                mem::swap(rec.fields_mut(), &mut self.fields);
                rec.set_number(self.record_number);
                rec.set_codec(self.codec.clone());
                self.record_number += 1;
                Ok(true)
            }
            other => other,
        };
        self.reset_buffers();
        out
    }

    /// The tokenizer state machine. Consumes exactly one record's worth of
    /// characters (plus any skipped lines) and leaves the parsed fields in
    /// `self.fields`.
    fn tokenize_record(&mut self, skip_lines: usize) -> Result<bool> {
        for _ in 0..skip_lines {
            self.skip_line()?;
        }
        if self.exhausted {
            return Ok(false);
        }
        let mut nread: u64 = 0;
        loop {
            if nread > self.max_record_size {
                return Err(Error::RecordTooLong {
                    record: self.record_number,
                    limit: self.max_record_size,
                });
            }
            let b = match self.next_byte()? {
                Some(b) => b,
                None => {
                    self.exhausted = true;
                    if self.in_quote {
                        self.close_quote_at_eof(nread)?;
                    } else if nread == 0
                        && self.fields.is_empty()
                        && self.field.is_empty()
                        && !self.saw_quote
                        && self.record_number > 0
                    {
                        // Nothing consumed after a trailing terminator; the
                        // previous record was the last one.
                        return Ok(false);
                    }
                    self.end_field()?;
                    return Ok(true);
                }
            };
            nread += 1;
            if self.in_quote {
                if b == self.quote {
                    self.quote_run += 1;
                } else if b == self.delimiter || b == b'\n' {
                    if self.quote_run == 0 {
                        // Separators and line feeds are content inside an
                        // open quote.
                        self.field.push(b);
                    } else if self.resolve_quote_run() {
                        self.end_field()?;
                        if b == b'\n' {
                            return Ok(true);
                        }
                    } else {
                        self.field.push(b);
                    }
                } else if b == b'\r' && self.quote_run > 0 {
                    // CR between a closing quote run and its line feed.
                } else {
                    self.flush_quote_run();
                    self.field.push(b);
                }
            } else if self.comments_enabled
                && b == self.comment
                && self.field.is_empty()
            {
                self.skip_line()?;
            } else if b == self.delimiter {
                self.end_field()?;
            } else if b == b'\r' {
                // always dropped
            } else if b == b'\n' {
                self.end_field()?;
                return Ok(true);
            } else if b == self.quote {
                self.in_quote = true;
                self.saw_quote = true;
                self.quote_run = 1;
            } else {
                self.field.push(b);
            }
        }
    }

    /// Decide whether a pending quote run closes the field at a separator
    /// or line feed, flattening the run into literal quotes either way.
    ///
    /// At the very start of a field an even run closes it (the opening and
    /// terminating quotes bracket zero or more doubled pairs); mid-field an
    /// odd run closes it (the final quote is the terminator). The pairs
    /// that are neither opener nor terminator each collapse to one literal
    /// quote character.
    fn resolve_quote_run(&mut self) -> bool {
        let at_start = self.field.is_empty();
        let closes = if at_start {
            self.quote_run % 2 == 0
        } else {
            self.quote_run % 2 == 1
        };
        let literal = match (at_start, closes) {
            (true, true) => (self.quote_run - 2) / 2,
            (true, false) => (self.quote_run - 1) / 2,
            (false, true) => (self.quote_run - 1) / 2,
            (false, false) => self.quote_run / 2,
        };
        self.push_quotes(literal);
        self.quote_run = 0;
        if closes {
            self.in_quote = false;
        }
        closes
    }

    /// An ordinary character after a pending quote run: the run is content,
    /// one literal quote per pair.
    fn flush_quote_run(&mut self) {
        if self.quote_run == 0 {
            return;
        }
        let literal = if self.field.is_empty() {
            (self.quote_run - 1) / 2
        } else {
            self.quote_run / 2
        };
        self.push_quotes(literal);
        self.quote_run = 0;
    }

    fn close_quote_at_eof(&mut self, nread: u64) -> Result<()> {
        if self.quote_run == 0 {
            return Err(Error::UnexpectedEof {
                record: self.record_number,
                read: nread,
            });
        }
        let at_start = self.field.is_empty();
        let closes = if at_start {
            self.quote_run % 2 == 0
        } else {
            self.quote_run % 2 == 1
        };
        if !closes {
            return Err(Error::InvalidRecord {
                record: self.record_number,
                msg: format!(
                    "run of {} quote characters cannot close the field at \
                     end of stream",
                    self.quote_run
                ),
            });
        }
        let literal = if at_start {
            (self.quote_run - 2) / 2
        } else {
            (self.quote_run - 1) / 2
        };
        self.push_quotes(literal);
        self.quote_run = 0;
        self.in_quote = false;
        Ok(())
    }

    /// Finalize the current field. A field that is empty and never saw a
    /// quote is null; anything else is a string, including the explicitly
    /// quoted empty string.
    fn end_field(&mut self) -> Result<()> {
        let value = if self.field.is_empty() && !self.saw_quote {
            None
        } else {
            match str::from_utf8(&self.field) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    return Err(Error::Utf8 {
                        record: self.record_number,
                        field: self.fields.len(),
                    });
                }
            }
        };
        self.fields.push(value);
        self.field.clear();
        self.saw_quote = false;
        Ok(())
    }

    fn push_quotes(&mut self, n: usize) {
        for _ in 0..n {
            self.field.push(self.quote);
        }
    }

    /// Clear both record buffers, shrinking any that grew past its trim
    /// threshold back to its baseline capacity. Runs after every record,
    /// successful or not.
    fn reset_buffers(&mut self) {
        if self.fields.capacity() > self.max_fields_capacity {
            self.fields = Vec::with_capacity(self.fields_capacity);
        } else {
            self.fields.clear();
        }
        if self.field.capacity() > self.max_field_capacity {
            self.field = Vec::with_capacity(self.field_capacity);
        } else {
            self.field.clear();
        }
        self.in_quote = false;
        self.quote_run = 0;
        self.saw_quote = false;
    }

    fn skip_line(&mut self) -> Result<()> {
        loop {
            match self.next_byte()? {
                None | Some(b'\n') => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.bufi >= self.buf_len {
            self.buf_len = self.rdr.read(&mut self.buf)?;
            self.bufi = 0;
            if self.buf_len == 0 {
                return Ok(None);
            }
        }
        let b = self.buf[self.bufi];
        self.bufi += 1;
        Ok(Some(b))
    }
}

/// An iterator over owned record snapshots.
///
/// Stops after the first error.
pub struct Records<'a, R: 'a> {
    rdr: &'a mut Reader<R>,
    errored: bool,
}

impl<'a, R: io::Read> Iterator for Records<'a, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        if self.errored {
            return None;
        }
        let mut rec = Record::with_codec(self.rdr.codec.clone());
        match self.rdr.read_record(&mut rec) {
            Ok(true) => Some(Ok(rec)),
            Ok(false) => None,
            Err(err) => {
                self.errored = true;
                Some(Err(err))
            }
        }
    }
}

/// A reader wrapped in a mutex, for multiple consumers pulling records off
/// one stream.
///
/// Each call locks for one whole record read and returns an owned snapshot,
/// so no caller can observe a partially read record and no record is handed
/// out twice.
pub struct SharedReader<R> {
    inner: Arc<Mutex<Reader<R>>>,
}

impl<R> Clone for SharedReader<R> {
    fn clone(&self) -> SharedReader<R> {
        SharedReader { inner: self.inner.clone() }
    }
}

impl<R: io::Read> SharedReader<R> {
    /// Wrap a reader for shared use.
    pub fn new(rdr: Reader<R>) -> SharedReader<R> {
        SharedReader { inner: Arc::new(Mutex::new(rdr)) }
    }

    /// Read the next record under the lock, as an owned snapshot.
    pub fn read_next(&self) -> Result<Option<Record>> {
        let mut rdr = self.lock();
        let mut rec = Record::with_codec(rdr.codec.clone());
        if rdr.read_record(&mut rec)? {
            Ok(Some(rec))
        } else {
            Ok(None)
        }
    }

    /// True once the underlying source has been exhausted.
    pub fn is_done(&self) -> bool {
        self.lock().is_done()
    }

    fn lock(&self) -> MutexGuard<Reader<R>> {
        // The reader's buffers are reset after every record, so a reader
        // recovered from a panicked holder starts the next record clean.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
