/*!
A streaming CSV reader and writer with typed field access.

The reader tokenizes one record at a time with constant memory. Quoting
follows the doubled-quote convention: a quote character inside a quoted
field is written twice, and on the way back in a run of consecutive quote
characters is disambiguated by its parity and position. Fields are nullable;
an unquoted empty field reads back as `None` while an explicitly quoted
empty string reads back as `Some("")`.

Typed conversions (integers, floats, booleans, epoch-millisecond
timestamps, base64 byte arrays) are delegated to a [`Codec`], with
[`StdCodec`] as the default.

# Reading

```
use csvstream::{Reader, Record};

# fn run() -> csvstream::Result<()> {
let mut rdr = Reader::from_string("tom,33,t\nbob,,f\n");
let mut rec = Record::new();
while rdr.read_record(&mut rec)? {
    let name = rec.read_str(0)?;
    let age = rec.read_i32_opt(1)?;
    let active = rec.read_bool_or(2, false)?;
    println!("{} {:?} {}", name, age, active);
}
# Ok(()) }
# run().unwrap();
```

# Writing

```
use csvstream::Writer;

# fn run() -> csvstream::Result<()> {
let mut wtr = Writer::from_memory();
wtr.begin_record();
wtr.write_field("tom")?;
wtr.write_field(33)?;
wtr.write_field(true)?;
wtr.end_record()?;
assert_eq!(wtr.into_string(), "tom,33,t\n");
# Ok(()) }
# run().unwrap();
```
*/

#![deny(missing_docs)]

pub use crate::codec::{Codec, CodecError, StdCodec};
pub use crate::error::{ConvertError, Error, Result};
pub use crate::reader::{Reader, ReaderBuilder, Records, SharedReader};
pub use crate::record::Record;
pub use crate::writer::{Field, SharedWriter, Writer, WriterBuilder};

mod codec;
mod error;
mod reader;
mod record;
mod writer;

/// Reject configurations whose special characters cannot be told apart.
pub(crate) fn validate_config(
    delimiter: u8,
    quote: u8,
    comment: u8,
) -> Result<()> {
    if delimiter == quote {
        return Err(Error::Usage(
            "the field separator and quote character must differ".to_string(),
        ));
    }
    if comment == delimiter || comment == quote {
        return Err(Error::Usage(
            "the comment character must differ from the field separator and \
             quote character"
                .to_string(),
        ));
    }
    Ok(())
}
