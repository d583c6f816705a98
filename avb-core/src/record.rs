//! Tagged extensible record protocol
//!
//! Every record body follows the same shape:
//!
//! ```text
//! 0x02 <version>  fixed fields ...  (0x01 <tag_id> <guard> <value>)*  0x03
//! ```
//!
//! The extension loop peeks one byte at a time; anything other than `0x01`
//! is pushed back and ends the loop. Unknown extension ids are fatal.

use crate::codec::{ChunkReader, ChunkWriter};
use crate::object::{AvbObject, Value};
use crate::{Error, Result};
use std::io::SeekFrom;

/// Literal bytes of the record protocol.
pub mod tag {
    /// Introduces an extension block.
    pub const EXT: u8 = 0x01;
    /// Opens a record.
    pub const BEGIN: u8 = 0x02;
    /// Closes a record.
    pub const END: u8 = 0x03;

    pub const BYTES: u8 = 65;
    pub const BOOL: u8 = 66;
    pub const BYTE: u8 = 68;
    pub const SHORT: u8 = 69;
    pub const USHORT: u8 = 70;
    pub const INT: u8 = 71;
    pub const UINT: u8 = 72;
    pub const STRING: u8 = 76;
    pub const RAW_UUID: u8 = 80;
}

impl ChunkReader<'_> {
    /// Reads `0x02 <version>`, failing on any other version.
    pub fn read_record_header(&mut self, version: u8) -> Result<()> {
        self.read_assert_tag(tag::BEGIN)?;
        self.read_assert_tag(version)
    }

    /// Reads `0x02 <version>` where several revisions are understood.
    pub fn read_record_header_any(&mut self, versions: &[u8]) -> Result<u8> {
        self.read_assert_tag(tag::BEGIN)?;
        let offset = self.position()?;
        let version = self.read_u8()?;
        if !versions.contains(&version) {
            return Err(Error::UnexpectedGuardTag {
                offset,
                expected: versions.first().copied().unwrap_or_default(),
                found: version,
            });
        }
        Ok(version)
    }

    pub fn read_end(&mut self) -> Result<()> {
        self.read_assert_tag(tag::END)
    }

    /// Next extension tag id, or `None` once the loop is over.
    ///
    /// Consumes nothing unless the next byte is `0x01`.
    pub fn next_extension(&mut self) -> Result<Option<u8>> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        if self.read_u8()? != tag::EXT {
            self.seek(SeekFrom::Current(-1))?;
            return Ok(None);
        }
        Ok(Some(self.read_u8()?))
    }
}

impl ChunkWriter<'_> {
    pub fn write_record_header(&mut self, version: u8) -> Result<()> {
        self.write_u8(tag::BEGIN)?;
        self.write_u8(version)
    }

    pub fn write_end(&mut self) -> Result<()> {
        self.write_u8(tag::END)
    }
}

/// Narrows a collection length to the width of its count field.
pub fn wire_count<T: TryFrom<usize>>(class: &'static str, name: &'static str, count: usize) -> Result<T> {
    T::try_from(count).map_err(|_| Error::TooManyEntries { class, name, count })
}

/// Wire shape of a single guarded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Ref,
    String,
    RawUuid,
    /// Carries its own leading guard.
    MobId,
    /// Unix timestamp behind an `INT` guard.
    Date,
}

impl Field {
    pub fn guard(self) -> Option<u8> {
        match self {
            Field::Bool => Some(tag::BOOL),
            Field::Byte => Some(tag::BYTE),
            Field::Int16 => Some(tag::SHORT),
            Field::UInt16 => Some(tag::USHORT),
            Field::Int32 | Field::Date => Some(tag::INT),
            Field::UInt32 | Field::Ref => Some(tag::UINT),
            Field::String => Some(tag::STRING),
            Field::RawUuid => Some(tag::RAW_UUID),
            Field::MobId => None,
        }
    }
}

/// Reads `<guard> <value>` into property `name`.
pub fn read_guarded(
    r: &mut ChunkReader<'_>,
    obj: &mut AvbObject,
    name: &str,
    field: Field,
) -> Result<()> {
    if let Some(guard) = field.guard() {
        r.read_assert_tag(guard)?;
    }
    let value = match field {
        Field::Bool => Value::Bool(r.read_bool()?),
        Field::Byte => Value::Int(r.read_u8()? as i64),
        Field::Int16 => Value::Int(r.read_i16()? as i64),
        Field::UInt16 => Value::Int(r.read_u16()? as i64),
        Field::Int32 => Value::Int(r.read_i32()? as i64),
        Field::UInt32 => Value::Int(r.read_u32()? as i64),
        Field::Ref => Value::Ref(r.read_ref()?),
        Field::String => r.read_string_value()?,
        Field::RawUuid => Value::Uuid(r.read_raw_uuid()?),
        Field::MobId => Value::MobId(r.read_mob_id()?),
        Field::Date => Value::DateTime(r.read_datetime()?),
    };
    obj.set(name, value)
}

/// Writes `<guard> <value>` from property `name`, which must be present.
pub fn write_guarded(
    w: &mut ChunkWriter<'_>,
    obj: &AvbObject,
    name: &str,
    field: Field,
) -> Result<()> {
    if let Some(guard) = field.guard() {
        w.write_u8(guard)?;
    }
    match field {
        Field::Bool => w.write_bool(obj.get_bool(name)?),
        Field::Byte => w.write_u8(obj.get_int_as::<u8>(name)?),
        Field::Int16 => w.write_i16(obj.get_int_as::<i16>(name)?),
        Field::UInt16 => w.write_u16(obj.get_int_as::<u16>(name)?),
        Field::Int32 => w.write_i32(obj.get_int_as::<i32>(name)?),
        Field::UInt32 => w.write_u32(obj.get_int_as::<u32>(name)?),
        Field::Ref => w.write_ref(obj.get_ref(name)?),
        Field::String => w.write_string_value(obj.get(name)?),
        Field::RawUuid => w.write_raw_uuid(&obj.get_uuid(name)?),
        Field::MobId => w.write_mob_id(&obj.get_mob_id(name)?),
        Field::Date => w.write_datetime(&obj.get_datetime(name)?),
    }
}

/// Writes `0x01 <tag_id> <guard> <value>` when `name` is present; absent fields are omitted.
pub fn write_extension(
    w: &mut ChunkWriter<'_>,
    obj: &AvbObject,
    tag_id: u8,
    name: &str,
    field: Field,
) -> Result<()> {
    if !obj.has(name) {
        return Ok(());
    }
    w.write_u8(tag::EXT)?;
    w.write_u8(tag_id)?;
    write_guarded(w, obj, name, field)
}

pub fn unknown_extension(class: &'static str, tag: u8) -> Error {
    Error::UnknownExtensionTag { class, tag }
}
