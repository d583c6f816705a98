//! Byte-order-bound primitive reader and writer
//!
//! A [`Reader`] or [`Writer`] is bound to one [`ByteOrder`] for its whole
//! session. Every `read_*` has a `write_*` counterpart that reproduces the
//! bytes it consumed.

use crate::object::Value;
use crate::record::tag;
use crate::text::TextEncoding;
use crate::types::{FourCC, MobId, Rect, RgbColor};
use crate::{exp10, text, Error, ObjectRef, Rational, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use uuid::Uuid;

/// Session byte order, signalled by the two-byte platform marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Platform marker written at the start of a file.
    pub fn marker(self) -> [u8; 2] {
        match self {
            ByteOrder::Little => [0x06, 0x00],
            ByteOrder::Big => [0x00, 0x06],
        }
    }

    pub fn from_marker(marker: [u8; 2]) -> Option<Self> {
        match marker {
            [0x06, 0x00] => Some(ByteOrder::Little),
            [0x00, 0x06] => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

/// Session object id to write-time chunk index.
pub type ChunkMapping = HashMap<u32, u32>;

/// Reader over one isolated chunk body.
pub type ChunkReader<'a> = Reader<Cursor<&'a [u8]>>;

/// Writer producing one chunk body.
pub type ChunkWriter<'a> = Writer<'a, Vec<u8>>;

macro_rules! read_ordered {
    ($name:ident, $t:ty, $method:ident) => {
        pub fn $name(&mut self) -> Result<$t> {
            let offset = self.position()?;
            let value = match self.order {
                ByteOrder::Little => self.inner.$method::<LittleEndian>(),
                ByteOrder::Big => self.inner.$method::<BigEndian>(),
            };
            value.map_err(|_| Error::TruncatedRead {
                offset,
                need: std::mem::size_of::<$t>(),
            })
        }
    };
}

macro_rules! write_ordered {
    ($name:ident, $t:ty, $method:ident) => {
        pub fn $name(&mut self, value: $t) -> Result<()> {
            match self.order {
                ByteOrder::Little => self.inner.$method::<LittleEndian>(value)?,
                ByteOrder::Big => self.inner.$method::<BigEndian>(value)?,
            }
            Ok(())
        }
    };
}

/// Primitive decoder bound to a byte order.
pub struct Reader<R> {
    inner: R,
    order: ByteOrder,
    ref_limit: Option<u32>,
}

impl<R: Read + Seek> Reader<R> {
    pub fn new(inner: R, order: ByteOrder) -> Self {
        Self {
            inner,
            order,
            ref_limit: None,
        }
    }

    /// Rejects decoded references at or beyond `limit`.
    pub fn with_ref_limit(mut self, limit: Option<u32>) -> Self {
        self.ref_limit = limit;
        self
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.inner.seek(pos)?)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let offset = self.position()?;
        self.inner
            .read_u8()
            .map_err(|_| Error::TruncatedRead { offset, need: 1 })
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? == 0x01)
    }

    read_ordered!(read_u16, u16, read_u16);
    read_ordered!(read_i16, i16, read_i16);
    read_ordered!(read_u32, u32, read_u32);
    read_ordered!(read_i32, i32, read_i32);
    read_ordered!(read_u64, u64, read_u64);
    read_ordered!(read_i64, i64, read_i64);
    read_ordered!(read_f64, f64, read_f64);

    /// Reads a `u32` that is little-endian regardless of the session order.
    pub fn read_u32_le(&mut self) -> Result<u32> {
        let offset = self.position()?;
        self.inner
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::TruncatedRead { offset, need: 4 })
    }

    /// Reads `len` bytes; the buffer grows with the data actually read.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let offset = self.position()?;
        let mut buf = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(Error::TruncatedRead { offset, need: len });
        }
        Ok(buf)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let offset = self.position()?;
        let mut buf = [0u8; N];
        self.inner
            .read_exact(&mut buf)
            .map_err(|_| Error::TruncatedRead { offset, need: N })?;
        Ok(buf)
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        let bytes = self.read_array::<4>()?;
        Ok(FourCC::from_disk(bytes, self.order))
    }

    /// Reads a length-prefixed string; `None` when the length is the `0xFFFF` sentinel.
    pub fn read_string(&mut self) -> Result<Option<String>> {
        Ok(self.read_text()?.map(|(s, _)| s))
    }

    /// Reads a length-prefixed string along with the encoding it was stored in.
    pub fn read_text(&mut self) -> Result<Option<(String, TextEncoding)>> {
        let len = self.read_u16()?;
        if len == 0xFFFF {
            return Ok(None);
        }
        let data = self.read_bytes(len as usize)?;
        Ok(Some((text::decode(&data), text::detect(&data))))
    }

    /// Reads a string property value, keeping the stored encoding.
    ///
    /// The absent sentinel yields [`Value::Null`]; UTF-8 payloads yield
    /// [`Value::Utf8String`] so they are written back with their lead-in.
    pub fn read_string_value(&mut self) -> Result<Value> {
        Ok(match self.read_text()? {
            None => Value::Null,
            Some((s, TextEncoding::MacRoman)) => Value::String(s),
            Some((s, TextEncoding::Utf8)) => Value::Utf8String(s),
        })
    }

    pub fn read_datetime(&mut self) -> Result<DateTime<Utc>> {
        let secs = self.read_u32()?;
        Utc.timestamp_opt(secs as i64, 0)
            .single()
            .ok_or_else(|| Error::MalformedHeader {
                field: "timestamp",
                detail: format!("{secs} is not a valid timestamp"),
            })
    }

    pub fn read_exp10(&mut self) -> Result<f64> {
        let mantissa = self.read_i32()?;
        let exponent = self.read_i16()?;
        Ok(exp10::decode(mantissa, exponent))
    }

    pub fn read_rational(&mut self) -> Result<Rational> {
        let num = self.read_i32()?;
        let den = self.read_i32()?;
        Ok(Rational::new(num, den))
    }

    /// 16-byte UUID; the first three fields follow the session byte order.
    pub fn read_raw_uuid(&mut self) -> Result<Uuid> {
        let d1 = self.read_u32()?;
        let d2 = self.read_u16()?;
        let d3 = self.read_u16()?;
        let d4 = self.read_array::<8>()?;
        Ok(Uuid::from_fields(d1, d2, d3, &d4))
    }

    /// UUID with a guard byte before each field.
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        self.read_assert_tag(tag::UINT)?;
        let d1 = self.read_u32()?;
        self.read_assert_tag(tag::USHORT)?;
        let d2 = self.read_u16()?;
        self.read_assert_tag(tag::USHORT)?;
        let d3 = self.read_u16()?;
        self.read_assert_tag(tag::BYTES)?;
        let len = self.read_u32()?;
        if len != 8 {
            return Err(Error::MalformedHeader {
                field: "uuid",
                detail: format!("node field length {len}, expected 8"),
            });
        }
        let d4 = self.read_array::<8>()?;
        Ok(Uuid::from_fields(d1, d2, d3, &d4))
    }

    pub fn read_mob_id(&mut self) -> Result<MobId> {
        self.read_assert_tag(tag::BYTES)?;
        let len = self.read_u32()?;
        if len != 12 {
            return Err(Error::MalformedHeader {
                field: "mob_id",
                detail: format!("label length {len}, expected 12"),
            });
        }
        let label = self.read_array::<12>()?;
        self.read_assert_tag(tag::BYTE)?;
        let length = self.read_u8()?;
        self.read_assert_tag(tag::BYTE)?;
        let instance_high = self.read_u8()?;
        self.read_assert_tag(tag::BYTE)?;
        let instance_mid = self.read_u8()?;
        self.read_assert_tag(tag::BYTE)?;
        let instance_low = self.read_u8()?;
        let material = self.read_uuid()?;

        Ok(MobId {
            label,
            length,
            instance_high,
            instance_mid,
            instance_low,
            material,
        })
    }

    pub fn read_rect(&mut self) -> Result<Rect> {
        self.read_version_word("rect")?;
        Ok(Rect {
            top: self.read_i16()?,
            left: self.read_i16()?,
            bottom: self.read_i16()?,
            right: self.read_i16()?,
        })
    }

    pub fn read_rgb_color(&mut self) -> Result<RgbColor> {
        self.read_version_word("rgb_color")?;
        Ok(RgbColor {
            red: self.read_u16()?,
            green: self.read_u16()?,
            blue: self.read_u16()?,
        })
    }

    fn read_version_word(&mut self, field: &'static str) -> Result<()> {
        let version = self.read_i16()?;
        if version != 1 {
            return Err(Error::MalformedHeader {
                field,
                detail: format!("version {version}, expected 1"),
            });
        }
        Ok(())
    }

    /// Reads an object reference, checked against the table length when bound.
    pub fn read_ref(&mut self) -> Result<ObjectRef> {
        let index = self.read_u32()?;
        if let Some(len) = self.ref_limit {
            if index >= len {
                return Err(Error::InvalidReferenceIndex { index, len });
            }
        }
        Ok(ObjectRef::new(index))
    }

    /// Consumes one byte and fails unless it equals `expected`.
    pub fn read_assert_tag(&mut self, expected: u8) -> Result<()> {
        let offset = self.position()?;
        let found = self.read_u8()?;
        if found != expected {
            return Err(Error::UnexpectedGuardTag {
                offset,
                expected,
                found,
            });
        }
        Ok(())
    }
}

impl<'a> Reader<Cursor<&'a [u8]>> {
    /// Reader over an isolated chunk body.
    pub fn from_slice(data: &'a [u8], order: ByteOrder) -> Self {
        Self::new(Cursor::new(data), order)
    }

    pub fn remaining(&self) -> usize {
        let len = self.inner.get_ref().len() as u64;
        len.saturating_sub(self.inner.position()) as usize
    }

    /// Preallocation for `count` entries of at least one byte each.
    ///
    /// Counts come from the body itself, so they are bounded by what is left.
    pub fn capacity_for(&self, count: usize) -> usize {
        count.min(self.remaining())
    }

    /// Asserts the body was consumed exactly.
    pub fn finish(&self, class: &'static str) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(Error::TrailingBytes { class, remaining }),
        }
    }
}

/// Primitive encoder bound to a byte order.
///
/// When built with a [`ChunkMapping`], references are rewritten to their
/// write-time indices.
pub struct Writer<'a, W> {
    inner: W,
    order: ByteOrder,
    refs: Option<&'a ChunkMapping>,
}

impl<'a, W: Write> Writer<'a, W> {
    pub fn new(inner: W, order: ByteOrder) -> Self {
        Self {
            inner,
            order,
            refs: None,
        }
    }

    pub fn with_mapping(mut self, refs: &'a ChunkMapping) -> Self {
        self.refs = Some(refs);
        self
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.inner.write_u8(value)?;
        Ok(())
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    write_ordered!(write_u16, u16, write_u16);
    write_ordered!(write_i16, i16, write_i16);
    write_ordered!(write_u32, u32, write_u32);
    write_ordered!(write_i32, i32, write_i32);
    write_ordered!(write_u64, u64, write_u64);
    write_ordered!(write_i64, i64, write_i64);
    write_ordered!(write_f64, f64, write_f64);

    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.inner.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        Ok(())
    }

    pub fn write_fourcc(&mut self, code: FourCC) -> Result<()> {
        self.write_bytes(&code.to_disk(self.order))
    }

    /// Writes a length-prefixed string; `None` emits the `0xFFFF` sentinel.
    pub fn write_string(&mut self, value: Option<&str>) -> Result<()> {
        self.write_text(value, TextEncoding::MacRoman)
    }

    /// Writes a length-prefixed string in `encoding`.
    ///
    /// MacRoman falls back to UTF-8 for characters it cannot represent.
    pub fn write_text(&mut self, value: Option<&str>, encoding: TextEncoding) -> Result<()> {
        match value {
            None => self.write_u16(0xFFFF),
            Some(s) => {
                let data = text::encode_as(s, encoding)?;
                self.write_u16(data.len() as u16)?;
                self.write_bytes(&data)
            }
        }
    }

    /// Writes a string property value read by [`Reader::read_string_value`].
    pub fn write_string_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.write_text(None, TextEncoding::MacRoman),
            Value::String(s) => self.write_text(Some(s.as_str()), TextEncoding::MacRoman),
            Value::Utf8String(s) => self.write_text(Some(s.as_str()), TextEncoding::Utf8),
            other => Err(Error::UnsupportedTextValue(format!(
                "{other:?} is not a string"
            ))),
        }
    }

    pub fn write_datetime(&mut self, value: &DateTime<Utc>) -> Result<()> {
        let secs = u32::try_from(value.timestamp()).map_err(|_| Error::MalformedHeader {
            field: "timestamp",
            detail: format!("{value} is outside the 32-bit range"),
        })?;
        self.write_u32(secs)
    }

    pub fn write_exp10(&mut self, value: f64) -> Result<()> {
        let (mantissa, exponent) = exp10::encode(value)?;
        self.write_i32(mantissa)?;
        self.write_i16(exponent)
    }

    pub fn write_rational(&mut self, value: Rational) -> Result<()> {
        self.write_i32(value.num)?;
        self.write_i32(value.den)
    }

    pub fn write_raw_uuid(&mut self, value: &Uuid) -> Result<()> {
        let (d1, d2, d3, d4) = value.as_fields();
        self.write_u32(d1)?;
        self.write_u16(d2)?;
        self.write_u16(d3)?;
        self.write_bytes(d4)
    }

    pub fn write_uuid(&mut self, value: &Uuid) -> Result<()> {
        let (d1, d2, d3, d4) = value.as_fields();
        self.write_u8(tag::UINT)?;
        self.write_u32(d1)?;
        self.write_u8(tag::USHORT)?;
        self.write_u16(d2)?;
        self.write_u8(tag::USHORT)?;
        self.write_u16(d3)?;
        self.write_u8(tag::BYTES)?;
        self.write_u32(8)?;
        self.write_bytes(d4)
    }

    pub fn write_mob_id(&mut self, value: &MobId) -> Result<()> {
        self.write_u8(tag::BYTES)?;
        self.write_u32(12)?;
        self.write_bytes(&value.label)?;
        for byte in [
            value.length,
            value.instance_high,
            value.instance_mid,
            value.instance_low,
        ] {
            self.write_u8(tag::BYTE)?;
            self.write_u8(byte)?;
        }
        self.write_uuid(&value.material)
    }

    pub fn write_rect(&mut self, value: &Rect) -> Result<()> {
        self.write_i16(1)?;
        self.write_i16(value.top)?;
        self.write_i16(value.left)?;
        self.write_i16(value.bottom)?;
        self.write_i16(value.right)
    }

    pub fn write_rgb_color(&mut self, value: &RgbColor) -> Result<()> {
        self.write_i16(1)?;
        self.write_u16(value.red)?;
        self.write_u16(value.green)?;
        self.write_u16(value.blue)
    }

    /// Writes a reference, translated through the chunk mapping when one is bound.
    pub fn write_ref(&mut self, value: ObjectRef) -> Result<()> {
        if value.is_null() {
            return self.write_u32(0);
        }
        let index = match self.refs {
            Some(mapping) => *mapping
                .get(&value.index())
                .ok_or(Error::ReferenceNotYetWritten(value.index()))?,
            None => value.index(),
        };
        self.write_u32(index)
    }
}

impl Writer<'_, Vec<u8>> {
    pub fn position(&self) -> usize {
        self.inner.len()
    }
}
