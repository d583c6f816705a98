//! Typed name/value dictionaries

use crate::codec::{ChunkReader, ChunkWriter};
use crate::object::{AvbObject, Value};
use crate::property::{DefaultValue as D, PropertyDef as P, PropertyType as T};
use crate::record::wire_count;
use crate::registry::ClassDef;
use crate::types::FourCC;
use crate::{Error, Result};

const INT_ATTR: u32 = 1;
const STR_ATTR: u32 = 2;
const OBJ_ATTR: u32 = 3;
const BOB_ATTR: u32 = 4;

/// Entries are kept in the `entries` map; each value's variant selects its wire type.
pub static ATTRIBUTES: ClassDef = ClassDef {
    name: "Attributes",
    class_id: Some(FourCC::new(b"ATTR")),
    parent: None,
    properties: &[P::new("entries", "__OMFI:ATTR:Entries", T::Composite).with_default(D::EmptyMap)],
    read: Some(read_attributes),
    write: Some(write_attributes),
    init: None,
    deferred_refs: &[],
};

fn read_attributes(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    r.read_record_header(0x01)?;

    let count = r.read_u32()?;
    let mut entries = Vec::with_capacity(r.capacity_for(count as usize));
    for _ in 0..count {
        let kind = r.read_u32()?;
        let name = r.read_string()?.unwrap_or_default();
        let value = match kind {
            INT_ATTR => Value::Int(r.read_i32()? as i64),
            STR_ATTR => r.read_string_value()?,
            OBJ_ATTR => Value::Ref(r.read_ref()?),
            BOB_ATTR => {
                let size = r.read_u32()? as usize;
                Value::Bytes(r.read_bytes(size)?)
            }
            other => {
                return Err(Error::UnknownValueType {
                    class: ATTRIBUTES.name,
                    value_type: other as i64,
                })
            }
        };
        entries.push((name, value));
    }
    obj.set("entries", Value::Map(entries))?;

    r.read_end()
}

fn write_attributes(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    w.write_record_header(0x01)?;

    let entries = obj.get_map("entries")?;
    w.write_u32(wire_count(ATTRIBUTES.name, "entries", entries.len())?)?;
    for (name, value) in entries {
        match value {
            Value::Int(v) => {
                w.write_u32(INT_ATTR)?;
                w.write_string(Some(name))?;
                let v = i32::try_from(*v).map_err(|_| Error::PropertyTypeMismatch {
                    class: ATTRIBUTES.name,
                    name: name.clone(),
                    expected: T::Int32,
                })?;
                w.write_i32(v)?;
            }
            Value::String(_) | Value::Utf8String(_) | Value::Null => {
                w.write_u32(STR_ATTR)?;
                w.write_string(Some(name))?;
                w.write_string_value(value)?;
            }
            Value::Ref(r) => {
                w.write_u32(OBJ_ATTR)?;
                w.write_string(Some(name))?;
                w.write_ref(*r)?;
            }
            Value::Bytes(data) => {
                w.write_u32(BOB_ATTR)?;
                w.write_string(Some(name))?;
                w.write_u32(wire_count(ATTRIBUTES.name, "entries", data.len())?)?;
                w.write_bytes(data)?;
            }
            _ => {
                return Err(Error::PropertyTypeMismatch {
                    class: ATTRIBUTES.name,
                    name: name.clone(),
                    expected: T::Variant,
                })
            }
        }
    }

    w.write_end()
}

/// Looks up one entry.
pub fn get<'a>(attrs: &'a AvbObject, key: &str) -> Option<&'a Value> {
    attrs.get_opt("entries")?.entry(key)
}

/// Inserts or replaces one entry, keeping the original position of an existing key.
pub fn insert(attrs: &mut AvbObject, key: &str, value: impl Into<Value>) -> Result<()> {
    let value = value.into();
    if !matches!(
        value,
        Value::Int(_)
            | Value::String(_)
            | Value::Utf8String(_)
            | Value::Null
            | Value::Ref(_)
            | Value::Bytes(_)
    ) {
        return Err(Error::PropertyTypeMismatch {
            class: ATTRIBUTES.name,
            name: key.to_string(),
            expected: T::Variant,
        });
    }
    match attrs.get_mut("entries")? {
        Value::Map(entries) => {
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, slot)) => *slot = value,
                None => entries.push((key.to_string(), value)),
            }
            Ok(())
        }
        _ => Err(Error::PropertyTypeMismatch {
            class: ATTRIBUTES.name,
            name: "entries".to_string(),
            expected: T::Composite,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ByteOrder;
    use crate::ObjectRef;

    #[test]
    fn test_typed_entries_roundtrip() {
        let mut attrs = AvbObject::with_defaults(&ATTRIBUTES);
        insert(&mut attrs, "_COLOR_R", 65535).unwrap();
        insert(&mut attrs, "Comments", "locked picture").unwrap();
        insert(&mut attrs, "_USER", Value::Null).unwrap();
        insert(&mut attrs, "_ATN_CRM_REF", ObjectRef::new(2)).unwrap();
        insert(&mut attrs, "_BLOB", vec![1u8, 2, 3]).unwrap();
        insert(&mut attrs, "_COLOR_R", 0).unwrap();

        for order in [ByteOrder::Little, ByteOrder::Big] {
            let data = ATTRIBUTES.encode(&attrs, order, None).unwrap();
            let decoded = ATTRIBUTES.decode(&data, order, None).unwrap();
            assert_eq!(decoded, attrs);
            assert_eq!(get(&decoded, "_COLOR_R"), Some(&Value::Int(0)));
            assert_eq!(decoded.get_map("entries").unwrap()[0].0, "_COLOR_R");
            assert_eq!(get(&decoded, "_USER"), Some(&Value::Null));
        }
    }

    #[test]
    fn test_unsupported_entry_type() {
        let mut attrs = AvbObject::with_defaults(&ATTRIBUTES);
        assert!(insert(&mut attrs, "rate", 1.5).is_err());
    }

    #[test]
    fn test_int_entry_wider_than_wire() {
        let mut attrs = AvbObject::with_defaults(&ATTRIBUTES);
        insert(&mut attrs, "_TICKS", Value::Int(1 << 40)).unwrap();
        match ATTRIBUTES.encode(&attrs, ByteOrder::Little, None) {
            Err(Error::PropertyTypeMismatch { name, expected, .. }) => {
                assert_eq!(name, "_TICKS");
                assert_eq!(expected, T::Int32);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_huge_entry_count_is_truncated_read() {
        let data = [0x02, 0x01, 0xff, 0xff, 0xff, 0xff, 1, 0, 0, 0];
        assert!(matches!(
            ATTRIBUTES.decode(&data, ByteOrder::Little, None),
            Err(Error::TruncatedRead { .. })
        ));
    }

    #[test]
    fn test_unknown_wire_type() {
        let data = [0x02, 0x01, 1, 0, 0, 0, 9, 0, 0, 0, 1, 0, b'x', 0x03];
        assert!(matches!(
            ATTRIBUTES.decode(&data, ByteOrder::Little, None),
            Err(Error::UnknownValueType { value_type: 9, .. })
        ));
    }
}
