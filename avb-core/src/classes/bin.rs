//! Bin content, its items and view settings

use crate::codec::{ChunkReader, ChunkWriter};
use crate::file::AvbFile;
use crate::object::{AvbObject, SharedObject, Value};
use crate::property::{DefaultValue as D, PropertyDef as P, PropertyType as T};
use crate::record::{tag, unknown_extension, wire_count};
use crate::registry::ClassDef;
use crate::types::{FourCC, Rect, RgbColor};
use crate::{Error, ObjectRef, Result};

/// Number of sift slots every bin carries.
pub const SIFT_SLOTS: usize = 6;

/// Title given to a new bin's view setting.
pub const DEFAULT_VIEW_NAME: &str = "Untitled";

pub static SETTING: ClassDef = ClassDef {
    name: "Setting",
    class_id: None,
    parent: None,
    properties: &[
        P::new("name", "name", T::String).with_default(D::Str(DEFAULT_VIEW_NAME)),
        P::new("kind", "kind", T::String).with_default(D::Str("Bin View")),
        P::new("attr_count", "attributes", T::Int16).with_default(D::Int(0)),
        P::new("attr_type", "type", T::Int16).with_default(D::Int(0)),
        P::new("attributes", "attrList", T::Reference).with_default(D::NullRef),
    ],
    read: None,
    write: None,
    init: None,
    deferred_refs: &[],
};

fn read_setting(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    r.read_record_header(0x06)?;
    obj.set("name", r.read_string_value()?)?;
    obj.set("kind", r.read_string_value()?)?;
    obj.set("attr_count", r.read_i16()?)?;
    obj.set("attr_type", r.read_i16()?)?;
    obj.set("attributes", r.read_ref()?)
}

fn write_setting(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    w.write_record_header(0x06)?;
    w.write_string_value(obj.get("name")?)?;
    w.write_string_value(obj.get("kind")?)?;
    w.write_i16(obj.get_int_as::<i16>("attr_count")?)?;
    w.write_i16(obj.get_int_as::<i16>("attr_type")?)?;
    w.write_ref(obj.get_ref("attributes")?)
}

/// Column layout of a bin window.
///
/// Each column is a map of `title`, `format`, `type` and `hidden`. The
/// optional format descriptor extension carries the free-column ids and a
/// UTF-8 descriptor blob.
pub static BIN_VIEW_SETTING: ClassDef = ClassDef {
    name: "BinViewSetting",
    class_id: Some(FourCC::new(b"BVst")),
    parent: Some(&SETTING),
    properties: &[
        P::new("columns", "Columns", T::List).with_default(D::EmptyList),
        P::new("free_columns", "VCIDFreeColumns", T::List),
        P::new("format_descriptor", "FormatDescriptor", T::String),
    ],
    read: Some(read_bin_view_setting),
    write: Some(write_bin_view_setting),
    init: None,
    deferred_refs: &[],
};

fn column_field<'a>(column: &'a Value, key: &str) -> Result<&'a Value> {
    column.entry(key).ok_or_else(|| Error::AttributeNotFound {
        class: BIN_VIEW_SETTING.name,
        name: format!("columns.{key}"),
    })
}

fn entry_mismatch(class: &'static str, name: &str, expected: T) -> Error {
    Error::PropertyTypeMismatch {
        class,
        name: name.to_string(),
        expected,
    }
}

/// Integer map entry narrowed to its wire width.
fn int_entry<N: TryFrom<i64>>(class: &'static str, value: &Value, name: &str, expected: T) -> Result<N> {
    value
        .as_int_of()
        .ok_or_else(|| entry_mismatch(class, name, expected))
}

fn read_bin_view_setting(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_setting(r, obj)?;
    r.read_record_header(0x0a)?;

    let count = r.read_u16()?;
    let mut columns = Vec::with_capacity(r.capacity_for(count as usize));
    for _ in 0..count {
        columns.push(Value::Map(vec![
            ("title".to_string(), r.read_string_value()?),
            ("format".to_string(), Value::from(r.read_i16()?)),
            ("type".to_string(), Value::from(r.read_i16()?)),
            ("hidden".to_string(), Value::from(r.read_bool()?)),
        ]));
    }
    obj.set("columns", columns)?;

    while let Some(ext) = r.next_extension()? {
        match ext {
            0x01 => {
                r.read_assert_tag(tag::SHORT)?;
                let free = r.read_i16()?.max(0);
                let mut ids = Vec::with_capacity(r.capacity_for(free as usize));
                for _ in 0..free {
                    r.read_assert_tag(tag::SHORT)?;
                    ids.push(Value::from(r.read_i16()?));
                }
                obj.set("free_columns", ids)?;

                r.read_assert_tag(tag::INT)?;
                let size = r.read_i32()?.max(0) as usize;
                // The string guard repeats the size instead of a u16 length.
                r.read_assert_tag(tag::STRING)?;
                r.read_i32()?;
                let descriptor = r.read_bytes(size)?;
                obj.set(
                    "format_descriptor",
                    String::from_utf8_lossy(&descriptor).into_owned(),
                )?;
            }
            other => return Err(unknown_extension(BIN_VIEW_SETTING.name, other)),
        }
    }
    r.read_end()
}

fn write_bin_view_setting(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_setting(w, obj)?;
    w.write_record_header(0x0a)?;

    let class = BIN_VIEW_SETTING.name;
    let columns = obj.get_list("columns")?;
    w.write_u16(wire_count(class, "columns", columns.len())?)?;
    for column in columns {
        w.write_string_value(column_field(column, "title")?)?;
        w.write_i16(int_entry(class, column_field(column, "format")?, "columns.format", T::Int16)?)?;
        w.write_i16(int_entry(class, column_field(column, "type")?, "columns.type", T::Int16)?)?;
        let hidden = column_field(column, "hidden")?
            .as_bool()
            .ok_or_else(|| entry_mismatch(class, "columns.hidden", T::Bool))?;
        w.write_bool(hidden)?;
    }

    // Free-column ids and the descriptor share one extension block.
    let descriptor = match obj.get_opt("format_descriptor") {
        Some(_) => obj.get_str_opt("format_descriptor")?,
        None => None,
    };
    let free = match obj.get_opt("free_columns") {
        Some(_) => Some(obj.get_list("free_columns")?),
        None => None,
    };
    match (descriptor, free) {
        (Some(descriptor), free) => {
            let free = free.unwrap_or(&[]);
            w.write_u8(tag::EXT)?;
            w.write_u8(0x01)?;
            w.write_u8(tag::SHORT)?;
            w.write_i16(wire_count(class, "free_columns", free.len())?)?;
            for id in free {
                w.write_u8(tag::SHORT)?;
                w.write_i16(int_entry(class, id, "free_columns", T::Int16)?)?;
            }
            let bytes = descriptor.as_bytes();
            let size = wire_count::<i32>(class, "format_descriptor", bytes.len())?;
            w.write_u8(tag::INT)?;
            w.write_i32(size)?;
            w.write_u8(tag::STRING)?;
            w.write_i32(size)?;
            w.write_bytes(bytes)?;
        }
        (None, Some(_)) => {
            return Err(Error::MissingDependentProperty {
                class,
                name: "free_columns",
                requires: "format_descriptor",
            })
        }
        (None, None) => {}
    }
    w.write_end()
}

/// One entry of a bin: a mob reference plus its placement in frame view.
pub static BIN_ITEM: ClassDef = ClassDef {
    name: "BinItem",
    class_id: None,
    parent: None,
    properties: &[
        P::new("mob", "Composition", T::Reference).with_default(D::NullRef),
        P::new("x", "Xpos", T::Int16).with_default(D::Int(0)),
        P::new("y", "Ypos", T::Int16).with_default(D::Int(0)),
        P::new("keyframe", "Keyframe", T::Int32).with_default(D::Int(0)),
        P::new("user_placed", "userPlaced", T::UInt8).with_default(D::Int(0)),
    ],
    read: None,
    write: None,
    init: None,
    deferred_refs: &[],
};

pub static SIFT_ITEM: ClassDef = ClassDef {
    name: "SiftItem",
    class_id: None,
    parent: None,
    properties: &[
        P::new("method", "SiftMethod", T::Int16).with_default(D::Int(0)),
        P::new("string", "SiftString", T::String).with_default(D::Str("")),
        P::new("column", "SiftColumn", T::String).with_default(D::Str("")),
    ],
    read: None,
    write: None,
    init: None,
    deferred_refs: &[],
};

pub static BIN: ClassDef = ClassDef {
    name: "Bin",
    class_id: Some(FourCC::new(b"ABIN")),
    parent: None,
    properties: &[
        P::new("view_setting", "binviewsetting", T::Reference).with_default(D::NullRef),
        P::new("uid_high", "binuid.high", T::UInt32).with_default(D::Int(0)),
        P::new("uid_low", "binuid.low", T::UInt32).with_default(D::Int(0)),
        P::new("items", "Items", T::List).with_default(D::EmptyList),
        P::new("display_mask", "DisplayMask", T::Int32).with_default(D::Int(0)),
        P::new("display_mode", "DisplayMode", T::Int16).with_default(D::Int(0)),
        P::new("sifted", "Sifted", T::Bool).with_default(D::Bool(false)),
        P::new("sifted_settings", "SiftedSettring", T::List).with_default(D::EmptyList),
        P::new("sort_columns", "SortColumns", T::List).with_default(D::EmptyList),
        P::new("mac_font", "MacFont", T::Int16).with_default(D::Int(1)),
        P::new("mac_font_size", "MacFontSize", T::Int16).with_default(D::Int(11)),
        P::new("mac_image_scale", "MacImageScale", T::Int16).with_default(D::Int(0)),
        P::new("home_rect", "HomeRect", T::Rect).with_default(D::Rect(Rect::new(0, 0, 0, 0))),
        P::new("background_color", "BackColor", T::Color)
            .with_default(D::Color(RgbColor::new(0xFFFF, 0xFFFF, 0xFFFF))),
        P::new("forground_color", "ForeColor", T::Color)
            .with_default(D::Color(RgbColor::new(0, 0, 0))),
        P::new("ql_image_scale", "QLImageScale", T::Int16).with_default(D::Int(0)),
        P::new("was_iconic", "WasIconic", T::Bool).with_default(D::Bool(false)),
        P::new("attributes", "BinAttr", T::Reference).with_default(D::NullRef),
    ],
    read: Some(read_bin),
    write: Some(write_bin),
    init: Some(init_bin),
    deferred_refs: &["view_setting", "attributes"],
};

fn objects_of<'a>(obj: &'a AvbObject, name: &str) -> Result<Vec<&'a AvbObject>> {
    obj.get_list(name)?
        .iter()
        .map(|v| {
            v.as_object().ok_or_else(|| Error::PropertyTypeMismatch {
                class: BIN.name,
                name: name.to_string(),
                expected: T::Composite,
            })
        })
        .collect()
}

fn read_bin(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    let version = r.read_record_header_any(&[0x0e, 0x0f])?;

    obj.set("view_setting", r.read_ref()?)?;
    obj.set("uid_high", r.read_u32()?)?;
    obj.set("uid_low", r.read_u32()?)?;

    let count = match version {
        0x0e => r.read_u16()? as u32,
        _ => r.read_u32()?,
    };
    let mut items = Vec::with_capacity(r.capacity_for(count as usize));
    for _ in 0..count {
        let mut item = AvbObject::empty(&BIN_ITEM);
        item.set("mob", r.read_ref()?)?;
        item.set("x", r.read_i16()?)?;
        item.set("y", r.read_i16()?)?;
        item.set("keyframe", r.read_i32()?)?;
        item.set("user_placed", r.read_u8()?)?;
        items.push(Value::from(item));
    }
    obj.set("items", items)?;

    obj.set("display_mask", r.read_i32()?)?;
    obj.set("display_mode", r.read_i16()?)?;
    obj.set("sifted", r.read_bool()?)?;

    let mut sifts = Vec::with_capacity(SIFT_SLOTS);
    for _ in 0..SIFT_SLOTS {
        let mut sift = AvbObject::empty(&SIFT_ITEM);
        sift.set("method", r.read_i16()?)?;
        sift.set("string", r.read_string_value()?)?;
        sift.set("column", r.read_string_value()?)?;
        sifts.push(Value::from(sift));
    }
    obj.set("sifted_settings", sifts)?;

    let count = r.read_i16()?.max(0);
    let mut sort_columns = Vec::with_capacity(r.capacity_for(count as usize));
    for _ in 0..count {
        sort_columns.push(Value::Map(vec![
            ("direction".to_string(), Value::from(r.read_u8()?)),
            ("column".to_string(), r.read_string_value()?),
        ]));
    }
    obj.set("sort_columns", sort_columns)?;

    obj.set("mac_font", r.read_i16()?)?;
    obj.set("mac_font_size", r.read_i16()?)?;
    obj.set("mac_image_scale", r.read_i16()?)?;
    obj.set("home_rect", r.read_rect()?)?;
    obj.set("background_color", r.read_rgb_color()?)?;
    obj.set("forground_color", r.read_rgb_color()?)?;
    obj.set("ql_image_scale", r.read_i16()?)?;
    obj.set("was_iconic", r.read_bool()?)?;
    obj.set("attributes", r.read_ref()?)?;

    r.read_end()
}

fn write_bin(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    let items = objects_of(obj, "items")?;
    let large = items.len() > u16::MAX as usize;
    w.write_record_header(if large { 0x0f } else { 0x0e })?;

    w.write_ref(obj.get_ref("view_setting")?)?;
    w.write_u32(obj.get_int_as::<u32>("uid_high")?)?;
    w.write_u32(obj.get_int_as::<u32>("uid_low")?)?;

    if large {
        w.write_u32(wire_count(BIN.name, "items", items.len())?)?;
    } else {
        w.write_u16(wire_count(BIN.name, "items", items.len())?)?;
    }
    for item in &items {
        w.write_ref(item.get_ref("mob")?)?;
        w.write_i16(item.get_int_as::<i16>("x")?)?;
        w.write_i16(item.get_int_as::<i16>("y")?)?;
        w.write_i32(item.get_int_as::<i32>("keyframe")?)?;
        w.write_u8(item.get_int_as::<u8>("user_placed")?)?;
    }

    w.write_i32(obj.get_int_as::<i32>("display_mask")?)?;
    w.write_i16(obj.get_int_as::<i16>("display_mode")?)?;
    w.write_bool(obj.get_bool("sifted")?)?;

    // Exactly six slots on disk; missing ones are written blank.
    let sifts = objects_of(obj, "sifted_settings")?;
    let blank = AvbObject::with_defaults(&SIFT_ITEM);
    for i in 0..SIFT_SLOTS {
        let sift = sifts.get(i).copied().unwrap_or(&blank);
        w.write_i16(sift.get_int_as::<i16>("method")?)?;
        w.write_string_value(sift.get("string")?)?;
        w.write_string_value(sift.get("column")?)?;
    }

    let sort_columns = obj.get_list("sort_columns")?;
    w.write_i16(wire_count(BIN.name, "sort_columns", sort_columns.len())?)?;
    for column in sort_columns {
        let field = |key: &str| {
            column.entry(key).ok_or_else(|| Error::AttributeNotFound {
                class: BIN.name,
                name: format!("sort_columns.{key}"),
            })
        };
        w.write_u8(int_entry(BIN.name, field("direction")?, "sort_columns.direction", T::UInt8)?)?;
        w.write_string_value(field("column")?)?;
    }

    w.write_i16(obj.get_int_as::<i16>("mac_font")?)?;
    w.write_i16(obj.get_int_as::<i16>("mac_font_size")?)?;
    w.write_i16(obj.get_int_as::<i16>("mac_image_scale")?)?;
    w.write_rect(&obj.get_rect("home_rect")?)?;
    w.write_rgb_color(&obj.get_color("background_color")?)?;
    w.write_rgb_color(&obj.get_color("forground_color")?)?;
    w.write_i16(obj.get_int_as::<i16>("ql_image_scale")?)?;
    w.write_bool(obj.get_bool("was_iconic")?)?;
    w.write_ref(obj.get_ref("attributes")?)?;

    w.write_end()
}

fn init_bin(file: &AvbFile, obj: &mut AvbObject) -> Result<()> {
    let uid = uuid::Uuid::new_v4().as_u128() as u64;
    obj.set("uid_high", (uid >> 32) as u32)?;
    obj.set("uid_low", uid as u32)?;

    let view_setting = file.create(BIN_VIEW_SETTING.name)?;
    obj.set("view_setting", ObjectRef::of(&view_setting.borrow())?)?;
    let attributes = file.create(super::attributes::ATTRIBUTES.name)?;
    obj.set("attributes", ObjectRef::of(&attributes.borrow())?)?;

    let sifts = (0..SIFT_SLOTS)
        .map(|_| Value::from(AvbObject::with_defaults(&SIFT_ITEM)))
        .collect::<Vec<_>>();
    obj.set("sifted_settings", sifts)
}

/// Resolves every item's mob, skipping null references.
pub fn mobs(file: &AvbFile, bin: &AvbObject) -> Result<Vec<SharedObject>> {
    let mut out = Vec::new();
    for item in objects_of(bin, "items")? {
        if let Some(mob) = item.resolve(file, "mob")? {
            out.push(mob);
        }
    }
    Ok(out)
}

/// Appends a new item pointing at `mob`.
pub fn add_mob(bin: &mut AvbObject, mob: ObjectRef) -> Result<()> {
    let mut item = AvbObject::with_defaults(&BIN_ITEM);
    item.set("mob", mob)?;
    bin.get_list_mut("items")?.push(Value::from(item));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ByteOrder;

    fn view_setting() -> AvbObject {
        let mut vs = AvbObject::with_defaults(&BIN_VIEW_SETTING);
        let column = |title: &str, format: i16| {
            Value::Map(vec![
                ("title".to_string(), Value::from(title)),
                ("format".to_string(), Value::from(format)),
                ("type".to_string(), Value::from(0i16)),
                ("hidden".to_string(), Value::from(false)),
            ])
        };
        vs.set("columns", vec![column("Name", 1), column("Start", 7)])
            .unwrap();
        vs
    }

    #[test]
    fn test_view_setting_defaults_roundtrip() {
        let vs = view_setting();
        let data = BIN_VIEW_SETTING.encode(&vs, ByteOrder::Little, None).unwrap();
        let decoded = BIN_VIEW_SETTING.decode(&data, ByteOrder::Little, None).unwrap();
        assert_eq!(decoded.get_str("name").unwrap(), DEFAULT_VIEW_NAME);
        assert_eq!(decoded.get_str("kind").unwrap(), "Bin View");
        assert_eq!(decoded, vs);
        assert!(!decoded.has("format_descriptor"));
    }

    #[test]
    fn test_format_descriptor_extension() {
        let mut vs = view_setting();
        vs.set("free_columns", vec![Value::from(12i16)]).unwrap();
        vs.set("format_descriptor", "<columns/>").unwrap();

        for order in [ByteOrder::Little, ByteOrder::Big] {
            let data = BIN_VIEW_SETTING.encode(&vs, order, None).unwrap();
            assert_eq!(&data[data.len() - 11..], b"<columns/>\x03");
            let decoded = BIN_VIEW_SETTING.decode(&data, order, None).unwrap();
            assert_eq!(decoded, vs);
        }
    }

    #[test]
    fn test_mistyped_column_field_is_rejected() {
        let mut vs = view_setting();
        let columns = vs.get_list_mut("columns").unwrap();
        columns[1] = Value::Map(vec![
            ("title".to_string(), Value::from("Start")),
            ("format".to_string(), Value::from("seven")),
            ("type".to_string(), Value::from(0i16)),
            ("hidden".to_string(), Value::from(false)),
        ]);
        assert!(matches!(
            BIN_VIEW_SETTING.encode(&vs, ByteOrder::Little, None),
            Err(Error::PropertyTypeMismatch { expected: T::Int16, .. })
        ));

        let mut vs = view_setting();
        vs.get_list_mut("columns").unwrap()[0] = Value::Map(vec![
            ("title".to_string(), Value::from("Name")),
            ("format".to_string(), Value::from(1i16)),
            ("type".to_string(), Value::from(0i16)),
            ("hidden".to_string(), Value::from(1i16)),
        ]);
        assert!(matches!(
            BIN_VIEW_SETTING.encode(&vs, ByteOrder::Little, None),
            Err(Error::PropertyTypeMismatch { expected: T::Bool, .. })
        ));
    }

    #[test]
    fn test_free_columns_need_descriptor() {
        let mut vs = view_setting();
        vs.set("free_columns", vec![Value::from(12i16)]).unwrap();
        assert!(matches!(
            BIN_VIEW_SETTING.encode(&vs, ByteOrder::Little, None),
            Err(Error::MissingDependentProperty { name: "free_columns", .. })
        ));

        vs.set("format_descriptor", "").unwrap();
        let data = BIN_VIEW_SETTING.encode(&vs, ByteOrder::Little, None).unwrap();
        let decoded = BIN_VIEW_SETTING.decode(&data, ByteOrder::Little, None).unwrap();
        assert_eq!(decoded.get_list("free_columns").unwrap(), &[Value::from(12i16)]);
    }

    #[test]
    fn test_sort_direction_out_of_range() {
        let mut bin = AvbObject::with_defaults(&BIN);
        bin.set("view_setting", ObjectRef::new(1)).unwrap();
        bin.set("attributes", ObjectRef::new(2)).unwrap();
        bin.set(
            "sort_columns",
            vec![Value::Map(vec![
                ("direction".to_string(), Value::from(300i16)),
                ("column".to_string(), Value::from("Name")),
            ])],
        )
        .unwrap();
        match BIN.encode(&bin, ByteOrder::Little, None) {
            Err(Error::PropertyTypeMismatch { name, expected, .. }) => {
                assert_eq!(name, "sort_columns.direction");
                assert_eq!(expected, T::UInt8);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bin_roundtrip() {
        let mut bin = AvbObject::with_defaults(&BIN);
        bin.set("view_setting", ObjectRef::new(1)).unwrap();
        bin.set("attributes", ObjectRef::new(2)).unwrap();
        add_mob(&mut bin, ObjectRef::new(3)).unwrap();
        add_mob(&mut bin, ObjectRef::new(4)).unwrap();
        bin.set(
            "sort_columns",
            vec![Value::Map(vec![
                ("direction".to_string(), Value::from(1u8)),
                ("column".to_string(), Value::from("Name")),
            ])],
        )
        .unwrap();

        let data = BIN.encode(&bin, ByteOrder::Little, None).unwrap();
        assert_eq!(&data[..2], &[tag::BEGIN, 0x0e]);
        let decoded = BIN.decode(&data, ByteOrder::Little, None).unwrap();

        assert_eq!(decoded.get_list("items").unwrap().len(), 2);
        assert_eq!(decoded.get_list("sifted_settings").unwrap().len(), SIFT_SLOTS);
        assert_eq!(
            decoded.references(),
            [1, 3, 4, 2].map(ObjectRef::new).to_vec()
        );
        assert_eq!(BIN.encode(&decoded, ByteOrder::Little, None).unwrap(), data);
    }

    #[test]
    fn test_large_bin_uses_wide_count() {
        let mut bin = AvbObject::with_defaults(&BIN);
        let item = Value::from(AvbObject::with_defaults(&BIN_ITEM));
        bin.set("items", vec![item; u16::MAX as usize + 1]).unwrap();

        let data = BIN.encode(&bin, ByteOrder::Little, None).unwrap();
        assert_eq!(&data[..2], &[tag::BEGIN, 0x0f]);
        assert_eq!(&data[14..18], &(u16::MAX as u32 + 1).to_le_bytes());
        let decoded = BIN.decode(&data, ByteOrder::Little, None).unwrap();
        assert_eq!(decoded.get_list("items").unwrap().len(), u16::MAX as usize + 1);
    }

    #[test]
    fn test_unknown_bin_version() {
        let bin = AvbObject::with_defaults(&BIN);
        let mut data = BIN.encode(&bin, ByteOrder::Little, None).unwrap();
        data[1] = 0x0d;
        assert!(matches!(
            BIN.decode(&data, ByteOrder::Little, None),
            Err(Error::UnexpectedGuardTag { found: 0x0d, .. })
        ));
    }
}
