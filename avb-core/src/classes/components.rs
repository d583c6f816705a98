//! Timeline components: sequences, clips, fillers and parameter curves

use crate::codec::{ChunkReader, ChunkWriter};
use crate::object::{AvbObject, Value};
use crate::property::{DefaultValue as D, PropertyDef as P, PropertyType as T};
use crate::record::{read_guarded, unknown_extension, wire_count, write_extension, Field};
use crate::registry::ClassDef;
use crate::types::{FourCC, Rational};
use crate::{Error, RefList, Result};

/// Media kind ids stored in `media_kind_id`.
pub mod media_kind {
    pub const NONE: i64 = 0;
    pub const PICTURE: i64 = 1;
    pub const SOUND: i64 = 2;
    pub const TIMECODE: i64 = 3;
    pub const EDGECODE: i64 = 4;
    pub const ATTRIBUTE: i64 = 5;
    pub const EFFECT_DATA: i64 = 6;
    pub const DESCRIPTIVE_METADATA: i64 = 7;
}

/// Interpretation of a control point value, keyed by `value_type`.
pub mod value_type {
    pub const INT: i64 = 1;
    pub const DOUBLE: i64 = 2;
    pub const REFERENCE: i64 = 4;
}

pub static COMPONENT: ClassDef = ClassDef {
    name: "Component",
    class_id: None,
    parent: None,
    properties: &[
        P::new("left_bob", "__OMFI:CPNT:LeftBob", T::Reference).with_default(D::NullRef),
        P::new("right_bob", "__OMFI:CPNT:RightBob", T::Reference).with_default(D::NullRef),
        P::new("media_kind_id", "OMFI:CPNT:TrackKind", T::Int16).with_default(D::Int(0)),
        P::new("edit_rate", "EdRate", T::Float).with_default(D::Float(25.0)),
        P::new("name", "OMFI:CPNT:Name", T::String).with_default(D::Null),
        P::new("effect_id", "OMFI:CPNT:EffectID", T::String).with_default(D::Null),
        P::new("attributes", "OMFI:CPNT:Attributes", T::Reference).with_default(D::NullRef),
        P::new("session_attrs", "OMFI:CPNT:SessionAttrs", T::Reference).with_default(D::NullRef),
        P::new("precomputed", "__OMFI:CPNT:Precomputed", T::Reference).with_default(D::NullRef),
        P::new("param_list", "OMFI:CPNT:ParamList", T::Reference),
    ],
    read: None,
    write: None,
    init: None,
    deferred_refs: &[],
};

pub(crate) fn read_component(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    r.read_record_header(0x03)?;
    obj.set("left_bob", r.read_ref()?)?;
    obj.set("right_bob", r.read_ref()?)?;
    obj.set("media_kind_id", r.read_i16()?)?;
    obj.set("edit_rate", r.read_exp10()?)?;
    obj.set("name", r.read_string_value()?)?;
    obj.set("effect_id", r.read_string_value()?)?;
    obj.set("attributes", r.read_ref()?)?;
    obj.set("session_attrs", r.read_ref()?)?;
    obj.set("precomputed", r.read_ref()?)?;

    while let Some(tag) = r.next_extension()? {
        match tag {
            0x01 => read_guarded(r, obj, "param_list", Field::Ref)?,
            other => return Err(unknown_extension(obj.class_name(), other)),
        }
    }
    Ok(())
}

pub(crate) fn write_component(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    w.write_record_header(0x03)?;
    w.write_ref(obj.get_ref("left_bob")?)?;
    w.write_ref(obj.get_ref("right_bob")?)?;
    w.write_i16(obj.get_int_as::<i16>("media_kind_id")?)?;
    w.write_exp10(obj.get_float("edit_rate")?)?;
    w.write_string_value(obj.get("name")?)?;
    w.write_string_value(obj.get("effect_id")?)?;
    w.write_ref(obj.get_ref("attributes")?)?;
    w.write_ref(obj.get_ref("session_attrs")?)?;
    w.write_ref(obj.get_ref("precomputed")?)?;
    write_extension(w, obj, 0x01, "param_list", Field::Ref)
}

/// Human-readable media kind of a component.
pub fn media_kind_name(obj: &AvbObject) -> Result<&'static str> {
    Ok(match obj.get_int("media_kind_id")? {
        media_kind::NONE => "none",
        media_kind::PICTURE => "picture",
        media_kind::SOUND => "sound",
        media_kind::TIMECODE => "timecode",
        media_kind::EDGECODE => "edgecode",
        media_kind::ATTRIBUTE => "attribute",
        media_kind::EFFECT_DATA => "effectdata",
        media_kind::DESCRIPTIVE_METADATA => "descriptive metadata",
        _ => "unknown",
    })
}

pub static SEQUENCE: ClassDef = ClassDef {
    name: "Sequence",
    class_id: Some(FourCC::new(b"SEQU")),
    parent: Some(&COMPONENT),
    properties: &[
        P::new("components", "__OMFI:SEQU:Sequence", T::RefList).with_default(D::EmptyRefList),
    ],
    read: Some(read_sequence),
    write: Some(write_sequence),
    init: None,
    deferred_refs: &[],
};

fn read_sequence(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_component(r, obj)?;
    r.read_record_header(0x03)?;

    let count = r.read_u32()?;
    let refs = (0..count)
        .map(|_| r.read_ref())
        .collect::<Result<Vec<_>>>()?;
    obj.set("components", RefList::from_refs(refs))?;

    r.read_end()
}

fn write_sequence(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_component(w, obj)?;
    w.write_record_header(0x03)?;

    let components = obj.get_ref_list("components")?;
    w.write_u32(wire_count(SEQUENCE.name, "components", components.len())?)?;
    for r in components.refs() {
        w.write_ref(*r)?;
    }

    w.write_end()
}

pub static CLIP: ClassDef = ClassDef {
    name: "Clip",
    class_id: None,
    parent: Some(&COMPONENT),
    properties: &[P::new("length", "OMFI:CLIP:Length", T::UInt32).with_default(D::Int(0))],
    read: None,
    write: None,
    init: None,
    deferred_refs: &[],
};

pub(crate) fn read_clip(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_component(r, obj)?;
    r.read_record_header(0x01)?;
    obj.set("length", r.read_u32()?)
}

pub(crate) fn write_clip(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_component(w, obj)?;
    w.write_record_header(0x01)?;
    w.write_u32(obj.get_int_as::<u32>("length")?)
}

pub static SOURCE_CLIP: ClassDef = ClassDef {
    name: "SourceClip",
    class_id: Some(FourCC::new(b"SCLP")),
    parent: Some(&CLIP),
    properties: &[
        P::new("mob_id_hi", "OMFI:SCLP:SourceID.high", T::Int32).with_default(D::Int(0)),
        P::new("mob_id_lo", "OMFI:SCLP:SourceID.low", T::Int32).with_default(D::Int(0)),
        P::new("track_id", "OMFI:SCLP:SourceTrack", T::Int16).with_default(D::Int(0)),
        P::new("start_time", "OMFI:SCLP:SourcePosition", T::Int32).with_default(D::Int(0)),
        P::new("mob_id", "MobID", T::MobId),
    ],
    read: Some(read_source_clip),
    write: Some(write_source_clip),
    init: None,
    deferred_refs: &[],
};

fn read_source_clip(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_clip(r, obj)?;
    r.read_record_header(0x03)?;
    obj.set("mob_id_hi", r.read_i32()?)?;
    obj.set("mob_id_lo", r.read_i32()?)?;
    obj.set("track_id", r.read_i16()?)?;
    obj.set("start_time", r.read_i32()?)?;

    while let Some(tag) = r.next_extension()? {
        match tag {
            0x01 => read_guarded(r, obj, "mob_id", Field::MobId)?,
            other => return Err(unknown_extension(SOURCE_CLIP.name, other)),
        }
    }
    r.read_end()
}

fn write_source_clip(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_clip(w, obj)?;
    w.write_record_header(0x03)?;
    w.write_i32(obj.get_int_as::<i32>("mob_id_hi")?)?;
    w.write_i32(obj.get_int_as::<i32>("mob_id_lo")?)?;
    w.write_i16(obj.get_int_as::<i16>("track_id")?)?;
    w.write_i32(obj.get_int_as::<i32>("start_time")?)?;
    write_extension(w, obj, 0x01, "mob_id", Field::MobId)?;
    w.write_end()
}

pub static FILLER: ClassDef = ClassDef {
    name: "Filler",
    class_id: Some(FourCC::new(b"FILL")),
    parent: Some(&CLIP),
    properties: &[],
    read: Some(read_filler),
    write: Some(write_filler),
    init: None,
    deferred_refs: &[],
};

fn read_filler(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_clip(r, obj)?;
    r.read_record_header(0x01)?;
    r.read_end()
}

fn write_filler(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_clip(w, obj)?;
    w.write_record_header(0x01)?;
    w.write_end()
}

pub static TIMECODE: ClassDef = ClassDef {
    name: "Timecode",
    class_id: Some(FourCC::new(b"TCCP")),
    parent: Some(&CLIP),
    properties: &[
        P::new("flags", "OMFI:TCCP:Flags", T::UInt32).with_default(D::Int(0)),
        P::new("fps", "OMFI:TCCP:FPS", T::UInt16).with_default(D::Int(25)),
        P::new("start", "OMFI:TCCP:StartTC", T::UInt32).with_default(D::Int(0)),
    ],
    read: Some(read_timecode),
    write: Some(write_timecode),
    init: None,
    deferred_refs: &[],
};

fn read_timecode(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_clip(r, obj)?;
    r.read_record_header(0x01)?;
    obj.set("flags", r.read_u32()?)?;
    obj.set("fps", r.read_u16()?)?;
    // unused
    r.read_bytes(6)?;
    obj.set("start", r.read_u32()?)?;
    r.read_end()
}

fn write_timecode(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_clip(w, obj)?;
    w.write_record_header(0x01)?;
    w.write_u32(obj.get_int_as::<u32>("flags")?)?;
    w.write_u16(obj.get_int_as::<u16>("fps")?)?;
    w.write_bytes(&[0; 6])?;
    w.write_u32(obj.get_int_as::<u32>("start")?)?;
    w.write_end()
}

pub static TRACK_REF: ClassDef = ClassDef {
    name: "TrackRef",
    class_id: Some(FourCC::new(b"TRKR")),
    parent: Some(&CLIP),
    properties: &[
        P::new("relative_scope", "OMFI:TRKR:RelativeScope", T::Int16).with_default(D::Int(0)),
        P::new("relative_track", "OMFI:TRKR:RelativeTrack", T::Int16).with_default(D::Int(0)),
    ],
    read: Some(read_track_ref),
    write: Some(write_track_ref),
    init: None,
    deferred_refs: &[],
};

fn read_track_ref(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_clip(r, obj)?;
    r.read_record_header(0x01)?;
    obj.set("relative_scope", r.read_i16()?)?;
    obj.set("relative_track", r.read_i16()?)?;
    r.read_end()
}

fn write_track_ref(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_clip(w, obj)?;
    w.write_record_header(0x01)?;
    w.write_i16(obj.get_int_as::<i16>("relative_scope")?)?;
    w.write_i16(obj.get_int_as::<i16>("relative_track")?)?;
    w.write_end()
}

pub static PARAM_CLIP: ClassDef = ClassDef {
    name: "ParamClip",
    class_id: Some(FourCC::new(b"PRCL")),
    parent: Some(&CLIP),
    properties: &[
        P::new("interp_kind", "OMFI:PRCL:InterpKind", T::Int32).with_default(D::Int(0)),
        P::new("value_type", "OMFI:PRCL:ValueType", T::Int16).with_default(D::Int(value_type::INT)),
        P::new("control_points", "OMFI:PRCL:ControlPoints", T::List).with_default(D::EmptyList),
        P::new("extrap_kind", "OMFI:PRCL:ExtrapKind", T::Int32),
        P::new("fields", "OMFI:PRCL:FieldCount", T::Int32),
    ],
    read: Some(read_param_clip),
    write: Some(write_param_clip),
    init: None,
    deferred_refs: &[],
};

/// One key of a [`PARAM_CLIP`] curve.
pub static CONTROL_POINT: ClassDef = ClassDef {
    name: "ControlPoint",
    class_id: None,
    parent: None,
    properties: &[
        P::new("offset", "OMFI:CTRL:Offset", T::Rational).with_default(D::Rational(Rational::new(0, 1))),
        P::new("timescale", "OMFI:CTRL:TimeScale", T::Int32).with_default(D::Int(0)),
        P::new("value", "OMFI:CTRL:Value", T::Variant).with_default(D::Int(0)),
        P::new("pp", "OMFI:CTRL:PP", T::List).with_default(D::EmptyList),
    ],
    read: None,
    write: None,
    init: None,
    deferred_refs: &[],
};

/// Per-point extra attached to a [`CONTROL_POINT`].
pub static PER_POINT: ClassDef = ClassDef {
    name: "PerPoint",
    class_id: None,
    parent: None,
    properties: &[
        P::new("code", "OMFI:CTRL:PP:Code", T::Int16).with_default(D::Int(0)),
        P::new("type", "OMFI:CTRL:PP:Type", T::Int16).with_default(D::Int(value_type::DOUBLE)),
        P::new("value", "OMFI:CTRL:PP:Value", T::Float).with_default(D::Float(0.0)),
    ],
    read: None,
    write: None,
    init: None,
    deferred_refs: &[],
};

fn read_variant(r: &mut ChunkReader<'_>, class: &'static str, kind: i64) -> Result<Value> {
    Ok(match kind {
        value_type::INT => Value::Int(r.read_i32()? as i64),
        value_type::DOUBLE => Value::Float(r.read_f64()?),
        value_type::REFERENCE => Value::Ref(r.read_ref()?),
        other => {
            return Err(Error::UnknownValueType {
                class,
                value_type: other,
            })
        }
    })
}

fn write_variant(w: &mut ChunkWriter<'_>, class: &'static str, kind: i64, value: &Value) -> Result<()> {
    let mismatch = || Error::PropertyTypeMismatch {
        class,
        name: "value".to_string(),
        expected: T::Variant,
    };
    match (kind, value) {
        (value_type::INT, v) => w.write_i32(v.as_int_of().ok_or_else(mismatch)?),
        (value_type::DOUBLE, Value::Float(v)) => w.write_f64(*v),
        (value_type::DOUBLE, Value::Int(v)) => w.write_f64(*v as f64),
        (value_type::DOUBLE, _) => Err(mismatch()),
        (value_type::REFERENCE, v) => w.write_ref(v.as_reference().ok_or_else(mismatch)?),
        (other, _) => Err(Error::UnknownValueType {
            class,
            value_type: other,
        }),
    }
}

fn read_param_clip(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_clip(r, obj)?;
    r.read_record_header(0x01)?;
    obj.set("interp_kind", r.read_i32()?)?;
    let kind = r.read_i16()? as i64;
    obj.set("value_type", kind)?;

    let point_count = r.read_i32()?;
    let mut points = Vec::with_capacity(r.capacity_for(point_count.max(0) as usize));
    for _ in 0..point_count {
        let mut cp = AvbObject::empty(&CONTROL_POINT);
        cp.set("offset", r.read_rational()?)?;
        cp.set("timescale", r.read_i32()?)?;
        cp.set("value", read_variant(r, PARAM_CLIP.name, kind)?)?;

        let pp_count = r.read_i16()?;
        let mut extras = Vec::with_capacity(r.capacity_for(pp_count.max(0) as usize));
        for _ in 0..pp_count {
            let mut pp = AvbObject::empty(&PER_POINT);
            pp.set("code", r.read_i16()?)?;
            let pp_kind = r.read_i16()? as i64;
            pp.set("type", pp_kind)?;
            match pp_kind {
                value_type::DOUBLE => pp.set("value", r.read_f64()?)?,
                other => {
                    return Err(Error::UnknownValueType {
                        class: PER_POINT.name,
                        value_type: other,
                    })
                }
            }
            extras.push(Value::from(pp));
        }
        cp.set("pp", extras)?;
        points.push(Value::from(cp));
    }
    obj.set("control_points", points)?;

    while let Some(tag) = r.next_extension()? {
        match tag {
            0x01 => read_guarded(r, obj, "extrap_kind", Field::Int32)?,
            0x02 => read_guarded(r, obj, "fields", Field::Int32)?,
            other => return Err(unknown_extension(PARAM_CLIP.name, other)),
        }
    }
    r.read_end()
}

fn write_param_clip(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_clip(w, obj)?;
    w.write_record_header(0x01)?;
    w.write_i32(obj.get_int_as::<i32>("interp_kind")?)?;
    let kind = obj.get_int_as::<i16>("value_type")?;
    w.write_i16(kind)?;
    let kind = i64::from(kind);

    let points = obj.get_list("control_points")?;
    w.write_i32(wire_count(PARAM_CLIP.name, "control_points", points.len())?)?;
    for point in points {
        let cp = point.as_object().ok_or_else(|| Error::PropertyTypeMismatch {
            class: PARAM_CLIP.name,
            name: "control_points".to_string(),
            expected: T::Composite,
        })?;
        w.write_rational(cp.get_rational("offset")?)?;
        w.write_i32(cp.get_int_as::<i32>("timescale")?)?;
        write_variant(w, PARAM_CLIP.name, kind, cp.get("value")?)?;

        let extras = cp.get_list("pp")?;
        w.write_i16(wire_count(CONTROL_POINT.name, "pp", extras.len())?)?;
        for extra in extras {
            let pp = extra.as_object().ok_or_else(|| Error::PropertyTypeMismatch {
                class: CONTROL_POINT.name,
                name: "pp".to_string(),
                expected: T::Composite,
            })?;
            w.write_i16(pp.get_int_as::<i16>("code")?)?;
            let pp_kind = pp.get_int_as::<i16>("type")?;
            w.write_i16(pp_kind)?;
            write_variant(w, PER_POINT.name, i64::from(pp_kind), pp.get("value")?)?;
        }
    }

    write_extension(w, obj, 0x01, "extrap_kind", Field::Int32)?;
    write_extension(w, obj, 0x02, "fields", Field::Int32)?;
    w.write_end()
}
