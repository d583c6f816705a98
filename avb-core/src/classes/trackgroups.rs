//! Track groups and compositions (mobs)

use super::components::{read_component, write_component, COMPONENT};
use super::now;
use crate::codec::{ChunkReader, ChunkWriter};
use crate::file::AvbFile;
use crate::object::{AvbObject, Value};
use crate::property::{DefaultValue as D, PropertyDef as P, PropertyType as T};
use crate::record::{read_guarded, tag, unknown_extension, wire_count, write_extension, Field};
use crate::registry::ClassDef;
use crate::types::{FourCC, MobId};
use crate::{Error, Result};

/// Per-track presence bits, in field order.
pub mod track_flags {
    pub const LABEL: u16 = 1 << 0;
    pub const ATTRIBUTES: u16 = 1 << 1;
    pub const COMPONENT: u16 = 1 << 2;
    pub const FILLER_PROXY: u16 = 1 << 3;
    pub const BOB_DATA: u16 = 1 << 4;
    pub const CONTROL_CODE: u16 = 1 << 5;
    pub const CONTROL_SUB_CODE: u16 = 1 << 6;
    pub const START_POS: u16 = 1 << 7;
    pub const READ_ONLY: u16 = 1 << 8;
    pub const SESSION_ATTR: u16 = 1 << 9;

    pub const KNOWN: u16 = (1 << 10) - 1;
}

/// Track fields in wire order with their presence bit and shape.
const TRACK_FIELDS: &[(&str, u16, Field)] = &[
    ("index", track_flags::LABEL, Field::Int16),
    ("attributes", track_flags::ATTRIBUTES, Field::Ref),
    ("session_attr", track_flags::SESSION_ATTR, Field::Ref),
    ("component", track_flags::COMPONENT, Field::Ref),
    ("filler_proxy", track_flags::FILLER_PROXY, Field::Ref),
    ("bob_data", track_flags::BOB_DATA, Field::Ref),
    ("control_code", track_flags::CONTROL_CODE, Field::Int16),
    ("control_sub_code", track_flags::CONTROL_SUB_CODE, Field::Int16),
    ("start_pos", track_flags::START_POS, Field::Int32),
    ("read_only", track_flags::READ_ONLY, Field::Bool),
];

/// One entry of a track group's track table. Every field is optional.
pub static TRACK: ClassDef = ClassDef {
    name: "Track",
    class_id: None,
    parent: None,
    properties: &[
        P::new("index", "OMFI:TRAK:LabelNumber", T::Int16),
        P::new("attributes", "OMFI:TRAK:Attributes", T::Reference),
        P::new("session_attr", "OMFI:TRAK:SessionAttrs", T::Reference),
        P::new("component", "OMFI:TRAK:TrackComponent", T::Reference),
        P::new("filler_proxy", "OMFI:TRAK:FillerProxy", T::Reference),
        P::new("bob_data", "__OMFI:TRAK:Bob", T::Reference),
        P::new("control_code", "OMFI:TRAK:ControlCode", T::Int16),
        P::new("control_sub_code", "OMFI:TRAK:ControlSubCode", T::Int16),
        P::new("start_pos", "OMFI:TRAK:StartPos", T::Int32),
        P::new("read_only", "OMFI:TRAK:ReadOnly", T::Bool),
        P::new("lock_number", "OMFI:TRAK:LockNumber", T::Int16),
    ],
    read: None,
    write: None,
    init: None,
    deferred_refs: &[],
};

/// Presence bitmask derived from which fields a track carries.
pub fn track_flags(track: &AvbObject) -> u16 {
    TRACK_FIELDS
        .iter()
        .filter(|(name, _, _)| track.has(name))
        .fold(0, |flags, (_, bit, _)| flags | bit)
}

fn read_track(r: &mut ChunkReader<'_>) -> Result<AvbObject> {
    let flags = r.read_u16()?;
    if flags & !track_flags::KNOWN != 0 {
        return Err(Error::UnknownTrackFlags { flags });
    }

    let mut track = AvbObject::empty(&TRACK);
    for &(name, bit, field) in TRACK_FIELDS {
        if flags & bit == 0 {
            continue;
        }
        let value = match field {
            Field::Int16 => Value::Int(r.read_i16()? as i64),
            Field::Int32 => Value::Int(r.read_i32()? as i64),
            Field::Bool => Value::Bool(r.read_bool()?),
            _ => Value::Ref(r.read_ref()?),
        };
        track.set(name, value)?;
    }
    Ok(track)
}

fn write_track(w: &mut ChunkWriter<'_>, track: &AvbObject) -> Result<()> {
    w.write_u16(track_flags(track))?;
    for &(name, _, field) in TRACK_FIELDS {
        if !track.has(name) {
            continue;
        }
        match field {
            Field::Int16 => w.write_i16(track.get_int_as::<i16>(name)?)?,
            Field::Int32 => w.write_i32(track.get_int_as::<i32>(name)?)?,
            Field::Bool => w.write_bool(track.get_bool(name)?)?,
            _ => w.write_ref(track.get_ref(name)?)?,
        }
    }
    Ok(())
}

pub static TRACK_GROUP: ClassDef = ClassDef {
    name: "TrackGroup",
    class_id: None,
    parent: Some(&COMPONENT),
    properties: &[
        P::new("mc_mode", "OMFI:TRKG:MC:Mode", T::UInt8).with_default(D::Int(0)),
        P::new("length", "OMFI:TRKG:GroupLength", T::Int32).with_default(D::Int(0)),
        P::new("num_scalars", "OMFI:TRKG:NumScalars", T::Int32).with_default(D::Int(0)),
        P::new("tracks", "OMFI:TRKG:Tracks", T::List).with_default(D::EmptyList),
    ],
    read: None,
    write: None,
    init: None,
    deferred_refs: &[],
};

fn tracks_of(obj: &AvbObject) -> Result<Vec<&AvbObject>> {
    obj.get_list("tracks")?
        .iter()
        .map(|v| {
            v.as_object().ok_or_else(|| Error::PropertyTypeMismatch {
                class: obj.class_name(),
                name: "tracks".to_string(),
                expected: T::Composite,
            })
        })
        .collect()
}

pub(crate) fn read_track_group(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_component(r, obj)?;
    r.read_record_header(0x08)?;

    obj.set("mc_mode", r.read_u8()?)?;
    obj.set("length", r.read_i32()?)?;
    obj.set("num_scalars", r.read_i32()?)?;

    let count = r.read_i32()?;
    let mut tracks = (0..count)
        .map(|_| read_track(r))
        .collect::<Result<Vec<_>>>()?;

    while let Some(ext) = r.next_extension()? {
        match ext {
            0x01 => {
                for track in &mut tracks {
                    read_guarded(r, track, "lock_number", Field::Int16)?;
                }
            }
            other => return Err(unknown_extension(obj.class_name(), other)),
        }
    }

    obj.set(
        "tracks",
        tracks.into_iter().map(Value::from).collect::<Vec<_>>(),
    )
}

pub(crate) fn write_track_group(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_component(w, obj)?;
    w.write_record_header(0x08)?;

    w.write_u8(obj.get_int_as::<u8>("mc_mode")?)?;
    w.write_i32(obj.get_int_as::<i32>("length")?)?;
    w.write_i32(obj.get_int_as::<i32>("num_scalars")?)?;

    let tracks = tracks_of(obj)?;
    w.write_i32(wire_count(obj.class_name(), "tracks", tracks.len())?)?;
    for track in &tracks {
        write_track(w, track)?;
    }

    // Lock numbers are all-or-nothing across the table.
    let locked = tracks.iter().filter(|t| t.has("lock_number")).count();
    if locked != 0 && locked != tracks.len() {
        return Err(Error::PartialExtension {
            class: obj.class_name(),
            name: "lock_number",
        });
    }
    if locked != 0 {
        w.write_u8(tag::EXT)?;
        w.write_u8(0x01)?;
        for track in &tracks {
            w.write_u8(tag::SHORT)?;
            w.write_i16(track.get_int_as::<i16>("lock_number")?)?;
        }
    }
    Ok(())
}

/// Appends a track to a track group.
pub fn add_track(group: &mut AvbObject, track: AvbObject) -> Result<()> {
    group.get_list_mut("tracks")?.push(Value::from(track));
    Ok(())
}

/// Kind of a composition, stored in `mob_type_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobKind {
    Composition,
    Master,
    Source,
}

impl MobKind {
    pub fn id(self) -> u8 {
        match self {
            MobKind::Composition => 1,
            MobKind::Master => 2,
            MobKind::Source => 3,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(MobKind::Composition),
            2 => Some(MobKind::Master),
            3 => Some(MobKind::Source),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MobKind::Composition => "CompositionMob",
            MobKind::Master => "MasterMob",
            MobKind::Source => "SourceMob",
        }
    }
}

pub static COMPOSITION: ClassDef = ClassDef {
    name: "Composition",
    class_id: Some(FourCC::new(b"CMPO")),
    parent: Some(&TRACK_GROUP),
    properties: &[
        P::new("mob_id_hi", "OMFI:MOBJ:MobID.high", T::Int32).with_default(D::Int(0)),
        P::new("mob_id_lo", "OMFI:MOBJ:MobID.low", T::Int32).with_default(D::Int(0)),
        P::new("last_modified", "OMFI:MOBJ:LastModified", T::DateTime),
        P::new("mob_type_id", "__OMFI:MOBJ:MobType", T::UInt8).with_default(D::Int(1)),
        P::new("usage_code", "OMFI:MOBJ:UsageCode", T::Int32).with_default(D::Int(0)),
        P::new("descriptor", "OMFI:MOBJ:PhysicalMedia", T::Reference).with_default(D::NullRef),
        P::new("creation_time", "OMFI:MOBJ:_CreationTime", T::DateTime),
        P::new("mob_id", "MobID", T::MobId),
    ],
    read: Some(read_composition),
    write: Some(write_composition),
    init: Some(init_composition),
    deferred_refs: &[],
};

fn read_composition(r: &mut ChunkReader<'_>, obj: &mut AvbObject) -> Result<()> {
    read_track_group(r, obj)?;
    r.read_record_header(0x02)?;

    obj.set("mob_id_hi", r.read_i32()?)?;
    obj.set("mob_id_lo", r.read_i32()?)?;
    obj.set("last_modified", r.read_datetime()?)?;
    obj.set("mob_type_id", r.read_u8()?)?;
    obj.set("usage_code", r.read_i32()?)?;
    obj.set("descriptor", r.read_ref()?)?;

    while let Some(ext) = r.next_extension()? {
        match ext {
            0x01 => read_guarded(r, obj, "creation_time", Field::Date)?,
            0x02 => read_guarded(r, obj, "mob_id", Field::MobId)?,
            other => return Err(unknown_extension(COMPOSITION.name, other)),
        }
    }
    r.read_end()
}

fn write_composition(w: &mut ChunkWriter<'_>, obj: &AvbObject) -> Result<()> {
    write_track_group(w, obj)?;
    w.write_record_header(0x02)?;

    w.write_i32(obj.get_int_as::<i32>("mob_id_hi")?)?;
    w.write_i32(obj.get_int_as::<i32>("mob_id_lo")?)?;
    w.write_datetime(&obj.get_datetime("last_modified")?)?;
    w.write_u8(obj.get_int_as::<u8>("mob_type_id")?)?;
    w.write_i32(obj.get_int_as::<i32>("usage_code")?)?;
    w.write_ref(obj.get_ref("descriptor")?)?;

    write_extension(w, obj, 0x01, "creation_time", Field::Date)?;
    write_extension(w, obj, 0x02, "mob_id", Field::MobId)?;
    w.write_end()
}

fn init_composition(_file: &AvbFile, obj: &mut AvbObject) -> Result<()> {
    let stamp = now();
    obj.set("last_modified", stamp)?;
    obj.set("creation_time", stamp)?;
    obj.set("mob_id", MobId::new())?;
    obj.set("mob_type_id", MobKind::Composition.id())
}

/// Decoded mob kind of a composition.
pub fn mob_kind(obj: &AvbObject) -> Result<MobKind> {
    let id = obj.get_int("mob_type_id")?;
    MobKind::from_id(id).ok_or(Error::UnknownValueType {
        class: COMPOSITION.name,
        value_type: id,
    })
}

pub fn set_mob_kind(obj: &mut AvbObject, kind: MobKind) -> Result<()> {
    obj.set("mob_type_id", kind.id())
}
