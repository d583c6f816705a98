use anyhow::Result;
use avb_core::classes::{bin, trackgroups};
use avb_core::classes::trackgroups::MobKind;
use avb_core::{AvbFile, AvbObject, ByteOrder, FourCC, ObjectRef, RefList, SharedObject};
use avb_encoder::{AvbFileExt, WriteOptions};
use std::path::Path;
use tempfile::tempdir;

fn id(obj: &SharedObject) -> u32 {
    obj.borrow().instance_id().unwrap_or_default()
}

/// A master mob with one picture track holding a filler and a source clip.
fn populate(file: &AvbFile) -> Result<SharedObject> {
    let mob = file.create("Composition")?;
    let seq = file.create("Sequence")?;
    let filler = file.create("Filler")?;
    let clip = file.create("SourceClip")?;

    filler.borrow_mut().set("length", 48u32)?;
    {
        let mut clip = clip.borrow_mut();
        clip.set("length", 100u32)?;
        clip.set("edit_rate", 24000.0 / 1001.0)?;
        clip.set("mob_id", avb_core::MobId::new())?;
    }
    {
        let mut seq = seq.borrow_mut();
        seq.set("media_kind_id", 1i16)?;
        seq.set(
            "components",
            RefList::from_refs(vec![ObjectRef::new(id(&filler)), ObjectRef::new(id(&clip))]),
        )?;
    }
    {
        let mut mob = mob.borrow_mut();
        mob.set("name", "Interview A")?;
        trackgroups::set_mob_kind(&mut mob, MobKind::Master)?;
        let mut track = AvbObject::embedded("Track")?;
        track.set("index", 1i16)?;
        track.set("component", ObjectRef::new(id(&seq)))?;
        trackgroups::add_track(&mut mob, track)?;
    }

    let content = file.content()?;
    bin::add_mob(&mut content.borrow_mut(), ObjectRef::new(id(&mob)))?;
    Ok(mob)
}

fn class_ids(path: &Path) -> Result<Vec<FourCC>> {
    let file = AvbFile::open(path)?;
    let ids = file
        .chunks()
        .map(|c| c.map(|c| c.class_id))
        .collect::<avb_core::Result<Vec<_>>>()?;
    Ok(ids)
}

#[test]
fn empty_container_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty.avb");

    let file = AvbFile::new()?;
    let summary = file.write(&path)?;
    assert_eq!(summary.objects, 3);

    let reopened = AvbFile::open(&path)?;
    let content = reopened.content()?;
    let content = content.borrow();
    assert_eq!(content.class_name(), "Bin");
    assert_eq!(content.get_list("items")?.len(), 0);

    let view = content
        .resolve(&reopened, "view_setting")?
        .expect("bin has a view setting");
    assert_eq!(view.borrow().get_str("name")?, bin::DEFAULT_VIEW_NAME);
    Ok(())
}

#[test]
fn composition_graph_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("mob.avb");

    let file = AvbFile::new()?;
    let mob = populate(&file)?;
    file.write(&path)?;

    assert_eq!(
        class_ids(&path)?,
        [b"OBJD", b"CMPO", b"SEQU", b"FILL", b"SCLP", b"BVst", b"ATTR", b"ABIN"].map(FourCC::new)
    );

    let reopened = AvbFile::open(&path)?;
    let content = reopened.content()?;
    let mobs = bin::mobs(&reopened, &content.borrow())?;
    assert_eq!(mobs.len(), 1);

    let decoded = mobs[0].borrow();
    assert_eq!(decoded.get_str("name")?, "Interview A");
    assert_eq!(trackgroups::mob_kind(&decoded)?, MobKind::Master);
    assert_eq!(decoded.get_mob_id("mob_id")?, mob.borrow().get_mob_id("mob_id")?);

    let tracks = decoded.get_list("tracks")?;
    let track = tracks[0].as_object().expect("tracks are embedded objects");
    let seq = track.resolve(&reopened, "component")?.expect("track has a component");
    let seq = seq.borrow();
    assert_eq!(seq.class_name(), "Sequence");

    let components = seq
        .get_ref_list("components")?
        .iter(&reopened)
        .collect::<avb_core::Result<Vec<_>>>()?;
    let filler = components[0].as_ref().expect("filler");
    let clip = components[1].as_ref().expect("clip");
    assert_eq!(filler.borrow().get_int("length")?, 48);
    assert_eq!(clip.borrow().get_float("edit_rate")?, 23.976);
    assert!(clip.borrow().has("mob_id"));
    Ok(())
}

#[test]
fn decoded_chunks_reencode_identically() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("chunks.avb");
    let file = AvbFile::new()?;
    populate(&file)?;
    file.write(&path)?;

    let reopened = AvbFile::open(&path)?;
    for index in 1..reopened.chunk_count() {
        let chunk = reopened.read_chunk(index)?;
        let obj = reopened.read_object(index)?;
        let obj = obj.borrow();
        let body = obj.class().encode(&obj, reopened.byte_order(), None)?;
        assert_eq!(body, chunk.read(), "chunk {index} ({})", chunk.class_id);
    }
    Ok(())
}

#[test]
fn rewrite_is_stable() -> Result<()> {
    let dir = tempdir()?;
    let first = dir.path().join("first.avb");
    let second = dir.path().join("second.avb");
    let third = dir.path().join("third.avb");

    let file = AvbFile::new()?;
    populate(&file)?;
    file.write(&first)?;

    let reopened = AvbFile::open(&first)?;
    reopened.write_with(&second, &WriteOptions::preserving(&reopened))?;
    let again = AvbFile::open(&second)?;
    again.write_with(&third, &WriteOptions::preserving(&again))?;

    let first = std::fs::read(&first)?;
    assert_eq!(std::fs::read(&second)?, first);
    assert_eq!(std::fs::read(&third)?, first);
    Ok(())
}

#[test]
fn big_endian_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("big.avb");

    let file = AvbFile::new()?;
    populate(&file)?;
    let options = WriteOptions {
        byte_order: ByteOrder::Big,
        ..WriteOptions::default()
    };
    file.write_with(&path, &options)?;

    let data = std::fs::read(&path)?;
    assert_eq!(&data[..8], b"\x00\x06Domain");

    let reopened = AvbFile::open(&path)?;
    assert_eq!(reopened.byte_order(), ByteOrder::Big);
    let content = reopened.content()?;
    let mobs = bin::mobs(&reopened, &content.borrow())?;
    assert_eq!(mobs[0].borrow().get_str("name")?, "Interview A");
    Ok(())
}

#[test]
fn edits_to_an_opened_file_are_written() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("edit.avb");
    let edited = dir.path().join("edited.avb");

    let file = AvbFile::new()?;
    populate(&file)?;
    file.write(&path)?;

    let reopened = AvbFile::open(&path)?;
    let content = reopened.content()?;
    let extra = reopened.create("Composition")?;
    extra.borrow_mut().set("name", "Added later")?;
    bin::add_mob(&mut content.borrow_mut(), ObjectRef::new(id(&extra)))?;
    assert!(reopened.modified_objects().len() >= 2);
    reopened.write(&edited)?;

    let result = AvbFile::open(&edited)?;
    let content = result.content()?;
    let names = bin::mobs(&result, &content.borrow())?
        .iter()
        .map(|m| m.borrow().get_str("name").map(str::to_string))
        .collect::<avb_core::Result<Vec<_>>>()?;
    assert_eq!(names, ["Interview A", "Added later"]);
    Ok(())
}
