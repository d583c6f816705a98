//! Class registry
//!
//! Two lookup tables: chunk classes by their 4-byte type code, and every
//! class (including embedded helpers decoded inline by a parent) by name.
//! Registration also indexes each class's property list by name.

use crate::codec::{ByteOrder, ChunkMapping, ChunkReader, ChunkWriter, Reader, Writer};
use crate::file::AvbFile;
use crate::object::AvbObject;
use crate::property::PropertyDef;
use crate::types::FourCC;
use crate::{classes, Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Decodes a record body into an empty instance.
pub type ReadFn = fn(&mut ChunkReader<'_>, &mut AvbObject) -> Result<()>;

/// Encodes an instance into a record body.
pub type WriteFn = fn(&mut ChunkWriter<'_>, &AvbObject) -> Result<()>;

/// Populates a freshly constructed instance beyond its schema defaults.
pub type InitFn = fn(&AvbFile, &mut AvbObject) -> Result<()>;

/// Static description of one object kind.
pub struct ClassDef {
    pub name: &'static str,
    /// Set for kinds stored as standalone chunks.
    pub class_id: Option<FourCC>,
    pub parent: Option<&'static ClassDef>,
    /// Own properties, in binary layout order.
    pub properties: &'static [PropertyDef],
    /// `None` for abstract bases whose fields are read by subclasses.
    pub read: Option<ReadFn>,
    pub write: Option<WriteFn>,
    pub init: Option<InitFn>,
    /// Reference properties written after the top-level graph.
    pub deferred_refs: &'static [&'static str],
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("class_id", &self.class_id)
            .field("parent", &self.parent.map(|p| p.name))
            .finish_non_exhaustive()
    }
}

impl ClassDef {
    /// Every property, inherited ones first.
    pub fn property_defs(&self) -> Vec<&'static PropertyDef> {
        let mut defs = self.parent.map(|p| p.property_defs()).unwrap_or_default();
        defs.extend(self.properties.iter());
        defs
    }

    pub fn property(&self, name: &str) -> Option<&'static PropertyDef> {
        self.properties
            .iter()
            .find(|d| d.name == name)
            .or_else(|| self.parent.and_then(|p| p.property(name)))
    }

    /// Whether this class is `other` or derives from it.
    pub fn is_a(&self, other: &ClassDef) -> bool {
        std::ptr::eq(self, other) || self.parent.is_some_and(|p| p.is_a(other))
    }

    /// Decodes one isolated chunk body, requiring every byte to be consumed.
    pub fn decode(
        &'static self,
        data: &[u8],
        order: ByteOrder,
        ref_limit: Option<u32>,
    ) -> Result<AvbObject> {
        let read = self.read.ok_or(Error::NotAChunkClass(self.name))?;
        let mut reader = Reader::from_slice(data, order).with_ref_limit(ref_limit);
        let mut obj = AvbObject::empty(self);
        read(&mut reader, &mut obj)?;
        reader.finish(self.name)?;
        obj.finish_decoding();
        Ok(obj)
    }

    /// Encodes one chunk body, translating references through `refs` when given.
    pub fn encode(
        &self,
        obj: &AvbObject,
        order: ByteOrder,
        refs: Option<&ChunkMapping>,
    ) -> Result<Vec<u8>> {
        let write = self.write.ok_or(Error::NotAChunkClass(self.name))?;
        let mut writer = Writer::new(Vec::new(), order);
        if let Some(refs) = refs {
            writer = writer.with_mapping(refs);
        }
        write(&mut writer, obj)?;
        Ok(writer.into_inner())
    }
}

/// Lookup tables over every known class.
#[derive(Debug, Default)]
pub struct Registry {
    by_class_id: HashMap<FourCC, &'static ClassDef>,
    by_name: HashMap<&'static str, &'static ClassDef>,
    properties: HashMap<&'static str, HashMap<&'static str, &'static PropertyDef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a standalone chunk class under its type code and name.
    pub fn register(&mut self, class: &'static ClassDef) {
        if let Some(class_id) = class.class_id {
            self.by_class_id.insert(class_id, class);
        }
        self.register_helper(class);
    }

    /// Registers a base or embedded helper class by name only.
    pub fn register_helper(&mut self, class: &'static ClassDef) {
        self.by_name.insert(class.name, class);
        let props = class
            .property_defs()
            .into_iter()
            .map(|def| (def.name, def))
            .collect();
        self.properties.insert(class.name, props);
    }

    pub fn class_by_id(&self, class_id: FourCC) -> Option<&'static ClassDef> {
        self.by_class_id.get(&class_id).copied()
    }

    pub fn class_by_name(&self, name: &str) -> Option<&'static ClassDef> {
        self.by_name.get(name).copied()
    }

    /// O(1) declared-property lookup.
    pub fn property(&self, class: &str, name: &str) -> Option<&'static PropertyDef> {
        self.properties.get(class)?.get(name).copied()
    }

    pub fn class_ids(&self) -> impl Iterator<Item = FourCC> + '_ {
        self.by_class_id.keys().copied()
    }
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let mut registry = Registry::new();
    classes::register_all(&mut registry);
    registry
});

/// The process-wide registry of built-in classes.
pub fn registry() -> &'static Registry {
    &REGISTRY
}
