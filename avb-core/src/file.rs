//! Open-file session
//!
//! An [`AvbFile`] owns the byte source, the chunk table and the decode
//! cache. Objects are decoded lazily the first time a reference to them is
//! resolved; later resolutions of the same index hand out the same shared
//! instance until [`AvbFile::release_unused`] drops it.

use crate::container::{AvbChunk, ChunkTable, FileHeader};
use crate::object::{AvbObject, SharedObject};
use crate::options::ReadOptions;
use crate::registry::registry;
use crate::types::FourCC;
use crate::{ByteOrder, Error, ObjectRef, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Leading record bytes kept in decode error context.
const HEX_CONTEXT: usize = 128;

/// Seekable byte source behind a file.
pub trait Source: Read + Seek {}

impl<T: Read + Seek> Source for T {}

/// An AVB file: header, chunk table and object cache
pub struct AvbFile {
    source: Option<RefCell<Box<dyn Source>>>,
    options: ReadOptions,
    header: FileHeader,
    table: ChunkTable,
    cache: RefCell<HashMap<u32, SharedObject>>,
    next_object_id: Cell<u32>,
    content: RefCell<Option<SharedObject>>,
}

impl AvbFile {
    /// Opens a file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReadOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::with_capacity(options.buffer_size, file), options)
    }

    /// Reads the header and chunk table, then decodes the content object
    pub fn from_reader<R: Read + Seek + 'static>(mut reader: R, options: ReadOptions) -> Result<Self> {
        let (header, root) = FileHeader::read(&mut reader)?;
        let table = ChunkTable::scan(&mut reader, root, header.object_count)?;
        debug!(
            objects = header.object_count,
            root_index = header.root_index,
            byte_order = ?header.byte_order,
            "opened AVB file"
        );

        let file = Self {
            source: Some(RefCell::new(Box::new(reader))),
            options,
            next_object_id: Cell::new(table.len()),
            header,
            table,
            cache: RefCell::new(HashMap::new()),
            content: RefCell::new(None),
        };
        let content = file.resolve(ObjectRef::new(file.header.root_index))?;
        file.content.replace(content);
        Ok(file)
    }

    /// Creates an empty file whose content is a fresh bin
    pub fn new() -> Result<Self> {
        let header = FileHeader::new(ByteOrder::default());
        let table = ChunkTable::empty(header.root_chunk()?);
        let file = Self {
            source: None,
            options: ReadOptions::default(),
            next_object_id: Cell::new(table.len()),
            header,
            table,
            cache: RefCell::new(HashMap::new()),
            content: RefCell::new(None),
        };
        let bin = file.create("Bin")?;
        file.content.replace(Some(bin));
        Ok(file)
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Number of chunk table entries, the root chunk included
    pub fn chunk_count(&self) -> u32 {
        self.table.len()
    }

    /// The root content object (normally a bin)
    pub fn content(&self) -> Result<SharedObject> {
        self.content.borrow().clone().ok_or(Error::NoContent)
    }

    pub fn set_content(&self, content: SharedObject) {
        self.content.replace(Some(content));
    }

    /// Raw record `index`; 0 is the header's root chunk
    pub fn read_chunk(&self, index: u32) -> Result<AvbChunk> {
        if index == 0 {
            return Ok(self.table.root().clone());
        }
        let source = self.source.as_ref().ok_or(Error::NoSource)?;
        self.table.read_chunk(&mut *source.borrow_mut(), index)
    }

    /// Every chunk in table order, starting with the root chunk
    pub fn chunks(&self) -> impl Iterator<Item = Result<AvbChunk>> + '_ {
        (0..self.table.len()).map(move |index| self.read_chunk(index))
    }

    /// Decodes every chunk whose type code is in `class_ids`
    pub fn iter_class_ids<'a>(
        &'a self,
        class_ids: &'a [FourCC],
    ) -> impl Iterator<Item = Result<SharedObject>> + 'a {
        (1..self.table.len()).filter_map(move |index| match self.read_chunk(index) {
            Ok(chunk) if class_ids.contains(&chunk.class_id) => Some(self.read_object(index)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
    }

    /// The live instance for `index`, if one is cached
    pub fn cached(&self, index: u32) -> Option<SharedObject> {
        self.cache.borrow().get(&index).cloned()
    }

    /// Dereferences `r`: null yields `None`, otherwise the shared instance
    pub fn resolve(&self, r: ObjectRef) -> Result<Option<SharedObject>> {
        if r.is_null() {
            return Ok(None);
        }
        let index = r.index();
        if !self.options.check_refs
            && !self.table.contains(index)
            && self.cached(index).is_none()
        {
            warn!(index, len = self.table.len(), "ignoring out-of-range reference");
            return Ok(None);
        }
        self.read_object(index).map(Some)
    }

    /// Cached instance for `index`, decoding its chunk on a miss
    pub fn read_object(&self, index: u32) -> Result<SharedObject> {
        if let Some(obj) = self.cached(index) {
            return Ok(obj);
        }
        if index == 0 || !self.table.contains(index) {
            return Err(Error::InvalidReferenceIndex {
                index,
                len: self.table.len(),
            });
        }

        let obj = Rc::new(RefCell::new(self.decode_chunk(index)?));
        self.cache.borrow_mut().insert(index, Rc::clone(&obj));
        Ok(obj)
    }

    fn decode_chunk(&self, index: u32) -> Result<AvbObject> {
        let chunk = self.read_chunk(index)?;
        trace!(index, class_id = %chunk.class_id, len = chunk.len(), "decoding chunk");

        let context = |source: Error| {
            let mut hex = chunk.hex();
            hex.truncate(HEX_CONTEXT * 2);
            Error::Chunk {
                index,
                class_id: chunk.class_id,
                hex,
                source: Box::new(source),
            }
        };

        let class = registry()
            .class_by_id(chunk.class_id)
            .ok_or_else(|| context(Error::UnknownTypeCode(chunk.class_id)))?;
        let limit = self.options.check_refs.then(|| self.table.len());
        let mut obj = class
            .decode(chunk.read(), self.table.order(), limit)
            .map_err(context)?;
        obj.set_instance_id(index);
        Ok(obj)
    }

    /// Constructs a new top-level object of class `name`
    ///
    /// The object gets a session id above every on-disk index, its schema
    /// defaults and its class init hook, and is kept alive by the cache.
    pub fn create(&self, name: &str) -> Result<SharedObject> {
        let class = registry()
            .class_by_name(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))?;
        if class.class_id.is_none() {
            return Err(Error::NotAChunkClass(class.name));
        }

        let id = self.next_object_id.get();
        self.next_object_id.set(id + 1);

        let mut obj = AvbObject::with_defaults(class);
        obj.set_instance_id(id);
        if let Some(init) = class.init {
            init(self, &mut obj)?;
        }

        let obj = Rc::new(RefCell::new(obj));
        self.cache.borrow_mut().insert(id, Rc::clone(&obj));
        Ok(obj)
    }

    /// Drops cached objects that are unmodified, backed by a chunk and held
    /// by nobody else. Returns how many were released.
    pub fn release_unused(&self) -> usize {
        let disk_len = self.table.len();
        let mut cache = self.cache.borrow_mut();
        let before = cache.len();
        cache.retain(|&index, obj| {
            index >= disk_len
                || Rc::strong_count(obj) > 1
                || obj.try_borrow().map_or(true, |o| o.is_modified())
        });
        let released = before - cache.len();
        debug!(released, remaining = cache.len(), "released cached objects");
        released
    }

    /// Cached objects with pending changes, in id order
    pub fn modified_objects(&self) -> Vec<SharedObject> {
        let cache = self.cache.borrow();
        let mut ids: Vec<u32> = cache
            .iter()
            .filter(|(_, obj)| obj.try_borrow().map_or(true, |o| o.is_modified()))
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids.iter().filter_map(|id| cache.get(id).cloned()).collect()
    }
}
