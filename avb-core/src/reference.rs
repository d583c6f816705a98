//! Object references and reference lists

use crate::file::AvbFile;
use crate::object::{AvbObject, SharedObject};
use crate::types::FourCC;
use crate::Result;

/// Handle to an object by its index in the owning file; `0` is null.
///
/// A reference does not own its target. Resolving goes through the file's
/// decode cache, so two references to the same index yield the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectRef {
    index: u32,
}

impl ObjectRef {
    pub const NULL: ObjectRef = ObjectRef { index: 0 };

    pub const fn new(index: u32) -> Self {
        Self { index }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn is_null(self) -> bool {
        self.index == 0
    }

    /// Reference to an object that already has a session id.
    pub fn of(obj: &AvbObject) -> Result<Self> {
        obj.instance_id()
            .map(Self::new)
            .ok_or(crate::Error::DetachedObject(obj.class().name))
    }

    pub fn resolve(self, file: &AvbFile) -> Result<Option<SharedObject>> {
        file.resolve(self)
    }

    /// Type code of the target chunk without decoding it.
    pub fn class_id(self, file: &AvbFile) -> Result<Option<FourCC>> {
        if self.is_null() {
            return Ok(None);
        }
        if let Some(obj) = file.cached(self.index) {
            return Ok(obj.borrow().class().class_id);
        }
        Ok(Some(file.read_chunk(self.index)?.class_id))
    }
}

/// Ordered references that resolve through the file on access.
///
/// Any mutation marks the list modified, which in turn marks its owner.
#[derive(Debug, Clone, Default)]
pub struct RefList {
    refs: Vec<ObjectRef>,
    modified: bool,
}

impl PartialEq for RefList {
    fn eq(&self, other: &Self) -> bool {
        self.refs == other.refs
    }
}

impl RefList {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clean list as decoded from disk.
    pub fn from_refs(refs: Vec<ObjectRef>) -> Self {
        Self {
            refs,
            modified: false,
        }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn refs(&self) -> &[ObjectRef] {
        &self.refs
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn get(&self, i: usize, file: &AvbFile) -> Result<Option<SharedObject>> {
        match self.refs.get(i) {
            Some(r) => r.resolve(file),
            None => Ok(None),
        }
    }

    /// Resolves each entry in order.
    pub fn iter<'a>(
        &'a self,
        file: &'a AvbFile,
    ) -> impl Iterator<Item = Result<Option<SharedObject>>> + 'a {
        self.refs.iter().map(move |r| r.resolve(file))
    }

    pub fn push(&mut self, r: ObjectRef) {
        self.refs.push(r);
        self.modified = true;
    }

    pub fn insert(&mut self, i: usize, r: ObjectRef) {
        self.refs.insert(i, r);
        self.modified = true;
    }

    pub fn remove(&mut self, i: usize) -> ObjectRef {
        self.modified = true;
        self.refs.remove(i)
    }

    pub fn pop(&mut self) -> Option<ObjectRef> {
        self.modified = true;
        self.refs.pop()
    }

    pub fn set(&mut self, i: usize, r: ObjectRef) {
        self.refs[i] = r;
        self.modified = true;
    }

    pub fn clear(&mut self) {
        self.refs.clear();
        self.modified = true;
    }

    pub fn extend(&mut self, refs: impl IntoIterator<Item = ObjectRef>) {
        self.refs.extend(refs);
        self.modified = true;
    }

    pub fn sort_by_key<K: Ord>(&mut self, f: impl FnMut(&ObjectRef) -> K) {
        self.refs.sort_by_key(f);
        self.modified = true;
    }

    pub fn reverse(&mut self) {
        self.refs.reverse();
        self.modified = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_ref() {
        assert!(ObjectRef::NULL.is_null());
        assert!(ObjectRef::default().is_null());
        assert!(!ObjectRef::new(3).is_null());
    }

    #[test]
    fn test_every_mutation_marks_list() {
        let mutations: [fn(&mut RefList); 9] = [
            |l: &mut RefList| l.push(ObjectRef::new(9)),
            |l: &mut RefList| l.insert(0, ObjectRef::new(9)),
            |l: &mut RefList| {
                l.remove(0);
            },
            |l: &mut RefList| {
                l.pop();
            },
            |l: &mut RefList| l.set(0, ObjectRef::new(9)),
            |l: &mut RefList| l.clear(),
            |l: &mut RefList| l.extend([ObjectRef::new(9)]),
            |l: &mut RefList| l.sort_by_key(|r| r.index()),
            |l: &mut RefList| l.reverse(),
        ];
        for mutate in mutations {
            let mut list = RefList::from_refs(vec![ObjectRef::new(2), ObjectRef::new(1)]);
            assert!(!list.is_modified());
            mutate(&mut list);
            assert!(list.is_modified());
        }
    }

    #[test]
    fn test_equality_ignores_dirty_state() {
        let clean = RefList::from_refs(vec![ObjectRef::new(1)]);
        let mut dirty = RefList::new();
        dirty.push(ObjectRef::new(1));
        assert_eq!(clean, dirty);
    }
}
