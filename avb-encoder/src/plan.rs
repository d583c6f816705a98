//! Write-order planning
//!
//! Chunk indices are assigned before anything is encoded, so every
//! reference can be rewritten as soon as its owner is written:
//!
//! 1. each top-level node referenced by the content (e.g. every mob of a
//!    bin), in schema order, followed by its breadth-first dependency
//!    subgraph;
//! 2. the content class's deferred singletons (e.g. a bin's view setting and
//!    attributes), the same way;
//! 3. the content object itself, with the highest index.

use crate::Result;
use avb_core::{AvbFile, ChunkMapping, Error as CoreError, ObjectRef, SharedObject};
use std::collections::VecDeque;
use tracing::trace;

/// Objects in chunk order plus the session id to chunk index mapping
#[derive(Debug, Default)]
pub struct WritePlan {
    objects: Vec<SharedObject>,
    mapping: ChunkMapping,
}

impl WritePlan {
    /// Plans the chunk order of everything reachable from the file's content
    pub fn build(file: &AvbFile) -> Result<Self> {
        let content = file.content()?;
        let (content_id, top_level, deferred) = {
            let obj = content.borrow();
            let class = obj.class();
            let content_id = obj
                .instance_id()
                .ok_or(CoreError::DetachedObject(class.name))?;

            let mut top_level = Vec::new();
            for def in class.property_defs() {
                if class.deferred_refs.contains(&def.name) {
                    continue;
                }
                if let Some(value) = obj.get_opt(def.name) {
                    value.collect_refs(&mut top_level);
                }
            }
            let mut deferred = Vec::new();
            for name in class.deferred_refs {
                if let Some(value) = obj.get_opt(name) {
                    value.collect_refs(&mut deferred);
                }
            }
            (content_id, top_level, deferred)
        };

        let mut plan = Self::default();
        // Reserved so back references never pull the content forward.
        plan.mapping.insert(content_id, 0);
        for r in top_level.into_iter().chain(deferred) {
            plan.visit(file, r)?;
        }

        let index = plan.objects.len() as u32 + 1;
        plan.mapping.insert(content_id, index);
        trace!(index, session_id = content_id, "planned content");
        plan.objects.push(content);
        Ok(plan)
    }

    /// Assigns `start` and then its unvisited dependencies, breadth first
    fn visit(&mut self, file: &AvbFile, start: ObjectRef) -> Result<()> {
        let mut queue = VecDeque::from([start]);
        while let Some(r) = queue.pop_front() {
            if self.mapping.contains_key(&r.index()) {
                continue;
            }
            let Some(obj) = file.resolve(r)? else {
                continue;
            };

            let index = self.objects.len() as u32 + 1;
            self.mapping.insert(r.index(), index);
            {
                let obj = obj.borrow();
                trace!(index, session_id = r.index(), class = obj.class_name(), "planned chunk");
                queue.extend(obj.references());
            }
            self.objects.push(obj);
        }
        Ok(())
    }

    /// Number of chunks to write
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in chunk order; the object at position `i` gets index `i + 1`
    pub fn objects(&self) -> &[SharedObject] {
        &self.objects
    }

    pub fn mapping(&self) -> &ChunkMapping {
        &self.mapping
    }

    /// Chunk index assigned to a session id
    pub fn index_of(&self, session_id: u32) -> Option<u32> {
        self.mapping.get(&session_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avb_core::classes::{bin, trackgroups};
    use avb_core::{AvbObject, RefList};

    fn id(obj: &SharedObject) -> u32 {
        obj.borrow().instance_id().unwrap()
    }

    fn mob_with_sequence(file: &AvbFile) -> (SharedObject, SharedObject, SharedObject) {
        let mob = file.create("Composition").unwrap();
        let seq = file.create("Sequence").unwrap();
        let filler = file.create("Filler").unwrap();

        seq.borrow_mut()
            .set("components", RefList::from_refs(vec![ObjectRef::new(id(&filler))]))
            .unwrap();
        let mut track = AvbObject::embedded("Track").unwrap();
        track.set("index", 1i16).unwrap();
        track.set("component", ObjectRef::new(id(&seq))).unwrap();
        trackgroups::add_track(&mut mob.borrow_mut(), track).unwrap();
        (mob, seq, filler)
    }

    #[test]
    fn test_empty_bin_order() {
        let file = AvbFile::new().unwrap();
        let plan = WritePlan::build(&file).unwrap();

        let classes: Vec<_> = plan.objects().iter().map(|o| o.borrow().class_name()).collect();
        assert_eq!(classes, ["BinViewSetting", "Attributes", "Bin"]);
        let content = file.content().unwrap();
        assert_eq!(plan.index_of(id(&content)), Some(3));
    }

    #[test]
    fn test_mobs_before_singletons() {
        let file = AvbFile::new().unwrap();
        let (first, seq, filler) = mob_with_sequence(&file);
        let (second, _, _) = mob_with_sequence(&file);

        let content = file.content().unwrap();
        bin::add_mob(&mut content.borrow_mut(), ObjectRef::new(id(&first))).unwrap();
        bin::add_mob(&mut content.borrow_mut(), ObjectRef::new(id(&second))).unwrap();
        // A second item for the same mob must not duplicate it.
        bin::add_mob(&mut content.borrow_mut(), ObjectRef::new(id(&first))).unwrap();

        let plan = WritePlan::build(&file).unwrap();
        let classes: Vec<_> = plan.objects().iter().map(|o| o.borrow().class_name()).collect();
        assert_eq!(
            classes,
            [
                "Composition",
                "Sequence",
                "Filler",
                "Composition",
                "Sequence",
                "Filler",
                "BinViewSetting",
                "Attributes",
                "Bin",
            ]
        );
        assert_eq!(plan.index_of(id(&first)), Some(1));
        assert_eq!(plan.index_of(id(&seq)), Some(2));
        assert_eq!(plan.index_of(id(&filler)), Some(3));
        assert_eq!(plan.index_of(id(&second)), Some(4));
        assert_eq!(plan.len(), 9);
    }

    #[test]
    fn test_back_reference_to_content() {
        let file = AvbFile::new().unwrap();
        let content = file.content().unwrap();
        let seq = file.create("Sequence").unwrap();
        seq.borrow_mut()
            .set("components", RefList::from_refs(vec![ObjectRef::new(id(&content))]))
            .unwrap();
        bin::add_mob(&mut content.borrow_mut(), ObjectRef::new(id(&seq))).unwrap();

        let plan = WritePlan::build(&file).unwrap();
        assert_eq!(plan.index_of(id(&seq)), Some(1));
        assert_eq!(plan.index_of(id(&content)), Some(plan.len() as u32));
    }

    #[test]
    fn test_dangling_reference_fails() {
        let file = AvbFile::new().unwrap();
        let content = file.content().unwrap();
        bin::add_mob(&mut content.borrow_mut(), ObjectRef::new(99)).unwrap();

        assert!(matches!(
            WritePlan::build(&file),
            Err(crate::Error::Core(CoreError::InvalidReferenceIndex { index: 99, .. }))
        ));
    }
}
