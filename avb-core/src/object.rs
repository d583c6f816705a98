//! Property-based object model
//!
//! Every decoded node is an [`AvbObject`]: a class pointer plus an ordered
//! list of `(property, value)` pairs. A property missing from the list was
//! not encoded in this file instance, which is distinct from a present
//! property holding a null or zero value.

use crate::file::AvbFile;
use crate::property::{PropertyDef, PropertyType};
use crate::registry::{registry, ClassDef};
use crate::types::{MobId, Rational, Rect, RgbColor};
use crate::{Error, ObjectRef, RefList, Result};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Decoded object shared through the file's reference cache.
pub type SharedObject = Rc<RefCell<AvbObject>>;

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// String stored behind the NUL lead-in as UTF-8; rewritten the same way.
    Utf8String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Ref(ObjectRef),
    RefList(RefList),
    List(Vec<Value>),
    Rational(Rational),
    Uuid(Uuid),
    MobId(MobId),
    Rect(Rect),
    Color(RgbColor),
    Object(Box<AvbObject>),
    /// Ordered name/value table.
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer narrowed to a wire width; `None` when absent or out of range.
    pub fn as_int_of<T: TryFrom<i64>>(&self) -> Option<T> {
        self.as_int().and_then(|v| T::try_from(v).ok())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Utf8String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Value::Ref(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&AvbObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut AvbObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Looks up an entry of a [`Value::Map`].
    pub fn entry(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Appends every non-null reference held by this value, depth first.
    pub fn collect_refs(&self, out: &mut Vec<ObjectRef>) {
        match self {
            Value::Ref(r) if !r.is_null() => out.push(*r),
            Value::RefList(list) => out.extend(list.refs().iter().filter(|r| !r.is_null())),
            Value::List(items) => items.iter().for_each(|v| v.collect_refs(out)),
            Value::Object(obj) => out.extend(obj.references()),
            Value::Map(entries) => entries.iter().for_each(|(_, v)| v.collect_refs(out)),
            _ => {}
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    i16 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f64 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    DateTime<Utc> => DateTime,
    ObjectRef => Ref,
    RefList => RefList,
    Vec<Value> => List,
    Rational => Rational,
    Uuid => Uuid,
    MobId => MobId,
    Rect => Rect,
    RgbColor => Color,
}

impl From<AvbObject> for Value {
    fn from(obj: AvbObject) -> Self {
        Value::Object(Box::new(obj))
    }
}

impl From<Option<&str>> for Value {
    fn from(s: Option<&str>) -> Self {
        s.map_or(Value::Null, Value::from)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map_or(Value::Null, Value::String)
    }
}

/// A decoded or constructed node of the object graph.
#[derive(Clone)]
pub struct AvbObject {
    class: &'static ClassDef,
    instance_id: Option<u32>,
    properties: Vec<(&'static str, Value)>,
    tracking: bool,
    modified: bool,
}

/// Field-for-field equality: same class, same present properties, same values.
impl PartialEq for AvbObject {
    fn eq(&self, other: &Self) -> bool {
        self.class.name == other.class.name
            && self.properties.len() == other.properties.len()
            && self
                .properties
                .iter()
                .all(|(name, value)| other.get_opt(name) == Some(value))
    }
}

impl fmt::Debug for AvbObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.class.name);
        if let Some(id) = self.instance_id {
            s.field("instance_id", &id);
        }
        for (name, value) in &self.properties {
            s.field(name, value);
        }
        s.finish()
    }
}

impl AvbObject {
    /// Blank instance in decoding mode: no defaults, no dirty tracking.
    pub fn empty(class: &'static ClassDef) -> Self {
        Self {
            class,
            instance_id: None,
            properties: Vec::new(),
            tracking: false,
            modified: false,
        }
    }

    /// Fresh instance with schema defaults applied and dirty tracking on.
    pub fn with_defaults(class: &'static ClassDef) -> Self {
        let mut obj = Self::empty(class);
        for def in class.property_defs() {
            if let Some(value) = def.default.to_value() {
                obj.properties.push((def.name, value));
            }
        }
        obj.tracking = true;
        obj.modified = true;
        obj
    }

    /// Fresh helper object decoded inline by its parent (e.g. `BinItem`).
    pub fn embedded(name: &str) -> Result<Self> {
        let class = registry()
            .class_by_name(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))?;
        if class.class_id.is_some() {
            return Err(Error::NotAnEmbeddedClass(class.name));
        }
        Ok(Self::with_defaults(class))
    }

    pub fn class(&self) -> &'static ClassDef {
        self.class
    }

    pub fn class_name(&self) -> &'static str {
        self.class.name
    }

    /// Session id: the chunk index for decoded objects.
    pub fn instance_id(&self) -> Option<u32> {
        self.instance_id
    }

    pub(crate) fn set_instance_id(&mut self, id: u32) {
        self.instance_id = Some(id);
    }

    /// Present properties in first-insert order.
    pub fn properties(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.properties.iter().map(|(n, v)| (*n, v))
    }

    fn property_def(&self, name: &str) -> Result<&'static PropertyDef> {
        registry()
            .property(self.class.name, name)
            .ok_or_else(|| Error::UnknownProperty {
                class: self.class.name,
                name: name.to_string(),
            })
    }

    fn mismatch(&self, name: &str) -> Error {
        match self.property_def(name) {
            Ok(def) => Error::PropertyTypeMismatch {
                class: self.class.name,
                name: name.to_string(),
                expected: def.kind,
            },
            Err(err) => err,
        }
    }

    /// Whether `name` was encoded (or set) on this instance.
    pub fn has(&self, name: &str) -> bool {
        self.properties.iter().any(|(n, _)| *n == name)
    }

    pub fn get_opt(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// Value of a present property; absence is an error.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.get_opt(name).ok_or_else(|| Error::AttributeNotFound {
            class: self.class.name,
            name: name.to_string(),
        })
    }

    /// Stores a declared property, keeping its first-insert position.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let def = self.property_def(name)?;
        let value = value.into();
        if !def.kind.accepts(&value) {
            return Err(Error::PropertyTypeMismatch {
                class: self.class.name,
                name: def.name.to_string(),
                expected: def.kind,
            });
        }
        match self.properties.iter_mut().find(|(n, _)| *n == def.name) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((def.name, value)),
        }
        self.mark_modified();
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.properties.iter().position(|(n, _)| *n == name)?;
        self.mark_modified();
        Some(self.properties.remove(pos).1)
    }

    /// Mutable access to a present property; marks the object modified.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Value> {
        let class = self.class.name;
        self.mark_modified();
        self.properties
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| Error::AttributeNotFound {
                class,
                name: name.to_string(),
            })
    }

    pub fn get_list_mut(&mut self, name: &str) -> Result<&mut Vec<Value>> {
        if !matches!(self.get(name)?, Value::List(_)) {
            return Err(self.mismatch(name));
        }
        match self.get_mut(name)? {
            Value::List(items) => Ok(items),
            _ => unreachable!("checked above"),
        }
    }

    /// The list tracks its own mutations; see [`AvbObject::is_modified`].
    pub fn get_ref_list_mut(&mut self, name: &str) -> Result<&mut RefList> {
        let class = self.class.name;
        let pos = self
            .properties
            .iter()
            .position(|(n, _)| *n == name)
            .ok_or_else(|| Error::AttributeNotFound {
                class,
                name: name.to_string(),
            })?;
        if !matches!(self.properties[pos].1, Value::RefList(_)) {
            return Err(self.mismatch(name));
        }
        match &mut self.properties[pos].1 {
            Value::RefList(list) => Ok(list),
            _ => unreachable!("checked above"),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.get(name)?.as_int().ok_or_else(|| self.mismatch(name))
    }

    /// Integer property narrowed to its wire width; out-of-range values are a mismatch.
    pub fn get_int_as<T: TryFrom<i64>>(&self, name: &str) -> Result<T> {
        self.get(name)?.as_int_of().ok_or_else(|| self.mismatch(name))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.get(name)?.as_bool().ok_or_else(|| self.mismatch(name))
    }

    pub fn get_float(&self, name: &str) -> Result<f64> {
        match self.get(name)? {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            _ => Err(self.mismatch(name)),
        }
    }

    /// String value; an absent-string sentinel reads as `""`.
    pub fn get_str(&self, name: &str) -> Result<&str> {
        Ok(self.get_str_opt(name)?.unwrap_or(""))
    }

    /// String value; `None` for the absent-string sentinel.
    pub fn get_str_opt(&self, name: &str) -> Result<Option<&str>> {
        match self.get(name)? {
            Value::String(s) | Value::Utf8String(s) => Ok(Some(s)),
            Value::Null => Ok(None),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_bytes(&self, name: &str) -> Result<&[u8]> {
        match self.get(name)? {
            Value::Bytes(data) => Ok(data),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_ref(&self, name: &str) -> Result<ObjectRef> {
        self.get(name)?.as_reference().ok_or_else(|| self.mismatch(name))
    }

    pub fn get_list(&self, name: &str) -> Result<&[Value]> {
        match self.get(name)? {
            Value::List(items) => Ok(items),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_map(&self, name: &str) -> Result<&[(String, Value)]> {
        match self.get(name)? {
            Value::Map(entries) => Ok(entries),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_ref_list(&self, name: &str) -> Result<&RefList> {
        match self.get(name)? {
            Value::RefList(list) => Ok(list),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_object(&self, name: &str) -> Result<&AvbObject> {
        self.get(name)?.as_object().ok_or_else(|| self.mismatch(name))
    }

    pub fn get_mob_id(&self, name: &str) -> Result<MobId> {
        match self.get(name)? {
            Value::MobId(id) => Ok(*id),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_uuid(&self, name: &str) -> Result<Uuid> {
        match self.get(name)? {
            Value::Uuid(id) => Ok(*id),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_datetime(&self, name: &str) -> Result<DateTime<Utc>> {
        match self.get(name)? {
            Value::DateTime(t) => Ok(*t),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_rational(&self, name: &str) -> Result<Rational> {
        match self.get(name)? {
            Value::Rational(v) => Ok(*v),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_rect(&self, name: &str) -> Result<Rect> {
        match self.get(name)? {
            Value::Rect(v) => Ok(*v),
            _ => Err(self.mismatch(name)),
        }
    }

    pub fn get_color(&self, name: &str) -> Result<RgbColor> {
        match self.get(name)? {
            Value::Color(v) => Ok(*v),
            _ => Err(self.mismatch(name)),
        }
    }

    /// Dereferences a reference property through `file`.
    pub fn resolve(&self, file: &AvbFile, name: &str) -> Result<Option<SharedObject>> {
        self.get_ref(name)?.resolve(file)
    }

    /// All non-null references held by present properties, in schema order.
    pub fn references(&self) -> Vec<ObjectRef> {
        let mut out = Vec::new();
        for def in self.class.property_defs() {
            if let Some(value) = self.get_opt(def.name) {
                value.collect_refs(&mut out);
            }
        }
        out
    }

    pub fn is_modified(&self) -> bool {
        self.modified
            || self
                .properties
                .iter()
                .any(|(_, v)| matches!(v, Value::RefList(list) if list.is_modified()))
    }

    pub fn mark_modified(&mut self) {
        if self.tracking {
            self.modified = true;
        }
    }

    /// Leaves decoding mode; later mutations are tracked.
    pub fn finish_decoding(&mut self) {
        self.tracking = true;
        self.modified = false;
        for (_, value) in &mut self.properties {
            match value {
                Value::Object(obj) => obj.finish_decoding(),
                Value::List(items) => items
                    .iter_mut()
                    .filter_map(Value::as_object_mut)
                    .for_each(AvbObject::finish_decoding),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::{bin, components};

    #[test]
    fn test_absent_is_distinct_from_null() {
        let mut obj = AvbObject::empty(&components::FILLER);
        assert!(!obj.has("name"));
        assert!(matches!(
            obj.get("name"),
            Err(Error::AttributeNotFound { name, .. }) if name == "name"
        ));

        obj.set("name", Value::Null).unwrap();
        assert!(obj.has("name"));
        assert_eq!(obj.get_str("name").unwrap(), "");
        assert_eq!(obj.get_str_opt("name").unwrap(), None);
    }

    #[test]
    fn test_set_checks_declared_type() {
        let mut obj = AvbObject::empty(&components::FILLER);
        assert!(matches!(
            obj.set("length", "long"),
            Err(Error::PropertyTypeMismatch { .. })
        ));
        assert!(matches!(
            obj.set("no_such_field", 1),
            Err(Error::UnknownProperty { .. })
        ));
        obj.set("length", 100u32).unwrap();
        assert_eq!(obj.get_int("length").unwrap(), 100);
    }

    #[test]
    fn test_narrowing_rejects_out_of_range() {
        let mut obj = AvbObject::empty(&components::TRACK_REF);
        obj.set("relative_track", -1i16).unwrap();
        assert_eq!(obj.get_int_as::<i16>("relative_track").unwrap(), -1);

        *obj.get_mut("relative_track").unwrap() = Value::Int(70_000);
        assert!(matches!(
            obj.get_int_as::<i16>("relative_track"),
            Err(Error::PropertyTypeMismatch { expected: PropertyType::Int16, .. })
        ));
        assert_eq!(Value::Int(-1).as_int_of::<u8>(), None);
    }

    #[test]
    fn test_first_insert_order_is_kept() {
        let mut obj = AvbObject::empty(&components::FILLER);
        obj.set("length", 1u32).unwrap();
        obj.set("name", "a").unwrap();
        obj.set("length", 2u32).unwrap();
        let names: Vec<_> = obj.properties().map(|(n, _)| n).collect();
        assert_eq!(names, ["length", "name"]);
    }

    #[test]
    fn test_dirty_tracking() {
        let mut obj = AvbObject::empty(&components::FILLER);
        obj.set("length", 10u32).unwrap();
        assert!(!obj.is_modified(), "decoding mode does not track");

        obj.finish_decoding();
        assert!(!obj.is_modified());
        obj.set("length", 11u32).unwrap();
        assert!(obj.is_modified());
    }

    #[test]
    fn test_ref_list_mutation_marks_owner() {
        let mut obj = AvbObject::empty(&components::SEQUENCE);
        obj.set("components", RefList::from_refs(vec![ObjectRef::new(1)]))
            .unwrap();
        obj.finish_decoding();
        assert!(!obj.is_modified());

        obj.get_ref_list_mut("components")
            .unwrap()
            .push(ObjectRef::new(2));
        assert!(obj.is_modified());
        assert_eq!(obj.references(), [ObjectRef::new(1), ObjectRef::new(2)]);
    }

    #[test]
    fn test_embedded_helpers() {
        let item = AvbObject::embedded("BinItem").unwrap();
        assert_eq!(item.class_name(), "BinItem");
        assert!(item.has("x"));
        assert!(matches!(
            AvbObject::embedded("Bin"),
            Err(Error::NotAnEmbeddedClass("Bin"))
        ));
        assert!(matches!(
            AvbObject::embedded("Nope"),
            Err(Error::UnknownClass(_))
        ));
        assert_eq!(bin::BIN_ITEM.name, "BinItem");
    }
}
