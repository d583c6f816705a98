//! Declared property schema

use crate::object::Value;
use crate::types::{Rational, Rect, RgbColor};
use crate::{ObjectRef, RefList};

/// Semantic type of a declared property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    Float,
    String,
    Bytes,
    DateTime,
    Reference,
    RefList,
    List,
    Rational,
    Uuid,
    MobId,
    Rect,
    Color,
    /// Nested helper object or a name/value table.
    Composite,
    /// Integer, float or reference depending on a sibling discriminant.
    Variant,
}

impl PropertyType {
    /// Whether `value` may be stored under a property of this type.
    pub fn accepts(self, value: &Value) -> bool {
        use PropertyType as T;

        fn in_range(value: &Value, min: i64, max: i64) -> bool {
            matches!(value, Value::Int(v) if (min..=max).contains(v))
        }

        match self {
            T::Bool => matches!(value, Value::Bool(_)),
            T::Int8 => in_range(value, i8::MIN as i64, i8::MAX as i64),
            T::UInt8 => in_range(value, 0, u8::MAX as i64),
            T::Int16 => in_range(value, i16::MIN as i64, i16::MAX as i64),
            T::UInt16 => in_range(value, 0, u16::MAX as i64),
            T::Int32 => in_range(value, i32::MIN as i64, i32::MAX as i64),
            T::UInt32 => in_range(value, 0, u32::MAX as i64),
            T::Int64 => matches!(value, Value::Int(_)),
            T::Float => matches!(value, Value::Float(_)),
            T::String => matches!(value, Value::String(_) | Value::Utf8String(_) | Value::Null),
            T::Bytes => matches!(value, Value::Bytes(_)),
            T::DateTime => matches!(value, Value::DateTime(_)),
            T::Reference => matches!(value, Value::Ref(_)),
            T::RefList => matches!(value, Value::RefList(_)),
            T::List => matches!(value, Value::List(_)),
            T::Rational => matches!(value, Value::Rational(_)),
            T::Uuid => matches!(value, Value::Uuid(_)),
            T::MobId => matches!(value, Value::MobId(_)),
            T::Rect => matches!(value, Value::Rect(_)),
            T::Color => matches!(value, Value::Color(_)),
            T::Composite => matches!(value, Value::Object(_) | Value::Map(_)),
            T::Variant => matches!(value, Value::Int(_) | Value::Float(_) | Value::Ref(_)),
        }
    }
}

/// Schema default applied to freshly constructed objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    /// Left absent.
    None,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
    EmptyList,
    EmptyRefList,
    EmptyMap,
    NullRef,
    Rect(Rect),
    Color(RgbColor),
    Rational(Rational),
}

impl DefaultValue {
    pub fn to_value(self) -> Option<Value> {
        Some(match self {
            DefaultValue::None => return None,
            DefaultValue::Null => Value::Null,
            DefaultValue::Bool(v) => Value::Bool(v),
            DefaultValue::Int(v) => Value::Int(v),
            DefaultValue::Float(v) => Value::Float(v),
            DefaultValue::Str(s) => Value::String(s.to_string()),
            DefaultValue::EmptyList => Value::List(Vec::new()),
            DefaultValue::EmptyRefList => Value::RefList(RefList::new()),
            DefaultValue::EmptyMap => Value::Map(Vec::new()),
            DefaultValue::NullRef => Value::Ref(ObjectRef::NULL),
            DefaultValue::Rect(v) => Value::Rect(v),
            DefaultValue::Color(v) => Value::Color(v),
            DefaultValue::Rational(v) => Value::Rational(v),
        })
    }
}

/// One declared property: short name, legacy tag name, type and default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyDef {
    pub name: &'static str,
    pub long_name: &'static str,
    pub kind: PropertyType,
    pub default: DefaultValue,
}

impl PropertyDef {
    pub const fn new(name: &'static str, long_name: &'static str, kind: PropertyType) -> Self {
        Self {
            name,
            long_name,
            kind,
            default: DefaultValue::None,
        }
    }

    pub const fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_ranges() {
        assert!(PropertyType::Int16.accepts(&Value::Int(-32768)));
        assert!(!PropertyType::Int16.accepts(&Value::Int(40000)));
        assert!(PropertyType::UInt16.accepts(&Value::Int(40000)));
        assert!(!PropertyType::UInt8.accepts(&Value::Int(-1)));
        assert!(!PropertyType::Int32.accepts(&Value::Float(1.0)));
    }

    #[test]
    fn test_string_accepts_null() {
        assert!(PropertyType::String.accepts(&Value::Null));
        assert!(PropertyType::String.accepts(&Value::String("x".into())));
        assert!(!PropertyType::Reference.accepts(&Value::Null));
    }

    #[test]
    fn test_default_values() {
        let def = PropertyDef::new("name", "OMFI:CPNT:Name", PropertyType::String)
            .with_default(DefaultValue::Str("Untitled"));
        assert_eq!(def.default.to_value(), Some(Value::String("Untitled".into())));
        assert_eq!(DefaultValue::None.to_value(), None);
    }
}
