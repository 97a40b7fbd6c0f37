//! The typed value model stored in chunks.
//!
//! A [`Value`] is encoded into exactly one chunk. Composite values (lists,
//! sets, maps, structs) are stored inline in their parent's chunk; the only
//! edges between chunks are [`Ref`]s. [`Value::chunks`] enumerates those
//! edges, which is what the value store validates and the walker follows.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::Hash;

/// Static type of a [`Value`].
///
/// `Type::Value` is the universal type: every value conforms to it. Struct
/// types are nominal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Number,
    String,
    Blob,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Struct(String),
    Ref(Box<Type>),
    Value,
}

impl Type {
    /// Shorthand for `Ref<target>`.
    pub fn ref_of(target: Type) -> Self {
        Self::Ref(Box::new(target))
    }

    /// Returns `true` for the universal type.
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value)
    }

    /// Common type of a collection's elements: the shared type when all
    /// elements agree, `Value` when they differ or there are none.
    fn unify<'a>(mut types: impl Iterator<Item = Type> + 'a) -> Type {
        let Some(first) = types.next() else {
            return Type::Value;
        };
        if types.all(|t| t == first) {
            first
        } else {
            Type::Value
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "Bool"),
            Self::Number => write!(f, "Number"),
            Self::String => write!(f, "String"),
            Self::Blob => write!(f, "Blob"),
            Self::List(t) => write!(f, "List<{t}>"),
            Self::Set(t) => write!(f, "Set<{t}>"),
            Self::Map(k, v) => write!(f, "Map<{k}, {v}>"),
            Self::Struct(name) => write!(f, "Struct {name}"),
            Self::Ref(t) => write!(f, "Ref<{t}>"),
            Self::Value => write!(f, "Value"),
        }
    }
}

/// A typed pointer to the chunk holding a value.
///
/// `target_type` is the declared type of the value the ref should resolve to.
/// `height` is 1 for a value without refs and otherwise one more than the
/// tallest ref it contains, so a chunk is always taller than its children.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ref {
    target: Hash,
    target_type: Type,
    height: u64,
}

impl Ref {
    /// Build a ref to `value`, computing its hash, type, and height.
    pub fn new(value: &Value) -> Self {
        Self::with_target(crate::codec::value_hash(value), value)
    }

    /// Build a ref to `value` whose encoded hash is already known.
    pub fn with_target(target: Hash, value: &Value) -> Self {
        let height = value.chunks().iter().map(Ref::height).max().unwrap_or(0) + 1;
        Self {
            target,
            target_type: value.type_of(),
            height,
        }
    }

    /// Build a ref from already-known parts.
    pub fn from_parts(target: Hash, target_type: Type, height: u64) -> Self {
        Self {
            target,
            target_type,
            height,
        }
    }

    pub fn target(&self) -> Hash {
        self.target
    }

    pub fn target_type(&self) -> &Type {
        &self.target_type
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// The same target with a different declared type.
    pub fn retyped(&self, target_type: Type) -> Self {
        Self {
            target_type,
            ..self.clone()
        }
    }
}

/// A named record with ordered fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Struct {
    pub name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Struct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// A typed, possibly composite object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Number(i64),
    String(String),
    Blob(Vec<u8>),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<Value, Value>),
    Struct(Struct),
    Ref(Ref),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(items.into_iter().collect())
    }

    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Set(items.into_iter().collect())
    }

    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self::Map(entries.into_iter().collect())
    }

    /// The static type of this value.
    pub fn type_of(&self) -> Type {
        match self {
            Self::Bool(_) => Type::Bool,
            Self::Number(_) => Type::Number,
            Self::String(_) => Type::String,
            Self::Blob(_) => Type::Blob,
            Self::List(items) => Type::List(Box::new(Type::unify(items.iter().map(Value::type_of)))),
            Self::Set(items) => Type::Set(Box::new(Type::unify(items.iter().map(Value::type_of)))),
            Self::Map(entries) => Type::Map(
                Box::new(Type::unify(entries.keys().map(Value::type_of))),
                Box::new(Type::unify(entries.values().map(Value::type_of))),
            ),
            Self::Struct(s) => Type::Struct(s.name.clone()),
            Self::Ref(r) => Type::ref_of(r.target_type().clone()),
        }
    }

    /// The direct outgoing references of this value.
    ///
    /// Inline composites are searched recursively; refs are not followed.
    pub fn chunks(&self) -> Vec<Ref> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut Vec<Ref>) {
        match self {
            Self::Bool(_) | Self::Number(_) | Self::String(_) | Self::Blob(_) => {}
            Self::List(items) => items.iter().for_each(|v| v.collect_refs(out)),
            Self::Set(items) => items.iter().for_each(|v| v.collect_refs(out)),
            Self::Map(entries) => {
                for (k, v) in entries {
                    k.collect_refs(out);
                    v.collect_refs(out);
                }
            }
            Self::Struct(s) => s.fields.values().for_each(|v| v.collect_refs(out)),
            Self::Ref(r) => out.push(r.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_value(&self) -> Option<&Ref> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<Value, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Struct> for Value {
    fn from(s: Struct) -> Self {
        Self::Struct(s)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Self::Ref(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types() {
        assert_eq!(Value::Bool(true).type_of(), Type::Bool);
        assert_eq!(Value::Number(4).type_of(), Type::Number);
        assert_eq!(Value::from("x").type_of(), Type::String);
        assert_eq!(Value::Blob(vec![1]).type_of(), Type::Blob);
    }

    #[test]
    fn homogeneous_collections_keep_element_type() {
        let l = Value::list([Value::Number(1), Value::Number(2)]);
        assert_eq!(l.type_of(), Type::List(Box::new(Type::Number)));
        let m = Value::map([(Value::from("k"), Value::Bool(false))]);
        assert_eq!(m.type_of(), Type::Map(Box::new(Type::String), Box::new(Type::Bool)));
    }

    #[test]
    fn mixed_or_empty_collections_are_value_typed() {
        let l = Value::list([Value::Number(1), Value::from("a")]);
        assert_eq!(l.type_of(), Type::List(Box::new(Type::Value)));
        assert_eq!(Value::Set(Default::default()).type_of(), Type::Set(Box::new(Type::Value)));
    }

    #[test]
    fn struct_types_are_nominal() {
        let s = Struct::new("Point").with("x", Value::Number(1));
        let t = Struct::new("Point").with("y", Value::from("z"));
        assert_eq!(Value::from(s).type_of(), Value::from(t).type_of());
    }

    #[test]
    fn leaf_ref_has_height_one() {
        let r = Ref::new(&Value::from("leaf"));
        assert_eq!(r.height(), 1);
        assert_eq!(r.target_type(), &Type::String);
    }

    #[test]
    fn height_grows_through_refs() {
        let leaf = Ref::new(&Value::from("leaf"));
        let mid = Value::list([Value::Ref(leaf.clone())]);
        let mid_ref = Ref::new(&mid);
        assert_eq!(mid_ref.height(), 2);
        let top = Ref::new(&Value::list([Value::Ref(mid_ref), Value::Ref(leaf)]));
        assert_eq!(top.height(), 3);
    }

    #[test]
    fn chunks_finds_nested_refs_but_does_not_follow_them() {
        let a = Ref::new(&Value::from("a"));
        let b = Ref::new(&Value::from("b"));
        let v = Value::from(
            Struct::new("Holder")
                .with("one", Value::Ref(a.clone()))
                .with("many", Value::map([(Value::from("k"), Value::list([Value::Ref(b.clone())]))])),
        );
        let refs = v.chunks();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&a));
        assert!(refs.contains(&b));
    }

    #[test]
    fn ref_value_type_wraps_target_type() {
        let r = Ref::new(&Value::Number(3));
        assert_eq!(Value::Ref(r).type_of(), Type::ref_of(Type::Number));
    }

    #[test]
    fn type_display() {
        let t = Type::Map(Box::new(Type::String), Box::new(Type::ref_of(Type::Struct("Commit".into()))));
        assert_eq!(t.to_string(), "Map<String, Ref<Struct Commit>>");
    }
}
