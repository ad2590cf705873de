use crate::config::MAX_VALUE_DEPTH;
use indexmap::IndexMap;
use serde::de::{self, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Ordered mapping used for structured values and snapshots.
pub type ValueMap = IndexMap<String, Value>;

/// A stored value.
///
/// Leaves of the route tree hold a `Value`; snapshots of the tree are a
/// `Value::Map` whose nested maps mirror the branches.
///
/// Deserializing refuses anything nested deeper than [`MAX_VALUE_DEPTH`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Empty map, the snapshot of an empty tree.
    pub fn empty_map() -> Self {
        Value::Map(ValueMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Nesting depth: 1 for a scalar or an empty container, plus one for
    /// every list or map around the deepest element.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1usize)];
        while let Some((value, level)) = pending.pop() {
            deepest = deepest.max(level);
            match value {
                Value::List(items) => pending.extend(items.iter().map(|item| (item, level + 1))),
                Value::Map(map) => pending.extend(map.values().map(|item| (item, level + 1))),
                _ => {}
            }
        }
        deepest
    }

    /// Short name of the variant, used in log fields.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

const VARIANTS: &[&str] = &["Null", "Bool", "Int", "Float", "String", "List", "Map"];

#[derive(Deserialize)]
#[serde(variant_identifier)]
enum Tag {
    Null,
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
}

/// Decodes one `Value` found `level` containers deep.
#[derive(Clone, Copy)]
struct ValueSeed {
    level: usize,
}

impl ValueSeed {
    fn child(self) -> Self {
        Self {
            level: self.level + 1,
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ValueSeed { level: 1 }.deserialize(deserializer)
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        if self.level > MAX_VALUE_DEPTH {
            return Err(de::Error::custom(format_args!(
                "value nested deeper than {MAX_VALUE_DEPTH} levels"
            )));
        }
        deserializer.deserialize_enum("Value", VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for ValueSeed {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("enum Value")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Value, A::Error> {
        let (tag, variant) = data.variant::<Tag>()?;
        match tag {
            Tag::Null => variant.unit_variant().map(|()| Value::Null),
            Tag::Bool => variant.newtype_variant().map(Value::Bool),
            Tag::Int => variant.newtype_variant().map(Value::Int),
            Tag::Float => variant.newtype_variant().map(Value::Float),
            Tag::String => variant.newtype_variant().map(Value::String),
            Tag::List => variant.newtype_variant_seed(ListSeed(self.child())).map(Value::List),
            Tag::Map => variant.newtype_variant_seed(MapSeed(self.child())).map(Value::Map),
        }
    }
}

struct ListSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for ListSeed {
    type Value = Vec<Value>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Vec<Value>, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ListSeed {
    type Value = Vec<Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of values")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<Value>, A::Error> {
        // length prefixes come from the peer; never trust them for allocation
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element_seed(self.0)? {
            items.push(item);
        }
        Ok(items)
    }
}

struct MapSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for MapSeed {
    type Value = ValueMap;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<ValueMap, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for MapSeed {
    type Value = ValueMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ValueMap, A::Error> {
        let mut map = ValueMap::with_capacity(access.size_hint().unwrap_or(0).min(1024));
        while let Some(key) = access.next_key::<String>()? {
            let value = access.next_value_seed(self.0)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(i: $t) -> Self {
                Value::Int(i64::from(i))
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(f64::from(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Value::from(30), Value::Int(30));
        assert_eq!(Value::from("Alice"), Value::String("Alice".into()));
        assert_eq!(Value::from(vec![1, 2]), Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
    }

    #[test]
    fn display_is_readable() {
        let mut profile = ValueMap::new();
        profile.insert("name".into(), "Alice".into());
        profile.insert("age".into(), 30.into());
        let mut root = ValueMap::new();
        root.insert("profile".into(), Value::Map(profile));

        assert_eq!(
            Value::Map(root).to_string(),
            r#"{"profile": {"name": "Alice", "age": 30}}"#
        );
    }

    /// `levels` deep: the innermost int wrapped in `levels - 1` lists.
    fn nested(levels: usize) -> Value {
        let mut value = Value::Int(1);
        for _ in 1..levels {
            value = Value::List(vec![value]);
        }
        value
    }

    #[test]
    fn depth_counts_containers() {
        assert_eq!(Value::Null.depth(), 1);
        assert_eq!(Value::empty_map().depth(), 1);
        assert_eq!(Value::from(vec![1, 2]).depth(), 2);

        let mut inner = ValueMap::new();
        inner.insert("list".into(), vec![1].into());
        let mut outer = ValueMap::new();
        outer.insert("flat".into(), 1.into());
        outer.insert("inner".into(), Value::Map(inner));
        assert_eq!(Value::Map(outer).depth(), 4);
        assert_eq!(nested(MAX_VALUE_DEPTH).depth(), MAX_VALUE_DEPTH);
    }

    #[test]
    fn wire_decoding_stops_at_max_depth() {
        let at_limit = nested(MAX_VALUE_DEPTH);
        let bytes = bincode::serialize(&at_limit).unwrap();
        assert_eq!(bincode::deserialize::<Value>(&bytes).unwrap(), at_limit);

        let past_limit = bincode::serialize(&nested(MAX_VALUE_DEPTH + 1)).unwrap();
        let err = bincode::deserialize::<Value>(&past_limit).unwrap_err();
        assert!(err.to_string().contains("nested deeper"));
    }

    #[test]
    fn self_describing_formats_still_decode() {
        let mut map = ValueMap::new();
        map.insert("name".into(), "Alice".into());
        map.insert("tags".into(), vec!["a", "b"].into());
        map.insert("none".into(), Value::Null);
        let value = Value::Map(map);

        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), value);
    }
}
