//! # Snapshot Formats
//!
//! Named codecs turning a store snapshot into bytes and back.
//!
//! ## Formats
//! - **JSON**: pretty-printed object, via `serde_json` (insertion order preserved)
//! - **YAML**: block mapping, via `serde_yaml`
//!
//! Codecs are selected by a case-insensitive name (`"json"`, `"yaml"`, `"yml"`);
//! anything else is `UnsupportedCodec`.
//!
//! ## Round trip
//! `decode(encode(s)) == s` for every snapshot built from finite numbers. JSON
//! refuses to encode NaN or infinities. Integers beyond `i64` decode as floats.
//!
//! ## Usage
//! ```rust
//! use nemoria::persistence::Codec;
//! use nemoria::store::{Value, ValueMap};
//!
//! let codec: Codec = "JSON".parse().unwrap();
//! let mut map = ValueMap::new();
//! map.insert("name".into(), "Alice".into());
//! let snapshot = Value::Map(map);
//!
//! let bytes = codec.encode(&snapshot).unwrap();
//! assert_eq!(codec.decode(&bytes).unwrap(), snapshot);
//! ```

use crate::error::{constants, NemoriaError, Result};
use crate::store::value::{Value, ValueMap};
use std::fmt;
use std::str::FromStr;

/// Supported on-disk formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Codec {
    /// Human-readable JSON (default)
    #[default]
    Json,
    /// YAML block mapping
    Yaml,
}

impl Codec {
    /// Every supported codec, in preference order.
    pub const ALL: [Codec; 2] = [Codec::Json, Codec::Yaml];

    /// Resolve a codec by name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            "yaml" | "yml" => Ok(Codec::Yaml),
            _ => Err(NemoriaError::UnsupportedCodec(name.to_string())),
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Codec::Json => "JSON",
            Codec::Yaml => "YAML",
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Yaml => "yaml",
        }
    }

    /// Serialize a snapshot.
    pub fn encode(self, snapshot: &Value) -> Result<Vec<u8>> {
        match self {
            Codec::Json => {
                let json = to_json(snapshot)?;
                let mut bytes = serde_json::to_vec_pretty(&json)
                    .map_err(|e| NemoriaError::PersistenceError(e.to_string()))?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            Codec::Yaml => serde_yaml::to_string(&to_yaml(snapshot))
                .map(String::into_bytes)
                .map_err(|e| NemoriaError::PersistenceError(e.to_string())),
        }
    }

    /// Deserialize a snapshot.
    pub fn decode(self, data: &[u8]) -> Result<Value> {
        match self {
            Codec::Json => {
                let json: serde_json::Value = serde_json::from_slice(data)
                    .map_err(|e| NemoriaError::PersistenceError(format!("invalid JSON: {e}")))?;
                Ok(from_json(json))
            }
            Codec::Yaml => {
                let yaml: serde_yaml::Value = serde_yaml::from_slice(data)
                    .map_err(|e| NemoriaError::PersistenceError(format!("invalid YAML: {e}")))?;
                from_yaml(yaml)
            }
        }
    }
}

impl FromStr for Codec {
    type Err = NemoriaError;

    fn from_str(s: &str) -> Result<Self> {
        Codec::from_name(s)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .ok_or_else(|| NemoriaError::PersistenceError(constants::ERR_NON_FINITE_FLOAT.into()))?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<Result<_>>()?)
        }
        Value::Map(map) => {
            let mut object = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                object.insert(key.clone(), to_json(item)?);
            }
            serde_json::Value::Object(object)
        }
    })
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(object) => Value::Map(
            object
                .into_iter()
                .map(|(key, item)| (key, from_json(item)))
                .collect(),
        ),
    }
}

fn to_yaml(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Int(i) => serde_yaml::Value::Number((*i).into()),
        Value::Float(x) => serde_yaml::Value::Number((*x).into()),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::List(items) => serde_yaml::Value::Sequence(items.iter().map(to_yaml).collect()),
        Value::Map(map) => {
            let mut mapping = serde_yaml::Mapping::with_capacity(map.len());
            for (key, item) in map {
                mapping.insert(serde_yaml::Value::String(key.clone()), to_yaml(item));
            }
            serde_yaml::Value::Mapping(mapping)
        }
    }
}

fn yaml_key(key: serde_yaml::Value) -> Result<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Null => Ok("null".to_string()),
        other => Err(NemoriaError::PersistenceError(format!(
            "unsupported YAML mapping key: {other:?}"
        ))),
    }
}

fn from_yaml(yaml: serde_yaml::Value) -> Result<Value> {
    Ok(match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::List(items.into_iter().map(from_yaml).collect::<Result<_>>()?)
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = ValueMap::with_capacity(mapping.len());
            for (key, item) in mapping {
                map.insert(yaml_key(key)?, from_yaml(item)?);
            }
            Value::Map(map)
        }
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample() -> Value {
        let mut profile = ValueMap::new();
        profile.insert("name".into(), "Alice".into());
        profile.insert("age".into(), 30.into());
        profile.insert("score".into(), 9.5.into());
        profile.insert("tags".into(), vec!["a", "b"].into());
        profile.insert("nothing".into(), Value::Null);
        profile.insert("active".into(), true.into());
        let mut user = ValueMap::new();
        user.insert("profile".into(), Value::Map(profile));
        let mut root = ValueMap::new();
        root.insert("user".into(), Value::Map(user));
        root.insert("empty".into(), Value::empty_map());
        Value::Map(root)
    }

    #[test]
    fn names_resolve_case_insensitively() {
        assert_eq!(Codec::from_name("json").unwrap(), Codec::Json);
        assert_eq!(Codec::from_name("JSON").unwrap(), Codec::Json);
        assert_eq!(Codec::from_name("Yaml").unwrap(), Codec::Yaml);
        assert_eq!(Codec::from_name("yml").unwrap(), Codec::Yaml);
        assert_eq!(
            Codec::from_name("toml").unwrap_err().kind(),
            ErrorKind::UnsupportedCodec
        );
    }

    #[test]
    fn both_codecs_roundtrip_sample() {
        let snapshot = sample();
        for codec in Codec::ALL {
            let bytes = codec.encode(&snapshot).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), snapshot, "{codec}");
        }
    }

    #[test]
    fn json_keeps_insertion_order() {
        let mut root = ValueMap::new();
        root.insert("zeta".into(), 1.into());
        root.insert("alpha".into(), 2.into());
        let text = String::from_utf8(Codec::Json.encode(&Value::Map(root)).unwrap()).unwrap();
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
    }

    #[test]
    fn json_encoding_is_deterministic() {
        let snapshot = sample();
        assert_eq!(
            Codec::Json.encode(&snapshot).unwrap(),
            Codec::Json.encode(&snapshot).unwrap()
        );
    }

    #[test]
    fn json_rejects_non_finite_floats() {
        let err = Codec::Json.encode(&Value::Float(f64::INFINITY)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceError);
    }

    #[test]
    fn whole_floats_stay_floats() {
        for codec in Codec::ALL {
            let bytes = codec.encode(&Value::Float(2.0)).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), Value::Float(2.0));
        }
    }

    #[test]
    fn malformed_input_is_persistence_error() {
        assert_eq!(
            Codec::Json.decode(b"{\"a\": ").unwrap_err().kind(),
            ErrorKind::PersistenceError
        );
        assert_eq!(
            Codec::Yaml.decode(b"a: [1, 2").unwrap_err().kind(),
            ErrorKind::PersistenceError
        );
    }

    #[test]
    fn yaml_scalar_keys_are_stringified() {
        let decoded = Codec::Yaml.decode(b"1: one\ntrue: yes\n").unwrap();
        let map = decoded.as_map().unwrap();
        assert_eq!(map["1"], Value::String("one".into()));
        assert!(map.contains_key("true"));
    }
}
