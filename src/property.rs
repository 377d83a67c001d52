//! Records as ordered property lists
//!
//! A record is an ordered list of named, typed properties. Application types
//! become records through the [`Entity`] trait, either by hand (load/save
//! pair) or through serde via [`save_struct`] / [`load_struct`].

use crate::error::{NdsError, Result};
use crate::key::Key;
use crate::validate::ElementShape;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use std::fmt;

/// Geographic point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Latitude within [-90, 90] and longitude within [-180, 180]
    pub fn valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Value of a single property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Unindexed binary payload
    Bytes(Vec<u8>),
    /// Short, indexable byte string
    ByteString(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Reference to another record
    Key(Key),
    GeoPoint(GeoPoint),
    /// Reference to an opaque binary blob held elsewhere
    BlobKey(String),
}

/// Discriminant of [`PropertyValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Bytes,
    ByteString,
    Timestamp,
    Key,
    GeoPoint,
    BlobKey,
}

impl ValueKind {
    /// Primitive kinds are always understood by the record codec; the rest
    /// must be registered before first use.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ValueKind::Null
                | ValueKind::Bool
                | ValueKind::Int
                | ValueKind::Float
                | ValueKind::String
                | ValueKind::Bytes
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::ByteString => "byte_string",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Key => "key",
            ValueKind::GeoPoint => "geo_point",
            ValueKind::BlobKey => "blob_key",
        };
        write!(f, "{}", name)
    }
}

impl PropertyValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::Null => ValueKind::Null,
            PropertyValue::Bool(_) => ValueKind::Bool,
            PropertyValue::Int(_) => ValueKind::Int,
            PropertyValue::Float(_) => ValueKind::Float,
            PropertyValue::String(_) => ValueKind::String,
            PropertyValue::Bytes(_) => ValueKind::Bytes,
            PropertyValue::ByteString(_) => ValueKind::ByteString,
            PropertyValue::Timestamp(_) => ValueKind::Timestamp,
            PropertyValue::Key(_) => ValueKind::Key,
            PropertyValue::GeoPoint(_) => ValueKind::GeoPoint,
            PropertyValue::BlobKey(_) => ValueKind::BlobKey,
        }
    }

    fn from_json(name: &str, value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(PropertyValue::Null),
            JsonValue::Bool(b) => Ok(PropertyValue::Bool(b)),
            JsonValue::Number(n) if n.is_u64() && n.as_i64().is_none() => Err(NdsError::Encoding(
                format!("Field {} holds {}, which does not fit a 64-bit signed integer", name, n),
            )),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(PropertyValue::Int(i)),
                None => n.as_f64().map(PropertyValue::Float).ok_or_else(|| {
                    NdsError::Encoding(format!("Field {} holds an unrepresentable number", name))
                }),
            },
            JsonValue::String(s) => Ok(PropertyValue::String(s)),
            JsonValue::Array(_) | JsonValue::Object(_) => Err(NdsError::Encoding(format!(
                "Field {} holds a nested value, which has no property representation",
                name
            ))),
        }
    }

    fn into_json(self) -> Result<JsonValue> {
        let value = match self {
            PropertyValue::Null => JsonValue::Null,
            PropertyValue::Bool(b) => JsonValue::Bool(b),
            PropertyValue::Int(i) => JsonValue::Number(i.into()),
            PropertyValue::Float(f) => Number::from_f64(f)
                .map(JsonValue::Number)
                .ok_or_else(|| NdsError::Decoding(format!("Non-finite float {}", f)))?,
            PropertyValue::String(s) | PropertyValue::BlobKey(s) => JsonValue::String(s),
            PropertyValue::Bytes(b) | PropertyValue::ByteString(b) => {
                JsonValue::Array(b.into_iter().map(|byte| JsonValue::Number(byte.into())).collect())
            }
            PropertyValue::Timestamp(t) => {
                JsonValue::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            PropertyValue::Key(key) => serde_json::to_value(key)
                .map_err(|e| NdsError::Decoding(e.to_string()))?,
            PropertyValue::GeoPoint(point) => serde_json::to_value(point)
                .map_err(|e| NdsError::Decoding(e.to_string()))?,
        };
        Ok(value)
    }
}

/// A single named property of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
    /// Excluded from store indexes
    pub no_index: bool,
    /// One element of a multi-valued property
    pub multiple: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
            no_index: false,
            multiple: false,
        }
    }

    /// Mark the property as unindexed
    pub fn unindexed(mut self) -> Self {
        self.no_index = true;
        self
    }

    /// Mark the property as one element of a multi-valued field
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Marker for a multi-valued field with no elements: an unindexed,
    /// multiple null
    pub fn empty_sequence(name: impl Into<String>) -> Self {
        Self::new(name, PropertyValue::Null).unindexed().multiple()
    }

    pub fn is_empty_sequence(&self) -> bool {
        self.multiple && self.no_index && self.value == PropertyValue::Null
    }
}

/// Ordered list of properties; the record form the store and cache exchange
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyList(Vec<Property>);

impl PropertyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, property: Property) {
        self.0.push(property);
    }

    /// Append a single-valued, indexed property
    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.0.push(Property::new(name, value));
        self
    }

    /// First property with the given name
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Property>> for PropertyList {
    fn from(properties: Vec<Property>) -> Self {
        Self(properties)
    }
}

impl FromIterator<Property> for PropertyList {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PropertyList {
    type Item = Property;
    type IntoIter = std::vec::IntoIter<Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PropertyList {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// An application value that can be stored as a record.
///
/// `SHAPE` tells batch validation how the value presents itself. Types that
/// hand-write `save`/`load` should declare [`ElementShape::LoadSaver`].
pub trait Entity: Sized + Send + Sync + 'static {
    const SHAPE: ElementShape = ElementShape::Struct;

    /// Convert into the record form
    fn save(&self) -> Result<PropertyList>;

    /// Rebuild from the record form
    fn load(properties: PropertyList) -> Result<Self>;
}

/// Bare property lists are accepted by the codec and the store but rejected
/// as a batch value container.
impl Entity for PropertyList {
    const SHAPE: ElementShape = ElementShape::PropertyList;

    fn save(&self) -> Result<PropertyList> {
        Ok(self.clone())
    }

    fn load(properties: PropertyList) -> Result<Self> {
        Ok(properties)
    }
}

impl<T: Entity> Entity for Box<T> {
    const SHAPE: ElementShape = match T::SHAPE {
        ElementShape::Struct => ElementShape::StructRef,
        other => other,
    };

    fn save(&self) -> Result<PropertyList> {
        self.as_ref().save()
    }

    fn load(properties: PropertyList) -> Result<Self> {
        T::load(properties).map(Box::new)
    }
}

/// Save a serde-serializable struct as a property list, preserving field order.
///
/// Sequence fields become multi-valued properties; an empty sequence is
/// written as [`Property::empty_sequence`]. Nested structs and maps are
/// rejected with [`NdsError::Encoding`], as are unsigned integers above
/// `i64::MAX`.
///
/// Fields are converted from their serde form, so only primitive kinds are
/// produced: `DateTime` becomes a `String`, `Vec<u8>` a multi-valued `Int`
/// and `Key` or `GeoPoint` fields are rejected as nested. Records needing
/// the typed kinds implement [`Entity`] by hand; [`load_struct`] reads
/// typed values back into these fields either way.
pub fn save_struct<T: Serialize>(src: &T) -> Result<PropertyList> {
    let value = serde_json::to_value(src).map_err(|e| NdsError::Encoding(e.to_string()))?;
    let fields = match value {
        JsonValue::Object(fields) => fields,
        other => {
            return Err(NdsError::Encoding(format!(
                "Expected a struct, found {}",
                json_type_name(&other)
            )))
        }
    };

    let mut properties = PropertyList::new();
    for (name, value) in fields {
        match value {
            JsonValue::Array(elements) if elements.is_empty() => {
                properties.push(Property::empty_sequence(name));
            }
            JsonValue::Array(elements) => {
                for element in elements {
                    let value = PropertyValue::from_json(&name, element)?;
                    properties.push(Property::new(name.clone(), value).multiple());
                }
            }
            other => {
                let value = PropertyValue::from_json(&name, other)?;
                properties.push(Property::new(name, value));
            }
        }
    }
    Ok(properties)
}

/// Load a property list into a serde-deserializable struct.
///
/// Multi-valued properties are collected into sequences; typed values are
/// presented in their serde form (timestamps as RFC 3339, byte strings as
/// byte sequences).
pub fn load_struct<T: DeserializeOwned>(properties: PropertyList) -> Result<T> {
    let mut fields = Map::new();
    for property in properties {
        if property.is_empty_sequence() {
            fields
                .entry(property.name)
                .or_insert_with(|| JsonValue::Array(Vec::new()));
            continue;
        }
        let value = property.value.into_json()?;
        if property.multiple {
            let slot = fields
                .entry(property.name)
                .or_insert_with(|| JsonValue::Array(Vec::new()));
            match slot {
                JsonValue::Array(elements) => elements.push(value),
                _ => {
                    return Err(NdsError::Decoding(
                        "Property mixes single and multiple values".to_string(),
                    ))
                }
            }
        } else {
            fields.insert(property.name, value);
        }
    }
    serde_json::from_value(JsonValue::Object(fields)).map_err(|e| NdsError::Decoding(e.to_string()))
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "sequence",
        JsonValue::Object(_) => "map",
    }
}

/// Implement [`Entity`] for a serde struct through [`save_struct`] / [`load_struct`]
#[macro_export]
macro_rules! impl_struct_entity {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::property::Entity for $ty {
                fn save(&self) -> $crate::error::Result<$crate::property::PropertyList> {
                    $crate::property::save_struct(self)
                }

                fn load(
                    properties: $crate::property::PropertyList,
                ) -> $crate::error::Result<Self> {
                    $crate::property::load_struct(properties)
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Task {
        id: String,
        priority: i64,
        score: f64,
        done: bool,
        tags: Vec<String>,
        created_at: DateTime<Utc>,
        note: Option<String>,
    }

    fn sample_task() -> Task {
        Task {
            id: "task-001".to_string(),
            priority: 3,
            score: 0.75,
            done: false,
            tags: vec!["a".to_string(), "b".to_string()],
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            note: None,
        }
    }

    #[test]
    fn test_save_struct_preserves_field_order() {
        let properties = save_struct(&sample_task()).unwrap();
        let names: Vec<&str> = properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["id", "priority", "score", "done", "tags", "tags", "created_at", "note"]
        );
        assert!(properties.iter().filter(|p| p.name == "tags").all(|p| p.multiple));
        assert_eq!(properties.get("priority"), Some(&PropertyValue::Int(3)));
    }

    #[test]
    fn test_struct_round_trip() {
        let task = sample_task();
        let loaded: Task = load_struct(save_struct(&task).unwrap()).unwrap();
        assert_eq!(loaded, task);
    }

    #[test]
    fn test_empty_sequence_round_trip() {
        let task = Task {
            tags: vec![],
            ..sample_task()
        };

        let properties = save_struct(&task).unwrap();
        let tags: Vec<&Property> = properties.iter().filter(|p| p.name == "tags").collect();
        assert_eq!(tags.len(), 1);
        assert!(tags[0].is_empty_sequence());

        let loaded: Task = load_struct(properties).unwrap();
        assert_eq!(loaded, task);
    }

    #[test]
    fn test_oversized_unsigned_fails_encoding() {
        #[derive(Serialize)]
        struct Counter {
            n: u64,
        }

        let err = save_struct(&Counter { n: u64::MAX }).unwrap_err();
        assert!(matches!(err, NdsError::Encoding(_)));

        let fits = save_struct(&Counter { n: i64::MAX as u64 }).unwrap();
        assert_eq!(fits.get("n"), Some(&PropertyValue::Int(i64::MAX)));
    }

    #[test]
    fn test_struct_fields_use_serde_forms() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Upload {
            at: DateTime<Utc>,
            digest: Vec<u8>,
        }

        let upload = Upload {
            at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            digest: vec![7, 8],
        };
        let properties = save_struct(&upload).unwrap();

        assert_eq!(properties.get("at").map(PropertyValue::kind), Some(ValueKind::String));
        assert!(properties
            .iter()
            .filter(|p| p.name == "digest")
            .all(|p| p.multiple && p.value.kind() == ValueKind::Int));

        let loaded: Upload = load_struct(properties).unwrap();
        assert_eq!(loaded, upload);
    }

    #[test]
    fn test_save_struct_rejects_nested_and_non_struct() {
        #[derive(Serialize)]
        struct Outer {
            inner: std::collections::BTreeMap<String, i64>,
        }
        let nested = Outer {
            inner: [("x".to_string(), 1)].into_iter().collect(),
        };
        assert!(matches!(save_struct(&nested), Err(NdsError::Encoding(_))));
        assert!(matches!(save_struct(&42), Err(NdsError::Encoding(_))));
    }

    #[test]
    fn test_load_struct_reads_typed_values() {
        #[derive(Debug, Deserialize)]
        struct Place {
            at: DateTime<Utc>,
            location: GeoPoint,
            owner: Key,
            digest: Vec<u8>,
        }

        let at = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        let properties = PropertyList::new()
            .with("at", PropertyValue::Timestamp(at))
            .with("location", PropertyValue::GeoPoint(GeoPoint::new(52.1, 4.3)))
            .with("owner", PropertyValue::Key(Key::named("User", "alice")))
            .with("digest", PropertyValue::ByteString(vec![1, 2, 255]));

        let place: Place = load_struct(properties).unwrap();
        assert_eq!(place.at, at);
        assert_eq!(place.location, GeoPoint::new(52.1, 4.3));
        assert_eq!(place.owner, Key::named("User", "alice"));
        assert_eq!(place.digest, vec![1, 2, 255]);
    }

    #[test]
    fn test_value_kinds() {
        assert!(ValueKind::Int.is_primitive());
        assert!(ValueKind::Bytes.is_primitive());
        assert!(!ValueKind::Timestamp.is_primitive());
        assert!(!ValueKind::GeoPoint.is_primitive());
        assert_eq!(PropertyValue::BlobKey("b".into()).kind(), ValueKind::BlobKey);
        assert_eq!(ValueKind::ByteString.to_string(), "byte_string");
    }

    #[test]
    fn test_entity_shapes() {
        assert_eq!(<PropertyList as Entity>::SHAPE, ElementShape::PropertyList);
        assert_eq!(<Box<PropertyList> as Entity>::SHAPE, ElementShape::PropertyList);
    }

    #[test]
    fn test_geo_point_validity() {
        assert!(GeoPoint::new(45.0, 120.0).valid());
        assert!(!GeoPoint::new(91.0, 0.0).valid());
        assert!(!GeoPoint::new(0.0, -181.0).valid());
    }
}
