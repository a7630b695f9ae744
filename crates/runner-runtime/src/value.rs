//! Dynamic values exchanged across the native/script boundary.
//!
//! `DynamicValue` is the untyped representation every capability and every
//! method call uses. Typed native values move in and out of it through
//! [`encode`] and [`decode`]; decoding reports the field path of the first
//! mismatch so runner authors can see which part of their payload was wrong.

use crate::error::{RuntimeError, RuntimeResult};
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    Unexpected, VariantAccess, Visitor,
};
use serde::ser;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Largest integer a script number represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Untyped value as seen by script code.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DynamicValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<DynamicValue>),
    Map(BTreeMap<String, DynamicValue>),
}

impl DynamicValue {
    /// Build a map value from key/value pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<DynamicValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        DynamicValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynamicValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Look up a member of a map value.
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        match self {
            DynamicValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Script-facing name of the value's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DynamicValue::Null => "null",
            DynamicValue::Bool(_) => "boolean",
            DynamicValue::Number(_) => "number",
            DynamicValue::String(_) => "string",
            DynamicValue::Array(_) => "array",
            DynamicValue::Map(_) => "object",
        }
    }

    fn unexpected(&self) -> Unexpected<'_> {
        match self {
            DynamicValue::Null => Unexpected::Unit,
            DynamicValue::Bool(b) => Unexpected::Bool(*b),
            DynamicValue::Number(n) => Unexpected::Float(*n),
            DynamicValue::String(s) => Unexpected::Str(s),
            DynamicValue::Array(_) => Unexpected::Seq,
            DynamicValue::Map(_) => Unexpected::Map,
        }
    }
}

/// Integral numbers are rendered without a fractional part.
fn integral(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Some(n as i64)
    } else {
        None
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::Value::from(self.clone()))
    }
}

impl From<serde_json::Value> for DynamicValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DynamicValue::Null,
            serde_json::Value::Bool(b) => DynamicValue::Bool(b),
            serde_json::Value::Number(n) => DynamicValue::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => DynamicValue::String(s),
            serde_json::Value::Array(items) => {
                DynamicValue::Array(items.into_iter().map(DynamicValue::from).collect())
            }
            serde_json::Value::Object(map) => DynamicValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, DynamicValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<DynamicValue> for serde_json::Value {
    fn from(value: DynamicValue) -> Self {
        match value {
            DynamicValue::Null => serde_json::Value::Null,
            DynamicValue::Bool(b) => serde_json::Value::Bool(b),
            DynamicValue::Number(n) => match integral(n) {
                Some(i) => serde_json::Value::from(i),
                None => serde_json::Number::from_f64(n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            },
            DynamicValue::String(s) => serde_json::Value::String(s),
            DynamicValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            DynamicValue::Map(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for DynamicValue {
    fn from(value: &str) -> Self {
        DynamicValue::String(value.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(value: String) -> Self {
        DynamicValue::String(value)
    }
}

impl From<f64> for DynamicValue {
    fn from(value: f64) -> Self {
        DynamicValue::Number(value)
    }
}

impl From<i64> for DynamicValue {
    fn from(value: i64) -> Self {
        DynamicValue::Number(value as f64)
    }
}

impl From<u32> for DynamicValue {
    fn from(value: u32) -> Self {
        DynamicValue::Number(f64::from(value))
    }
}

impl From<bool> for DynamicValue {
    fn from(value: bool) -> Self {
        DynamicValue::Bool(value)
    }
}

impl<T: Into<DynamicValue>> From<Option<T>> for DynamicValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(DynamicValue::Null, Into::into)
    }
}

impl<T: Into<DynamicValue>> From<Vec<T>> for DynamicValue {
    fn from(value: Vec<T>) -> Self {
        DynamicValue::Array(value.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<(String, DynamicValue)> for DynamicValue {
    fn from_iter<I: IntoIterator<Item = (String, DynamicValue)>>(iter: I) -> Self {
        DynamicValue::Map(iter.into_iter().collect())
    }
}

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DynamicValue::Null => serializer.serialize_unit(),
            DynamicValue::Bool(b) => serializer.serialize_bool(*b),
            DynamicValue::Number(n) => match integral(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            DynamicValue::String(s) => serializer.serialize_str(s),
            DynamicValue::Array(items) => items.serialize(serializer),
            DynamicValue::Map(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DynamicValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DynamicValueVisitor)
    }
}

struct DynamicValueVisitor;

impl<'de> Visitor<'de> for DynamicValueVisitor {
    type Value = DynamicValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any script value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Number(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Number(v as f64))
    }

    fn visit_f64<E>(self, v: f64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Number(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v))
    }

    fn visit_unit<E>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_none<E>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<DynamicValue, D::Error> {
        DynamicValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DynamicValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(DynamicValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DynamicValue, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, DynamicValue>()? {
            map.insert(key, value);
        }
        Ok(DynamicValue::Map(map))
    }
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// A dynamic value did not match the requested native type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    path: Vec<PathSegment>,
    message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Dotted path of the offending field, empty for the root.
    pub fn path(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            match segment {
                PathSegment::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathSegment::Index(index) => out.push_str(&format!("[{}]", index)),
            }
        }
        out
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn within_key(mut self, key: &str) -> Self {
        self.path.insert(0, PathSegment::Key(key.to_string()));
        self
    }

    fn within_index(mut self, index: usize) -> Self {
        self.path.insert(0, PathSegment::Index(index));
        self
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path(), self.message)
        }
    }
}

impl std::error::Error for DecodeError {}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DecodeError::new(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        DecodeError::new("missing required field").within_key(field)
    }
}

/// Decode a typed native value out of a dynamic value.
pub fn decode<T: DeserializeOwned>(value: &DynamicValue) -> Result<T, DecodeError> {
    T::deserialize(value)
}

/// Encode a native value into its dynamic representation.
///
/// Numbers keep their exact value, including infinities and NaN.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> RuntimeResult<DynamicValue> {
    value
        .serialize(ValueSerializer)
        .map_err(|e| RuntimeError::Encode(e.0))
}

#[derive(Debug)]
struct EncodeError(String);

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EncodeError {}

impl ser::Error for EncodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        EncodeError(msg.to_string())
    }
}

/// Serializer whose output is a [`DynamicValue`].
#[derive(Clone, Copy)]
struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = DynamicValue;
    type Error = EncodeError;
    type SerializeSeq = SeqEncoder;
    type SerializeTuple = SeqEncoder;
    type SerializeTupleStruct = SeqEncoder;
    type SerializeTupleVariant = TupleVariantEncoder;
    type SerializeMap = MapEncoder;
    type SerializeStruct = MapEncoder;
    type SerializeStructVariant = StructVariantEncoder;

    fn serialize_bool(self, v: bool) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(f64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(f64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(f64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(v as f64))
    }

    fn serialize_u8(self, v: u8) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(f64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(f64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(f64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(v as f64))
    }

    fn serialize_f32(self, v: f32) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Number(v))
    }

    fn serialize_char(self, v: char) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Array(
            v.iter().map(|b| DynamicValue::Number(f64::from(*b))).collect(),
        ))
    }

    fn serialize_none(self) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<DynamicValue, EncodeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<DynamicValue, EncodeError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::map([(variant, value.serialize(self)?)]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqEncoder, EncodeError> {
        Ok(SeqEncoder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqEncoder, EncodeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqEncoder, EncodeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<TupleVariantEncoder, EncodeError> {
        Ok(TupleVariantEncoder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapEncoder, EncodeError> {
        Ok(MapEncoder {
            map: BTreeMap::new(),
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapEncoder, EncodeError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<StructVariantEncoder, EncodeError> {
        Ok(StructVariantEncoder {
            variant,
            map: BTreeMap::new(),
        })
    }
}

/// Map keys become strings the way script property keys do.
fn map_key(key: DynamicValue) -> Result<String, EncodeError> {
    match key {
        DynamicValue::String(s) => Ok(s),
        DynamicValue::Number(n) => Ok(integral(n).map_or_else(|| n.to_string(), |i| i.to_string())),
        DynamicValue::Bool(b) => Ok(b.to_string()),
        other => Err(EncodeError(format!(
            "map keys must be strings, found {}",
            other.kind()
        ))),
    }
}

struct SeqEncoder {
    items: Vec<DynamicValue>,
}

impl ser::SerializeSeq for SeqEncoder {
    type Ok = DynamicValue;
    type Error = EncodeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqEncoder {
    type Ok = DynamicValue;
    type Error = EncodeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<DynamicValue, EncodeError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqEncoder {
    type Ok = DynamicValue;
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<DynamicValue, EncodeError> {
        ser::SerializeSeq::end(self)
    }
}

struct TupleVariantEncoder {
    variant: &'static str,
    items: Vec<DynamicValue>,
}

impl ser::SerializeTupleVariant for TupleVariantEncoder {
    type Ok = DynamicValue;
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::map([(
            self.variant,
            DynamicValue::Array(self.items),
        )]))
    }
}

struct MapEncoder {
    map: BTreeMap<String, DynamicValue>,
    key: Option<String>,
}

impl ser::SerializeMap for MapEncoder {
    type Ok = DynamicValue;
    type Error = EncodeError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), EncodeError> {
        self.key = Some(map_key(key.serialize(ValueSerializer)?)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), EncodeError> {
        let key = self
            .key
            .take()
            .ok_or_else(|| EncodeError("map value serialized before its key".to_string()))?;
        self.map.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Map(self.map))
    }
}

impl ser::SerializeStruct for MapEncoder {
    type Ok = DynamicValue;
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        self.map
            .insert(key.to_owned(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::Map(self.map))
    }
}

struct StructVariantEncoder {
    variant: &'static str,
    map: BTreeMap<String, DynamicValue>,
}

impl ser::SerializeStructVariant for StructVariantEncoder {
    type Ok = DynamicValue;
    type Error = EncodeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        self.map
            .insert(key.to_owned(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<DynamicValue, EncodeError> {
        Ok(DynamicValue::map([(self.variant, DynamicValue::Map(self.map))]))
    }
}

fn visit_number<'de, V: Visitor<'de>>(n: f64, visitor: V) -> Result<V::Value, DecodeError> {
    match integral(n) {
        Some(i) if i >= 0 => visitor.visit_u64(i as u64),
        Some(i) => visitor.visit_i64(i),
        None => visitor.visit_f64(n),
    }
}

impl<'de> Deserializer<'de> for &'de DynamicValue {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self {
            DynamicValue::Null => visitor.visit_unit(),
            DynamicValue::Bool(b) => visitor.visit_bool(*b),
            DynamicValue::Number(n) => visit_number(*n, visitor),
            DynamicValue::String(s) => visitor.visit_borrowed_str(s),
            DynamicValue::Array(items) => {
                let mut seq = SeqAccessor {
                    iter: items.iter().enumerate(),
                };
                let value = visitor.visit_seq(&mut seq)?;
                if seq.iter.len() == 0 {
                    Ok(value)
                } else {
                    Err(de::Error::invalid_length(items.len(), &"fewer elements"))
                }
            }
            DynamicValue::Map(map) => visitor.visit_map(MapAccessor {
                iter: map.iter(),
                current: None,
            }),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DecodeError> {
        match self {
            DynamicValue::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        match self {
            DynamicValue::String(s) => {
                let variant: de::value::StrDeserializer<'_, DecodeError> =
                    s.as_str().into_deserializer();
                visitor.visit_enum(variant)
            }
            DynamicValue::Map(map) if map.len() == 1 => {
                let Some((variant, value)) = map.iter().next() else {
                    return Err(de::Error::invalid_length(0, &"one variant"));
                };
                visitor.visit_enum(EnumAccessor {
                    variant: variant.as_str(),
                    value,
                })
            }
            other => Err(de::Error::invalid_type(
                other.unexpected(),
                &"a variant name or single-key object",
            )),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

struct SeqAccessor<'de> {
    iter: std::iter::Enumerate<std::slice::Iter<'de, DynamicValue>>,
}

impl<'de> SeqAccess<'de> for SeqAccessor<'de> {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, DecodeError> {
        match self.iter.next() {
            Some((index, value)) => seed
                .deserialize(value)
                .map(Some)
                .map_err(|e| e.within_index(index)),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapAccessor<'de> {
    iter: std::collections::btree_map::Iter<'de, String, DynamicValue>,
    current: Option<(&'de str, &'de DynamicValue)>,
}

impl<'de> MapAccess<'de> for MapAccessor<'de> {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DecodeError> {
        match self.iter.next() {
            Some((key, value)) => {
                self.current = Some((key.as_str(), value));
                seed.deserialize(de::value::BorrowedStrDeserializer::new(key))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, DecodeError> {
        let (key, value) = self
            .current
            .take()
            .ok_or_else(|| DecodeError::new("map value requested before its key"))?;
        seed.deserialize(value).map_err(|e| e.within_key(key))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct EnumAccessor<'de> {
    variant: &'de str,
    value: &'de DynamicValue,
}

impl<'de> EnumAccess<'de> for EnumAccessor<'de> {
    type Error = DecodeError;
    type Variant = VariantAccessor<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), DecodeError> {
        let variant =
            seed.deserialize(de::value::BorrowedStrDeserializer::<DecodeError>::new(self.variant))?;
        Ok((
            variant,
            VariantAccessor {
                key: self.variant,
                value: self.value,
            },
        ))
    }
}

struct VariantAccessor<'de> {
    key: &'de str,
    value: &'de DynamicValue,
}

impl<'de> VariantAccess<'de> for VariantAccessor<'de> {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<(), DecodeError> {
        match self.value {
            DynamicValue::Null => Ok(()),
            other => Err(de::Error::invalid_type(other.unexpected(), &"unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, DecodeError> {
        seed.deserialize(self.value)
            .map_err(|e| e.within_key(self.key))
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DecodeError> {
        Deserializer::deserialize_seq(self.value, visitor).map_err(|e| e.within_key(self.key))
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError> {
        Deserializer::deserialize_map(self.value, visitor).map_err(|e| e.within_key(self.key))
    }
}
