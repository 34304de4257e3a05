//! Core types for the sample store.

use crate::media::{Image, NdArray, VideoReader};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How the records of one store are encoded.
///
/// A store is monomorphic: every record in it shares one type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Image,
    Video,
    Numpy,
    Dict,
}

impl RecordType {
    /// All record types.
    pub const ALL: [RecordType; 4] = [
        RecordType::Image,
        RecordType::Video,
        RecordType::Numpy,
        RecordType::Dict,
    ];

    /// Tag used in descriptors.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Image => "image",
            RecordType::Video => "video",
            RecordType::Numpy => "numpy",
            RecordType::Dict => "dict",
        }
    }

    /// Field name a single-valued record is exposed under.
    ///
    /// Dict records already carry their own field names.
    pub fn default_data_name(self) -> Option<&'static str> {
        match self {
            RecordType::Image => Some("image"),
            RecordType::Video => Some("video"),
            RecordType::Numpy => Some("data"),
            RecordType::Dict => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| format!("unknown record type: {s}"))
    }
}

/// Record type of a writer: unset until the first write, then fixed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TypeState {
    #[default]
    Unfixed,
    Fixed(RecordType),
}

impl TypeState {
    /// Fix the type to `ty`, or check it against the already fixed type.
    ///
    /// Returns the state to move to. `self` is not modified, so a rejected
    /// write leaves the writer exactly as it was.
    pub fn admit(self, ty: RecordType) -> Result<TypeState, (RecordType, RecordType)> {
        match self {
            TypeState::Unfixed => Ok(TypeState::Fixed(ty)),
            TypeState::Fixed(fixed) if fixed == ty => Ok(self),
            TypeState::Fixed(fixed) => Err((fixed, ty)),
        }
    }

    pub fn get(self) -> Option<RecordType> {
        match self {
            TypeState::Unfixed => None,
            TypeState::Fixed(ty) => Some(ty),
        }
    }
}

/// Storage key of the record at `index`: its decimal representation.
pub fn record_key(index: u64) -> Vec<u8> {
    index.to_string().into_bytes()
}

/// A field value inside a dict record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Array(NdArray),
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from!(
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f32 => Float,
    f64 => Float,
    String => Str,
    &str => Str,
    Vec<u8> => Bytes,
    Vec<Value> => List,
    BTreeMap<String, Value> => Map,
    NdArray => Array,
);

/// Named fields of a dict record.
pub type Fields = BTreeMap<String, Value>;

/// A decoded record.
#[derive(Debug)]
pub enum Data {
    Image(Image),
    Video(VideoReader),
    Array(NdArray),
    Dict(Fields),
}

impl Data {
    pub fn record_type(&self) -> RecordType {
        match self {
            Data::Image(_) => RecordType::Image,
            Data::Video(_) => RecordType::Video,
            Data::Array(_) => RecordType::Numpy,
            Data::Dict(_) => RecordType::Dict,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Data::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoReader> {
        match self {
            Data::Video(video) => Some(video),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Data::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Fields> {
        match self {
            Data::Dict(fields) => Some(fields),
            _ => None,
        }
    }
}

/// What a reader hands back for one index.
#[derive(Debug)]
pub enum Sample {
    /// Decoded record wrapped under the reader's default field name.
    Named(BTreeMap<String, Data>),
    /// Decoded record as stored.
    Raw(Data),
}

impl Sample {
    /// Wrap `data` under `name` when a name is given.
    pub fn wrap(data: Data, name: Option<&str>) -> Self {
        match name {
            Some(name) => Sample::Named(BTreeMap::from([(name.to_string(), data)])),
            None => Sample::Raw(data),
        }
    }

    /// Look up a wrapped field.
    pub fn field(&self, name: &str) -> Option<&Data> {
        match self {
            Sample::Named(map) => map.get(name),
            Sample::Raw(_) => None,
        }
    }

    pub fn into_raw(self) -> Option<Data> {
        match self {
            Sample::Raw(data) => Some(data),
            Sample::Named(_) => None,
        }
    }
}
