//! `tf.train.Example` protocol buffer messages.
//!
//! Only the subset needed to read and write training records: a map of named
//! features, each holding a list of byte strings, floats or 64-bit integers.

use std::collections::HashMap;

/// A single training example: named features.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Example {
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Features {
    #[prost(map = "string, message", tag = "1")]
    pub feature: HashMap<String, Feature>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Feature {
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

pub mod feature {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        BytesList(super::BytesList),
        #[prost(message, tag = "2")]
        FloatList(super::FloatList),
        #[prost(message, tag = "3")]
        Int64List(super::Int64List),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

impl Feature {
    /// A feature holding one byte string.
    pub fn bytes(value: Vec<u8>) -> Self {
        Self {
            kind: Some(feature::Kind::BytesList(BytesList { value: vec![value] })),
        }
    }

    /// A feature holding one 64-bit integer.
    pub fn int64(value: i64) -> Self {
        Self {
            kind: Some(feature::Kind::Int64List(Int64List { value: vec![value] })),
        }
    }
}
