//! Serde model of the LUKS2 JSON area.
//!
//! Field types mirror what cryptsetup writes: 64-bit quantities are decimal
//! strings, binary values are base64, object keys are decimal ids. The
//! structures are kept loose here and checked when they are normalized into
//! [`Metadata`](crate::header::Metadata).

use crate::header::SegmentSize;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::value::RawValue;
use std::collections::BTreeMap;

/// Top-level JSON object.
#[derive(Debug, Deserialize)]
pub(crate) struct Luks2Json {
    pub keyslots: BTreeMap<String, JsonKeyslot>,
    #[serde(default)]
    pub tokens: BTreeMap<String, Box<RawValue>>,
    pub segments: BTreeMap<String, JsonSegment>,
    pub digests: BTreeMap<String, JsonDigest>,
    pub config: JsonConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonKeyslot {
    #[serde(rename = "type")]
    pub kind: String,
    pub key_size: usize,
    pub area: JsonArea,
    pub kdf: Option<JsonKdf>,
    pub af: Option<JsonAf>,
    pub priority: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonArea {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "de_u64")]
    pub offset: u64,
    #[serde(deserialize_with = "de_u64")]
    pub size: u64,
    pub encryption: Option<String>,
    pub key_size: Option<usize>,
}

/// KDF object. Which fields are present depends on `kind`.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonKdf {
    #[serde(rename = "type")]
    pub kind: String,
    pub salt: String,
    pub hash: Option<String>,
    pub iterations: Option<u32>,
    pub time: Option<u32>,
    /// KiB.
    pub memory: Option<u32>,
    pub cpus: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonAf {
    #[serde(rename = "type")]
    pub kind: String,
    pub stripes: u32,
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonSegment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "de_u64")]
    pub offset: u64,
    #[serde(deserialize_with = "de_segment_size")]
    pub size: SegmentSize,
    #[serde(default, deserialize_with = "de_u64")]
    pub iv_tweak: u64,
    pub encryption: Option<String>,
    pub sector_size: Option<u32>,
    pub integrity: Option<serde_json::Value>,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonDigest {
    #[serde(rename = "type")]
    pub kind: String,
    pub keyslots: Vec<String>,
    pub segments: Vec<String>,
    pub hash: Option<String>,
    pub iterations: Option<u32>,
    pub salt: String,
    pub digest: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonConfig {
    #[serde(deserialize_with = "de_u64")]
    pub json_size: u64,
    #[serde(deserialize_with = "de_u64")]
    pub keyslots_size: u64,
    pub requirements: Option<JsonRequirements>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JsonRequirements {
    #[serde(default)]
    pub mandatory: Vec<String>,
}

/// The fields every token carries; the rest is type specific.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonTokenHeader {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub keyslots: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

/// Accept a u64 written either as a JSON number or as a decimal string.
fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid integer '{}'", s))),
    }
}

fn de_segment_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SegmentSize, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::String(s) if s == "dynamic" => Ok(SegmentSize::Dynamic),
        NumberOrString::String(s) => s
            .parse()
            .map(SegmentSize::Fixed)
            .map_err(|_| de::Error::custom(format!("invalid segment size '{}'", s))),
        NumberOrString::Number(n) => Ok(SegmentSize::Fixed(n)),
    }
}
