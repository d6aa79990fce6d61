//! Messages exchanged with the execution unit.
//!
//! Every message is a JSON object tagged by `type`. Binary payloads are carried as
//! Latin-1 strings: each byte becomes the code point of the same value, so bytes 0–255
//! survive the text encoding unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Compile {
        id: u64,
        payload: Vec<String>,
    },
    Scan {
        id: u64,
        #[serde(with = "latin1")]
        payload: Vec<u8>,
    },
}

impl Request {
    pub fn id(&self) -> u64 {
        match self {
            Request::Compile { id, .. } | Request::Scan { id, .. } => *id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    CompileResult {
        id: u64,
        success: bool,
        #[serde(rename = "ruleCount", default, skip_serializing_if = "Option::is_none")]
        rule_count: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ScanResult {
        id: u64,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        matches: Option<Vec<RuleMatch>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Response {
    pub fn id(&self) -> u64 {
        match self {
            Response::CompileResult { id, .. } | Response::ScanResult { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Response::CompileResult { .. } => "compileResult",
            Response::ScanResult { .. } => "scanResult",
        }
    }

    pub fn compiled(id: u64, rule_count: usize) -> Self {
        Response::CompileResult {
            id,
            success: true,
            rule_count: Some(rule_count),
            error: None,
        }
    }

    pub fn compile_failed(id: u64, error: impl Into<String>) -> Self {
        Response::CompileResult {
            id,
            success: false,
            rule_count: None,
            error: Some(error.into()),
        }
    }

    pub fn scanned(id: u64, matches: Vec<RuleMatch>) -> Self {
        Response::ScanResult {
            id,
            success: true,
            matches: Some(matches),
            error: None,
        }
    }

    pub fn scan_failed(id: u64, error: impl Into<String>) -> Self {
        Response::ScanResult {
            id,
            success: false,
            matches: None,
            error: Some(error.into()),
        }
    }
}

/// A rule whose condition held for the scanned payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule: String,
    pub meta: BTreeMap<String, String>,
    pub matches: Vec<StringMatch>,
}

/// One occurrence of a rule string
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringMatch {
    /// String identifier, including the leading `$`
    pub identifier: String,
    pub offset: usize,
    pub length: usize,
}

/// Byte string <-> Latin-1 text bridging
pub mod latin1 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|&b| char::from(b)).collect()
    }

    /// Returns `None` if a character is above U+00FF
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode(&s).ok_or_else(|| D::Error::custom("payload character outside the Latin-1 range"))
    }
}
