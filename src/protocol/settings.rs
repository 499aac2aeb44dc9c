//! Protocol-level query settings.
use std::collections::BTreeMap;

use super::{compression::CompressionMethod, varint, wire::write_string};

pub const NETWORK_COMPRESSION_METHOD: &str = "network_compression_method";
pub const NETWORK_ZSTD_COMPRESSION_LEVEL: &str = "network_zstd_compression_level";

const DEFAULT_ZSTD_LEVEL: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    UInt(u64),
    String(String),
}

impl SettingValue {
    fn write(&self, out: &mut Vec<u8>) {
        match self {
            SettingValue::UInt(v) => varint::write_u64(out, *v),
            SettingValue::String(v) => write_string(out, v),
        }
    }
}

/// Flat, ordered map of setting names to values.
///
/// A connection takes its own copy when a query starts, so later edits never
/// affect a running stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: SettingValue) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.set(NETWORK_COMPRESSION_METHOD, SettingValue::String(method.name().to_string()));
        self
    }

    pub fn with_zstd_level(mut self, level: u64) -> Self {
        self.set(NETWORK_ZSTD_COMPRESSION_LEVEL, SettingValue::UInt(level));
        self
    }

    /// Compression is on whenever a method has been chosen explicitly.
    pub fn compression_method(&self) -> Option<CompressionMethod> {
        match self.get(NETWORK_COMPRESSION_METHOD)? {
            SettingValue::String(name) => name.parse().ok(),
            SettingValue::UInt(_) => None,
        }
    }

    pub fn compression_level(&self) -> i32 {
        match self.get(NETWORK_ZSTD_COMPRESSION_LEVEL) {
            Some(SettingValue::UInt(level)) => i32::try_from(*level).unwrap_or(DEFAULT_ZSTD_LEVEL),
            _ => DEFAULT_ZSTD_LEVEL,
        }
    }

    /// Writes every setting as its name followed by its value. The caller closes
    /// the list with an empty name.
    pub fn write(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.values {
            write_string(out, name);
            value.write(out);
        }
    }
}
