use crate::error::{ModelError, Result};
use serde_json::{Map, Value};
use std::fmt;

/// The three JSON blobs an inbound row stores as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobField {
    Settings,
    StreamSettings,
    Sniffing,
}

impl BlobField {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobField::Settings => "settings",
            BlobField::StreamSettings => "streamSettings",
            BlobField::Sniffing => "sniffing",
        }
    }
}

impl fmt::Display for BlobField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a stored blob. Absent and empty blobs are `{}`; anything else must
/// be a JSON object. Schema checks belong to the protocol encoders.
pub fn parse_blob(field: BlobField, blob: Option<&str>) -> Result<Map<String, Value>> {
    match blob {
        None | Some("") => Ok(Map::new()),
        Some(text) => serde_json::from_str(text)
            .map_err(|source| ModelError::MalformedConfigBlob { field, source }),
    }
}
