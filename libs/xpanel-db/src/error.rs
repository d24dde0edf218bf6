//! Errors raised by the inbound and settings models.

use crate::models::blob::BlobField;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    /// A stored settings/streamSettings/sniffing blob is not a JSON object.
    #[error("malformed {field} blob: expected a JSON object ({source})")]
    MalformedConfigBlob {
        field: BlobField,
        #[source]
        source: serde_json::Error,
    },

    /// The source object for a record has a field of the wrong type.
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] serde_json::Error),

    #[error("invalid secondary forward config: {0}")]
    InvalidSecondaryForwardConfig(String),

    #[error("port already in use: {0}")]
    PortInUse(i32),

    #[error("invalid value {value:?} for setting {key}")]
    InvalidSetting { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
