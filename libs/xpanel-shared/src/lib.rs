use serde::{Deserialize, Serialize};

pub mod xray;

pub mod api {
    use super::*;

    /// Result envelope returned by every panel endpoint.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Msg<T = serde_json::Value> {
        pub success: bool,
        pub msg: String,
        pub obj: Option<T>,
    }

    impl<T> Default for Msg<T> {
        fn default() -> Self {
            Self {
                success: false,
                msg: String::new(),
                obj: None,
            }
        }
    }

    impl<T> Msg<T> {
        pub fn ok(msg: impl Into<String>) -> Self {
            Self {
                success: true,
                msg: msg.into(),
                obj: None,
            }
        }

        pub fn ok_with(msg: impl Into<String>, obj: T) -> Self {
            Self {
                success: true,
                msg: msg.into(),
                obj: Some(obj),
            }
        }

        pub fn fail(msg: impl Into<String>) -> Self {
            Self {
                success: false,
                msg: msg.into(),
                obj: None,
            }
        }
    }

    /// Per-tag traffic counters as reported by the Xray stats API.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Traffic {
        pub is_inbound: bool,
        pub tag: String,
        pub up: i64,
        pub down: i64,
    }
}
