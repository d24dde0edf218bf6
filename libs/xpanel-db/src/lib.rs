pub mod db;
pub mod env;
pub mod error;
pub mod models;
pub mod repositories;

pub use sqlx;
pub use error::ModelError;
