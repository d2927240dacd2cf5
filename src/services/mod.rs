// src/services/mod.rs
pub mod streaming_schema;

pub use streaming_schema::{parse_streaming_schema, SchemaStream};
