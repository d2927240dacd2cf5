// src/handlers/mod.rs
pub mod preview;
