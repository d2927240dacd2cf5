// src/models/mod.rs
pub mod chat;
pub mod events;
pub mod template;
