// src/models/mod.rs
pub mod batch;
pub mod certificate;
