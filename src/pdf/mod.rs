// src/pdf/mod.rs
pub mod canvas;
pub mod overlay;
pub mod qr;
pub mod renderer;
