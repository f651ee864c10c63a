//! Administrative surfaces around the engine.

pub mod csv;
pub mod enrollment;
pub mod import;
