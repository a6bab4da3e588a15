pub mod core;
pub mod curve;
pub mod scores;
pub mod students;
