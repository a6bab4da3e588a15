//! Grade curving ("katrol") engine and the JSON-lines sidecar around it.
//!
//! The curving core (`calc`, `curve`, `session`) only talks to storage through
//! [`repo::ScoreRepository`]; `ipc` is the surface the school screens drive.

pub mod calc;
pub mod config;
pub mod curve;
pub mod db;
pub mod error;
pub mod ipc;
pub mod model;
pub mod present;
pub mod repo;
pub mod session;

pub use error::{CurveError, CurveResult};
pub use session::{compute_curve, recompute_curve, save_curve, CurveSession, SaveMeta};
