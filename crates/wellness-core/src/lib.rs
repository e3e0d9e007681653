//! wellness-core - Core library for the wellness platform
//!
//! This crate contains the shared models, database layer, remote scheduling
//! client, and the reconciliation engine used by the HTTP API.

pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;
mod util;

pub use error::{Error, Result};
pub use models::{Appointment, AppointmentId, AppointmentStatus, Client, ClientId};
