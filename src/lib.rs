//! Francis-99 turbine blade fault diagnosis.
//!
//! Five sensor channels in; fault stage, reference crop and an expert explanation out.
//! `pipeline::AppContext` owns the loaded artifacts; `server::router` exposes it over HTTP.

pub mod config;
pub mod error;
pub mod explain;
pub mod knowledge;
pub mod model;
pub mod pipeline;
pub mod scaler;
pub mod server;
pub mod types;
pub mod visual;
pub mod window;

pub use error::DiagnosisError;
pub use pipeline::{AppContext, Diagnosis};
pub use types::{ExplanationOutcome, SensorReading, StageExplanation};
