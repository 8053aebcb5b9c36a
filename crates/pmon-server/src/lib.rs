//! Composition root of the pmon monitoring subsystem.
//!
//! [`service::MonitoringService`] builds the samplers, the health probe
//! engine, the alert engine and the store from a [`config::MonitorConfig`],
//! wires samples and outcomes into alert evaluation and exposes the query
//! surface used by the API layer, including [`export`]'s text format.

pub mod config;
pub mod export;
pub mod logging;
pub mod service;

pub use config::MonitorConfig;
pub use service::MonitoringService;
