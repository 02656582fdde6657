//! Core nucleation and association engine: geometry, travel-time
//! tables, the node/site/web graph, the nucleation algorithm, and the
//! concurrency and output-tracking scaffolding around it.

pub mod concurrency;
pub mod config;
pub mod error;
pub mod geo;
pub mod node;
pub mod nucleator;
pub mod output;
pub mod pick;
pub mod site;
pub mod taper;
pub mod timewarp;
pub mod traveltime;
pub mod trigger;
pub mod web;

pub use error::{GlassError, Result};
