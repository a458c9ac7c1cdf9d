mod actions;
pub mod client;
pub mod components;
pub mod phase;
pub mod reconcile;

#[cfg(feature = "metrics")]
mod metrics;

pub use reconcile::run;
