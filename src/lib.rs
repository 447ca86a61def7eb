//! # Horizon Guard
//!
//! Workspace facade re-exporting the forecasting engine and its statistical
//! primitives.
//!
//! ## Example
//!
//! ```
//! use horizon_guard_workspace::forecast_engine::config::{Horizon, HorizonRegistry};
//!
//! let registry = HorizonRegistry::default();
//! let profile = registry.get(Horizon::Days7).unwrap();
//! assert_eq!(profile.horizon_change_cap, 0.05);
//! assert!(registry.validate().is_ok());
//! ```

pub use forecast_engine;
pub use stat_math;

/// Horizons supported by the engine, in days
pub fn supported_horizons() -> Vec<usize> {
    forecast_engine::Horizon::ALL
        .iter()
        .map(|h| h.days())
        .collect()
}
