pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod models;
pub mod presence;
pub mod routes;
pub mod schema;
pub mod session;
pub mod state;
pub mod store;

pub use state::AppState;

/// Counters this service emits, with their Prometheus help text.
pub const COUNTERS: &[(&str, &str)] = &[
    ("notifications_persisted_total", "Notification records stored by admin sends"),
    ("notifications_failed_total", "Recipients whose notification could not be stored"),
    ("live_deliveries_total", "Events handed to open connections"),
    ("live_delivery_failures_total", "Live pushes that failed for a registered connection"),
];
