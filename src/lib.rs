//! Order management for the studio admin console: order/contract
//! reconciliation, the fulfillment workflow checklist and payment state.

pub mod admin_mode;
pub mod auth;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod panel;
pub mod payment;
pub mod reconcile;
pub mod templates;
pub mod workflow;
