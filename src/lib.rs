//! Litper Pro logistics analytics
//!
//! Carrier performance history, risk scoring, carrier recommendation and
//! shipment reports for Colombian parcel delivery, plus a gateway to the
//! AI providers and the ML backend used by the dashboard.

pub mod analytics;
pub mod api;
pub mod carrier_names;
pub mod cities;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod insights;
pub mod integrations;
pub mod ml_backend;
pub mod models;
pub mod recommend;
pub mod risk;
