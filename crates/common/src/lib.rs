#![cfg_attr(feature = "strict", deny(warnings))]

//! Data model, normalization, and shared types for the billing enforcement
//! core: apps, organizations, users, blocked/dunning state, and the
//! permission and billing-log records derived from them.

pub mod config;
pub mod headers;
pub mod model;
pub mod normalize;
pub mod time;

pub use headers::InboundHeaders;
pub use model::*;
