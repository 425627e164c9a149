//! Terminal-phase persistence: drains the writeback intents a request's
//! `Billing` record accumulated into durable app/organization state,
//! append-only activity logs, and PAYG meter events.

mod engine;
mod meter_client;
mod metering;

pub use engine::WritebackEngine;
pub use meter_client::{MeterClient, MeterField};
