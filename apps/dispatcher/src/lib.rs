//! Label dispatch service.
//!
//! Sends ZPL print jobs to an HTTPS print gateway, one at a time, in paced pools,
//! and falls back to rendering labels as PDF through the Labelary API.

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod routes;
pub mod state;
