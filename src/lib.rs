//! premium-checkout - subscription checkout that issues premium activation codes
//!
//! On subscription approval a code is generated from the plan, persisted to the
//! realtime database (or a local ledger when it is unreachable) and handed to a
//! presenter for display.

pub mod checkout;
pub mod code;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod persistence;
pub mod plans;
pub mod presenter;
pub mod storage;
pub mod store;
pub mod util;
