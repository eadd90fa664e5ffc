mod activation;
mod client;
mod transaction;

pub use activation::*;
pub use client::*;
pub use transaction::*;
