//! Types shared by the wallet boundary, the mint client and the front ends.

pub mod domain;
pub mod error;
pub mod protocol;
