//! Library components of the live results terminal client.

#![warn(missing_docs)]

pub mod logging;
pub mod report;
