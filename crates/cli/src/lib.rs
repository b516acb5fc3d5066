//! Alpaca Conform CLI
//!
//! Command-line front end over the conformance engine: runs the protocol
//! checks against one device, lists device plans and manages the
//! configuration file.

pub mod commands;
pub mod output;
pub mod status;
