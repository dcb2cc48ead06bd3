//! Domain types and local persistence for the Power BI report exporter.
//!
//! Holds the credential store, the business-id input source, output
//! naming rules and the output directory handle. Nothing in this crate
//! talks to the network; token refresh goes through the
//! [`credentials::TokenProvider`] trait.

pub mod credentials;
pub mod error;
pub mod input;
pub mod naming;
pub mod output;
pub mod types;
