//! `pbx-exporter` -- batch PDF export of Power BI reports.
//!
//! [`config`] reads the environment, [`run`] wires the credential store,
//! the Power BI client and the export pipeline together.

pub mod config;
pub mod run;
