//! Power BI REST client library.
//!
//! Provides the Azure AD client-credentials token client, typed request
//! and response bodies for the asynchronous export API, an HTTP wrapper
//! behind the [`api::ExportApi`] trait, and the backoff policy used while
//! waiting for an export job to finish.

pub mod api;
pub mod auth;
pub mod messages;
pub mod poll;
