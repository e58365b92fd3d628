//! Posting service client.
//!
//! The executor only sees `PostingClient`; `HttpPostingClient` is the
//! production implementation over a JSON endpoint.

mod client;
mod http;

pub use client::{PostError, PostReceipt, PostingClient, ReplyTarget};
pub use http::{HttpPostingClient, HttpPostingConfig, classify_status};
