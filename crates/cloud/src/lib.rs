//! HTTP clients for the two generation backends.
//!
//! - [`pod::PodClient`] talks to a single pre-warmed worker over a
//!   synchronous request/response API.
//! - [`serverless::ServerlessClient`] talks to a queue-backed endpoint
//!   supporting bounded synchronous runs plus submit/poll/cancel.
//!
//! Both implement the traits in [`backend`] so the dispatcher can be
//! exercised against in-memory fakes. The bounded poll loop lives in
//! [`poll`].

pub mod backend;
pub mod error;
pub mod pod;
pub mod poll;
pub mod serverless;

pub use backend::{PodBackend, ServerlessBackend};
pub use error::ClientError;
pub use pod::PodClient;
pub use poll::poll_until_terminal;
pub use serverless::ServerlessClient;
