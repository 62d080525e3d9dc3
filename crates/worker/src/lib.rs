//! `gendispatch-worker` library crate.
//!
//! Exposes the [`Dispatcher`](dispatcher::Dispatcher), which routes a
//! generation job to the persistent pod when it is ready and to the
//! serverless pool otherwise. The binary entrypoint lives in `main.rs`.

pub mod dispatcher;

pub use dispatcher::{DispatchOptions, Dispatcher};
