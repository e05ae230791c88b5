//! Running algorithms off the caller's thread.
//!
//! Pipelines themselves stay synchronous. This module only moves whole executions
//! onto tokio's blocking pool and turns progress events into a stream:
//! - [`execute_in_background`] and [`execute_batch`] for background execution
//! - [`ChannelProgress`] and [`progress_channel`] for streaming progress to a host

pub mod background;
pub mod channel;

pub use background::{execute_batch, execute_in_background};
pub use channel::{progress_channel, ChannelProgress};
