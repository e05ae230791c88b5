pub mod algorithm;
pub mod async_impl;
pub mod binder;
pub mod broadcast;
pub mod context;
pub mod error;
pub mod progress;
pub mod property;
pub mod registry;
pub mod sync_impl;
pub mod validation;
