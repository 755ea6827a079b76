//! Failure handling around the durable store.

pub mod retry;
