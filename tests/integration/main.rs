//! Integration tests against a local WebSocket feed.
//!
//! Each test spins up an in-process server on an ephemeral port, so no
//! network access is needed.
//! Run with: cargo test --test integration

mod feed;
mod monitor;
mod support;
