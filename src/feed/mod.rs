//! Streaming market-data feed.
//!
//! - [`connection`]: the single shared WebSocket and its handler registry
//! - [`router`]: subscribe/unsubscribe bookkeeping over that connection
//! - [`messages`]: wire types
//! - [`reconnect`]: reconnection policy

pub mod connection;
pub mod messages;
pub mod reconnect;
pub mod router;

pub use connection::{
    ConnectionManager, ConnectionStatus, DispatchReport, HandlerGuard, HandlerId, HandlerRegistry,
    MessageHandler,
};
pub use messages::{
    decode_frame, BookUpdate, CandleUpdate, ControlMessage, InboundMessage, Method, Subscription,
};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use router::{ControlSink, SubscriptionRouter};
