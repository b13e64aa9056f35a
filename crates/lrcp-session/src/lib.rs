//! Reliable, ordered byte streams over lrcp datagrams.
//!
//! This is the engine of lrcp. Peers open numbered sessions, exchange data
//! at explicit byte offsets and acknowledge cumulatively; the engine turns
//! that into exactly-once, in-order delivery to a [`StreamHandler`].
//!
//! - [`Session`]: per-session state machine
//! - [`SessionTable`]: owned map of live sessions
//! - [`RetransmitTimer`]: per-session resend timer
//! - [`Dispatcher`]: routes inbound frames and exposes the send API
//! - [`Server`] / [`Client`]: UDP endpoints wired to a dispatcher

pub mod app;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod retransmit;
pub mod server;
pub mod session;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{line_reverse, HandlerFactory, LineReverse, StreamHandler};
pub use client::Client;
pub use config::SessionConfig;
pub use dispatcher::{Dispatcher, Outbound};
pub use error::{Result, SessionError};
pub use retransmit::RetransmitTimer;
pub use server::{Server, ShutdownHandle};
pub use session::{AckOutcome, CloseReason, Session, SessionState, SessionStats, Tick};
pub use table::{SessionTable, SharedSession};
