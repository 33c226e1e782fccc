//! In-memory abuse guard for request handlers: fixed-window rate limiting per
//! caller and operation class, plus per-session CSRF tokens.
//!
//! The library core (`clock`, `rate_limit`, `token`, `guard`) has no I/O. The
//! remaining modules wire it into an axum gateway.

pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod sweeper;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use error::{AppError, GuardError};
pub use guard::{ClassPolicy, Guard, GuardDecision, GuardRequest, PolicyTable};
pub use rate_limit::{CheckOutcome, CounterStore, GuardPolicy};
pub use token::{TokenStore, TokenValue, TokenVerifier};
