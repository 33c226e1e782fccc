mod admin;
mod csrf;
mod forward;
mod guard;
mod health;
mod metrics;

pub use admin::reset_handler;
pub use csrf::{issue_token_handler, logout_handler};
pub use forward::forward_handler;
pub use guard::guard_middleware;
pub use health::health_handler;
pub use metrics::metrics_handler;
