use std::net::IpAddr;
use std::sync::Arc;

use crate::classify::RouteTable;
use crate::guard::Guard;
use crate::rate_limit::CounterStore;
use crate::token::TokenStore;

// app's shared state
pub struct AppState {
    pub guard: Guard,
    pub counters: Arc<CounterStore>,
    pub tokens: Arc<TokenStore>,
    pub routes: RouteTable,
    pub trusted_proxies: Vec<IpAddr>, // peers allowed to set X-Forwarded-For
    pub token_lifetime_ms: u64,
    pub admin_key: Option<String>,
    pub client: reqwest::Client,
    pub upstream: Option<String>, // where admitted requests go
}
