use std::sync::Arc;
use tokio::time::{Duration, interval};

use crate::metrics::{COUNTER_ENTRIES, SWEPT_ENTRIES, TOKEN_ENTRIES};
use crate::rate_limit::CounterStore;
use crate::token::TokenStore;

// One pass over both stores, returns entries removed
pub fn sweep_once(counters: &CounterStore, tokens: &TokenStore) -> usize {
    let removed = counters.sweep() + tokens.sweep();

    SWEPT_ENTRIES.inc_by(removed as u64);
    COUNTER_ENTRIES.set(counters.len() as i64);
    TOKEN_ENTRIES.set(tokens.len() as i64);
    removed
}

// Periodic sweep, runs until the runtime shuts down
pub async fn sweeper(counters: Arc<CounterStore>, tokens: Arc<TokenStore>, every: Duration) {
    let mut interval = interval(every);

    tracing::info!(interval = ?every, "sweeper started");

    loop {
        interval.tick().await;

        let removed = sweep_once(&counters, &tokens);
        if removed > 0 {
            tracing::debug!(
                removed,
                counters = counters.len(),
                tokens = tokens.len(),
                "swept stale entries"
            );
        }
    }
}
