use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::classify::RouteTable;
use crate::error::GuardError;
use crate::guard::{ClassPolicy, DEFAULT_CLASS, PolicyTable};
use crate::rate_limit::GuardPolicy;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "request-guard")]
#[command(about = "Rate limiting and CSRF guard in front of a hosted backend")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "GUARD_PORT", default_value_t = 8080)]
    pub port: u16,

    // Backend that admitted requests are forwarded to
    // Example: "https://project.supabase.co"
    #[arg(short, long, env = "GUARD_UPSTREAM")]
    pub upstream: Option<String>,

    // TOML file with the policy table and route rules
    #[arg(short, long, env = "GUARD_CONFIG")]
    pub config: Option<PathBuf>,

    // Token lifetime in milliseconds (overrides the file)
    #[arg(long, env = "GUARD_TOKEN_LIFETIME_MS")]
    pub token_lifetime_ms: Option<u64>,

    // Spend CSRF tokens on first successful use
    #[arg(long, env = "GUARD_SINGLE_USE_TOKENS")]
    pub single_use_tokens: bool,

    // Sweep interval in seconds
    #[arg(long, env = "GUARD_SWEEP_INTERVAL", default_value_t = 60)]
    pub sweep_interval: u64,

    // Key required by the admin endpoints, admin is disabled when unset
    #[arg(long, env = "GUARD_ADMIN_KEY", hide_env_values = true)]
    pub admin_key: Option<String>,

    // Proxy addresses whose X-Forwarded-For / X-Real-IP are believed
    // Example: "127.0.0.1,10.0.0.2" (overrides the file)
    #[arg(long, env = "GUARD_TRUSTED_PROXIES", value_delimiter = ',')]
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PolicyEntry {
    pub max_requests: u32,
    pub window_ms: u64,
    #[serde(default)]
    pub state_changing: bool,
}

impl PolicyEntry {
    const fn new(max_requests: u32, window_ms: u64, state_changing: bool) -> Self {
        Self {
            max_requests,
            window_ms,
            state_changing,
        }
    }

    fn build(&self) -> Result<ClassPolicy, GuardError> {
        Ok(ClassPolicy {
            limit: GuardPolicy::configure(self.max_requests, self.window_ms)?,
            state_changing: self.state_changing,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteRule {
    pub prefix: String,
    pub class: String,
}

/// Guard configuration as read from the TOML file. Every field has a
/// default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub default_policy: PolicyEntry,
    pub classes: BTreeMap<String, PolicyEntry>,
    pub routes: Vec<RouteRule>,
    pub token_lifetime_ms: u64,
    pub single_use_tokens: bool,
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        let classes = [
            ("auth", PolicyEntry::new(5, 60_000, true)),
            ("payment", PolicyEntry::new(10, 3_600_000, true)),
            ("messaging", PolicyEntry::new(30, 60_000, true)),
            ("token", PolicyEntry::new(20, 60_000, false)),
            ("admin", PolicyEntry::new(30, 60_000, false)),
            ("api-general", PolicyEntry::new(100, 60_000, true)),
        ]
        .into_iter()
        .map(|(name, entry)| (name.to_string(), entry))
        .collect();

        let routes = [
            ("/api/auth", "auth"),
            ("/api/session", "auth"),
            ("/api/payments", "payment"),
            ("/api/messages", "messaging"),
            ("/api/csrf-token", "token"),
            ("/admin", "admin"),
            ("/api", "api-general"),
        ]
        .into_iter()
        .map(|(prefix, class)| RouteRule {
            prefix: prefix.to_string(),
            class: class.to_string(),
        })
        .collect();

        Self {
            default_policy: PolicyEntry::new(60, 60_000, false),
            classes,
            routes,
            token_lifetime_ms: 3_600_000,
            single_use_tokens: false,
            trusted_proxies: Vec::new(),
        }
    }
}

impl GuardConfig {
    pub fn from_file(path: &Path) -> Result<Self, GuardError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, GuardError> {
        Ok(toml::from_str(raw)?)
    }

    /// File (or built-in defaults) with CLI overrides applied.
    pub fn load(args: &Args) -> Result<Self, GuardError> {
        let mut config = match &args.config {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading guard config");
                Self::from_file(path)?
            }
            None => Self::default(),
        };

        if let Some(lifetime) = args.token_lifetime_ms {
            config.token_lifetime_ms = lifetime;
        }
        if args.single_use_tokens {
            config.single_use_tokens = true;
        }
        if !args.trusted_proxies.is_empty() {
            config.trusted_proxies = args.trusted_proxies.clone();
        }
        Ok(config)
    }

    /// Validate every policy. Any bad entry stops startup.
    pub fn policy_table(&self) -> Result<PolicyTable, GuardError> {
        if self.token_lifetime_ms == 0 {
            return Err(GuardError::InvalidTokenLifetime);
        }

        let mut table = PolicyTable::new(self.default_policy.build()?);
        for (class, entry) in &self.classes {
            // the fallback owns the `default` counters
            if class == DEFAULT_CLASS {
                return Err(GuardError::ReservedClass(class.clone()));
            }
            table.insert(class.clone(), entry.build()?);
        }
        Ok(table)
    }

    pub fn route_table(&self, policies: &PolicyTable) -> Result<RouteTable, GuardError> {
        let mut routes = RouteTable::new(DEFAULT_CLASS);
        for rule in &self.routes {
            if !policies.contains(&rule.class) {
                return Err(GuardError::UnknownClass {
                    prefix: rule.prefix.clone(),
                    class: rule.class.clone(),
                });
            }
            routes.add(&rule.prefix, &rule.class);
        }
        Ok(routes)
    }
}
