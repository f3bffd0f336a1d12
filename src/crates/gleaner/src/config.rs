//! Service configuration, loaded from the environment at startup.

use tooling::env::{get_env, get_env_bool, get_env_list, get_env_parse_or};

/// Default bind address for the HTTP surface.
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Admin API key; None leaves admin routes open (development mode).
    pub admin_api_key: Option<String>,

    /// Database path/DSN for the durable queue, checkpoints, and changelog.
    pub database_url: Option<String>,

    /// When true, webhook turns are enqueued; otherwise processed inline.
    pub use_durable_queue: bool,

    /// Telegram bot token for the transport.
    pub telegram_bot_token: Option<String>,

    /// HTTP bind address.
    pub bind_addr: String,

    /// Global daily model-spend cap in USD.
    pub llm_daily_budget_usd: Option<f64>,

    /// Per-domain all-time caps parsed from `DOMAIN_BUDGET_<name>` variables.
    pub domain_budgets: Vec<(String, f64)>,

    /// Budget envelopes.
    pub cost_per_task_cap_usd: Option<f64>,
    pub cost_per_agent_daily_cap_usd: Option<f64>,
    pub cost_per_queue_concurrency_cap_usd: Option<f64>,
    pub cost_per_tool_call_cap_usd: Option<f64>,

    /// Extra egress-allowlisted hosts.
    pub network_allowlist: Vec<String>,

    /// Tool governance lists.
    pub approved_tools: Vec<String>,
    pub blocked_tools: Vec<String>,

    /// Quarantine Claims lacking provenance when true.
    pub require_claim_provenance: bool,

    /// Autonomous expansion configuration.
    pub expansion_domains: Vec<String>,
    pub expansion_max_domains: usize,
    pub expansion_max_sources_per_domain: usize,

    /// Root directory approved code changes are written under.
    pub improvement_root: String,

    /// Supervisor recursion cap.
    pub recursion_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin_api_key: None,
            database_url: None,
            use_durable_queue: false,
            telegram_bot_token: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            llm_daily_budget_usd: None,
            domain_budgets: Vec::new(),
            cost_per_task_cap_usd: None,
            cost_per_agent_daily_cap_usd: None,
            cost_per_queue_concurrency_cap_usd: None,
            cost_per_tool_call_cap_usd: None,
            network_allowlist: Vec::new(),
            approved_tools: Vec::new(),
            blocked_tools: Vec::new(),
            require_claim_provenance: false,
            expansion_domains: Vec::new(),
            expansion_max_domains: 3,
            expansion_max_sources_per_domain: 5,
            improvement_root: ".".to_string(),
            recursion_limit: 30,
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        // DOMAIN_BUDGET_Machine_Learning=1.00 caps domain "Machine Learning".
        let mut domain_budgets = Vec::new();
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix("DOMAIN_BUDGET_") {
                if let Ok(limit) = value.trim().parse::<f64>() {
                    domain_budgets.push((name.replace('_', " "), limit));
                } else {
                    tracing::warn!(var = %key, value = %value, "Invalid domain budget, ignoring");
                }
            }
        }

        Self {
            admin_api_key: get_env("ADMIN_API_KEY"),
            database_url: get_env("DATABASE_URL"),
            use_durable_queue: get_env_bool("USE_DURABLE_QUEUE"),
            telegram_bot_token: get_env("TELEGRAM_BOT_TOKEN"),
            bind_addr: get_env("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            llm_daily_budget_usd: parse_budget("LLM_DAILY_BUDGET_USD"),
            domain_budgets,
            cost_per_task_cap_usd: parse_budget("COST_PER_TASK_CAP_USD"),
            cost_per_agent_daily_cap_usd: parse_budget("COST_PER_AGENT_DAILY_CAP_USD"),
            cost_per_queue_concurrency_cap_usd: parse_budget("COST_PER_QUEUE_CONCURRENCY_CAP_USD"),
            cost_per_tool_call_cap_usd: parse_budget("COST_PER_TOOL_CALL_CAP_USD"),
            network_allowlist: get_env_list("SECURITY_NETWORK_ALLOWLIST"),
            approved_tools: get_env_list("SECURITY_APPROVED_TOOLS"),
            blocked_tools: get_env_list("SECURITY_BLOCKED_TOOLS"),
            require_claim_provenance: get_env_bool("REQUIRE_CLAIM_PROVENANCE"),
            expansion_domains: get_env_list("EXPANSION_DOMAINS"),
            expansion_max_domains: get_env_parse_or("EXPANSION_MAX_DOMAINS", 3),
            expansion_max_sources_per_domain: get_env_parse_or(
                "EXPANSION_MAX_SOURCES_PER_DOMAIN",
                5,
            ),
            improvement_root: get_env("IMPROVEMENT_ROOT").unwrap_or_else(|| ".".to_string()),
            recursion_limit: get_env_parse_or("SUPERVISOR_RECURSION_LIMIT", 30),
        }
    }
}

fn parse_budget(var: &str) -> Option<f64> {
    match get_env(var) {
        Some(v) => match v.parse::<f64>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(var = %var, value = %v, "Invalid budget value, ignoring");
                None
            }
        },
        None => None,
    }
}
