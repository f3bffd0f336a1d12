//! Security guards: network egress allowlist, content sanitization,
//! prompt-injection wrapping, paywall detection, and tool governance.

pub mod injection;
pub mod network;
pub mod paywall;
pub mod sanitize;
pub mod tools;

pub use injection::wrap_untrusted_content;
pub use network::NetworkAllowlist;
pub use paywall::{detect_paywall, PaywallCheck};
pub use sanitize::{sanitize_content, sanitize_for_llm, ContentType};
pub use tools::ToolPolicy;
