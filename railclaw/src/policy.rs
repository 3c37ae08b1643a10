//! Policy Store (spec §4.A)
//!
//! A typed read-only view over the versioned policy document. `load()` is
//! called fresh on every request path; nothing here is cached across a
//! request boundary, which is what gives policy edits immediate effect
//! (spec §4.A access discipline, §9 "do not hold a process-wide parsed
//! policy").

use crate::errors::PolicyError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    pub wallet: String,
    pub onboarded: bool,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Specification {
    pub allowed_chains: HashSet<String>,
    pub allowed_tokens: HashSet<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Restrictions {
    #[serde(default)]
    pub max_single_payment: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Operational {
    #[serde(default)]
    pub emi_enabled: bool,
    #[serde(default)]
    pub emi_premium_percent: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub settlement_chain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossChain {
    #[serde(default)]
    pub user_payable_chains: HashSet<String>,
    #[serde(default)]
    pub bridge: BridgeSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            settlement_chain: None,
        }
    }
}

impl Default for CrossChain {
    fn default() -> Self {
        Self {
            user_payable_chains: HashSet::new(),
            bridge: BridgeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    PendingOnboarding,
    Active,
}

/// A versioned, validated policy document (spec §3).
#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    pub version: u64,
    pub status: PolicyStatus,
    pub business: Business,
    pub specification: Specification,
    #[serde(default)]
    pub restrictions: Restrictions,
    #[serde(default)]
    pub operational: Operational,
    #[serde(default)]
    pub cross_chain: CrossChain,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Default for Restrictions {
    fn default() -> Self {
        Self {
            max_single_payment: 0.0,
        }
    }
}

impl Default for Operational {
    fn default() -> Self {
        Self {
            emi_enabled: false,
            emi_premium_percent: 0.0,
        }
    }
}

impl Policy {
    /// Parse and validate a policy document's raw bytes. The document is
    /// plain YAML; "front-matter" (`version`, `status`, `updated_at`) are
    /// ordinary top-level keys alongside `business`/`specification`/etc, so
    /// one `serde_yaml` pass covers the whole thing (spec §6).
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let policy: Policy = serde_yaml::from_str(raw).map_err(|e| PolicyError::Malformed {
            reason: e.to_string(),
        })?;
        policy.validate()?;
        Ok(policy)
    }

    /// Read and validate the policy document at `path` (spec §4.A `load()`).
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path).map_err(|_| PolicyError::NotFound {
            path: path.display().to_string(),
        })?;
        Self::parse(&raw)
    }

    fn validate(&self) -> Result<(), PolicyError> {
        // (i) bridge.enabled implies settlement_chain is itself allowed.
        if self.cross_chain.bridge.enabled {
            let settlement = self.cross_chain.bridge.settlement_chain.as_deref();
            let ok = settlement
                .map(|c| self.specification.allowed_chains.contains(c))
                .unwrap_or(false);
            if !ok {
                return Err(PolicyError::InvariantViolated {
                    which: "cross_chain.bridge.settlement_chain must be in allowed_chains".into(),
                });
            }
        }

        // (ii) an active policy must name at least one chain and token.
        if self.status == PolicyStatus::Active {
            if self.specification.allowed_chains.is_empty() {
                return Err(PolicyError::InvariantViolated {
                    which: "allowed_chains must be non-empty when status=active".into(),
                });
            }
            if self.specification.allowed_tokens.is_empty() {
                return Err(PolicyError::InvariantViolated {
                    which: "allowed_tokens must be non-empty when status=active".into(),
                });
            }
        }

        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.status == PolicyStatus::Active && self.business.onboarded
    }

    /// Case-insensitive token membership check (spec §4.E step 3).
    pub fn allows_token(&self, token: &str) -> bool {
        self.specification
            .allowed_tokens
            .iter()
            .any(|t| t.eq_ignore_ascii_case(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml(bridge_enabled: bool, settlement: &str) -> String {
        format!(
            r#"
version: 3
status: active
business:
  id: biz_1
  name: Example Co
  wallet: "0x1111111111111111111111111111111111111111"
  onboarded: true
specification:
  allowed_chains: [polygon, arbitrum]
  allowed_tokens: [USDC]
restrictions:
  max_single_payment: 10000
operational:
  emi_enabled: false
  emi_premium_percent: 0
cross_chain:
  user_payable_chains: [solana]
  bridge:
    enabled: {bridge_enabled}
    provider: across
    settlement_chain: {settlement}
"#
        )
    }

    #[test]
    fn test_parse_valid_policy() {
        let policy = Policy::parse(&sample_yaml(true, "arbitrum")).unwrap();
        assert_eq!(policy.version, 3);
        assert!(policy.is_ready());
        assert!(policy.allows_token("usdc"));
    }

    #[test]
    fn test_bridge_settlement_chain_must_be_allowed() {
        let err = Policy::parse(&sample_yaml(true, "optimism")).unwrap_err();
        assert!(matches!(err, PolicyError::InvariantViolated { .. }));
    }

    #[test]
    fn test_active_requires_nonempty_chains() {
        let yaml = r#"
version: 1
status: active
business:
  id: biz_1
  name: Example Co
  wallet: "0x1111111111111111111111111111111111111111"
  onboarded: true
specification:
  allowed_chains: []
  allowed_tokens: [USDC]
"#;
        let err = Policy::parse(yaml).unwrap_err();
        assert!(matches!(err, PolicyError::InvariantViolated { .. }));
    }

    #[test]
    fn test_pending_onboarding_allows_empty_chains() {
        let yaml = r#"
version: 1
status: pending_onboarding
business:
  id: biz_1
  name: Example Co
  wallet: "0x1111111111111111111111111111111111111111"
  onboarded: false
specification:
  allowed_chains: []
  allowed_tokens: []
"#;
        let policy = Policy::parse(yaml).unwrap();
        assert!(!policy.is_ready());
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let err = Policy::load(Path::new("/nonexistent/path/policy.yaml")).unwrap_err();
        assert!(matches!(err, PolicyError::NotFound { .. }));
    }
}
