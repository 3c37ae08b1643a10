//! Orchestrator (spec §4.E)
//!
//! Parses a request, consults the Policy Store fresh on every call, decides
//! the route (`bridge` / `direct` / `rejected`), creates a payment record,
//! and spawns the owning monitor detached. Never waits on the monitor: the
//! open question in spec §9 is resolved explicitly in favor of "return
//! first, monitor detaches."

use crate::config::Config;
use crate::crypto;
use crate::errors::PolicyError;
use crate::metrics::Metrics;
use crate::monitors::{bridge as bridge_monitor, direct as direct_monitor};
use crate::policy::Policy;
use crate::record::{BridgeFields, DirectFields, PaymentRecord, RecordHeader};
use crate::registry::MonitorRegistry;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use multichain_rs::address_codec::parse_evm_address;
use multichain_rs::types::ScaledAmount;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use tracing::{info, warn};

/// The one on-chain token used for every bridge deposit's input leg: USDC on
/// Solana (spec §3 `input_token_mint`, §4.E step 4).
const BRIDGE_INPUT_DECIMALS: u8 = 6;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    CreatePaymentLink {
        amount: f64,
        token: String,
        chain: String,
        #[serde(default)]
        chat_id: Option<String>,
    },
    CheckPayment {
        payment_id: String,
    },
    ListPayments {
        #[serde(default)]
        status: Option<String>,
        #[serde(default = "default_list_limit")]
        limit: usize,
    },
}

fn default_list_limit() -> usize {
    50
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    Chain,
    Token,
    Amount,
    Emi,
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeInstructions {
    pub deposit_address: String,
    pub amount_to_send: String,
    pub relay_fee: String,
    pub business_receives: String,
    pub settlement_chain: String,
    pub settlement_wallet: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Executed {
        payment_id: String,
        link: String,
    },
    BridgePayment {
        payment_id: String,
        bridge_instructions: BridgeInstructions,
    },
    Rejected {
        violation: Violation,
        policy: serde_json::Value,
        received: serde_json::Value,
    },
    NotReady,
    Record(Box<PaymentRecord>),
    RecordList(Vec<PaymentRecord>),
    NotFound {
        payment_id: String,
    },
}

pub struct Orchestrator {
    config: Config,
    store: RecordStore,
    registry: MonitorRegistry,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(config: Config, store: RecordStore, registry: MonitorRegistry, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            store,
            registry,
            metrics,
        }
    }

    fn load_policy(&self) -> Result<Policy, PolicyError> {
        Policy::load(std::path::Path::new(&self.config.policy_path))
    }

    /// `handle(request) -> Response` (spec §4.E). This is the only entry
    /// point callers use; every other method on this type is a private
    /// implementation detail of `create_payment_link`.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::CreatePaymentLink { amount, token, chain, chat_id } => {
                self.create_payment_link(amount, token, chain, chat_id).await
            }
            Request::CheckPayment { payment_id } => match self.store.get(&payment_id) {
                Ok(record) => Response::Record(Box::new(record)),
                Err(_) => Response::NotFound { payment_id },
            },
            Request::ListPayments { status, limit } => {
                let records = self
                    .store
                    .list(
                        |r| {
                            status
                                .as_ref()
                                .map(|s| format!("{:?}", r.status()).to_lowercase() == s.to_lowercase())
                                .unwrap_or(true)
                        },
                        limit,
                    )
                    .unwrap_or_default();
                Response::RecordList(records)
            }
        }
    }

    async fn create_payment_link(
        &self,
        amount: f64,
        token: String,
        chain: String,
        chat_id: Option<String>,
    ) -> Response {
        let policy = match self.load_policy() {
            Ok(p) => p,
            Err(_) => return Response::NotReady,
        };
        if !policy.is_ready() {
            return Response::NotReady;
        }

        let route = match self.route(&policy, &chain) {
            Ok(route) => route,
            Err(violation) => {
                self.metrics.record_payment_rejected(violation_label(violation));
                return Response::Rejected {
                    violation,
                    policy: serde_json::json!(policy.specification.allowed_chains),
                    received: serde_json::json!(chain),
                };
            }
        };

        if !policy.allows_token(&token) {
            self.metrics.record_payment_rejected("token");
            return Response::Rejected {
                violation: Violation::Token,
                policy: serde_json::json!(policy.specification.allowed_tokens),
                received: serde_json::json!(token),
            };
        }

        let max_single = policy.restrictions.max_single_payment;
        if max_single > 0.0 && amount > max_single {
            self.metrics.record_payment_rejected("amount");
            return Response::Rejected {
                violation: Violation::Amount,
                policy: serde_json::json!(max_single),
                received: serde_json::json!(amount),
            };
        }

        let payment_id = crypto::generate_payment_id();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::hours(self.config.payment.default_expiry_hours as i64);

        match route {
            Route::Direct => self.execute_direct(policy, payment_id, token, chain, amount, chat_id, now, expires_at).await,
            Route::Bridge { settlement_chain } => {
                self.execute_bridge(policy, payment_id, token, chain, settlement_chain, amount, chat_id, now, expires_at)
                    .await
            }
        }
    }

    /// Routing predicate (spec §4.E step 2 / §8 invariant 1): bridge iff
    /// `chain` is both user-payable and bridging is enabled; else direct iff
    /// `chain` is itself allowed; else rejected on `chain`.
    fn route(&self, policy: &Policy, chain: &str) -> Result<Route, Violation> {
        if policy.cross_chain.user_payable_chains.contains(chain) && policy.cross_chain.bridge.enabled {
            let settlement_chain = policy
                .cross_chain
                .bridge
                .settlement_chain
                .clone()
                .ok_or(Violation::Chain)?;
            return Ok(Route::Bridge { settlement_chain });
        }
        if policy.specification.allowed_chains.contains(chain) {
            return Ok(Route::Direct);
        }
        Err(Violation::Chain)
    }

    async fn execute_direct(
        &self,
        policy: Policy,
        payment_id: String,
        token: String,
        chain: String,
        amount: f64,
        chat_id: Option<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Response {
        let header = RecordHeader {
            payment_id: payment_id.clone(),
            business_id: policy.business.id.clone(),
            business_name: policy.business.name.clone(),
            settlement_wallet: policy.business.wallet.clone(),
            chat_id,
            token: token.clone(),
            settlement_chain: chain.clone(),
            status: crate::record::PaymentStatus::Pending,
            created_at,
            expires_at,
            tx_hash: None,
            confirmations: None,
            confirmed_at: None,
            expired_at: None,
            error: None,
        };
        let record = PaymentRecord::Direct(DirectFields {
            header,
            amount: format!("{amount:.6}"),
        });

        if let Err(err) = self.store.create(&record) {
            warn!(%payment_id, error = %err, "failed to create direct payment record");
            return Response::NotReady;
        }
        self.metrics.record_payment_created("direct");

        let Ok(wallet_bytes) = parse_evm_address(&policy.business.wallet) else {
            warn!(%payment_id, "settlement wallet is not a valid EVM address");
            let _ = self.store.update(&payment_id, |r| {
                r.set_status(crate::record::PaymentStatus::Error);
                r.header_mut().error = Some("invalid settlement wallet".into());
            });
            return Response::NotReady;
        };

        self.spawn_direct_monitor(
            payment_id.clone(),
            wallet_bytes,
            token,
            format!("{amount:.6}"),
            created_at,
            chain,
        )
        .await;

        Response::Executed {
            link: format!("{}/p/{}", self.config.payment.base_url, payment_id),
            payment_id,
        }
    }

    async fn spawn_direct_monitor(
        &self,
        payment_id: String,
        wallet: [u8; 20],
        token: String,
        amount: String,
        created_at: DateTime<Utc>,
        chain: String,
    ) {
        let store = self.store.clone();
        let config = self.config.clone();
        let metrics = self.metrics.clone();
        let monitor_id = payment_id.clone();
        let input = direct_monitor::DirectMonitorInput {
            payment_id,
            settlement_wallet: wallet,
            token,
            amount,
            created_at,
            chain,
        };
        metrics.set_active_monitors_delta("direct", 1);
        let handle = tokio::spawn(async move {
            direct_monitor::run(store, config, input, metrics.clone()).await;
            metrics.set_active_monitors_delta("direct", -1);
        });
        self.registry.spawn_guarded(monitor_id, handle).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_bridge(
        &self,
        policy: Policy,
        payment_id: String,
        token: String,
        source_chain: String,
        settlement_chain: String,
        amount: f64,
        chat_id: Option<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Response {
        let bridge_cfg = &self.config.bridge;

        let Ok(output_token_address) = self
            .config
            .chain(&settlement_chain)
            .and_then(|c| {
                c.tokens
                    .get(&token.to_uppercase())
                    .cloned()
                    .ok_or_else(|| eyre::eyre!("no output token configured for {token} on {settlement_chain}"))
            })
        else {
            warn!(%payment_id, %token, %settlement_chain, "bridge requested with no configured output token");
            return Response::NotReady;
        };

        let Some(spoke_pool_destination) = bridge_cfg.spoke_pools.get(&settlement_chain).cloned() else {
            warn!(%settlement_chain, "no SpokePool configured for settlement chain");
            return Response::NotReady;
        };
        let Some(&destination_chain_id) = bridge_cfg.across_chain_ids.get(&settlement_chain) else {
            warn!(%settlement_chain, "no Across chain id configured for settlement chain");
            return Response::NotReady;
        };

        let relay_fee = (amount * bridge_cfg.estimated_relay_fee_pct).max(bridge_cfg.min_relay_fee_buffer);
        let raw_input = match ScaledAmount::parse_units(&format!("{:.6}", amount + relay_fee), BRIDGE_INPUT_DECIMALS) {
            Ok(a) => a.raw,
            Err(err) => {
                warn!(%payment_id, error = %err, "failed to scale bridge input amount");
                return Response::NotReady;
            }
        };
        let raw_output = match ScaledAmount::parse_units(&format!("{amount:.6}"), BRIDGE_INPUT_DECIMALS) {
            Ok(a) => a.raw,
            Err(err) => {
                warn!(%payment_id, error = %err, "failed to scale bridge output amount");
                return Response::NotReady;
            }
        };

        let temp_keypair = Keypair::new();
        let temp_wallet_pubkey = temp_keypair.pubkey();
        let Ok(usdc_mint) = bridge_cfg.solana_usdc_mint.parse::<solana_sdk::pubkey::Pubkey>() else {
            warn!("configured solana USDC mint is not a valid pubkey");
            return Response::NotReady;
        };
        let deposit_address = multichain_rs::solana::derive_ata(&temp_wallet_pubkey, &usdc_mint);

        let Ok(wallet_key_bytes) = hex::decode(self.config.encryption.wallet_key.trim_start_matches("0x")) else {
            warn!("encryption.wallet_key is not valid hex");
            return Response::NotReady;
        };
        let mut key = [0u8; 32];
        key.copy_from_slice(&wallet_key_bytes);
        let Ok(temp_private_key_sealed) = crypto::seal(&temp_keypair.to_bytes(), &key) else {
            warn!(%payment_id, "failed to seal temp solana private key");
            return Response::NotReady;
        };

        let fill_deadline = created_at + chrono::Duration::seconds(bridge_cfg.fill_deadline_offset_sec as i64);

        let header = RecordHeader {
            payment_id: payment_id.clone(),
            business_id: policy.business.id.clone(),
            business_name: policy.business.name.clone(),
            settlement_wallet: policy.business.wallet.clone(),
            chat_id,
            token,
            settlement_chain: settlement_chain.clone(),
            status: crate::record::PaymentStatus::WaitingDeposit,
            created_at,
            expires_at,
            tx_hash: None,
            confirmations: None,
            confirmed_at: None,
            expired_at: None,
            error: None,
        };
        let record = PaymentRecord::Bridge(BridgeFields {
            header,
            source_chain,
            input_token_mint: usdc_mint.to_string(),
            output_token_address: output_token_address.clone(),
            raw_input_amount: raw_input,
            raw_output_amount: raw_output,
            relay_fee,
            temp_wallet_pubkey: temp_wallet_pubkey.to_string(),
            deposit_address: deposit_address.to_string(),
            temp_private_key_sealed,
            spoke_pool_source: bridge_cfg.solana_spoke_pool_program.clone(),
            spoke_pool_destination,
            destination_chain_id,
            quote_timestamp: created_at.timestamp(),
            fill_deadline: fill_deadline.timestamp(),
            deposit_tx_sig: None,
            actual_input_amount: None,
        });

        if let Err(err) = self.store.create(&record) {
            warn!(%payment_id, error = %err, "failed to create bridge payment record");
            return Response::NotReady;
        }
        self.metrics.record_payment_created("bridge");

        self.spawn_bridge_monitor(payment_id.clone(), false).await;

        Response::BridgePayment {
            bridge_instructions: BridgeInstructions {
                deposit_address: deposit_address.to_string(),
                amount_to_send: format!("{:.2}", amount + relay_fee),
                relay_fee: format!("{relay_fee:.2}"),
                business_receives: format!("{amount:.2}"),
                settlement_chain,
                settlement_wallet: policy.business.wallet,
            },
            payment_id,
        }
    }

    async fn spawn_bridge_monitor(&self, payment_id: String, resume_stage3: bool) {
        let store = self.store.clone();
        let config = self.config.clone();
        let metrics = self.metrics.clone();
        let monitor_id = payment_id.clone();
        metrics.set_active_monitors_delta("bridge", 1);
        let handle = tokio::spawn(async move {
            bridge_monitor::run(store, config, payment_id, resume_stage3, metrics.clone()).await;
            metrics.set_active_monitors_delta("bridge", -1);
        });
        self.registry.spawn_guarded(monitor_id, handle).await;
    }

    /// Startup resume sweep (spec §9 supplemented feature, §8 invariant 7):
    /// respawn a monitor for every non-terminal record found on disk, so an
    /// in-memory registry surviving a process restart is not required for
    /// correctness.
    pub async fn resume_pending_monitors(&self) {
        let Ok(records) = self.store.list(|r| !r.status().is_terminal(), usize::MAX) else {
            return;
        };
        for record in records {
            let payment_id = record.payment_id().to_string();
            match &record {
                PaymentRecord::Direct(d) => {
                    info!(%payment_id, "resuming direct monitor after restart");
                    let Ok(wallet) = parse_evm_address(&d.header.settlement_wallet) else {
                        continue;
                    };
                    self.spawn_direct_monitor(
                        payment_id,
                        wallet,
                        d.header.token.clone(),
                        d.amount.clone(),
                        d.header.created_at,
                        d.header.settlement_chain.clone(),
                    )
                    .await;
                }
                PaymentRecord::Bridge(b) => {
                    let resume_stage3 = b.header.status == crate::record::PaymentStatus::Bridging;
                    info!(%payment_id, resume_stage3, "resuming bridge monitor after restart");
                    self.spawn_bridge_monitor(payment_id, resume_stage3).await;
                }
            }
        }
    }

    /// Number of monitors currently registered as running. Used by `main`
    /// to let in-flight monitors finish their own deadline on shutdown
    /// instead of killing them with the process immediately.
    pub async fn active_monitor_count(&self) -> usize {
        self.registry.active_count().await
    }
}

enum Route {
    Direct,
    Bridge { settlement_chain: String },
}

fn violation_label(violation: Violation) -> &'static str {
    match violation {
        Violation::Chain => "chain",
        Violation::Token => "token",
        Violation::Amount => "amount",
        Violation::Emi => "emi",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;

    fn policy_yaml(bridge_enabled: bool) -> String {
        format!(
            r#"
version: 1
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
cross_chain:
  user_payable_chains: [solana]
  bridge:
    enabled: {bridge_enabled}
    provider: across
    settlement_chain: arbitrum
"#
        )
    }

    fn fake_orchestrator() -> (Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path()).unwrap();
        let mut chains = std::collections::HashMap::new();
        chains.insert(
            "arbitrum".to_string(),
            crate::config::ChainConfig {
                rpc_url: "http://localhost:9999".into(),
                ws_url: None,
                tokens: [("USDC".to_string(), "0x2222222222222222222222222222222222222222".to_string())]
                    .into_iter()
                    .collect(),
                native_symbol: None,
                block_time_seconds: 1,
                lookback_blocks: 1500,
            },
        );
        chains.insert(
            "polygon".to_string(),
            crate::config::ChainConfig {
                rpc_url: "http://localhost:9999".into(),
                ws_url: None,
                tokens: [("USDC".to_string(), "0x3333333333333333333333333333333333333333".to_string())]
                    .into_iter()
                    .collect(),
                native_symbol: None,
                block_time_seconds: 1,
                lookback_blocks: 1500,
            },
        );

        let config = Config {
            data_dir: dir.path().display().to_string(),
            policy_path: dir.path().join("policy.yaml").display().to_string(),
            chains,
            bridge: crate::config::BridgeConfig {
                spoke_pools: [("arbitrum".to_string(), "0x4444444444444444444444444444444444444444".to_string())]
                    .into_iter()
                    .collect(),
                across_chain_ids: [("arbitrum".to_string(), 42161u64)].into_iter().collect(),
                estimated_relay_fee_pct: 0.0012,
                min_relay_fee_buffer: 0.01,
                fill_deadline_offset_sec: 21600,
                solana_rpc_url: "http://localhost:8899".into(),
                solana_spoke_pool_program: "11111111111111111111111111111111".into(),
                solana_usdc_mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into(),
                solana_chain_id: 1399811149,
                historical_lookback_blocks: 300,
                resume_lookback_blocks: 2000,
            },
            encryption: crate::config::EncryptionConfig {
                wallet_key: hex::encode([7u8; 32]),
            },
            payment: crate::config::PaymentConfig {
                base_url: "https://pay.example.com".into(),
                default_expiry_hours: 24,
            },
            monitoring: crate::config::MonitoringConfig {
                poll_interval_ms: 100,
                required_confirmations: 20,
                direct_timeout_ms: 1000,
                bridge_timeout_ms: 1000,
            },
            sol: crate::config::SolConfig::default(),
            api: crate::config::ApiConfig::default(),
        };

        (
            Orchestrator::new(config, store, MonitorRegistry::new(), Arc::new(Metrics::new())),
            dir,
        )
    }

    #[tokio::test]
    async fn test_rejects_unknown_chain() {
        let (orch, dir) = fake_orchestrator();
        std::fs::write(dir.path().join("policy.yaml"), policy_yaml(false)).unwrap();

        let resp = orch
            .handle(Request::CreatePaymentLink {
                amount: 50.0,
                token: "USDC".into(),
                chain: "solana".into(),
                chat_id: None,
            })
            .await;

        match resp {
            Response::Rejected { violation, received, .. } => {
                assert_eq!(violation, Violation::Chain);
                assert_eq!(received, serde_json::json!("solana"));
            }
            other => panic!("expected rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_direct_route_for_allowed_chain_without_bridging() {
        let (orch, dir) = fake_orchestrator();
        std::fs::write(dir.path().join("policy.yaml"), policy_yaml(false)).unwrap();

        let resp = orch
            .handle(Request::CreatePaymentLink {
                amount: 100.0,
                token: "USDC".into(),
                chain: "polygon".into(),
                chat_id: None,
            })
            .await;

        match resp {
            Response::Executed { link, .. } => assert!(link.contains("/p/pay_")),
            other => panic!("expected executed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bridge_route_when_user_payable_and_enabled() {
        let (orch, dir) = fake_orchestrator();
        std::fs::write(dir.path().join("policy.yaml"), policy_yaml(true)).unwrap();

        let resp = orch
            .handle(Request::CreatePaymentLink {
                amount: 100.0,
                token: "USDC".into(),
                chain: "solana".into(),
                chat_id: None,
            })
            .await;

        match resp {
            Response::BridgePayment { bridge_instructions, .. } => {
                assert_eq!(bridge_instructions.settlement_chain, "arbitrum");
                assert_eq!(bridge_instructions.business_receives, "100.00");
                assert_eq!(bridge_instructions.relay_fee, "0.12");
                assert_eq!(bridge_instructions.amount_to_send, "100.12");
            }
            other => panic!("expected bridge_payment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_amount_above_max_single_payment() {
        let (orch, dir) = fake_orchestrator();
        std::fs::write(dir.path().join("policy.yaml"), policy_yaml(false)).unwrap();

        let resp = orch
            .handle(Request::CreatePaymentLink {
                amount: 10_000.01,
                token: "USDC".into(),
                chain: "polygon".into(),
                chat_id: None,
            })
            .await;

        assert!(matches!(
            resp,
            Response::Rejected { violation: Violation::Amount, .. }
        ));
    }

    #[tokio::test]
    async fn test_amount_equal_to_max_is_accepted() {
        let (orch, dir) = fake_orchestrator();
        std::fs::write(dir.path().join("policy.yaml"), policy_yaml(false)).unwrap();

        let resp = orch
            .handle(Request::CreatePaymentLink {
                amount: 10_000.0,
                token: "USDC".into(),
                chain: "polygon".into(),
                chat_id: None,
            })
            .await;

        assert!(matches!(resp, Response::Executed { .. }));
    }

    #[tokio::test]
    async fn test_rejects_disallowed_token() {
        let (orch, dir) = fake_orchestrator();
        std::fs::write(dir.path().join("policy.yaml"), policy_yaml(false)).unwrap();

        let resp = orch
            .handle(Request::CreatePaymentLink {
                amount: 10.0,
                token: "DAI".into(),
                chain: "polygon".into(),
                chat_id: None,
            })
            .await;

        assert!(matches!(resp, Response::Rejected { violation: Violation::Token, .. }));
    }

    #[tokio::test]
    async fn test_not_ready_when_policy_not_onboarded() {
        let (orch, dir) = fake_orchestrator();
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
        std::fs::write(dir.path().join("policy.yaml"), yaml).unwrap();

        let resp = orch
            .handle(Request::CreatePaymentLink {
                amount: 10.0,
                token: "USDC".into(),
                chain: "polygon".into(),
                chat_id: None,
            })
            .await;
        assert!(matches!(resp, Response::NotReady));
    }

    #[test]
    fn test_policy_parses_independent_of_load_path() {
        // Sanity check that the yaml fixture used across these tests is
        // itself a valid policy document (caught a typo once).
        assert!(Policy::parse(&policy_yaml(true)).is_ok());
    }
}
