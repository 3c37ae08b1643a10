//! End-to-end orchestrator scenarios against a temp `data_dir`, exercising
//! the public library surface the way a caller driving the payment API
//! would, without any live RPC (chain adapters are never invoked on the
//! rejected/not-ready/executed paths covered here — `execute_direct` only
//! writes the record and spawns a detached monitor, it never blocks on
//! the RPC the monitor itself would use).

use std::collections::HashMap;
use std::sync::Arc;

use railclaw::config::{
    ApiConfig, BridgeConfig, ChainConfig, Config, EncryptionConfig, MonitoringConfig, PaymentConfig, SolConfig,
};
use railclaw::metrics::Metrics;
use railclaw::orchestrator::{Orchestrator, Request, Response, Violation};
use railclaw::record::PaymentRecord;
use railclaw::registry::MonitorRegistry;
use railclaw::store::RecordStore;

fn active_policy(bridge_enabled: bool) -> String {
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

fn test_harness(bridge_enabled: bool) -> (Orchestrator, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("policy.yaml"), active_policy(bridge_enabled)).expect("write policy fixture");

    let store = RecordStore::new(dir.path()).expect("record store");

    let mut chains = HashMap::new();
    chains.insert(
        "arbitrum".to_string(),
        ChainConfig {
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
        ChainConfig {
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
        bridge: BridgeConfig {
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
        encryption: EncryptionConfig {
            wallet_key: hex::encode([7u8; 32]),
        },
        payment: PaymentConfig {
            base_url: "https://pay.example.com".into(),
            default_expiry_hours: 24,
        },
        monitoring: MonitoringConfig {
            poll_interval_ms: 100,
            required_confirmations: 20,
            direct_timeout_ms: 1000,
            bridge_timeout_ms: 1000,
        },
        sol: SolConfig::default(),
        api: ApiConfig::default(),
    };

    (
        Orchestrator::new(config, store, MonitorRegistry::new(), Arc::new(Metrics::new())),
        dir,
    )
}

#[tokio::test]
async fn create_then_check_round_trips_through_the_record_store() {
    let (orchestrator, _dir) = test_harness(false);

    let created = orchestrator
        .handle(Request::CreatePaymentLink {
            amount: 42.0,
            token: "USDC".into(),
            chain: "polygon".into(),
            chat_id: Some("chat_1".into()),
        })
        .await;

    let payment_id = match created {
        Response::Executed { payment_id, link } => {
            assert!(link.contains(&payment_id));
            payment_id
        }
        other => panic!("expected executed, got {other:?}"),
    };

    let checked = orchestrator
        .handle(Request::CheckPayment {
            payment_id: payment_id.clone(),
        })
        .await;

    match checked {
        Response::Record(record) => {
            assert_eq!(record.payment_id(), payment_id);
            assert!(matches!(*record, PaymentRecord::Direct(_)));
        }
        other => panic!("expected record, got {other:?}"),
    }
}

#[tokio::test]
async fn check_payment_for_unknown_id_is_rejected_not_a_panic() {
    let (orchestrator, _dir) = test_harness(false);

    let resp = orchestrator
        .handle(Request::CheckPayment {
            payment_id: "pay_does_not_exist".into(),
        })
        .await;

    assert!(matches!(resp, Response::NotFound { payment_id } if payment_id == "pay_does_not_exist"));
}

#[tokio::test]
async fn list_payments_reflects_every_created_link_and_respects_limit() {
    let (orchestrator, _dir) = test_harness(false);

    for _ in 0..3 {
        orchestrator
            .handle(Request::CreatePaymentLink {
                amount: 5.0,
                token: "USDC".into(),
                chain: "polygon".into(),
                chat_id: None,
            })
            .await;
    }

    let all = orchestrator
        .handle(Request::ListPayments { status: None, limit: 50 })
        .await;
    match all {
        Response::RecordList(records) => assert_eq!(records.len(), 3),
        other => panic!("expected record_list, got {other:?}"),
    }

    let capped = orchestrator
        .handle(Request::ListPayments { status: None, limit: 2 })
        .await;
    match capped {
        Response::RecordList(records) => assert_eq!(records.len(), 2),
        other => panic!("expected record_list, got {other:?}"),
    }
}

#[tokio::test]
async fn bridge_route_produces_instructions_and_a_bridge_record() {
    let (orchestrator, _dir) = test_harness(true);

    let resp = orchestrator
        .handle(Request::CreatePaymentLink {
            amount: 200.0,
            token: "USDC".into(),
            chain: "solana".into(),
            chat_id: None,
        })
        .await;

    let payment_id = match resp {
        Response::BridgePayment { payment_id, bridge_instructions } => {
            assert_eq!(bridge_instructions.settlement_chain, "arbitrum");
            assert!(!bridge_instructions.deposit_address.is_empty());
            payment_id
        }
        other => panic!("expected bridge_payment, got {other:?}"),
    };

    let record = orchestrator.handle(Request::CheckPayment { payment_id }).await;
    assert!(matches!(record, Response::Record(boxed) if matches!(*boxed, PaymentRecord::Bridge(_))));
}

#[tokio::test]
async fn resume_pending_monitors_respawns_every_non_terminal_record_without_panicking() {
    let (orchestrator, _dir) = test_harness(false);

    orchestrator
        .handle(Request::CreatePaymentLink {
            amount: 12.0,
            token: "USDC".into(),
            chain: "polygon".into(),
            chat_id: None,
        })
        .await;
    orchestrator
        .handle(Request::CreatePaymentLink {
            amount: 18.0,
            token: "USDC".into(),
            chain: "polygon".into(),
            chat_id: None,
        })
        .await;

    // Simulates a process restart against the same data_dir: a fresh
    // registry has no knowledge of the monitors the first process spawned,
    // so the sweep must find both still-pending records on disk and
    // respawn without panicking, even though the unreachable RPC makes the
    // respawned monitors fail fast.
    orchestrator.resume_pending_monitors().await;

    let records = orchestrator
        .handle(Request::ListPayments { status: None, limit: 50 })
        .await;
    match records {
        Response::RecordList(records) => assert_eq!(records.len(), 2),
        other => panic!("expected record_list, got {other:?}"),
    }
}

#[tokio::test]
async fn amount_above_max_single_payment_is_rejected_with_the_received_amount() {
    let (orchestrator, _dir) = test_harness(false);

    let resp = orchestrator
        .handle(Request::CreatePaymentLink {
            amount: 50_000.0,
            token: "USDC".into(),
            chain: "polygon".into(),
            chat_id: None,
        })
        .await;

    match resp {
        Response::Rejected { violation, received, .. } => {
            assert_eq!(violation, Violation::Amount);
            assert_eq!(received, serde_json::json!(50_000.0));
        }
        other => panic!("expected rejected, got {other:?}"),
    }
}
