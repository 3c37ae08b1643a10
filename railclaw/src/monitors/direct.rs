//! Direct EVM Monitor (spec §4.D.1)
//!
//! Locates the single transfer that pays `settlement_wallet` the expected
//! amount of `token` on `settlement_chain`, then waits for
//! `required_confirmations`.

use crate::config::Config;
use crate::errors::RpcError;
use crate::metrics::Metrics;
use crate::record::{Notification, PaymentStatus};
use crate::store::RecordStore;
use chrono::Utc;
use eyre::{eyre, Result};
use multichain_rs::address_codec::parse_evm_address;
use multichain_rs::evm::{parse_erc20_transfer, EvmClient, EvmWatcher, LogFilterParams};
use multichain_rs::types::{EvmAddress, ScaledAmount};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Native coin symbols dispatched by block-scanning instead of `Transfer`
/// logs (spec §4.D.1).
const NATIVE_SYMBOLS: &[&str] = &["ETH", "MATIC", "AVAX", "BNB", "SOL"];

/// Low/high tolerance multipliers for amount matching (spec §4.D.1).
const TOLERANCE_LOW: f64 = 0.99;
const TOLERANCE_HIGH: f64 = 1.10;

pub struct DirectMonitorInput {
    pub payment_id: String,
    pub settlement_wallet: [u8; 20],
    pub token: String,
    pub amount: String,
    pub created_at: chrono::DateTime<Utc>,
    pub chain: String,
}

struct MatchedTransfer {
    tx_hash: [u8; 32],
    block_number: u64,
}

/// Run the direct monitor to completion, mutating the owning record as it
/// progresses. Never propagates to a caller (spec §7): the final outcome is
/// only visible through the record's terminal status.
pub async fn run(store: RecordStore, config: Config, input: DirectMonitorInput, metrics: Arc<Metrics>) {
    let payment_id = input.payment_id.clone();
    let deadline = Instant::now() + Duration::from_millis(config.monitoring.direct_timeout_ms);
    let poll_interval = Duration::from_millis(config.monitoring.poll_interval_ms);

    match run_inner(&store, &config, &input, deadline, poll_interval, &metrics).await {
        Ok(Some(matched)) => match finalize_confirmed(&store, &config, &input, matched, deadline).await {
            Ok(true) => metrics.record_payment_confirmed("direct"),
            Ok(false) => metrics.record_payment_expired("direct"),
            Err(err) => {
                warn!(%payment_id, error = %err, "direct monitor failed during confirmation wait");
                mark_error(&store, &payment_id, &err.to_string());
                metrics.record_payment_errored("direct");
            }
        },
        Ok(None) => {
            info!(%payment_id, "direct monitor timed out without a match");
            mark_expired(&store, &payment_id);
            metrics.record_payment_expired("direct");
        }
        Err(err) => {
            warn!(%payment_id, error = %err, "direct monitor fatal error");
            mark_error(&store, &payment_id, &err.to_string());
            metrics.record_payment_errored("direct");
        }
    }
}

async fn run_inner(
    store: &RecordStore,
    config: &Config,
    input: &DirectMonitorInput,
    deadline: Instant,
    poll_interval: Duration,
    metrics: &Metrics,
) -> Result<Option<MatchedTransfer>> {
    let chain_cfg = config.chain(&input.chain)?;
    let client = EvmClient::new(&chain_cfg.rpc_url, chain_cfg.ws_url.clone(), 0)?;
    let watcher = EvmWatcher::new(client.clone());

    let current_block = client.get_block_number().await?;
    let elapsed_since_created = (Utc::now() - input.created_at).num_seconds().max(0) as u64;
    let blocks_since_created = elapsed_since_created / chain_cfg.block_time_seconds.max(1);
    let from_block = current_block.saturating_sub(blocks_since_created.min(chain_cfg.lookback_blocks));

    let is_native = NATIVE_SYMBOLS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(&input.token));

    if is_native {
        return scan_native(store, &input.payment_id, &client, input, from_block, deadline, poll_interval).await;
    }

    let token_address = chain_cfg
        .tokens
        .get(&input.token.to_uppercase())
        .ok_or_else(|| eyre!("no token address configured for {} on {}", input.token, input.chain))?;
    let token_address_bytes = parse_evm_address(token_address)?;
    let decimals = client
        .get_token_decimals(alloy::primitives::Address::from(token_address_bytes))
        .await;
    let expected = ScaledAmount::parse_units(&input.amount, decimals)?;

    let known_spoke_pools: HashSet<[u8; 20]> = config
        .bridge
        .spoke_pools
        .values()
        .filter_map(|a| parse_evm_address(a).ok())
        .collect();

    scan_erc20(
        store,
        &input.payment_id,
        &watcher,
        alloy::primitives::Address::from(token_address_bytes),
        input.settlement_wallet,
        expected,
        &known_spoke_pools,
        from_block,
        deadline,
        poll_interval,
        metrics,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn scan_erc20(
    store: &RecordStore,
    payment_id: &str,
    watcher: &EvmWatcher,
    token_address: alloy::primitives::Address,
    wallet: [u8; 20],
    expected: ScaledAmount,
    known_spoke_pools: &HashSet<[u8; 20]>,
    mut from_block: u64,
    deadline: Instant,
    poll_interval: Duration,
    metrics: &Metrics,
) -> Result<Option<MatchedTransfer>> {
    use multichain_rs::hash::left_pad_address;

    let topic_to = alloy::primitives::FixedBytes::from(left_pad_address(&wallet));
    let transfer_sig = alloy::primitives::FixedBytes::from(
        multichain_rs::hash::keccak256(b"Transfer(address,address,uint256)"),
    );

    loop {
        if Instant::now() >= deadline {
            return Ok(None);
        }

        let current = match watcher.client().get_block_number().await {
            Ok(n) => n,
            Err(err) => match RpcError::classify(&err) {
                RpcError::Fatal(reason) => return Err(eyre!(reason)),
                RpcError::Transient(reason) => {
                    warn!(%payment_id, error = %reason, "transient error polling block number, retrying");
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            },
        };
        if current >= from_block {
            let filter = LogFilterParams {
                address: token_address,
                topics: vec![Some(transfer_sig), None, Some(topic_to)],
                from_block,
                to_block: current,
            };
            let outcome = watcher
                .historical_sweep_with_retry_hook(filter, from_block, current, &|| {
                    metrics.record_evm_chunk_retry()
                })
                .await?;
            for log in outcome.logs {
                let Some(transfer) = parse_erc20_transfer(&log) else {
                    continue;
                };
                if known_spoke_pools.contains(&transfer.from.0) {
                    continue;
                }
                if expected.observed_within(transfer.value, TOLERANCE_LOW, TOLERANCE_HIGH) {
                    info!(%payment_id, tx_hash = %hex::encode(transfer.tx_hash), "matched direct ERC-20 transfer");
                    store.update(payment_id, |r| r.set_status(PaymentStatus::Confirming)).ok();
                    return Ok(Some(MatchedTransfer {
                        tx_hash: transfer.tx_hash,
                        block_number: transfer.block_number,
                    }));
                }
            }
            from_block = current + 1;
        }

        tokio::time::sleep(poll_interval).await;
    }
}

async fn scan_native(
    store: &RecordStore,
    payment_id: &str,
    client: &EvmClient,
    input: &DirectMonitorInput,
    mut from_block: u64,
    deadline: Instant,
    poll_interval: Duration,
) -> Result<Option<MatchedTransfer>> {
    let expected = ScaledAmount::parse_units(&input.amount, 18)?;
    let wallet = EvmAddress(input.settlement_wallet);

    loop {
        if Instant::now() >= deadline {
            return Ok(None);
        }

        let current = match client.get_block_number().await {
            Ok(n) => n,
            Err(err) => match RpcError::classify(&err) {
                RpcError::Fatal(reason) => return Err(eyre!(reason)),
                RpcError::Transient(reason) => {
                    warn!(%payment_id, error = %reason, "transient error polling block number, retrying");
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            },
        };
        while from_block <= current {
            match client.get_block_transactions(from_block).await {
                Ok(txs) => {
                    for tx in txs {
                        if tx.to != Some(wallet) {
                            continue;
                        }
                        if expected.observed_within(tx.value, TOLERANCE_LOW, TOLERANCE_HIGH) {
                            let tx_hash_hex = hex::encode(tx.tx_hash);
                            info!(%payment_id, tx_hash = %tx_hash_hex, "matched direct native transfer");
                            store.update(payment_id, |r| r.set_status(PaymentStatus::Confirming)).ok();
                            return Ok(Some(MatchedTransfer {
                                tx_hash: tx.tx_hash,
                                block_number: from_block,
                            }));
                        }
                    }
                }
                Err(err) => {
                    warn!(%payment_id, block = from_block, error = %err, "transient error reading block, retrying");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    continue;
                }
            }
            from_block += 1;
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Returns `Ok(true)` if confirmed before `deadline`, `Ok(false)` if the
/// deadline passed first (the record is marked `expired` either way the
/// caller needs to know, so the metric recorded upstream is accurate).
async fn finalize_confirmed(
    store: &RecordStore,
    config: &Config,
    input: &DirectMonitorInput,
    matched: MatchedTransfer,
    deadline: Instant,
) -> Result<bool> {
    let chain_cfg = config.chain(&input.chain)?;
    let client = EvmClient::new(&chain_cfg.rpc_url, chain_cfg.ws_url.clone(), 0)?;
    let required = config.monitoring.required_confirmations;

    loop {
        if Instant::now() >= deadline {
            mark_expired(store, &input.payment_id);
            return Ok(false);
        }

        let current = match client.get_block_number().await {
            Ok(n) => n,
            Err(err) => {
                warn!(payment_id = %input.payment_id, error = %err, "transient error polling block number");
                tokio::time::sleep(Duration::from_millis(config.monitoring.poll_interval_ms)).await;
                continue;
            }
        };

        let confirmations = current.saturating_sub(matched.block_number) + 1;
        if confirmations >= required {
            let tx_hash_hex = format!("0x{}", hex::encode(matched.tx_hash));
            store.update(&input.payment_id, |r| {
                let header = r.header_mut();
                header.status = PaymentStatus::Confirmed;
                header.tx_hash = Some(tx_hash_hex.clone());
                header.confirmations = Some(confirmations);
                header.confirmed_at = Some(Utc::now());
            })?;
            store.enqueue_notification(
                &input.payment_id,
                &Notification::DirectConfirmed {
                    payment_id: input.payment_id.clone(),
                    tx_hash: tx_hash_hex,
                    token: input.token.clone(),
                    chain: input.chain.clone(),
                    confirmations,
                    confirmed_at: Utc::now(),
                },
            )?;
            return Ok(true);
        }

        tokio::time::sleep(Duration::from_millis(config.monitoring.poll_interval_ms)).await;
    }
}

fn mark_expired(store: &RecordStore, payment_id: &str) {
    let _ = store.update(payment_id, |r| {
        let header = r.header_mut();
        header.status = PaymentStatus::Expired;
        header.expired_at = Some(Utc::now());
    });
}

fn mark_error(store: &RecordStore, payment_id: &str, reason: &str) {
    let _ = store.update(payment_id, |r| {
        let header = r.header_mut();
        header.status = PaymentStatus::Error;
        header.error = Some(reason.to_string());
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_symbol_set_matches_spec() {
        for sym in ["ETH", "MATIC", "AVAX", "BNB", "SOL"] {
            assert!(NATIVE_SYMBOLS.iter().any(|s| s.eq_ignore_ascii_case(sym)));
        }
        assert!(!NATIVE_SYMBOLS.iter().any(|s| s.eq_ignore_ascii_case("USDC")));
    }

    #[test]
    fn test_tolerance_band_constants() {
        assert_eq!(TOLERANCE_LOW, 0.99);
        assert_eq!(TOLERANCE_HIGH, 1.10);
    }

    #[test]
    fn test_classify_rpc_error_fatal_for_missing_config() {
        let err = eyre!("no rpc configuration for chain \"ghost\"");
        assert!(matches!(RpcError::classify(&err), RpcError::Fatal(_)));
    }

    #[test]
    fn test_classify_rpc_error_transient_otherwise() {
        let err = eyre!("connection reset by peer");
        assert!(matches!(RpcError::classify(&err), RpcError::Transient(_)));
    }
}
