//! Solana RPC client
//!
//! Thin async wrapper over `solana_client::nonblocking::RpcClient`: balance
//! polling for the deposit-watch stage, `approveChecked` / raw instruction
//! submission with poll-confirm (spec §4.C: "never a persistent
//! websocket"). A single client is cheap to clone and safe to share across
//! monitors.

use eyre::{eyre, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of a token-account balance read. `AccountNotFound` is expected and
/// benign while a deposit ATA has not yet been created by the user's first
/// transfer (spec §4.D.2 stage 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAccountBalance {
    Amount(u64),
    AccountNotFound,
}

/// Thrown by [`SolanaClient::send_and_confirm`] when a submitted transaction
/// never reaches a confirmed status before the deadline, or the RPC itself
/// rejects it (spec §7 `TxError`).
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("transaction submission failed: {reason}")]
    Submit { reason: String },
    #[error("transaction {signature} not confirmed within deadline")]
    ConfirmTimeout { signature: Signature },
    #[error("transaction {signature} failed on-chain: {reason}")]
    Failed { signature: Signature, reason: String },
}

/// Read-write Solana RPC client.
#[derive(Clone)]
pub struct SolanaClient {
    rpc: Arc<RpcClient>,
}

impl SolanaClient {
    pub fn new(rpc_url: &str) -> Self {
        let rpc = RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed());
        Self { rpc: Arc::new(rpc) }
    }

    /// Read an SPL token account's amount. `AccountNotFound` covers both "no
    /// account at this address" and the decode-failure case, since both mean
    /// the user has not deposited yet.
    pub async fn get_token_account_balance(&self, ata: &Pubkey) -> Result<TokenAccountBalance> {
        match self.rpc.get_token_account_balance(ata).await {
            Ok(balance) => {
                let amount: u64 = balance
                    .amount
                    .parse()
                    .map_err(|e| eyre!("malformed token balance amount {:?}: {e}", balance.amount))?;
                Ok(TokenAccountBalance::Amount(amount))
            }
            Err(err) => {
                let msg = err.to_string();
                if msg.contains("could not find account") || msg.contains("AccountNotFound") {
                    Ok(TokenAccountBalance::AccountNotFound)
                } else {
                    Err(eyre!("get_token_account_balance failed: {msg}"))
                }
            }
        }
    }

    pub async fn derive_ata(&self, owner: &Pubkey, mint: &Pubkey) -> Pubkey {
        crate::solana::pda::derive_ata(owner, mint)
    }

    pub async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(self.rpc.get_latest_blockhash().await?)
    }

    /// Send a native SOL transfer (used to fund the disposable temp wallet
    /// from the configured dispenser before it submits the approve/deposit
    /// pair, spec §4.D.2 stage 2).
    pub async fn transfer_lamports(
        &self,
        from: &Keypair,
        to: &Pubkey,
        lamports: u64,
        deadline: Instant,
    ) -> Result<Signature, TxError> {
        let ix = solana_sdk::system_instruction::transfer(&from.pubkey(), to, lamports);
        self.send_and_confirm(&[ix], from.pubkey(), &[from], deadline).await
    }

    /// Build, sign, submit, and poll-confirm a transaction made of
    /// `instructions`. Never opens a persistent subscription: confirmation is
    /// a poll loop over `get_signature_statuses` bounded by `deadline` (spec
    /// §4.C).
    pub async fn send_and_confirm(
        &self,
        instructions: &[Instruction],
        payer: Pubkey,
        signers: &[&Keypair],
        deadline: Instant,
    ) -> Result<Signature, TxError> {
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| TxError::Submit { reason: e.to_string() })?;

        let message = Message::new(instructions, Some(&payer));
        let mut tx = Transaction::new_unsigned(message);
        tx.try_sign(&signers.to_vec(), blockhash)
            .map_err(|e| TxError::Submit { reason: e.to_string() })?;

        let signature = self
            .rpc
            .send_transaction_with_config(
                &tx,
                RpcSendTransactionConfig {
                    skip_preflight: false,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TxError::Submit { reason: e.to_string() })?;

        self.poll_confirm(signature, deadline).await?;
        Ok(signature)
    }

    /// Poll `get_signature_statuses` until `signature` is confirmed, errors
    /// on-chain, or `deadline` passes.
    async fn poll_confirm(&self, signature: Signature, deadline: Instant) -> Result<(), TxError> {
        loop {
            if Instant::now() >= deadline {
                return Err(TxError::ConfirmTimeout { signature });
            }

            match self.rpc.get_signature_statuses(&[signature]).await {
                Ok(response) => {
                    if let Some(Some(status)) = response.value.first() {
                        if let Some(err) = &status.err {
                            return Err(TxError::Failed {
                                signature,
                                reason: format!("{err:?}"),
                            });
                        }
                        if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                            debug!(%signature, "transaction confirmed");
                            return Ok(());
                        }
                    }
                }
                Err(err) => {
                    warn!(%signature, error = %err, "transient error polling signature status");
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}
