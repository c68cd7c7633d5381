//! Operation pipeline.
//!
//! # Responsibilities
//! - Serialize pipelines per signing account, across every orchestrator
//!   in the process unless an explicit lock table is given
//! - Run validation, the optional approval, build, sign, broadcast and
//!   confirmation in order, with no automatic retries
//! - Publish every state transition as a `ProgressEvent`
//!
//! # Design Decisions
//! - The account lock is held through confirmation, so a later operation
//!   always reads a nonce that accounts for earlier ones
//! - The approval sub-operation runs under the parent's lock
//! - A reverted receipt is an outcome with `TxStatus::Failed`, not an error
//! - A confirmation timeout never triggers a resend

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::TxHash;
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::schema::{ConfirmationConfig, GasConfig, OrchestratorConfig};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::network::{NetworkClient, Receipt};
use crate::observability::metrics;
use crate::orchestrator::locks::AccountLocks;
use crate::orchestrator::outcome::{TransactionOutcome, TxStatus};
use crate::orchestrator::state::{OperationState, ProgressEvent};
use crate::transaction::{OperationKind, OperationRequest, Plan, TxBuilder};
use crate::wallet::Account;

/// Buffered progress events per subscriber before the oldest are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Executes operation requests for one signing account on one network.
pub struct Orchestrator {
    account: Account,
    builder: TxBuilder,
    locks: Arc<AccountLocks>,
    confirmation: ConfirmationConfig,
    events: broadcast::Sender<ProgressEvent>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn NetworkClient>, account: Account, config: &OrchestratorConfig) -> Self {
        Self::with_settings(client, account, config.gas.clone(), config.confirmation.clone())
    }

    pub fn with_settings(
        client: Arc<dyn NetworkClient>,
        account: Account,
        gas: GasConfig,
        confirmation: ConfirmationConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            account,
            builder: TxBuilder::new(client, gas),
            locks: AccountLocks::process_wide(),
            confirmation,
            events,
        }
    }

    /// Use `locks` instead of the process-wide table, e.g. to scope
    /// exclusion to a set of orchestrators.
    pub fn with_locks(mut self, locks: Arc<AccountLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn address(&self) -> alloy::primitives::Address {
        self.account.address()
    }

    /// Read-only access for balance views and estimates.
    pub fn builder(&self) -> &TxBuilder {
        &self.builder
    }

    /// Subscribe to progress events of operations started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Execute `request` to a confirmed outcome.
    ///
    /// Dropping the returned future cancels the wait, but a transaction
    /// that was already broadcast may still be mined.
    pub async fn execute(&self, request: OperationRequest) -> OrchestratorResult<TransactionOutcome> {
        let operation_id = Uuid::new_v4();
        let kind = request.kind();

        let _guard = self.locks.acquire(self.account.address()).await;

        let span = tracing::info_span!("operation", %operation_id, kind = %kind);
        let result = self.run(operation_id, &request).instrument(span).await;

        match &result {
            Ok(outcome) => {
                let label = if outcome.is_success() { "success" } else { "reverted" };
                metrics::record_operation(kind.as_str(), label);
                tracing::info!(
                    %operation_id,
                    kind = %kind,
                    tx_hash = %outcome.tx_hash,
                    status = %outcome.status,
                    block = outcome.block_number,
                    "Operation finished"
                );
            }
            Err(e) => {
                metrics::record_operation(kind.as_str(), e.kind());
                self.emit(operation_id, None, kind, OperationState::Failed(e.kind().to_string()), e.tx_hash());
                if e.is_precondition() {
                    tracing::info!(%operation_id, kind = %kind, error = %e, "Operation rejected");
                } else {
                    tracing::warn!(%operation_id, kind = %kind, tx_hash = ?e.tx_hash(), error = %e, "Operation failed");
                }
            }
        }

        result
    }

    /// Receipt for a previously broadcast transaction, `None` while pending.
    ///
    /// Used to resolve a `ConfirmationTimeout` without resending.
    pub async fn lookup_receipt(&self, tx_hash: TxHash) -> OrchestratorResult<Option<Receipt>> {
        self.builder.client().get_receipt(tx_hash).await
    }

    async fn run(&self, operation_id: Uuid, request: &OperationRequest) -> OrchestratorResult<TransactionOutcome> {
        let kind = request.kind();
        let from = self.account.address();

        self.emit(operation_id, None, kind, OperationState::Validating, None);
        let mut plan = self.builder.validate(from, request).await?;

        let mut approval_tx = None;
        if let Some(approval) = plan.approval.take() {
            self.emit(operation_id, None, kind, OperationState::Approving, None);
            let approval_hash = self.approve(operation_id, &approval).await?;
            approval_tx = Some(approval_hash);

            // Fresh checks against the post-approval state
            plan = self.builder.validate(from, request).await?;
            if plan.approval.is_some() {
                return Err(OrchestratorError::ApprovalFailed {
                    tx_hash: approval_tx,
                    reason: "allowance still below the required amount after approval".into(),
                });
            }
        }

        let mut outcome = self.submit(operation_id, None, plan).await?;
        if let Some(hash) = approval_tx {
            outcome.details.set_approval_tx(hash);
        }
        Ok(outcome)
    }

    /// Run an approval sub-operation; anything short of a successful
    /// receipt becomes `ApprovalFailed`.
    async fn approve(&self, parent: Uuid, request: &OperationRequest) -> OrchestratorResult<TxHash> {
        let operation_id = Uuid::new_v4();
        let kind = request.kind();
        tracing::info!(%operation_id, %parent, "Allowance too low, approving first");

        self.emit(operation_id, Some(parent), kind, OperationState::Validating, None);
        let result = match self.builder.validate(self.account.address(), request).await {
            Ok(plan) => self.submit(operation_id, Some(parent), plan).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) if outcome.is_success() => Ok(outcome.tx_hash),
            Ok(outcome) => Err(OrchestratorError::ApprovalFailed {
                tx_hash: Some(outcome.tx_hash),
                reason: "approval transaction reverted".into(),
            }),
            Err(e) => {
                self.emit(
                    operation_id,
                    Some(parent),
                    kind,
                    OperationState::Failed(e.kind().to_string()),
                    e.tx_hash(),
                );
                Err(OrchestratorError::ApprovalFailed {
                    tx_hash: e.tx_hash(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Build, sign, broadcast and confirm a validated plan.
    async fn submit(
        &self,
        operation_id: Uuid,
        parent: Option<Uuid>,
        plan: Plan,
    ) -> OrchestratorResult<TransactionOutcome> {
        let kind = plan.kind;

        self.emit(operation_id, parent, kind, OperationState::Building, None);
        let unsigned = self.builder.build(&plan).await?;

        self.emit(operation_id, parent, kind, OperationState::Signing, None);
        let signed = self.account.sign(&unsigned)?;

        self.emit(operation_id, parent, kind, OperationState::Broadcasting, Some(signed.hash));
        let client = self.builder.client();
        let tx_hash = client.broadcast(signed.raw.clone()).await?;
        metrics::record_broadcast(kind.as_str());

        tracing::info!(
            %operation_id,
            kind = %kind,
            %tx_hash,
            nonce = unsigned.nonce,
            gas_price = unsigned.gas_price,
            gas_limit = unsigned.gas_limit,
            "Transaction broadcast"
        );

        self.emit(operation_id, parent, kind, OperationState::Confirming, Some(tx_hash));
        let started = Instant::now();
        let receipt = client
            .wait_for_receipt(
                tx_hash,
                Duration::from_secs(self.confirmation.timeout_secs),
                Duration::from_millis(self.confirmation.poll_interval_ms),
            )
            .await?;
        metrics::record_confirmation(kind.as_str(), started.elapsed());

        let status = TxStatus::from_receipt(receipt.success);
        let mut details = plan.details;
        if status.is_success() {
            if let Some(probe) = &plan.probe {
                if let Some(delta) = self.builder.measure(probe).await {
                    details.set_measured(delta);
                }
            }
        }

        self.emit(operation_id, parent, kind, OperationState::Done(status), Some(tx_hash));

        Ok(TransactionOutcome {
            operation_id,
            kind,
            tx_hash,
            status,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            from: unsigned.from,
            to: unsigned.to,
            nonce: unsigned.nonce,
            explorer_url: client.network().explorer_tx_url(&tx_hash),
            details,
        })
    }

    fn emit(
        &self,
        operation_id: Uuid,
        parent: Option<Uuid>,
        kind: OperationKind,
        state: OperationState,
        tx_hash: Option<TxHash>,
    ) {
        tracing::debug!(
            %operation_id,
            parent = ?parent,
            kind = %kind,
            state = %state,
            tx_hash = ?tx_hash,
            "State transition"
        );
        // No subscribers is not an error
        let _ = self.events.send(ProgressEvent {
            operation_id,
            parent,
            kind,
            state,
            tx_hash,
        });
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("account", &self.account)
            .field("builder", &self.builder)
            .field("confirmation", &self.confirmation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ContractFunction;
    use crate::network::mock::{fixture_address, MockChain};
    use crate::transaction::{ApprovalAmount, OperationDetails, TokenRef};
    use alloy::primitives::U256;

    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn setup() -> (Arc<MockChain>, Orchestrator) {
        let chain = Arc::new(MockChain::new());
        let account = Account::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let confirmation = ConfirmationConfig {
            timeout_secs: 2,
            poll_interval_ms: 10,
        };
        let orchestrator = Orchestrator::with_settings(chain.clone(), account, GasConfig::default(), confirmation);
        (chain, orchestrator)
    }

    #[tokio::test]
    async fn test_events_follow_pipeline_order() {
        let (chain, orchestrator) = setup();
        let token = fixture_address("usdt");
        chain.add_token(token, "USDT");
        chain.set_native_balance(orchestrator.address(), U256::from(10u64).pow(U256::from(18u64)));
        let mut events = orchestrator.subscribe();

        let outcome = orchestrator
            .execute(OperationRequest::Approve {
                token: TokenRef::new(token, 6),
                spender: fixture_address("pool"),
                amount: ApprovalAmount::Exact("5".parse().unwrap()),
            })
            .await
            .unwrap();
        assert!(outcome.is_success());

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.operation_id, outcome.operation_id);
            states.push(event.state.to_string());
        }
        assert_eq!(
            states,
            ["validating", "building", "signing", "broadcasting", "confirming", "done(success)"]
        );
        assert_eq!(
            chain.allowance_of(token, orchestrator.address(), fixture_address("pool")),
            U256::from(5_000_000u64)
        );
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_an_outcome() {
        let (chain, orchestrator) = setup();
        let token = fixture_address("usdt");
        chain.add_token(token, "USDT");
        chain.set_token_balance(token, orchestrator.address(), U256::from(1_000_000u64));
        chain.revert_next(ContractFunction::Transfer);

        let outcome = orchestrator
            .execute(OperationRequest::SendToken {
                token: TokenRef::new(token, 6),
                to: fixture_address("bob"),
                amount: "1".parse().unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.status, TxStatus::Failed);
        assert!(matches!(outcome.details, OperationDetails::TokenTransfer { ref symbol, .. } if symbol == "USDT"));
    }

    #[tokio::test]
    async fn test_failed_approval_blocks_main_action() {
        let (chain, orchestrator) = setup();
        let asset = fixture_address("usdt");
        let pool = fixture_address("pool");
        chain.add_token(asset, "USDT");
        chain.add_pool(pool);
        chain.set_token_balance(asset, orchestrator.address(), U256::from(100_000_000u64));
        chain.revert_next(ContractFunction::Approve);

        let err = orchestrator
            .execute(OperationRequest::SupplyToPool {
                pool,
                asset: TokenRef::new(asset, 6),
                amount: "10".parse().unwrap(),
                on_behalf_of: None,
                referral_code: 0,
                auto_approve: true,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::ApprovalFailed { tx_hash: Some(_), .. }));
        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].function, Some(ContractFunction::Approve));
    }

    #[tokio::test]
    async fn test_rejected_broadcast_is_not_retried() {
        let (chain, orchestrator) = setup();
        chain.set_native_balance(orchestrator.address(), U256::from(10u64).pow(U256::from(18u64)));
        chain.reject_next_broadcast("replacement transaction underpriced");

        let err = orchestrator
            .execute(OperationRequest::SendNative {
                to: fixture_address("bob"),
                amount: "0.1".parse().unwrap(),
                gas_price_gwei: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Broadcast { .. }));
        assert_eq!(chain.broadcast_attempts(), 1);
        assert_eq!(chain.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_poll_interval_still_confirms() {
        let chain = Arc::new(MockChain::new());
        let account = Account::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let confirmation = ConfirmationConfig {
            timeout_secs: 2,
            poll_interval_ms: 0,
        };
        let orchestrator = Orchestrator::with_settings(chain.clone(), account, GasConfig::default(), confirmation);
        chain.set_native_balance(orchestrator.address(), U256::from(10u64).pow(U256::from(18u64)));

        let outcome = orchestrator
            .execute(OperationRequest::SendNative {
                to: fixture_address("bob"),
                amount: "0.1".parse().unwrap(),
                gas_price_gwei: None,
            })
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_zero_approval_revokes_allowance() {
        let (chain, orchestrator) = setup();
        let token = fixture_address("usdt");
        let spender = fixture_address("pool");
        chain.add_token(token, "USDT");
        chain.set_allowance(token, orchestrator.address(), spender, U256::from(5_000_000u64));

        let outcome = orchestrator
            .execute(OperationRequest::Approve {
                token: TokenRef::new(token, 6),
                spender,
                amount: ApprovalAmount::Exact("0".parse().unwrap()),
            })
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(chain.allowance_of(token, orchestrator.address(), spender), U256::ZERO);
    }

    #[tokio::test]
    async fn test_ineffective_approval_blocks_main_action() {
        let (chain, orchestrator) = setup();
        let asset = fixture_address("usdt");
        let pool = fixture_address("pool");
        chain.add_token(asset, "USDT");
        chain.add_pool(pool);
        chain.set_token_balance(asset, orchestrator.address(), U256::from(100_000_000u64));
        chain.succeed_without_effect_next(ContractFunction::Approve);

        let err = orchestrator
            .execute(OperationRequest::SupplyToPool {
                pool,
                asset: TokenRef::new(asset, 6),
                amount: "10".parse().unwrap(),
                on_behalf_of: None,
                referral_code: 0,
                auto_approve: true,
            })
            .await
            .unwrap_err();

        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].function, Some(ContractFunction::Approve));
        assert!(matches!(
            err,
            OrchestratorError::ApprovalFailed { tx_hash: Some(hash), ref reason }
                if hash == sent[0].hash && reason.contains("still below")
        ));
        assert_eq!(chain.token_balance_of(asset, orchestrator.address()), U256::from(100_000_000u64));
    }

    #[tokio::test]
    async fn test_unanswered_broadcast_reports_hash() {
        let (chain, orchestrator) = setup();
        chain.set_native_balance(orchestrator.address(), U256::from(10u64).pow(U256::from(18u64)));
        chain.drop_next_broadcast_response();
        let mut events = orchestrator.subscribe();

        let err = orchestrator
            .execute(OperationRequest::SendNative {
                to: fixture_address("bob"),
                amount: "0.1".parse().unwrap(),
                gas_price_gwei: None,
            })
            .await
            .unwrap_err();

        let sent_hash = chain.sent()[0].hash;
        assert_eq!(err.tx_hash(), Some(sent_hash));
        assert!(!err.is_retryable_after_remediation());

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        let last = last.unwrap();
        assert_eq!(last.state, OperationState::Failed("broadcast".into()));
        assert_eq!(last.tx_hash, Some(sent_hash));
    }
}
