use std::{sync::Arc, time::Duration};

use bitcoin::{
    hashes::{sha256d, Hash},
    secp256k1::{Message, Secp256k1, SecretKey, SignOnly},
    PubkeyHash,
};
use harbour_dftx::{
    types::{common::Maybe, masternode::CreateMasternode},
    COIN,
};
use log::{info, warn};
use tokio::task::JoinHandle;

use crate::{
    assembler::Assembler,
    broadcast::Broadcaster,
    masternode::{resignation_order, LifecycleManager, ResignationCandidate},
    model::{MasternodeState, PendingWithdrawal, WithdrawalStatus},
    network::ChainParams,
    nodepool::NodePool,
    queue::{OpClass, RoleQueue},
    repository::WithdrawalRepository,
    traits::{NotificationSink, Severity},
    utxo::{select_until_amount, SelectionPolicy, UtxoLedger},
    Error, Result,
};

/// Kept below the live balance when releasing withdrawals, so the treasury
/// never drains to zero within one cycle.
const WITHDRAWAL_SAFETY_MARGIN: i64 = COIN;

/// Whole masternodes an excess can fund. Anything short of one full unit
/// cost creates nothing; there is no partial collateral.
pub fn affordable_creations(excess: i64, unit_cost: i64) -> usize {
    if excess <= 0 || unit_cost <= 0 {
        return 0;
    }
    (excess / unit_cost) as usize
}

/// Masternodes that must be resigned to recover `deficit`: collateral comes
/// back in whole units, so round up.
pub fn resignations_needed(deficit: i64, collateral: i64) -> usize {
    if deficit <= 0 || collateral <= 0 {
        return 0;
    }
    (deficit.div_ceil(collateral)) as usize
}

/// Greedy smallest-first release plan. Intentionally trades largest-first
/// fairness for satisfying the most withdrawals per cycle; a large
/// withdrawal waits for a future excess-liquidity cycle.
pub fn plan_withdrawal_releases(
    mut pending: Vec<PendingWithdrawal>,
    balance: i64,
    margin: i64,
) -> Vec<u64> {
    pending.sort_by(|a, b| a.amount.cmp(&b.amount).then_with(|| a.id.cmp(&b.id)));

    let mut budget = balance - margin;
    let mut released = Vec::new();
    for withdrawal in pending {
        if withdrawal.amount <= budget {
            budget -= withdrawal.amount;
            released.push(withdrawal.id);
        }
    }
    released
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub liquidity: i64,
    pub created: Vec<String>,
    pub resign_requested: Vec<String>,
    pub withdrawals_released: Vec<u64>,
}

/// Periodic corrector keeping the treasury balance inside its band by
/// creating or decommissioning masternodes, then releasing whatever queued
/// withdrawals the remaining balance covers.
pub struct LiquidityController {
    params: ChainParams,
    band_min: i64,
    band_max: i64,
    treasury_address: String,
    reservation_ttl: Duration,
    pool: Arc<NodePool>,
    ledger: Arc<UtxoLedger>,
    assembler: Arc<Assembler>,
    broadcaster: Arc<Broadcaster>,
    lifecycle: Arc<LifecycleManager>,
    withdrawals: Arc<WithdrawalRepository>,
    queue: Arc<RoleQueue>,
    notifier: Arc<dyn NotificationSink>,
    secp: Secp256k1<SignOnly>,
    /// Transient per-process key authorizing resignation requests towards
    /// the hosting servers. Never persisted.
    auth_key: SecretKey,
}

impl LiquidityController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: ChainParams,
        band_min: i64,
        band_max: i64,
        treasury_address: String,
        reservation_ttl: Duration,
        pool: Arc<NodePool>,
        ledger: Arc<UtxoLedger>,
        assembler: Arc<Assembler>,
        broadcaster: Arc<Broadcaster>,
        lifecycle: Arc<LifecycleManager>,
        withdrawals: Arc<WithdrawalRepository>,
        queue: Arc<RoleQueue>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            params,
            band_min,
            band_max,
            treasury_address,
            reservation_ttl,
            pool,
            ledger,
            assembler,
            broadcaster,
            lifecycle,
            withdrawals,
            queue,
            notifier,
            secp: Secp256k1::signing_only(),
            auth_key: SecretKey::new(&mut rand::thread_rng()),
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let pool = Arc::clone(&self.pool);
        let balance = self
            .queue
            .run(OpClass::Wallet, move || async move {
                pool.active().get_balance().await
            })
            .await?;

        let returning = self
            .lifecycle
            .all()?
            .into_iter()
            .filter(|n| n.is_returning_collateral())
            .count() as i64;
        let pending: Vec<PendingWithdrawal> = self
            .withdrawals
            .all()?
            .into_iter()
            .filter(|w| w.status == WithdrawalStatus::Pending)
            .collect();
        let pending_total: i64 = pending.iter().map(|w| w.amount).sum();

        report.liquidity =
            balance + returning * self.params.masternode_collateral - pending_total;
        info!(
            "[LiquidityController] liquidity {} (balance {balance}, {returning} returning, {pending_total} queued out)",
            report.liquidity
        );

        if report.liquidity > self.band_max {
            let count = affordable_creations(
                report.liquidity - self.band_max,
                self.params.masternode_unit_cost(),
            );
            report.created = self.create_masternodes(count).await?;
        } else if report.liquidity < self.band_min {
            let count = resignations_needed(
                self.band_min - report.liquidity,
                self.params.masternode_collateral,
            );
            report.resign_requested = self.request_resignations(count).await?;
        }

        report.withdrawals_released = self.release_withdrawals(pending, balance)?;
        Ok(report)
    }

    async fn create_masternodes(&self, count: usize) -> Result<Vec<String>> {
        let mut created = Vec::new();
        let idle = self.lifecycle.in_state(MasternodeState::Idle)?;
        if idle.len() < count {
            self.notifier
                .notify(
                    Severity::Warning,
                    &format!(
                        "excess liquidity funds {count} masternodes but only {} idle operators",
                        idle.len()
                    ),
                )
                .await;
        }

        for node in idle.into_iter().take(count) {
            match self.fund_one_masternode(&node.id, &node.operator_id).await {
                Ok(txid) => {
                    self.lifecycle
                        .enabling(&node.id, &self.treasury_address, &node.owner_wallet)?;
                    self.lifecycle.pre_enabled(&node.id, &txid)?;
                    created.push(node.id);
                }
                Err(e) => {
                    warn!("[LiquidityController] creation of {} failed: {e}", node.id);
                    self.notifier
                        .notify(
                            Severity::Warning,
                            &format!("masternode creation {} failed: {e}", node.id),
                        )
                        .await;
                }
            }
        }
        Ok(created)
    }

    async fn fund_one_masternode(&self, id: &str, operator_id: &str) -> Result<String> {
        let operator_pkh: PubkeyHash = operator_id
            .parse()
            .map_err(|_| Error::Conflict(format!("operator {operator_id} is not a key hash")))?;

        let params = self.params;
        let address = self.treasury_address.clone();
        let ttl = self.reservation_ttl;
        let ledger = Arc::clone(&self.ledger);
        let assembler = Arc::clone(&self.assembler);

        let assembled = self
            .queue
            .run(OpClass::Wallet, move || async move {
                let spendable = ledger.spendable(&address).await?;
                let funding = select_until_amount(
                    &spendable,
                    params.masternode_collateral + params.masternode_creation_fee,
                    params.fee_buffer,
                    params.max_inputs,
                    SelectionPolicy::Big,
                )?;
                ledger.reserve(&address, &funding, ttl)?;

                let owner_script = funding[0].script.clone();
                let dftx =
                    harbour_dftx::types::DfTx::CreateMasternode(CreateMasternode {
                        operator_type: 1,
                        operator_pub_key_hash: operator_pkh,
                        timelock: Maybe(None),
                    });
                match assembler.build_operation(
                    &address,
                    &funding,
                    &dftx,
                    params.masternode_creation_fee,
                    Some((owner_script, params.masternode_collateral)),
                    None,
                ) {
                    Ok(assembled) => Ok(assembled),
                    Err(e) => {
                        // Assembly failed after the reservation stuck; unlock
                        // before surfacing or retries starve the pool.
                        let refs: Vec<_> =
                            funding.iter().map(|o| o.output_ref()).collect();
                        ledger.release(&address, &refs)?;
                        Err(e)
                    }
                }
            })
            .await?;

        info!("[LiquidityController] funding masternode {id} via {}", assembled.txid);
        let txid = self.broadcaster.sign_and_send(&assembled).await?;
        Ok(txid.to_string())
    }

    async fn request_resignations(&self, count: usize) -> Result<Vec<String>> {
        let enabled = self.lifecycle.in_state(MasternodeState::Enabled)?;
        if enabled.is_empty() {
            self.notifier
                .notify(
                    Severity::Critical,
                    "liquidity below band and no enabled masternodes to resign",
                )
                .await;
            return Ok(Vec::new());
        }

        let pool = Arc::clone(&self.pool);
        let infos = self
            .queue
            .run(OpClass::Wallet, move || async move {
                pool.active().list_masternodes().await
            })
            .await?;

        let candidates = enabled
            .into_iter()
            .map(|node| {
                let target_multiplier = infos
                    .get(&node.id)
                    .and_then(|i| i.target_multipliers.as_ref())
                    .and_then(|m| m.first().copied())
                    .unwrap_or(0);
                ResignationCandidate {
                    node,
                    target_multiplier,
                }
            })
            .collect();

        let mut requested = Vec::new();
        for candidate in resignation_order(candidates).into_iter().take(count) {
            let authorization = self.sign_resignation(&candidate.node.id);
            self.lifecycle
                .resigning(&candidate.node.id, &authorization)?;
            info!(
                "[LiquidityController] resignation requested for {}",
                candidate.node.id
            );
            requested.push(candidate.node.id);
        }
        Ok(requested)
    }

    /// Authorization the hosting server verifies before issuing the resign
    /// transaction from the operator side.
    fn sign_resignation(&self, id: &str) -> String {
        let digest = sha256d::Hash::hash(format!("resign-masternode:{id}").as_bytes());
        let message = Message::from_digest(digest.to_byte_array());
        let signature = self.secp.sign_ecdsa(&message, &self.auth_key);
        hex::encode(signature.serialize_der())
    }

    fn release_withdrawals(
        &self,
        pending: Vec<PendingWithdrawal>,
        balance: i64,
    ) -> Result<Vec<u64>> {
        let plan = plan_withdrawal_releases(pending, balance, WITHDRAWAL_SAFETY_MARGIN);
        let mut released = Vec::new();
        for id in plan {
            let updated = self
                .withdrawals
                .update_checked(id, |w| w.status = WithdrawalStatus::Payable)?;
            info!(
                "[LiquidityController] withdrawal {id} ({}) marked payable",
                updated.amount
            );
            released.push(id);
        }
        Ok(released)
    }

    pub fn spawn(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match controller.run_cycle().await {
                    Ok(report) => info!(
                        "[LiquidityController] cycle done: {} created, {} resign-requested, {} withdrawals",
                        report.created.len(),
                        report.resign_requested.len(),
                        report.withdrawals_released.len()
                    ),
                    Err(e) => {
                        log::error!("[LiquidityController] cycle failed: {e}");
                        controller
                            .notifier
                            .notify(Severity::Warning, &format!("liquidity cycle failed: {e}"))
                            .await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn withdrawal(id: u64, amount: i64) -> PendingWithdrawal {
        PendingWithdrawal {
            id,
            account: format!("acct-{id}"),
            amount,
            status: WithdrawalStatus::Pending,
            requested_at: 0,
            version: 0,
        }
    }

    #[test]
    fn excess_below_one_unit_creates_nothing() {
        // balance 45,000 against a [20,000, 40,000] band leaves 5,000 excess;
        // one masternode costs 20,010: zero created this cycle.
        let excess = 45_000 - 40_000;
        assert_eq!(affordable_creations(excess, 20_010), 0);
    }

    #[test]
    fn excess_funds_whole_units_only() {
        assert_eq!(affordable_creations(40_030, 20_010), 2);
        assert_eq!(affordable_creations(20_010, 20_010), 1);
        assert_eq!(affordable_creations(-5, 20_010), 0);
    }

    #[test]
    fn deficit_rounds_resignations_up() {
        assert_eq!(resignations_needed(1, 20_000), 1);
        assert_eq!(resignations_needed(20_000, 20_000), 1);
        assert_eq!(resignations_needed(20_001, 20_000), 2);
        assert_eq!(resignations_needed(0, 20_000), 0);
    }

    #[test]
    fn withdrawals_release_smallest_first_under_margin() {
        let pending = vec![
            withdrawal(1, 5 * COIN),
            withdrawal(2, 2 * COIN),
            withdrawal(3, 40 * COIN),
        ];
        // Budget of 8 - 1 margin = 7 coins: ids 2 then 1 fit, 3 waits.
        let plan = plan_withdrawal_releases(pending, 8 * COIN, COIN);
        assert_eq!(plan, vec![2, 1]);
    }

    #[test]
    fn withdrawal_plan_skips_to_smaller_later_entries() {
        let pending = vec![withdrawal(1, 10), withdrawal(2, 100), withdrawal(3, 15)];
        // 30 budget: 10 and 15 fit, the 100 in between is skipped entirely.
        let plan = plan_withdrawal_releases(pending, 30, 0);
        assert_eq!(plan, vec![1, 3]);
    }

    #[test]
    fn empty_balance_releases_nothing() {
        let pending = vec![withdrawal(1, 10)];
        assert_eq!(plan_withdrawal_releases(pending, 5, COIN), Vec::<u64>::new());
    }
}
