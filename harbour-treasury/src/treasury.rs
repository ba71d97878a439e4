use std::{sync::Arc, time::Duration};

use bitcoin::{PubkeyHash, ScriptBuf, Txid};
use harbour_dftx::types::{
    account::{AccountToAccount, AccountToUtxos, UtxosToAccount},
    balance::{ScriptBalances, TokenBalanceUInt32, TokenBalanceVarInt},
    common::{Maybe, VarInt},
    loans::{PaybackLoan, TakeLoan},
    masternode::{CreateMasternode, ResignMasternode},
    pool::{CompositeSwap, MaxPrice, PoolAddLiquidity, PoolId, PoolRemoveLiquidity, PoolSwap},
    vault::{CreateVault, DepositToVault, WithdrawFromVault},
    DfTx,
};
use log::info;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    assembler::Assembler,
    broadcast::Broadcaster,
    client::{IndexerClient, NodeClient},
    config::Config,
    liquidity::LiquidityController,
    masternode::LifecycleManager,
    model::{OutputRef, ReservedOutputs},
    network::ChainParams,
    nodepool::{NodeHandle, NodePool},
    queue::{NodeRole, OpClass, RoleQueue},
    repository::{MasternodeRepository, ReservationRepository, WithdrawalRepository},
    storage::TreasuryStore,
    traits::{NotificationSink, OperatorRegistry, Signer},
    utxo::{select_count, select_exact, select_until_amount, SelectionPolicy, UtxoLedger},
    Result,
};

const RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// How much funding a caller needs reserved.
#[derive(Debug, Clone, Copy)]
pub enum FundingNeed {
    /// Accumulate at least this many satoshis (plus fee buffer).
    Amount(i64),
    /// Exactly one output of exactly this value.
    Exact(i64),
    /// A fixed number of outputs, no value target.
    Count(usize),
}

/// Every operation this core can put on chain.
#[derive(Debug, Clone)]
pub enum OperationRequest {
    Transfer {
        to: ScriptBuf,
        amount: i64,
        with_change: bool,
    },
    MasternodeCreate {
        operator_pkh: PubkeyHash,
        timelock: Option<u16>,
    },
    MasternodeResign {
        node_id: Txid,
    },
    VaultCreate {
        owner: ScriptBuf,
        scheme_id: String,
    },
    VaultDeposit {
        vault_id: Txid,
        from: ScriptBuf,
        token: u64,
        amount: i64,
    },
    VaultWithdraw {
        vault_id: Txid,
        to: ScriptBuf,
        token: u64,
        amount: i64,
    },
    VaultBorrow {
        vault_id: Txid,
        to: ScriptBuf,
        token: u32,
        amount: i64,
    },
    VaultRepay {
        vault_id: Txid,
        from: ScriptBuf,
        token: u32,
        amount: i64,
    },
    TokenTransfer {
        from: ScriptBuf,
        to: ScriptBuf,
        token: u32,
        amount: i64,
    },
    /// Account balance out to fresh UTXOs on `to`.
    TokenToUtxos {
        from: ScriptBuf,
        to: ScriptBuf,
        amount: i64,
    },
    /// UTXO value into the account balance of `to`.
    UtxosToTokens {
        to: ScriptBuf,
        amount: i64,
    },
    PoolAdd {
        from: ScriptBuf,
        token_a: u32,
        amount_a: i64,
        token_b: u32,
        amount_b: i64,
        share_address: ScriptBuf,
    },
    PoolRemove {
        script: ScriptBuf,
        token: u64,
        amount: i64,
    },
    Swap {
        from_script: ScriptBuf,
        from_token: u64,
        from_amount: i64,
        to_script: ScriptBuf,
        to_token: u64,
        max_price: (i64, i64),
        /// Route through these pools as a composite swap; empty means the
        /// direct pair.
        pools: Vec<u64>,
    },
    /// Sweep `count` outputs into one, selected by `policy`.
    Consolidate {
        count: usize,
        policy: SelectionPolicy,
    },
}

struct OperationPlan {
    dftx: Option<DfTx>,
    carrier_value: i64,
    primary: Option<(ScriptBuf, i64)>,
    minted: Option<(ScriptBuf, i64)>,
    need: FundingNeed,
    policy: SelectionPolicy,
    /// Plain-transfer change behavior; ignored for payload operations.
    with_change: bool,
}

/// The exposed surface of the core: funding reservation, operation
/// build-and-broadcast, and read-only node handles. One instance owns all
/// shared state and background tasks.
pub struct Treasury {
    config: Config,
    params: ChainParams,
    treasury_pool: Arc<NodePool>,
    payout_pool: Arc<NodePool>,
    treasury_queue: Arc<RoleQueue>,
    #[allow(dead_code)]
    payout_queue: Arc<RoleQueue>,
    indexer: Arc<IndexerClient>,
    ledger: Arc<UtxoLedger>,
    assembler: Arc<Assembler>,
    broadcaster: Arc<Broadcaster>,
    lifecycle: Arc<LifecycleManager>,
    liquidity: Arc<LiquidityController>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Treasury {
    /// Wires the whole core together. Must run inside the tokio runtime:
    /// the role queues spawn their worker tasks here.
    pub fn new(
        config: Config,
        signer: Arc<dyn Signer>,
        notifier: Arc<dyn NotificationSink>,
        registry: Arc<dyn OperatorRegistry>,
    ) -> Result<Self> {
        let params = config.network.params();
        let store = Arc::new(TreasuryStore::new(&config.store_path)?);

        let treasury_pool = Arc::new(NodePool::new(
            NodeRole::Treasury,
            NodeClient::new(&config.treasury_nodes.primary, RPC_TIMEOUT)?,
            NodeClient::new(&config.treasury_nodes.secondary, RPC_TIMEOUT)?,
            Arc::clone(&notifier),
        ));
        let payout_pool = Arc::new(NodePool::new(
            NodeRole::Payout,
            NodeClient::new(&config.payout_nodes.primary, RPC_TIMEOUT)?,
            NodeClient::new(&config.payout_nodes.secondary, RPC_TIMEOUT)?,
            Arc::clone(&notifier),
        ));
        let indexer = Arc::new(IndexerClient::new(&config.indexer_url, RPC_TIMEOUT)?);

        let ledger = Arc::new(UtxoLedger::new(
            indexer.clone(),
            ReservationRepository::new(Arc::clone(&store)),
        ));
        let assembler = Arc::new(Assembler::new(params));
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&treasury_pool),
            signer,
            Arc::clone(&ledger),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            MasternodeRepository::new(Arc::clone(&store)),
            registry,
            Arc::clone(&notifier),
        ));
        let withdrawals = Arc::new(WithdrawalRepository::new(store));

        let treasury_queue = Arc::new(RoleQueue::new(NodeRole::Treasury));
        let payout_queue = Arc::new(RoleQueue::new(NodeRole::Payout));

        let liquidity = Arc::new(LiquidityController::new(
            params,
            config.liquidity_min,
            config.liquidity_max,
            config.treasury_address.clone(),
            Duration::from_secs(config.reservation_ttl_secs),
            Arc::clone(&treasury_pool),
            Arc::clone(&ledger),
            Arc::clone(&assembler),
            Arc::clone(&broadcaster),
            Arc::clone(&lifecycle),
            withdrawals,
            Arc::clone(&treasury_queue),
            Arc::clone(&notifier),
        ));

        Ok(Self {
            config,
            params,
            treasury_pool,
            payout_pool,
            treasury_queue,
            payout_queue,
            indexer,
            ledger,
            assembler,
            broadcaster,
            lifecycle,
            liquidity,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawns the periodic machinery: health monitors, reservation sweeper,
    /// liquidity loop, registry reconciler.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        let health = Duration::from_secs(self.config.health_check_interval_secs);
        tasks.push(self.treasury_pool.spawn_monitor(health));
        tasks.push(self.payout_pool.spawn_monitor(health));
        tasks.push(
            self.ledger
                .spawn_sweeper(Duration::from_secs(self.config.sweep_interval_secs)),
        );
        tasks.push(
            self.liquidity
                .spawn(Duration::from_secs(self.config.liquidity_interval_secs)),
        );
        tasks.push(self.lifecycle.spawn_reconciler(
            self.config.masternode_servers.clone(),
            Duration::from_secs(self.config.reconcile_interval_secs),
        ));
        info!("[Treasury] background tasks started");
    }

    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Selects and locks funding for one operation. The whole
    /// snapshot-select-reserve sequence runs as one queue item, so two
    /// concurrent callers can never hold overlapping sets.
    pub async fn request_funding(
        &self,
        address: &str,
        need: FundingNeed,
        policy: SelectionPolicy,
    ) -> Result<ReservedOutputs> {
        request_funding_via(
            &self.treasury_queue,
            &self.ledger,
            self.params,
            address,
            need,
            policy,
            Duration::from_secs(self.config.reservation_ttl_secs),
        )
        .await
    }

    pub fn release_funding(&self, address: &str, outputs: &[OutputRef]) -> Result<()> {
        self.ledger.release(address, outputs)
    }

    /// Builds, signs and submits one operation; returns its txid. Selection
    /// and assembly failures surface before any network call; broadcast
    /// failures release the reservation first.
    pub async fn build_and_broadcast(&self, op: OperationRequest) -> Result<Txid> {
        let plan = self.plan(&op);
        let address = self.config.treasury_address.clone();
        let ttl = Duration::from_secs(self.config.reservation_ttl_secs);
        let params = self.params;
        let ledger = Arc::clone(&self.ledger);
        let assembler = Arc::clone(&self.assembler);

        let assembled = self
            .treasury_queue
            .run(OpClass::Wallet, move || async move {
                let spendable = ledger.spendable(&address).await?;
                let funding = match plan.need {
                    FundingNeed::Amount(amount) => select_until_amount(
                        &spendable,
                        amount,
                        params.fee_buffer,
                        params.max_inputs,
                        plan.policy,
                    )?,
                    FundingNeed::Exact(amount) => vec![select_exact(&spendable, amount)?],
                    FundingNeed::Count(count) => select_count(&spendable, count, plan.policy),
                };
                ledger.reserve(&address, &funding, ttl)?;

                // An empty primary script is the plan's placeholder for "the
                // funding script itself", resolvable only after selection.
                let primary = plan.primary.clone().map(|(script, value)| {
                    if script.is_empty() {
                        (funding[0].script.clone(), value)
                    } else {
                        (script, value)
                    }
                });

                let built = match &plan.dftx {
                    Some(dftx) => assembler.build_operation(
                        &address,
                        &funding,
                        dftx,
                        plan.carrier_value,
                        primary,
                        plan.minted.clone(),
                    ),
                    None => {
                        let (to, amount) = match primary {
                            Some((to, amount)) => (to, amount),
                            None => (funding[0].script.clone(), 0),
                        };
                        assembler.build_transfer(&address, &funding, to, amount, plan.with_change)
                    }
                };
                match built {
                    Ok(assembled) => Ok(assembled),
                    Err(e) => {
                        let refs: Vec<_> = funding.iter().map(|o| o.output_ref()).collect();
                        ledger.release(&address, &refs)?;
                        Err(e)
                    }
                }
            })
            .await?;

        self.broadcaster.sign_and_send(&assembled).await
    }

    /// Read-only connection snapshot for monitoring subsystems.
    pub fn node_handle(&self, role: NodeRole) -> NodeHandle {
        match role {
            NodeRole::Treasury => self.treasury_pool.handle(),
            NodeRole::Payout => self.payout_pool.handle(),
        }
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn indexer(&self) -> &Arc<IndexerClient> {
        &self.indexer
    }

    fn plan(&self, op: &OperationRequest) -> OperationPlan {
        let fee_only = FundingNeed::Amount(0);
        match op.clone() {
            OperationRequest::Transfer {
                to,
                amount,
                with_change,
            } => OperationPlan {
                dftx: None,
                carrier_value: 0,
                primary: Some((to, amount)),
                minted: None,
                need: FundingNeed::Amount(amount),
                policy: SelectionPolicy::Fitting,
                with_change,
            },
            OperationRequest::MasternodeCreate {
                operator_pkh,
                timelock,
            } => OperationPlan {
                dftx: Some(DfTx::CreateMasternode(CreateMasternode {
                    operator_type: 1,
                    operator_pub_key_hash: operator_pkh,
                    timelock: Maybe(timelock),
                })),
                carrier_value: self.params.masternode_creation_fee,
                // Collateral stays on the treasury's own script; the empty
                // placeholder resolves to the funding script after selection.
                primary: Some((ScriptBuf::new(), self.params.masternode_collateral)),
                minted: None,
                need: FundingNeed::Amount(
                    self.params.masternode_collateral + self.params.masternode_creation_fee,
                ),
                policy: SelectionPolicy::Big,
                with_change: false,
            },
            OperationRequest::MasternodeResign { node_id } => OperationPlan {
                dftx: Some(DfTx::ResignMasternode(ResignMasternode { node_id })),
                carrier_value: 0,
                primary: None,
                minted: None,
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::VaultCreate { owner, scheme_id } => OperationPlan {
                dftx: Some(DfTx::CreateVault(CreateVault {
                    owner_address: owner,
                    scheme_id,
                })),
                carrier_value: 0,
                primary: None,
                minted: None,
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::VaultDeposit {
                vault_id,
                from,
                token,
                amount,
            } => OperationPlan {
                dftx: Some(DfTx::DepositToVault(DepositToVault {
                    vault_id,
                    from,
                    token_amount: TokenBalanceVarInt {
                        token: VarInt(token),
                        amount,
                    },
                })),
                carrier_value: 0,
                primary: None,
                minted: None,
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::VaultWithdraw {
                vault_id,
                to,
                token,
                amount,
            } => OperationPlan {
                dftx: Some(DfTx::WithdrawFromVault(WithdrawFromVault {
                    vault_id,
                    to,
                    token_amount: TokenBalanceVarInt {
                        token: VarInt(token),
                        amount,
                    },
                })),
                carrier_value: 0,
                primary: None,
                minted: None,
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::VaultBorrow {
                vault_id,
                to,
                token,
                amount,
            } => OperationPlan {
                dftx: Some(DfTx::TakeLoan(TakeLoan {
                    vault_id,
                    to,
                    token_amounts: vec![TokenBalanceUInt32 { token, amount }].into(),
                })),
                carrier_value: 0,
                primary: None,
                minted: None,
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::VaultRepay {
                vault_id,
                from,
                token,
                amount,
            } => OperationPlan {
                dftx: Some(DfTx::PaybackLoan(PaybackLoan {
                    vault_id,
                    from,
                    token_amounts: vec![TokenBalanceUInt32 { token, amount }].into(),
                })),
                carrier_value: 0,
                primary: None,
                minted: None,
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::TokenTransfer {
                from,
                to,
                token,
                amount,
            } => OperationPlan {
                dftx: Some(DfTx::AccountToAccount(AccountToAccount {
                    from,
                    to: vec![ScriptBalances {
                        script: to,
                        balances: vec![TokenBalanceUInt32 { token, amount }].into(),
                    }]
                    .into(),
                })),
                carrier_value: 0,
                primary: None,
                minted: None,
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::TokenToUtxos { from, to, amount } => OperationPlan {
                dftx: Some(DfTx::AccountToUtxos(AccountToUtxos {
                    from,
                    balances: vec![TokenBalanceUInt32 { token: 0, amount }].into(),
                    // Carrier is vout 0; the minted output starts right after.
                    minting_outputs_start: VarInt(1),
                })),
                carrier_value: 0,
                primary: None,
                minted: Some((to, amount)),
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::UtxosToTokens { to, amount } => OperationPlan {
                dftx: Some(DfTx::UtxosToAccount(UtxosToAccount {
                    to: vec![ScriptBalances {
                        script: to,
                        balances: vec![TokenBalanceUInt32 { token: 0, amount }].into(),
                    }]
                    .into(),
                })),
                // The converted value rides on the carrier output itself.
                carrier_value: amount,
                primary: None,
                minted: None,
                need: FundingNeed::Amount(amount),
                policy: SelectionPolicy::Fitting,
                with_change: false,
            },
            OperationRequest::PoolAdd {
                from,
                token_a,
                amount_a,
                token_b,
                amount_b,
                share_address,
            } => OperationPlan {
                dftx: Some(DfTx::PoolAddLiquidity(PoolAddLiquidity {
                    from: vec![ScriptBalances {
                        script: from,
                        balances: vec![
                            TokenBalanceUInt32 {
                                token: token_a,
                                amount: amount_a,
                            },
                            TokenBalanceUInt32 {
                                token: token_b,
                                amount: amount_b,
                            },
                        ]
                        .into(),
                    }]
                    .into(),
                    share_address,
                })),
                carrier_value: 0,
                primary: None,
                minted: None,
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::PoolRemove {
                script,
                token,
                amount,
            } => OperationPlan {
                dftx: Some(DfTx::PoolRemoveLiquidity(PoolRemoveLiquidity {
                    script,
                    amount: TokenBalanceVarInt {
                        token: VarInt(token),
                        amount,
                    },
                })),
                carrier_value: 0,
                primary: None,
                minted: None,
                need: fee_only,
                policy: SelectionPolicy::Small,
                with_change: false,
            },
            OperationRequest::Swap {
                from_script,
                from_token,
                from_amount,
                to_script,
                to_token,
                max_price,
                pools,
            } => {
                let swap = PoolSwap {
                    from_script,
                    from_token_id: VarInt(from_token),
                    from_amount,
                    to_script,
                    to_token_id: VarInt(to_token),
                    max_price: MaxPrice {
                        integer: max_price.0,
                        fraction: max_price.1,
                    },
                };
                let dftx = if pools.is_empty() {
                    DfTx::PoolSwap(swap)
                } else {
                    DfTx::CompositeSwap(CompositeSwap {
                        pool_swap: swap,
                        pools: pools
                            .into_iter()
                            .map(|id| PoolId { id: VarInt(id) })
                            .collect::<Vec<_>>()
                            .into(),
                    })
                };
                OperationPlan {
                    dftx: Some(dftx),
                    carrier_value: 0,
                    primary: None,
                    minted: None,
                    need: fee_only,
                    policy: SelectionPolicy::Small,
                    with_change: false,
                }
            }
            OperationRequest::Consolidate { count, policy } => OperationPlan {
                dftx: None,
                carrier_value: 0,
                primary: None,
                minted: None,
                need: FundingNeed::Count(count),
                policy,
                with_change: false,
            },
        }
    }
}

/// Queue-funnelled select-and-reserve. Factored out of the facade so the
/// pairwise-disjointness of concurrent calls is testable without nodes.
pub(crate) async fn request_funding_via(
    queue: &RoleQueue,
    ledger: &Arc<UtxoLedger>,
    params: ChainParams,
    address: &str,
    need: FundingNeed,
    policy: SelectionPolicy,
    ttl: Duration,
) -> Result<ReservedOutputs> {
    let ledger = Arc::clone(ledger);
    let address = address.to_string();
    queue
        .run(OpClass::Wallet, move || async move {
            let spendable = ledger.spendable(&address).await?;
            let outputs = match need {
                FundingNeed::Amount(amount) => select_until_amount(
                    &spendable,
                    amount,
                    params.fee_buffer,
                    params.max_inputs,
                    policy,
                )?,
                FundingNeed::Exact(amount) => vec![select_exact(&spendable, amount)?],
                FundingNeed::Count(count) => select_count(&spendable, count, policy),
            };
            ledger.reserve(&address, &outputs, ttl)?;
            Ok(ReservedOutputs { address, outputs })
        })
        .await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bitcoin::hashes::Hash;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        client::UtxoSource,
        model::UnspentOutput,
        network::Network,
        repository::ReservationRepository,
    };

    struct StaticSource(Vec<UnspentOutput>);

    #[async_trait]
    impl UtxoSource for StaticSource {
        async fn current_height(&self) -> Result<u64> {
            Ok(1)
        }
        async fn list_unspent(&self, _address: &str) -> Result<Vec<UnspentOutput>> {
            Ok(self.0.clone())
        }
    }

    fn utxo(tag: u8, value: i64) -> UnspentOutput {
        UnspentOutput {
            txid: Txid::from_byte_array([tag; 32]),
            vout: 0,
            script: ScriptBuf::from(vec![0x00, 0x14, tag]),
            value,
            token_id: 0,
        }
    }

    #[tokio::test]
    async fn concurrent_funding_requests_never_overlap() {
        let outputs: Vec<UnspentOutput> =
            (0..32).map(|i| utxo(i, 100_000_000)).collect();
        let dir = tempdir().unwrap();
        let store = Arc::new(TreasuryStore::new(dir.path()).unwrap());
        let ledger = Arc::new(UtxoLedger::new(
            Arc::new(StaticSource(outputs)),
            ReservationRepository::new(store),
        ));
        let queue = Arc::new(RoleQueue::new(NodeRole::Treasury));
        let params = Network::Mainnet.params();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                request_funding_via(
                    &queue,
                    &ledger,
                    params,
                    "addr",
                    FundingNeed::Count(3),
                    SelectionPolicy::Big,
                    Duration::from_secs(600),
                )
                .await
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            let reserved = handle.await.unwrap().unwrap();
            assert_eq!(reserved.outputs.len(), 3);
            for output in reserved.refs() {
                // Pairwise disjoint: no output handed out twice.
                assert!(seen.insert(output), "output {output:?} double-reserved");
            }
        }
    }

    #[tokio::test]
    async fn exact_funding_requires_a_perfect_match() {
        let dir = tempdir().unwrap();
        let store = Arc::new(TreasuryStore::new(dir.path()).unwrap());
        let ledger = Arc::new(UtxoLedger::new(
            Arc::new(StaticSource(vec![utxo(1, 100), utxo(2, 250)])),
            ReservationRepository::new(store),
        ));
        let queue = Arc::new(RoleQueue::new(NodeRole::Treasury));
        let params = Network::Mainnet.params();

        let reserved = request_funding_via(
            &queue,
            &ledger,
            params,
            "addr",
            FundingNeed::Exact(100),
            SelectionPolicy::Small,
            Duration::from_secs(600),
        )
        .await
        .unwrap();
        assert_eq!(reserved.total_value(), 100);

        let missing = request_funding_via(
            &queue,
            &ledger,
            params,
            "addr",
            FundingNeed::Exact(150),
            SelectionPolicy::Small,
            Duration::from_secs(600),
        )
        .await;
        assert!(matches!(
            missing,
            Err(crate::Error::InsufficientFunds { .. })
        ));
    }
}
