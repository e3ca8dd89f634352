use std::time::Duration;

use alloy_primitives::{Address, U256};
use chugsplash::{constants::defaults, LocalChain, ManagerParams};
use clap::Parser;

use crate::executor::ExecutorConfig;

/// Parameters of the in-process chain.
#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "Chain Options")]
pub struct ChainArgs {
    /// Block gas limit
    #[arg(
        long = "chain.gas-limit",
        visible_aliases = ["gas-limit"],
        env = "CHUGSPLASH_BLOCK_GAS_LIMIT",
        default_value_t = defaults::BLOCK_GAS_LIMIT
    )]
    pub block_gas_limit: u64,

    /// Base fee per gas in wei
    #[arg(long = "chain.base-fee", visible_aliases = ["base-fee"], default_value_t = 0)]
    pub base_fee: u128,

    /// Administrator of the registry
    #[arg(
        long = "chain.admin",
        env = "CHUGSPLASH_REGISTRY_ADMIN",
        default_value = "0x00000000000000000000000000000000000ad000"
    )]
    pub registry_admin: Address,
}

impl ChainArgs {
    /// A fresh chain with these parameters whose managers use `params`.
    pub fn chain(&self, params: ManagerParams) -> LocalChain {
        LocalChain::new(self.registry_admin)
            .with_manager_params(params)
            .with_block_gas_limit(self.block_gas_limit)
            .with_base_fee(self.base_fee)
    }
}

/// Parameters of the project's manager.
#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "Manager Options")]
pub struct ManagerArgs {
    /// Owner of the project
    #[arg(
        long = "manager.owner",
        visible_aliases = ["owner"],
        env = "CHUGSPLASH_OWNER",
        default_value = "0x00000000000000000000000000000000000a0000"
    )]
    pub owner: Address,

    /// Seconds an executor keeps its claim on a remote deployment
    #[arg(long = "manager.lock-time", default_value_t = defaults::EXECUTION_LOCK_TIME)]
    pub execution_lock_time: u64,

    /// Bond in wei the owner keeps available for remote deployments
    #[arg(long = "manager.bond", default_value_t = U256::from(defaults::OWNER_BOND_AMOUNT))]
    pub owner_bond_amount: U256,

    /// Percentage on top of the gas cost paid to executors
    #[arg(
        long = "manager.executor-percentage",
        default_value_t = defaults::EXECUTOR_PAYMENT_PERCENTAGE
    )]
    pub executor_payment_percentage: u64,

    /// Percentage of the gas cost paid to the protocol
    #[arg(
        long = "manager.protocol-percentage",
        default_value_t = defaults::PROTOCOL_PAYMENT_PERCENTAGE
    )]
    pub protocol_payment_percentage: u64,

    /// Amount in wei the owner deposits into the manager
    #[arg(
        long = "manager.deposit",
        visible_aliases = ["deposit"],
        default_value = "1000000000000000000"
    )]
    pub deposit: U256,
}

impl ManagerArgs {
    /// The manager parameters.
    pub const fn params(&self) -> ManagerParams {
        ManagerParams {
            execution_lock_time: self.execution_lock_time,
            owner_bond_amount: self.owner_bond_amount,
            executor_payment_percentage: self.executor_payment_percentage,
            protocol_payment_percentage: self.protocol_payment_percentage,
        }
    }
}

/// Parameters of the remote executor.
#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "Executor Options")]
pub struct ExecutorArgs {
    /// Account the executor sends transactions from
    #[arg(
        long = "executor.address",
        visible_aliases = ["executor"],
        env = "CHUGSPLASH_EXECUTOR",
        default_value = "0x00000000000000000000000000000000000e0000"
    )]
    pub executor: Address,

    /// Milliseconds between two polls of the chain
    #[arg(
        long = "executor.poll-interval",
        env = "CHUGSPLASH_POLL_INTERVAL",
        default_value_t = 5_000
    )]
    pub poll_interval_ms: u64,

    /// Milliseconds a config fetch may take before it is retried on the next poll
    #[arg(long = "executor.fetch-timeout", default_value_t = 30_000)]
    pub fetch_timeout_ms: u64,

    /// Fraction of the block gas limit a batch may use, as its divisor
    #[arg(long = "executor.gas-divisor", default_value_t = 2)]
    pub gas_budget_divisor: u64,

    /// Upper bound on the number of actions per batch
    #[arg(long = "executor.max-batch-size")]
    pub max_batch_size: Option<usize>,

    /// Keep the earned payments in the manager after a deployment
    #[arg(long = "executor.no-withdraw")]
    pub no_withdraw: bool,
}

impl ExecutorArgs {
    /// The executor configuration.
    pub fn config(&self) -> ExecutorConfig {
        ExecutorConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            gas_budget_divisor: self.gas_budget_divisor,
            max_batch_size: self.max_batch_size,
            auto_withdraw: !self.no_withdraw,
        }
    }
}
