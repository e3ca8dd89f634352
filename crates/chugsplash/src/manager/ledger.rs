use alloy_primitives::{map::HashMap, Address, U256};

use crate::ManagerParams;

/// Debts of a manager towards executors and the protocol.
///
/// Debts may exceed the manager balance. Withdrawals are served first come, first served and are
/// capped by the balance at the time of the withdrawal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentLedger {
    executor_debt: HashMap<Address, U256>,
    total_executor_debt: U256,
    total_protocol_debt: U256,
}

impl PaymentLedger {
    /// The amount owed to `executor`.
    pub fn executor_debt(&self, executor: Address) -> U256 {
        self.executor_debt.get(&executor).copied().unwrap_or_default()
    }

    /// The amount owed to all executors.
    pub const fn total_executor_debt(&self) -> U256 {
        self.total_executor_debt
    }

    /// The amount owed to the protocol.
    pub const fn total_protocol_debt(&self) -> U256 {
        self.total_protocol_debt
    }

    /// Everything the manager owes.
    pub fn total_debt(&self) -> U256 {
        self.total_executor_debt.saturating_add(self.total_protocol_debt)
    }

    /// The part of `balance` not owed to anyone.
    pub fn available_funds(&self, balance: U256) -> U256 {
        balance.saturating_sub(self.total_debt())
    }

    /// Credits the payments for an execution transaction.
    pub fn credit_execution(
        &mut self,
        executor: Address,
        executor_payment: U256,
        protocol_payment: U256,
    ) {
        self.credit_executor(executor, executor_payment);
        self.total_protocol_debt = self.total_protocol_debt.saturating_add(protocol_payment);
    }

    /// Credits the forfeited owner bond to `executor`.
    pub fn forfeit_bond(&mut self, executor: Address, bond: U256) {
        self.credit_executor(executor, bond);
    }

    /// Amount paid out for a withdrawal of `requested` by `executor`.
    pub fn executor_withdrawal(&self, executor: Address, requested: U256, balance: U256) -> U256 {
        requested.min(self.executor_debt(executor)).min(balance)
    }

    /// Amount paid out for a protocol withdrawal of `requested`.
    pub fn protocol_withdrawal(&self, requested: U256, balance: U256) -> U256 {
        requested.min(self.total_protocol_debt).min(balance)
    }

    /// Reduces the debt towards `executor` by `amount`, returning the remaining debt.
    pub fn debit_executor(&mut self, executor: Address, amount: U256) -> U256 {
        let debt = self.executor_debt.entry(executor).or_default();
        *debt = debt.saturating_sub(amount);
        let remaining = *debt;
        if remaining.is_zero() {
            self.executor_debt.remove(&executor);
        }
        self.total_executor_debt = self.total_executor_debt.saturating_sub(amount);
        remaining
    }

    /// Reduces the debt towards the protocol by `amount`.
    pub fn debit_protocol(&mut self, amount: U256) {
        self.total_protocol_debt = self.total_protocol_debt.saturating_sub(amount);
    }

    fn credit_executor(&mut self, executor: Address, amount: U256) {
        let debt = self.executor_debt.entry(executor).or_default();
        *debt = debt.saturating_add(amount);
        self.total_executor_debt = self.total_executor_debt.saturating_add(amount);
    }
}

/// Payments for an execution transaction that consumed `gas_used` at `gas_price`.
///
/// Returns `(executor_payment, protocol_payment)`.
pub fn execution_payments(gas_used: u64, gas_price: u128, params: &ManagerParams) -> (U256, U256) {
    let cost = U256::from(gas_used) * U256::from(gas_price);
    let hundred = U256::from(100);
    let executor_share = hundred + U256::from(params.executor_payment_percentage);
    let executor = cost.saturating_mul(executor_share) / hundred;
    let protocol = cost.saturating_mul(U256::from(params.protocol_payment_percentage)) / hundred;
    (executor, protocol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const ALICE: Address = address!("0x5000000000000000000000000000000000000001");
    const BOB: Address = address!("0x5000000000000000000000000000000000000002");

    #[test]
    fn test_execution_payments() {
        let params = ManagerParams {
            executor_payment_percentage: 20,
            protocol_payment_percentage: 10,
            ..Default::default()
        };
        let (executor, protocol) = execution_payments(100_000, 2, &params);
        assert_eq!(executor, U256::from(240_000));
        assert_eq!(protocol, U256::from(20_000));
    }

    #[test]
    fn test_execution_payments_saturate() {
        let params = ManagerParams {
            executor_payment_percentage: u64::MAX,
            protocol_payment_percentage: u64::MAX,
            ..Default::default()
        };
        let (executor, protocol) = execution_payments(u64::MAX, u128::MAX, &params);
        assert_eq!(executor, U256::MAX / U256::from(100));
        let cost = U256::from(u64::MAX) * U256::from(u128::MAX);
        assert_eq!(protocol, cost * U256::from(u64::MAX) / U256::from(100));
    }

    #[test]
    fn test_withdrawals_are_capped_by_balance() {
        let mut ledger = PaymentLedger::default();
        ledger.credit_execution(ALICE, U256::from(70), U256::from(10));
        ledger.credit_execution(BOB, U256::from(50), U256::from(10));
        assert_eq!(ledger.total_debt(), U256::from(140));
        assert_eq!(ledger.available_funds(U256::from(100)), U256::ZERO);

        // the first withdrawal drains most of an underfunded balance
        let balance = U256::from(100);
        let paid = ledger.executor_withdrawal(ALICE, U256::MAX, balance);
        assert_eq!(paid, U256::from(70));
        assert_eq!(ledger.debit_executor(ALICE, paid), U256::ZERO);

        let paid = ledger.executor_withdrawal(BOB, U256::MAX, balance - U256::from(70));
        assert_eq!(paid, U256::from(30));
        assert_eq!(ledger.debit_executor(BOB, paid), U256::from(20));
        assert_eq!(ledger.total_executor_debt(), U256::from(20));
    }

    #[test]
    fn test_forfeit_bond_credits_exact_amount() {
        let mut ledger = PaymentLedger::default();
        ledger.forfeit_bond(ALICE, U256::from(1_000));
        assert_eq!(ledger.executor_debt(ALICE), U256::from(1_000));
        assert_eq!(ledger.total_protocol_debt(), U256::ZERO);
    }
}
