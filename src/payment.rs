use crate::model::{round_cents, Contract, Order, OrderStatus};
use crate::reconcile::Reconciled;
use serde::Serialize;

/// Share of the total collected up front as the deposit.
pub const DEPOSIT_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub total: f64,
    pub deposit: f64,
    pub paid: f64,
    pub remaining: f64,
    pub deposit_paid: bool,
    pub fully_paid: bool,
}

/// Amounts for `order` based on its reconciled items plus the contract's
/// travel fee. A completed order with its deposit paid counts as fully paid.
pub fn summarize(order: &Order, shown: &Reconciled, contract: Option<&Contract>) -> PaymentSummary {
    let travel_fee = contract.map(|c| c.travel_fee).unwrap_or(0.0);
    let total = round_cents(shown.total() + travel_fee);
    let deposit = round_cents(total * DEPOSIT_RATE);
    let fully_paid = order.deposit_paid && order.status == OrderStatus::Completed;
    let paid = if fully_paid {
        total
    } else if order.deposit_paid {
        deposit
    } else {
        0.0
    };
    PaymentSummary {
        total,
        deposit,
        paid,
        remaining: round_cents(total - paid),
        deposit_paid: order.deposit_paid,
        fully_paid,
    }
}
