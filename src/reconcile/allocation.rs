use rust_decimal::Decimal;

use crate::model::advance_payment::AdvancePayment;

/// Portion of a deduction drawn from one advance.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub advance_payment_id: u64,
    pub amount: Decimal,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub allocations: Vec<Allocation>,
    /// What the outstanding balances could not cover.
    pub unallocated: Decimal,
}

/// Spreads `amount` over the outstanding advances, exhausting the oldest
/// (by `advance_date`, then `id`) before touching the next one.
pub fn allocate_oldest_first(amount: Decimal, advances: &[AdvancePayment]) -> AllocationPlan {
    let mut ordered: Vec<&AdvancePayment> = advances
        .iter()
        .filter(|a| a.remaining_balance > Decimal::ZERO)
        .collect();
    ordered.sort_by(|a, b| a.advance_date.cmp(&b.advance_date).then(a.id.cmp(&b.id)));

    let mut left = amount.max(Decimal::ZERO);
    let mut allocations = Vec::new();

    for advance in ordered {
        if left <= Decimal::ZERO {
            break;
        }
        let take = left.min(advance.remaining_balance);
        left -= take;
        allocations.push(Allocation {
            advance_payment_id: advance.id,
            amount: take,
            previous_balance: advance.remaining_balance,
            new_balance: advance.remaining_balance - take,
        });
    }

    AllocationPlan {
        allocations,
        unallocated: left,
    }
}
