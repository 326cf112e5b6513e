//! Total order ids
//!
//! A 64-bit id that orders every ledger, transaction and operation:
//! 32 bits of ledger sequence, 20 bits of transaction application order,
//! 12 bits of operation order. Both orders are 1-based; 0 means "the
//! ledger itself" / "the transaction itself".

pub const LEDGER_BITS: u32 = 32;
pub const TRANSACTION_BITS: u32 = 20;
pub const OPERATION_BITS: u32 = 12;

pub const TRANSACTION_MASK: i64 = (1 << TRANSACTION_BITS) - 1;
pub const OPERATION_MASK: i64 = (1 << OPERATION_BITS) - 1;

/// Highest ledger sequence whose ids stay non-negative.
pub const MAX_LEDGER: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Toid {
    pub ledger: u32,
    pub transaction: u32,
    pub operation: u32,
}

impl Toid {
    pub fn new(ledger: u32, transaction: u32, operation: u32) -> Self {
        Self {
            ledger,
            transaction,
            operation,
        }
    }

    /// Packed id, or `None` when a component does not fit its width.
    pub fn checked_i64(self) -> Option<i64> {
        let fits = self.ledger <= MAX_LEDGER
            && self.transaction as i64 <= TRANSACTION_MASK
            && self.operation as i64 <= OPERATION_MASK;
        fits.then(|| self.to_i64())
    }

    /// Packed id. Transaction and operation orders are masked to their widths;
    /// use `checked_i64` for values that come from upstream data.
    pub fn to_i64(self) -> i64 {
        ((self.ledger as i64) << (TRANSACTION_BITS + OPERATION_BITS))
            | ((self.transaction as i64 & TRANSACTION_MASK) << OPERATION_BITS)
            | (self.operation as i64 & OPERATION_MASK)
    }

    pub fn parse(id: i64) -> Self {
        Self {
            ledger: (id >> (TRANSACTION_BITS + OPERATION_BITS)) as u32,
            transaction: ((id >> OPERATION_BITS) & TRANSACTION_MASK) as u32,
            operation: (id & OPERATION_MASK) as u32,
        }
    }
}

/// Id of the ledger row for `sequence`.
pub fn ledger_id(sequence: u32) -> i64 {
    Toid::new(sequence, 0, 0).to_i64()
}

/// Half-open id interval `[start, end)` covering ledgers `first..=last`.
///
/// Both ends are clamped to `MAX_LEDGER`; at that ledger `end` saturates at
/// `i64::MAX`.
pub fn ledger_range(first: u32, last: u32) -> (i64, i64) {
    let start = ledger_id(first.min(MAX_LEDGER));
    let end = (last.min(MAX_LEDGER) as i64 + 1)
        .checked_mul(1 << (TRANSACTION_BITS + OPERATION_BITS))
        .unwrap_or(i64::MAX);
    (start, end)
}
