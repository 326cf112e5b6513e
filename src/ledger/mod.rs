//! Ledger-domain types decoded from the upstream store.

pub mod amount;
pub mod toid;
pub mod types;

pub use toid::Toid;
pub use types::{
    Asset, ClaimOfferAtom, InflationPayout, LedgerBundle, LedgerHeader, Memo, Operation,
    OperationBody, OperationResult, Price, Signer, Transaction, TransactionEnvelope,
    TransactionFee, TransactionResult,
};
