//! Ledger bundle and transaction types
//!
//! Transactions are stored upstream as JSON envelope/result pairs and decoded
//! with serde. Amounts are stroops.

use serde::{Deserialize, Serialize};

/// One ledger's worth of data produced by a single upstream read.
///
/// Immutable once loaded; consumed and discarded within one ingestion step.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerBundle {
    pub sequence: u32,
    pub header: LedgerHeader,
    pub transactions: Vec<Transaction>,
    pub fees: Vec<TransactionFee>,
}

impl LedgerBundle {
    pub fn successful_transaction_count(&self) -> usize {
        self.transactions.iter().filter(|tx| tx.successful()).count()
    }

    pub fn failed_transaction_count(&self) -> usize {
        self.transactions.len() - self.successful_transaction_count()
    }

    /// Operations in successful transactions.
    pub fn operation_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|tx| tx.successful())
            .map(|tx| tx.envelope.operations.len())
            .sum()
    }

    /// Fee record for the transaction at 1-based application `index`.
    pub fn fee_for(&self, index: u32) -> Option<&TransactionFee> {
        self.fees.iter().find(|fee| fee.index == index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerHeader {
    pub sequence: u32,
    pub hash: String,
    pub previous_hash: String,
    /// Unix seconds
    pub close_time: i64,
    pub protocol_version: u32,
    pub total_coins: i64,
    pub fee_pool: i64,
    pub base_fee: u32,
    pub base_reserve: u32,
    pub max_tx_set_size: u32,
}

impl LedgerHeader {
    /// Close time as an RFC 3339 UTC timestamp.
    pub fn closed_at(&self) -> String {
        chrono::DateTime::from_timestamp(self.close_time, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub hash: String,
    pub ledger_sequence: u32,
    /// 1-based application order within the ledger
    pub index: u32,
    pub envelope: TransactionEnvelope,
    pub result: TransactionResult,
}

impl Transaction {
    pub fn successful(&self) -> bool {
        self.result.successful()
    }

    pub fn source_account(&self) -> &str {
        &self.envelope.source_account
    }

    /// Effective source of `op`: its own source, else the transaction's.
    pub fn operation_source<'a>(&'a self, op: &'a Operation) -> &'a str {
        op.source_account
            .as_deref()
            .unwrap_or(&self.envelope.source_account)
    }

    /// Result for the operation at 0-based `index`, if the result carries one.
    pub fn operation_result(&self, index: usize) -> Option<&OperationResult> {
        self.result.operations.get(index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFee {
    pub hash: String,
    pub ledger_sequence: u32,
    pub index: u32,
    pub fee_charged: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub source_account: String,
    pub fee: u32,
    pub sequence: i64,
    #[serde(default)]
    pub memo: Memo,
    #[serde(default)]
    pub time_bounds: Option<TimeBounds>,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Memo {
    #[default]
    None,
    Text(String),
    Id(u64),
    Hash(String),
    Return(String),
}

impl Memo {
    pub fn memo_type(&self) -> &'static str {
        match self {
            Memo::None => "none",
            Memo::Text(_) => "text",
            Memo::Id(_) => "id",
            Memo::Hash(_) => "hash",
            Memo::Return(_) => "return",
        }
    }

    pub fn value(&self) -> Option<String> {
        match self {
            Memo::None => None,
            Memo::Text(text) => Some(text.clone()),
            Memo::Id(id) => Some(id.to_string()),
            Memo::Hash(hash) | Memo::Return(hash) => Some(hash.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub min_time: u64,
    pub max_time: u64,
}

impl TimeBounds {
    /// Range literal stored in `history_transactions.time_bounds`.
    pub fn to_range(&self) -> String {
        if self.max_time == 0 {
            format!("[{},)", self.min_time)
        } else {
            format!("[{},{})", self.min_time, self.max_time)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub source_account: Option<String>,
    pub body: OperationBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationBody {
    CreateAccount {
        destination: String,
        starting_balance: i64,
    },
    Payment {
        destination: String,
        asset: Asset,
        amount: i64,
    },
    PathPayment {
        destination: String,
        send_asset: Asset,
        send_max: i64,
        dest_asset: Asset,
        dest_amount: i64,
        #[serde(default)]
        path: Vec<Asset>,
    },
    ManageOffer {
        selling: Asset,
        buying: Asset,
        amount: i64,
        price: Price,
        #[serde(default)]
        offer_id: i64,
    },
    CreatePassiveOffer {
        selling: Asset,
        buying: Asset,
        amount: i64,
        price: Price,
    },
    SetOptions {
        #[serde(default)]
        inflation_dest: Option<String>,
        #[serde(default)]
        clear_flags: Option<u32>,
        #[serde(default)]
        set_flags: Option<u32>,
        #[serde(default)]
        master_weight: Option<u32>,
        #[serde(default)]
        low_threshold: Option<u32>,
        #[serde(default)]
        med_threshold: Option<u32>,
        #[serde(default)]
        high_threshold: Option<u32>,
        #[serde(default)]
        home_domain: Option<String>,
        #[serde(default)]
        signer: Option<Signer>,
    },
    ChangeTrust {
        line: Asset,
        limit: i64,
    },
    AllowTrust {
        trustor: String,
        asset_code: String,
        authorize: bool,
    },
    AccountMerge {
        destination: String,
    },
    Inflation,
    ManageData {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    BumpSequence {
        bump_to: i64,
    },
}

impl OperationBody {
    /// Numeric type code stored in `history_operations.type`.
    pub fn type_code(&self) -> i64 {
        match self {
            OperationBody::CreateAccount { .. } => 0,
            OperationBody::Payment { .. } => 1,
            OperationBody::PathPayment { .. } => 2,
            OperationBody::ManageOffer { .. } => 3,
            OperationBody::CreatePassiveOffer { .. } => 4,
            OperationBody::SetOptions { .. } => 5,
            OperationBody::ChangeTrust { .. } => 6,
            OperationBody::AllowTrust { .. } => 7,
            OperationBody::AccountMerge { .. } => 8,
            OperationBody::Inflation => 9,
            OperationBody::ManageData { .. } => 10,
            OperationBody::BumpSequence { .. } => 11,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            OperationBody::CreateAccount { .. } => "create_account",
            OperationBody::Payment { .. } => "payment",
            OperationBody::PathPayment { .. } => "path_payment",
            OperationBody::ManageOffer { .. } => "manage_offer",
            OperationBody::CreatePassiveOffer { .. } => "create_passive_offer",
            OperationBody::SetOptions { .. } => "set_options",
            OperationBody::ChangeTrust { .. } => "change_trust",
            OperationBody::AllowTrust { .. } => "allow_trust",
            OperationBody::AccountMerge { .. } => "account_merge",
            OperationBody::Inflation => "inflation",
            OperationBody::ManageData { .. } => "manage_data",
            OperationBody::BumpSequence { .. } => "bump_sequence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signer {
    pub key: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub n: i32,
    pub d: i32,
}

impl Price {
    pub fn to_decimal_string(&self) -> String {
        if self.d == 0 {
            return "0".to_string();
        }
        format!("{:.7}", self.n as f64 / self.d as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Asset {
    #[serde(rename = "native")]
    Native,
    #[serde(rename = "credit_alphanum4")]
    CreditAlphanum4 { code: String, issuer: String },
    #[serde(rename = "credit_alphanum12")]
    CreditAlphanum12 { code: String, issuer: String },
}

impl Asset {
    /// Credit asset; the code length picks alphanum4 or alphanum12.
    pub fn credit(code: impl Into<String>, issuer: impl Into<String>) -> Self {
        let code = code.into();
        let issuer = issuer.into();
        if code.len() <= 4 {
            Asset::CreditAlphanum4 { code, issuer }
        } else {
            Asset::CreditAlphanum12 { code, issuer }
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    pub fn asset_type(&self) -> &'static str {
        match self {
            Asset::Native => "native",
            Asset::CreditAlphanum4 { .. } => "credit_alphanum4",
            Asset::CreditAlphanum12 { .. } => "credit_alphanum12",
        }
    }

    /// Empty for native.
    pub fn code(&self) -> &str {
        match self {
            Asset::Native => "",
            Asset::CreditAlphanum4 { code, .. } | Asset::CreditAlphanum12 { code, .. } => code,
        }
    }

    /// Empty for native.
    pub fn issuer(&self) -> &str {
        match self {
            Asset::Native => "",
            Asset::CreditAlphanum4 { issuer, .. } | Asset::CreditAlphanum12 { issuer, .. } => issuer,
        }
    }

    /// `trustlines.assettype` value upstream (0 for native).
    pub fn trustline_type(&self) -> i64 {
        match self {
            Asset::Native => 0,
            Asset::CreditAlphanum4 { .. } => 1,
            Asset::CreditAlphanum12 { .. } => 2,
        }
    }

    /// Adds `<prefix>asset_type`, `<prefix>asset_code`, `<prefix>asset_issuer`
    /// to a JSON details object. Code and issuer are omitted for native.
    pub fn write_details(&self, details: &mut serde_json::Map<String, serde_json::Value>, prefix: &str) {
        details.insert(format!("{}asset_type", prefix), self.asset_type().into());
        if !self.is_native() {
            details.insert(format!("{}asset_code", prefix), self.code().into());
            details.insert(format!("{}asset_issuer", prefix), self.issuer().into());
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            _ => write!(f, "{}:{}", self.code(), self.issuer()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub fee_charged: i64,
    pub code: String,
    #[serde(default)]
    pub operations: Vec<OperationResult>,
}

impl TransactionResult {
    pub const SUCCESS: &'static str = "tx_success";

    pub fn successful(&self) -> bool {
        self.code == Self::SUCCESS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OperationResult {
    Success,
    OfferClaims {
        #[serde(default)]
        claims: Vec<ClaimOfferAtom>,
    },
    PathPayment {
        #[serde(default)]
        claims: Vec<ClaimOfferAtom>,
        source_amount: i64,
    },
    AccountMerge {
        source_balance: i64,
    },
    Inflation {
        #[serde(default)]
        payouts: Vec<InflationPayout>,
    },
    Failed {
        code: String,
    },
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, OperationResult::Failed { .. })
    }

    pub fn claims(&self) -> &[ClaimOfferAtom] {
        match self {
            OperationResult::OfferClaims { claims } | OperationResult::PathPayment { claims, .. } => claims,
            _ => &[],
        }
    }
}

/// One offer crossed by an offer-taking operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimOfferAtom {
    pub seller_id: String,
    pub offer_id: i64,
    pub asset_sold: Asset,
    pub amount_sold: i64,
    pub asset_bought: Asset,
    pub amount_bought: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflationPayout {
    pub destination: String,
    pub amount: i64,
}
