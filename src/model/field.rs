use serde::{Deserialize, Serialize};

/// The fields of a normalized transaction that a column can be mapped to.
///
/// The set is closed: every conversion in the parser is an exhaustive `match` over this enum.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemField {
    Date,
    ValueDate,
    Narration,
    Reference,
    Withdrawal,
    Deposit,
    Amount,
    Balance,
    TransactionType,
    Category,
    Merchant,
    CardNumber,
}

serde_plain::derive_display_from_serialize!(SystemField);
serde_plain::derive_fromstr_from_deserialize!(SystemField);

/// How the raw cell of a field is converted.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FieldKind {
    /// Parsed into a date.
    Date,
    /// Parsed into an unsigned amount; zero is treated as absent.
    Leg,
    /// Parsed into a signed amount; zero is kept.
    Signed,
    /// Kept as trimmed text.
    Text,
}

impl SystemField {
    pub const ALL: [SystemField; 12] = [
        SystemField::Date,
        SystemField::ValueDate,
        SystemField::Narration,
        SystemField::Reference,
        SystemField::Withdrawal,
        SystemField::Deposit,
        SystemField::Amount,
        SystemField::Balance,
        SystemField::TransactionType,
        SystemField::Category,
        SystemField::Merchant,
        SystemField::CardNumber,
    ];

    pub fn kind(&self) -> FieldKind {
        match self {
            SystemField::Date | SystemField::ValueDate => FieldKind::Date,
            SystemField::Withdrawal | SystemField::Deposit => FieldKind::Leg,
            SystemField::Amount | SystemField::Balance => FieldKind::Signed,
            SystemField::Narration
            | SystemField::Reference
            | SystemField::TransactionType
            | SystemField::Category
            | SystemField::Merchant
            | SystemField::CardNumber => FieldKind::Text,
        }
    }

    /// Header synonyms, lowercase, used when suggesting a mapping from a header row. A header
    /// matches a field if it equals one of these or contains it, ignoring spaces and punctuation.
    pub(crate) fn synonyms(&self) -> &'static [&'static str] {
        match self {
            SystemField::Date => &["date", "txn date", "transaction date", "tran date", "posting date"],
            SystemField::ValueDate => &["value date", "value dt", "val date"],
            SystemField::Withdrawal => &["withdrawal", "debit", "dr", "withdrawal amt", "debit amount"],
            SystemField::Deposit => &["deposit", "credit", "cr", "deposit amt", "credit amount"],
            SystemField::Amount => &["amount", "txn amount", "transaction amount"],
            SystemField::Balance => &["balance", "closing balance", "running balance"],
            SystemField::Narration => &["narration", "description", "particulars", "details", "remarks"],
            SystemField::Reference => &["reference", "ref no", "cheque no", "chq no", "ref"],
            SystemField::TransactionType => &["type", "txn type", "transaction type"],
            SystemField::Category => &["category"],
            SystemField::Merchant => &["merchant", "payee", "vendor"],
            SystemField::CardNumber => &["card", "card no", "card number"],
        }
    }
}

/// The order in which header synonyms are tried. Value date precedes date so that "Value Date" is
/// not claimed by the plain date group, and the debit/credit groups precede amount so that
/// "Debit Amount" is a withdrawal.
pub(crate) const SUGGESTION_ORDER: [SystemField; 12] = [
    SystemField::ValueDate,
    SystemField::Date,
    SystemField::Withdrawal,
    SystemField::Deposit,
    SystemField::Amount,
    SystemField::Balance,
    SystemField::Narration,
    SystemField::Reference,
    SystemField::TransactionType,
    SystemField::Category,
    SystemField::Merchant,
    SystemField::CardNumber,
];
