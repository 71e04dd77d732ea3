//! Static description of the supported ISO 20022 message types.
//!
//! Every schema is a `'static` table: message code, XML namespace, document
//! root element and the flat field set the parser extracts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RagError;

/// The four ISO 20022 message types the harness understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "pacs.008")]
    Pacs008,
    #[serde(rename = "pacs.002")]
    Pacs002,
    #[serde(rename = "camt.053")]
    Camt053,
    #[serde(rename = "pain.001")]
    Pain001,
}

impl MessageType {
    pub const ALL: [MessageType; 4] = [
        MessageType::Pacs008,
        MessageType::Pacs002,
        MessageType::Camt053,
        MessageType::Pain001,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Pacs008 => "pacs.008",
            Self::Pacs002 => "pacs.002",
            Self::Camt053 => "camt.053",
            Self::Pain001 => "pain.001",
        }
    }

    pub fn schema(&self) -> &'static MessageSchema {
        match self {
            Self::Pacs008 => &PACS_008,
            Self::Pacs002 => &PACS_002,
            Self::Camt053 => &CAMT_053,
            Self::Pain001 => &PAIN_001,
        }
    }

    /// Resolve a message type from a document namespace URI
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .map(MessageType::schema)
            .find(|schema| schema.namespace == namespace)
            .map(|schema| schema.message_type)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for MessageType {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|message_type| message_type.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RagError::config(format!("unsupported message type: {s}")))
    }
}

/// Schema of one message type
#[derive(Debug)]
pub struct MessageSchema {
    pub message_type: MessageType,
    pub namespace: &'static str,
    /// Element directly under `Document` that identifies the message
    pub root_element: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Fields extracted by the parser, in report order
    pub fields: &'static [&'static str],
    /// Fields that hold monetary amounts
    pub amount_fields: &'static [&'static str],
    /// Fields that hold ISO 4217 currency codes
    pub currency_fields: &'static [&'static str],
    /// XML element names shown as "key fields" in prompts
    pub key_elements: &'static [&'static str],
}

pub static PACS_008: MessageSchema = MessageSchema {
    message_type: MessageType::Pacs008,
    namespace: "urn:iso:std:iso:20022:tech:xsd:pacs.008.001.10",
    root_element: "FIToFICstmrCdtTrf",
    name: "FIToFICustomerCreditTransfer",
    description: "Customer credit transfer message",
    fields: &[
        "message_id",
        "created_at",
        "amount",
        "currency",
        "debtor_name",
        "creditor_name",
        "debtor_bank",
        "creditor_bank",
        "charge_bearer",
        "purpose",
        "exchange_rate",
        "debtor_lei",
        "creditor_lei",
    ],
    amount_fields: &["amount"],
    currency_fields: &["currency"],
    key_elements: &["MsgId", "CreDtTm", "TtlIntrBkSttlmAmt", "Dbtr", "Cdtr"],
};

pub static PACS_002: MessageSchema = MessageSchema {
    message_type: MessageType::Pacs002,
    namespace: "urn:iso:std:iso:20022:tech:xsd:pacs.002.001.12",
    root_element: "FIToFIPmtStsRpt",
    name: "FIToFIPaymentStatusReport",
    description: "Payment status report message",
    fields: &[
        "message_id",
        "created_at",
        "original_message_id",
        "original_message_type",
        "group_status",
    ],
    amount_fields: &[],
    currency_fields: &[],
    key_elements: &["MsgId", "CreDtTm", "OrgnlMsgId", "GrpSts"],
};

pub static CAMT_053: MessageSchema = MessageSchema {
    message_type: MessageType::Camt053,
    namespace: "urn:iso:std:iso:20022:tech:xsd:camt.053.001.10",
    root_element: "BkToCstmrStmt",
    name: "BankToCustomerStatement",
    description: "Bank statement message",
    fields: &[
        "message_id",
        "created_at",
        "statement_id",
        "account_id",
        "balance_amount",
        "balance_currency",
    ],
    amount_fields: &["balance_amount"],
    currency_fields: &["balance_currency"],
    key_elements: &["MsgId", "CreDtTm", "StmtId", "Bal"],
};

pub static PAIN_001: MessageSchema = MessageSchema {
    message_type: MessageType::Pain001,
    namespace: "urn:iso:std:iso:20022:tech:xsd:pain.001.001.11",
    root_element: "CstmrCdtTrfInitn",
    name: "CustomerCreditTransferInitiation",
    description: "Payment initiation message",
    fields: &[
        "message_id",
        "created_at",
        "initiator_name",
        "payment_method",
        "execution_date",
        "debtor_name",
        "debtor_account",
        "amount",
        "currency",
        "creditor_name",
        "creditor_account",
    ],
    amount_fields: &["amount"],
    currency_fields: &["currency"],
    key_elements: &["MsgId", "CreDtTm", "InitgPty", "Dbtr", "Cdtr"],
};

/// ISO 4217 codes recognised in generated messages and in scored text
pub const CURRENCIES: &[(&str, &str)] = &[
    ("USD", "US Dollar"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("JPY", "Japanese Yen"),
    ("CHF", "Swiss Franc"),
    ("AUD", "Australian Dollar"),
    ("CAD", "Canadian Dollar"),
    ("CNY", "Chinese Yuan"),
    ("HKD", "Hong Kong Dollar"),
    ("SGD", "Singapore Dollar"),
];

pub const COUNTRIES: &[(&str, &str)] = &[
    ("US", "United States"),
    ("GB", "United Kingdom"),
    ("DE", "Germany"),
    ("FR", "France"),
    ("CH", "Switzerland"),
    ("JP", "Japan"),
    ("HK", "Hong Kong"),
    ("SG", "Singapore"),
];

/// BIC and institution name
pub const BANKS: &[(&str, &str)] = &[
    ("DEUTDEFF", "Deutsche Bank"),
    ("CHASUS33", "JPMorgan Chase"),
    ("BARCGB22", "Barclays Bank"),
    ("BNPAFRPP", "BNP Paribas"),
    ("UBSWCHZH", "UBS"),
    ("CITIGB2L", "Citibank London"),
    ("HSBCHKHH", "HSBC Hong Kong"),
    ("MHCBJPJT", "Mizuho Bank"),
];

/// Group status codes used in pacs.002 reports
pub const STATUS_CODES: &[(&str, &str)] = &[
    ("ACCC", "Accepted and Settled"),
    ("ACCP", "Accepted"),
    ("ACSC", "Accepted Settlement Completed"),
    ("ACSP", "Accepted for Settlement"),
    ("PDNG", "Pending"),
    ("RJCT", "Rejected"),
];

pub const CHARGE_BEARERS: &[(&str, &str)] = &[
    ("DEBT", "Borne by debtor"),
    ("CRED", "Borne by creditor"),
    ("SHAR", "Shared"),
    ("SLEV", "Following service level"),
];

pub fn is_currency_code(code: &str) -> bool {
    CURRENCIES.iter().any(|(c, _)| *c == code)
}

pub fn status_description(code: &str) -> Option<&'static str> {
    STATUS_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, description)| *description)
}
