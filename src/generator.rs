//! Synthetic ISO 20022 messages with randomized but schema-valid values.

use chrono::{Duration, Local};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::models::{ParsedMessage, StatementEntry};
use crate::schema::{BANKS, CHARGE_BEARERS, COUNTRIES, MessageType};

const GENERATED_CURRENCIES: &[&str] = &["USD", "EUR", "GBP", "JPY", "CHF", "AUD"];
const GENERATED_STATUSES: &[&str] = &["ACCP", "ACSC", "ACSP", "RJCT"];
const PURPOSES: &[&str] = &[
    "Trade settlement",
    "Salary payment",
    "Dividend payment",
    "Invoice settlement",
];

/// A generated document together with the values injected into it
#[derive(Debug, Clone)]
pub struct GeneratedMessage {
    pub message_type: MessageType,
    pub xml: String,
    /// The values written into `xml`, keyed like the parser's output
    pub injected: ParsedMessage,
}

pub struct MessageGenerator {
    rng: StdRng,
}

impl MessageGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self, message_type: MessageType) -> GeneratedMessage {
        match message_type {
            MessageType::Pacs008 => self.generate_pacs008(),
            MessageType::Pacs002 => self.generate_pacs002(),
            MessageType::Camt053 => self.generate_camt053(),
            MessageType::Pain001 => self.generate_pain001(),
        }
    }

    /// Generate `count` messages, picking randomly among `message_types`
    pub fn generate_batch(
        &mut self,
        count: usize,
        message_types: &[MessageType],
    ) -> Vec<GeneratedMessage> {
        let pool: &[MessageType] = if message_types.is_empty() {
            &MessageType::ALL
        } else {
            message_types
        };

        (0..count)
            .map(|_| {
                let message_type = *pool.choose(&mut self.rng).unwrap_or(&MessageType::Pacs008);
                self.generate(message_type)
            })
            .collect()
    }

    fn generate_id(&mut self, prefix: &str) -> String {
        let timestamp = Local::now().format("%Y%m%d%H%M%S");
        let suffix: u32 = self.rng.gen_range(0..1_000_000);
        format!("{prefix}{timestamp}{suffix:06}")
    }

    fn generate_amount(&mut self) -> (String, String) {
        let amount: f64 = self.rng.gen_range(1000.0..1_000_000.0);
        let currency = self.pick(GENERATED_CURRENCIES);
        (format!("{amount:.2}"), currency.to_string())
    }

    fn generate_datetime(&self, days_offset: i64) -> String {
        (Local::now() + Duration::days(days_offset))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    fn generate_bank(&mut self) -> (&'static str, &'static str) {
        *BANKS.choose(&mut self.rng).unwrap_or(&BANKS[0])
    }

    fn generate_country(&mut self) -> &'static str {
        COUNTRIES.choose(&mut self.rng).map(|(code, _)| *code).unwrap_or("US")
    }

    /// Dummy IBAN: country, check digits, 8 alphanumerics, 10 digits
    fn generate_iban(&mut self, country: &str) -> String {
        const ALNUM: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let check: u32 = self.rng.gen_range(0..100);
        let bank_code: String = (0..8)
            .map(|_| ALNUM[self.rng.gen_range(0..ALNUM.len())] as char)
            .collect();
        let account: String = (0..10)
            .map(|_| char::from(b'0' + self.rng.gen_range(0..10u8)))
            .collect();
        format!("{country}{check:02}{bank_code}{account}")
    }

    fn pick(&mut self, values: &[&'static str]) -> &'static str {
        values.choose(&mut self.rng).copied().unwrap_or_default()
    }

    pub fn generate_pacs008(&mut self) -> GeneratedMessage {
        let message_id = self.generate_id("PACS008");
        let created_at = self.generate_datetime(0);
        let (amount, currency) = self.generate_amount();
        let (debtor_bic, debtor_bank_name) = self.generate_bank();
        let (creditor_bic, creditor_bank_name) = self.generate_bank();
        let debtor_country = self.generate_country();
        let creditor_country = self.generate_country();
        let debtor_iban = self.generate_iban(debtor_country);
        let creditor_iban = self.generate_iban(creditor_country);
        let charge_bearer = CHARGE_BEARERS
            .choose(&mut self.rng)
            .map(|(code, _)| *code)
            .unwrap_or("SHAR");
        let purpose = self.pick(PURPOSES);
        let debtor_name = format!("{debtor_bank_name} Client");
        let creditor_name = format!("{creditor_bank_name} Client");

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="{namespace}">
    <FIToFICstmrCdtTrf>
        <GrpHdr>
            <MsgId>{message_id}</MsgId>
            <CreDtTm>{created_at}</CreDtTm>
            <NbOfTxs>1</NbOfTxs>
            <TtlIntrBkSttlmAmt Ccy="{currency}">{amount}</TtlIntrBkSttlmAmt>
        </GrpHdr>
        <CdtTrfTxInf>
            <ChrgBr>{charge_bearer}</ChrgBr>
            <DbtrAgt>
                <FinInstnId>
                    <BICFI>{debtor_bic}</BICFI>
                </FinInstnId>
            </DbtrAgt>
            <CdtrAgt>
                <FinInstnId>
                    <BICFI>{creditor_bic}</BICFI>
                </FinInstnId>
            </CdtrAgt>
            <Dbtr>
                <Nm>{debtor_name}</Nm>
                <Id>
                    <PrvtId>
                        <Othr>
                            <Id>{debtor_iban}</Id>
                        </Othr>
                    </PrvtId>
                </Id>
            </Dbtr>
            <Cdtr>
                <Nm>{creditor_name}</Nm>
                <Id>
                    <PrvtId>
                        <Othr>
                            <Id>{creditor_iban}</Id>
                        </Othr>
                    </PrvtId>
                </Id>
            </Cdtr>
            <RmtInf>
                <Ustrd>{purpose}</Ustrd>
            </RmtInf>
        </CdtTrfTxInf>
    </FIToFICstmrCdtTrf>
</Document>
"#,
            namespace = MessageType::Pacs008.schema().namespace,
            debtor_name = escape(&debtor_name),
            creditor_name = escape(&creditor_name),
        );

        let mut injected = ParsedMessage::new(MessageType::Pacs008);
        injected.insert("message_id", message_id);
        injected.insert("created_at", created_at);
        injected.insert("amount", amount);
        injected.insert("currency", currency);
        injected.insert("debtor_name", debtor_name);
        injected.insert("creditor_name", creditor_name);
        injected.insert("debtor_bank", debtor_bic);
        injected.insert("creditor_bank", creditor_bic);
        injected.insert("charge_bearer", charge_bearer);
        injected.insert("purpose", purpose);

        GeneratedMessage {
            message_type: MessageType::Pacs008,
            xml,
            injected,
        }
    }

    pub fn generate_pacs002(&mut self) -> GeneratedMessage {
        let message_id = self.generate_id("PACS002");
        let created_at = self.generate_datetime(0);
        let original_message_id = self.generate_id("ORIG");
        let original_message_type = "pacs.008.001.10";
        let status = self.pick(GENERATED_STATUSES);

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="{namespace}">
    <FIToFIPmtStsRpt>
        <GrpHdr>
            <MsgId>{message_id}</MsgId>
            <CreDtTm>{created_at}</CreDtTm>
        </GrpHdr>
        <OrgnlGrpInfAndSts>
            <OrgnlMsgId>{original_message_id}</OrgnlMsgId>
            <OrgnlMsgNmId>{original_message_type}</OrgnlMsgNmId>
            <GrpSts>{status}</GrpSts>
        </OrgnlGrpInfAndSts>
    </FIToFIPmtStsRpt>
</Document>
"#,
            namespace = MessageType::Pacs002.schema().namespace,
        );

        let mut injected = ParsedMessage::new(MessageType::Pacs002);
        injected.insert("message_id", message_id);
        injected.insert("created_at", created_at);
        injected.insert("original_message_id", original_message_id);
        injected.insert("original_message_type", original_message_type);
        injected.insert("group_status", status);

        GeneratedMessage {
            message_type: MessageType::Pacs002,
            xml,
            injected,
        }
    }

    pub fn generate_camt053(&mut self) -> GeneratedMessage {
        let message_id = self.generate_id("CAMT053");
        let created_at = self.generate_datetime(0);
        let statement_id = self.generate_id("STMT");
        let country = self.generate_country();
        let account_id = self.generate_iban(country);
        let (balance_amount, balance_currency) = self.generate_amount();

        let entry_count = self.rng.gen_range(1..=3);
        let mut entries = Vec::with_capacity(entry_count);
        for offset in 0..entry_count {
            let amount: f64 = self.rng.gen_range(10.0..50_000.0);
            let credit_debit = self.pick(&["CRDT", "DBIT"]);
            entries.push(StatementEntry {
                amount: format!("{amount:.2}"),
                currency: balance_currency.clone(),
                credit_debit: credit_debit.to_string(),
                status: "BOOK".to_string(),
                booking_date: self.generate_datetime(-(offset as i64)),
            });
        }

        let entries_xml: String = entries
            .iter()
            .map(|entry| {
                format!(
                    r#"
            <Ntry>
                <Amt Ccy="{}">{}</Amt>
                <CdtDbtInd>{}</CdtDbtInd>
                <Sts>{}</Sts>
                <BookgDt>
                    <DtTm>{}</DtTm>
                </BookgDt>
            </Ntry>"#,
                    entry.currency, entry.amount, entry.credit_debit, entry.status, entry.booking_date
                )
            })
            .collect();

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="{namespace}">
    <BkToCstmrStmt>
        <GrpHdr>
            <MsgId>{message_id}</MsgId>
            <CreDtTm>{created_at}</CreDtTm>
        </GrpHdr>
        <Stmt>
            <Id>{statement_id}</Id>
            <Acct>
                <Id>
                    <IBAN>{account_id}</IBAN>
                </Id>
            </Acct>
            <Bal>
                <Amt Ccy="{balance_currency}">{balance_amount}</Amt>
            </Bal>{entries_xml}
        </Stmt>
    </BkToCstmrStmt>
</Document>
"#,
            namespace = MessageType::Camt053.schema().namespace,
        );

        let mut injected = ParsedMessage::new(MessageType::Camt053);
        injected.insert("message_id", message_id);
        injected.insert("created_at", created_at);
        injected.insert("statement_id", statement_id);
        injected.insert("account_id", account_id);
        injected.insert("balance_amount", balance_amount);
        injected.insert("balance_currency", balance_currency);
        injected.transactions = entries;

        GeneratedMessage {
            message_type: MessageType::Camt053,
            xml,
            injected,
        }
    }

    pub fn generate_pain001(&mut self) -> GeneratedMessage {
        let message_id = self.generate_id("PAIN001");
        let created_at = self.generate_datetime(0);
        let (amount, currency) = self.generate_amount();
        let execution_date = self.generate_datetime(1);
        let payment_info_id = self.generate_id("PMT");
        let end_to_end_id = self.generate_id("E2E");
        let debtor_country = self.generate_country();
        let creditor_country = self.generate_country();
        let debtor_account = self.generate_iban(debtor_country);
        let creditor_account = self.generate_iban(creditor_country);

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="{namespace}">
    <CstmrCdtTrfInitn>
        <GrpHdr>
            <MsgId>{message_id}</MsgId>
            <CreDtTm>{created_at}</CreDtTm>
            <InitgPty>
                <Nm>Initiating Company</Nm>
            </InitgPty>
        </GrpHdr>
        <PmtInf>
            <PmtInfId>{payment_info_id}</PmtInfId>
            <PmtMtd>TRF</PmtMtd>
            <ReqdExctnDt>{execution_date}</ReqdExctnDt>
            <Dbtr>
                <Nm>Debtor Name</Nm>
            </Dbtr>
            <DbtrAcct>
                <Id>
                    <IBAN>{debtor_account}</IBAN>
                </Id>
            </DbtrAcct>
            <CdtTrfTxInf>
                <PmtId>
                    <EndToEndId>{end_to_end_id}</EndToEndId>
                </PmtId>
                <Amt>
                    <InstdAmt Ccy="{currency}">{amount}</InstdAmt>
                </Amt>
                <Cdtr>
                    <Nm>Creditor Name</Nm>
                </Cdtr>
                <CdtrAcct>
                    <Id>
                        <IBAN>{creditor_account}</IBAN>
                    </Id>
                </CdtrAcct>
            </CdtTrfTxInf>
        </PmtInf>
    </CstmrCdtTrfInitn>
</Document>
"#,
            namespace = MessageType::Pain001.schema().namespace,
        );

        let mut injected = ParsedMessage::new(MessageType::Pain001);
        injected.insert("message_id", message_id);
        injected.insert("created_at", created_at);
        injected.insert("initiator_name", "Initiating Company");
        injected.insert("payment_method", "TRF");
        injected.insert("execution_date", execution_date);
        injected.insert("debtor_name", "Debtor Name");
        injected.insert("debtor_account", debtor_account);
        injected.insert("amount", amount);
        injected.insert("currency", currency);
        injected.insert("creditor_name", "Creditor Name");
        injected.insert("creditor_account", creditor_account);

        GeneratedMessage {
            message_type: MessageType::Pain001,
            xml,
            injected,
        }
    }
}

impl Default for MessageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
