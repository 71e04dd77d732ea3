//! Namespace-aware extraction of the flat field map from ISO 20022 XML.

use roxmltree::{Document, Node};
use tracing::debug;

use crate::error::{RagError, RagResult};
use crate::models::{ParsedMessage, StatementEntry};
use crate::schema::MessageType;

/// Where a field lives in the document and how to read it
struct FieldRule {
    field: &'static str,
    /// Path relative to the message root; `/` is a child step, `//` a descendant step
    path: &'static str,
    /// Read this attribute instead of the element text
    attribute: Option<&'static str>,
}

const fn text(field: &'static str, path: &'static str) -> FieldRule {
    FieldRule {
        field,
        path,
        attribute: None,
    }
}

const fn attr(field: &'static str, path: &'static str, attribute: &'static str) -> FieldRule {
    FieldRule {
        field,
        path,
        attribute: Some(attribute),
    }
}

const COMMON_RULES: &[FieldRule] = &[
    text("message_id", "GrpHdr/MsgId"),
    text("created_at", "GrpHdr/CreDtTm"),
];

const PACS_008_RULES: &[FieldRule] = &[
    text("amount", "TtlIntrBkSttlmAmt"),
    attr("currency", "TtlIntrBkSttlmAmt", "Ccy"),
    text("debtor_name", "Dbtr/Nm"),
    text("creditor_name", "Cdtr/Nm"),
    text("debtor_bank", "DbtrAgt//BICFI"),
    text("creditor_bank", "CdtrAgt//BICFI"),
    text("charge_bearer", "ChrgBr"),
    text("purpose", "RmtInf/Ustrd"),
    text("exchange_rate", "XchgRate"),
    text("debtor_lei", "Dbtr//LEI"),
    text("creditor_lei", "Cdtr//LEI"),
];

const PACS_002_RULES: &[FieldRule] = &[
    text("original_message_id", "OrgnlMsgId"),
    text("original_message_type", "OrgnlMsgNmId"),
    text("group_status", "GrpSts"),
];

const CAMT_053_RULES: &[FieldRule] = &[
    text("statement_id", "Stmt/Id"),
    text("account_id", "Stmt/Acct/Id/IBAN"),
    text("balance_amount", "Stmt/Bal/Amt"),
    attr("balance_currency", "Stmt/Bal/Amt", "Ccy"),
];

const PAIN_001_RULES: &[FieldRule] = &[
    text("initiator_name", "InitgPty/Nm"),
    text("payment_method", "PmtInf/PmtMtd"),
    text("execution_date", "PmtInf/ReqdExctnDt"),
    text("debtor_name", "Dbtr/Nm"),
    text("debtor_account", "DbtrAcct/Id/IBAN"),
    text("amount", "InstdAmt"),
    attr("currency", "InstdAmt", "Ccy"),
    text("creditor_name", "Cdtr/Nm"),
    text("creditor_account", "CdtrAcct/Id/IBAN"),
];

fn rules_for(message_type: MessageType) -> &'static [FieldRule] {
    match message_type {
        MessageType::Pacs008 => PACS_008_RULES,
        MessageType::Pacs002 => PACS_002_RULES,
        MessageType::Camt053 => CAMT_053_RULES,
        MessageType::Pain001 => PAIN_001_RULES,
    }
}

/// Detect the message type from the document namespace and extract its fields.
///
/// Missing fields are left out of the map; only malformed XML or an unknown
/// namespace is an error.
pub fn parse_message(xml: &str) -> RagResult<ParsedMessage> {
    let document = Document::parse(xml.trim_start_matches('\u{feff}'))
        .map_err(|e| RagError::parse(format!("malformed XML: {e}")))?;
    let root = document.root_element();

    let namespace = root
        .tag_name()
        .namespace()
        .ok_or_else(|| RagError::parse("document root has no namespace"))?;
    let message_type = MessageType::from_namespace(namespace)
        .ok_or_else(|| RagError::parse(format!("unknown message namespace: {namespace}")))?;

    debug!(%message_type, "detected message type");
    Ok(extract(root, message_type))
}

/// Parse and require a specific message type
pub fn parse_message_as(xml: &str, expected: MessageType) -> RagResult<ParsedMessage> {
    let message = parse_message(xml)?;
    if message.message_type != expected {
        return Err(RagError::parse(format!(
            "expected {expected} message but found {}",
            message.message_type
        )));
    }
    Ok(message)
}

fn extract(root: Node, message_type: MessageType) -> ParsedMessage {
    let schema = message_type.schema();
    let namespace = schema.namespace;
    let mut message = ParsedMessage::new(message_type);

    let scope = match find(root, namespace, schema.root_element) {
        Some(node) => node,
        None => {
            debug!(element = schema.root_element, "message root element not found, searching whole document");
            root
        }
    };

    for rule in COMMON_RULES.iter().chain(rules_for(message_type)) {
        if let Some(value) = read_rule(scope, namespace, rule) {
            message.insert(rule.field, value);
        }
    }

    if message_type == MessageType::Camt053 {
        message.transactions = extract_entries(scope, namespace);
    }

    message
}

fn read_rule(scope: Node, namespace: &str, rule: &FieldRule) -> Option<String> {
    let node = find(scope, namespace, rule.path)?;
    let value = match rule.attribute {
        Some(attribute) => node.attribute(attribute),
        None => node.text(),
    }?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn extract_entries(scope: Node, namespace: &str) -> Vec<StatementEntry> {
    let Some(statement) = find(scope, namespace, "Stmt") else {
        return Vec::new();
    };

    statement
        .children()
        .filter(|node| is_named(*node, namespace, "Ntry"))
        .map(|entry| {
            let read = |path: &str| {
                find(entry, namespace, path)
                    .and_then(|node| node.text())
                    .map(|value| value.trim().to_string())
                    .unwrap_or_default()
            };
            StatementEntry {
                amount: read("Amt"),
                currency: find(entry, namespace, "Amt")
                    .and_then(|node| node.attribute("Ccy"))
                    .unwrap_or_default()
                    .to_string(),
                credit_debit: read("CdtDbtInd"),
                status: read("Sts"),
                booking_date: read("BookgDt/DtTm"),
            }
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Descendant,
}

/// Find the first element matching `path` below `scope`, in document order.
///
/// The first step always searches descendants, like `.//a/b` in ElementTree.
fn find<'a, 'input>(scope: Node<'a, 'input>, namespace: &str, path: &str) -> Option<Node<'a, 'input>> {
    let mut steps = Vec::new();
    let mut axis = Axis::Descendant;
    for segment in path.split('/') {
        if segment.is_empty() {
            axis = Axis::Descendant;
            continue;
        }
        steps.push((axis, segment));
        axis = Axis::Child;
    }
    find_steps(scope, namespace, &steps)
}

fn find_steps<'a, 'input>(
    node: Node<'a, 'input>,
    namespace: &str,
    steps: &[(Axis, &str)],
) -> Option<Node<'a, 'input>> {
    let Some(((axis, name), rest)) = steps.split_first() else {
        return Some(node);
    };

    let candidates: Vec<Node> = match axis {
        Axis::Child => node.children().collect(),
        Axis::Descendant => node.descendants().skip(1).collect(),
    };

    candidates
        .into_iter()
        .filter(|candidate| is_named(*candidate, namespace, name))
        .find_map(|candidate| find_steps(candidate, namespace, rest))
}

fn is_named(node: Node, namespace: &str, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(namespace)
}
