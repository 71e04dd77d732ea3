//! Built-in query catalog used when a run has no explicit queries.

use crate::schema::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioQuery {
    pub name: &'static str,
    pub query: &'static str,
    /// What the query is meant to probe
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub category: &'static str,
    pub queries: &'static [ScenarioQuery],
}

const fn q(name: &'static str, query: &'static str, description: &'static str) -> ScenarioQuery {
    ScenarioQuery {
        name,
        query,
        description,
    }
}

pub static SCENARIOS: &[Scenario] = &[
    Scenario {
        category: "Basic Understanding",
        queries: &[
            q(
                "Message Type",
                "What type of ISO 20022 message is this and what is its purpose?",
                "Tests basic message identification",
            ),
            q(
                "Key Fields",
                "What are the key fields in this message and their values?",
                "Tests field extraction",
            ),
            q(
                "Transaction Summary",
                "Provide a concise summary of this transaction.",
                "Tests summarization ability",
            ),
        ],
    },
    Scenario {
        category: "Payment Processing",
        queries: &[
            q(
                "Payment Flow",
                "Explain the payment flow, including all parties involved.",
                "Tests understanding of payment chain",
            ),
            q(
                "Settlement Details",
                "What are the settlement details and method used?",
                "Tests settlement understanding",
            ),
            q(
                "Charges",
                "How are the charges handled in this payment?",
                "Tests charge bearer understanding",
            ),
        ],
    },
    Scenario {
        category: "Compliance",
        queries: &[
            q(
                "Regulatory Requirements",
                "What regulatory requirements apply to this message?",
                "Tests regulatory knowledge",
            ),
            q(
                "Sanctions Screening",
                "What sanctions screening considerations apply?",
                "Tests compliance understanding",
            ),
            q(
                "Reporting Requirements",
                "What reporting requirements apply to this transaction?",
                "Tests reporting knowledge",
            ),
        ],
    },
    Scenario {
        category: "Cross-Border",
        queries: &[
            q(
                "Currency Exchange",
                "Analyze the currency exchange aspects of this transaction.",
                "Tests FX understanding",
            ),
            q(
                "International Routing",
                "How is this payment routed internationally?",
                "Tests routing knowledge",
            ),
            q(
                "Country Requirements",
                "What country-specific requirements apply?",
                "Tests geographic understanding",
            ),
        ],
    },
    Scenario {
        category: "Technical",
        queries: &[
            q(
                "Message Structure",
                "Analyze the XML structure and namespace usage.",
                "Tests technical understanding",
            ),
            q(
                "Validation Rules",
                "What validation rules apply to this message?",
                "Tests schema knowledge",
            ),
            q(
                "Message References",
                "Explain the message reference system used.",
                "Tests reference understanding",
            ),
        ],
    },
    Scenario {
        category: "Business",
        queries: &[
            q(
                "Business Purpose",
                "What is the business purpose of this transaction?",
                "Tests business context understanding",
            ),
            q(
                "Risk Assessment",
                "Assess the business risks in this transaction.",
                "Tests risk analysis",
            ),
            q(
                "Process Optimization",
                "Suggest optimizations for this payment process.",
                "Tests process understanding",
            ),
        ],
    },
    Scenario {
        category: "Error Handling",
        queries: &[
            q(
                "Error Scenarios",
                "What potential errors could occur with this message?",
                "Tests error awareness",
            ),
            q(
                "Resolution Process",
                "How should errors in this message be resolved?",
                "Tests problem-solving",
            ),
            q(
                "Status Updates",
                "How are status updates handled for this message?",
                "Tests status handling",
            ),
        ],
    },
    Scenario {
        category: "Reconciliation",
        queries: &[
            q(
                "Matching Rules",
                "What matching rules apply for reconciliation?",
                "Tests reconciliation understanding",
            ),
            q(
                "Statement Analysis",
                "Analyze the statement entries and balances.",
                "Tests statement understanding",
            ),
            q(
                "Exception Handling",
                "How are reconciliation exceptions handled?",
                "Tests exception handling",
            ),
        ],
    },
    Scenario {
        category: "Special Cases",
        queries: &[
            q(
                "High-Value Payment",
                "What special considerations apply to high-value payments?",
                "Tests high-value handling",
            ),
            q(
                "Urgent Processing",
                "How are urgent payments handled differently?",
                "Tests priority handling",
            ),
            q(
                "Return Processing",
                "How are payment returns processed?",
                "Tests return handling",
            ),
        ],
    },
];

const COMMON_CATEGORIES: &[&str] = &["Basic Understanding", "Technical", "Error Handling"];

/// Categories added on top of the common ones for each message type
pub fn type_categories(message_type: MessageType) -> &'static [&'static str] {
    match message_type {
        MessageType::Pacs008 => &["Payment Processing", "Compliance", "Cross-Border", "Business"],
        MessageType::Pacs002 => &["Error Handling"],
        MessageType::Camt053 => &["Reconciliation", "Business", "Technical"],
        MessageType::Pain001 => &["Payment Processing", "Business", "Compliance"],
    }
}

/// Scenarios relevant to a message type, in catalog order
pub fn relevant_scenarios(message_type: MessageType) -> Vec<&'static Scenario> {
    let extra = type_categories(message_type);
    SCENARIOS
        .iter()
        .filter(|scenario| {
            COMMON_CATEGORIES.contains(&scenario.category) || extra.contains(&scenario.category)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(message_type: MessageType) -> Vec<&'static str> {
        relevant_scenarios(message_type)
            .into_iter()
            .map(|scenario| scenario.category)
            .collect()
    }

    #[test]
    fn test_catalog_shape() {
        assert_eq!(SCENARIOS.len(), 9);
        assert!(SCENARIOS.iter().all(|scenario| scenario.queries.len() == 3));
        assert_eq!(SCENARIOS[0].queries[0].name, "Message Type");
    }

    #[test]
    fn test_pacs008_scenarios() {
        assert_eq!(
            categories(MessageType::Pacs008),
            vec![
                "Basic Understanding",
                "Payment Processing",
                "Compliance",
                "Cross-Border",
                "Technical",
                "Business",
                "Error Handling"
            ]
        );
    }

    #[test]
    fn test_pacs002_gets_only_common_categories() {
        assert_eq!(
            categories(MessageType::Pacs002),
            vec!["Basic Understanding", "Technical", "Error Handling"]
        );
    }

    #[test]
    fn test_categories_are_not_duplicated() {
        let camt = categories(MessageType::Camt053);
        assert_eq!(
            camt,
            vec![
                "Basic Understanding",
                "Technical",
                "Business",
                "Error Handling",
                "Reconciliation"
            ]
        );
        assert!(!categories(MessageType::Pain001).contains(&"Special Cases"));
    }
}
