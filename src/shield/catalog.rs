// Built-in detector catalog
//
// Ordered list of named detectors applied by the redaction engine. The order
// is part of the contract: substitutions run top to bottom, and placeholders
// use only upper-case letters, underscores, and brackets so no placeholder can
// itself match a later detector.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Classification of why a match was redacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternCategory {
    Pii,
    Phi,
    Pci,
    Secret,
    Corporate,
}

impl PatternCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::Pii => "PII",
            PatternCategory::Phi => "PHI",
            PatternCategory::Pci => "PCI",
            PatternCategory::Secret => "SECRET",
            PatternCategory::Corporate => "CORPORATE",
        }
    }
}

/// A single named detector.
pub struct Detector {
    pub name: &'static str,
    pub regex: Regex,
    pub placeholder: &'static str,
    pub category: PatternCategory,
}

/// Placeholder used for tenant custom-blacklist hits.
pub const CUSTOM_KEYWORD_PLACEHOLDER: &str = "[CORPORATE_SECRET]";

fn detector(
    name: &'static str,
    pattern: &str,
    placeholder: &'static str,
    category: PatternCategory,
) -> Detector {
    Detector {
        name,
        // Patterns are fixed and covered by tests; a failure here is a
        // programming error, not an input error.
        regex: Regex::new(pattern).unwrap(),
        placeholder,
        category,
    }
}

pub fn builtin_detectors() -> Vec<Detector> {
    use PatternCategory::*;

    vec![
        // PII / PHI
        detector(
            "Email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "[EMAIL_REDACTED]",
            Pii,
        ),
        detector(
            "Phone",
            r"\b(?:\+?1[-.]?)?\(?([0-9]{3})\)?[-.]?([0-9]{3})[-.]?([0-9]{4})\b",
            "[PHONE_HIDDEN]",
            Pii,
        ),
        detector("SSN", r"\b\d{3}-\d{2}-\d{4}\b", "[SSN_REDACTED]", Pii),
        detector(
            "Passport",
            r"\b[A-Z]{1,2}\d{6,9}\b",
            "[PASSPORT_REDACTED]",
            Pii,
        ),
        detector(
            "Date of Birth",
            r"\b(?:0[1-9]|1[0-2])[-/](?:0[1-9]|[12][0-9]|3[01])[-/](?:19|20)\d{2}\b",
            "[DOB_HIDDEN]",
            Pii,
        ),
        detector(
            "Medical Record",
            r"(?i)\b(?:MRN|medical record)[\s:#]*[A-Z0-9]{6,12}\b",
            "[MRN_REDACTED]",
            Phi,
        ),
        // Financial (PCI)
        detector(
            "Credit Card",
            r"\b(?:\d{4}[-\s]?){3}\d{4}\b",
            "[CARD_REDACTED]",
            Pci,
        ),
        detector(
            "CVV",
            r"(?i)\b(?:CVV|CVC)[\s:#]*\d{3,4}\b",
            "[CVV_HIDDEN]",
            Pci,
        ),
        detector(
            "IBAN",
            r"\b[A-Z]{2}\d{2}[A-Z0-9]{1,30}\b",
            "[IBAN_REDACTED]",
            Pci,
        ),
        detector(
            "SWIFT",
            r"\b[A-Z]{6}[A-Z0-9]{2}(?:[A-Z0-9]{3})?\b",
            "[SWIFT_REDACTED]",
            Pci,
        ),
        detector(
            "Bank Account",
            r"(?i)\b(?:account|acct)[\s:#]*\d{8,17}\b",
            "[ACCOUNT_REDACTED]",
            Pci,
        ),
        detector(
            "Salary",
            r"(?i)\$\s?\d{1,3}(?:,\d{3})*(?:\.\d{2})?(?:\s?(?:per year|annually|salary|compensation))?",
            "[SALARY_REDACTED]",
            Pci,
        ),
        // Technical secrets
        detector(
            "API Key (sk-)",
            r"\bsk-[A-Za-z0-9]{32,}\b",
            "[API_KEY_REDACTED]",
            Secret,
        ),
        detector("AWS Key", r"\bAKIA[0-9A-Z]{16}\b", "[AWS_KEY_REDACTED]", Secret),
        detector(
            "JWT Token",
            r"\beyJ[A-Za-z0-9_-]*\.eyJ[A-Za-z0-9_-]*\.[A-Za-z0-9_-]+\b",
            "[JWT_REDACTED]",
            Secret,
        ),
        detector(
            "Bearer Token",
            r"(?i)\bBearer\s+[A-Za-z0-9_-]{20,}\b",
            "[BEARER_TOKEN_REDACTED]",
            Secret,
        ),
        detector(
            "SSH Private Key",
            r"(?s)-----BEGIN (?:RSA |OPENSSH )?PRIVATE KEY-----.+?-----END (?:RSA |OPENSSH )?PRIVATE KEY-----",
            "[SSH_KEY_REDACTED]",
            Secret,
        ),
        detector(
            "Internal IP",
            r"\b(?:10\.|192\.168\.|172\.(?:1[6-9]|2[0-9]|3[01])\.)\d{1,3}\.\d{1,3}\b",
            "[INTERNAL_IP]",
            Secret,
        ),
        detector(
            "Database Connection",
            r"(?i)\b(?:mongodb|postgresql|mysql|postgres)://\S+",
            "[DB_CONNECTION_REDACTED]",
            Secret,
        ),
        // Corporate secrets
        detector(
            "Project Codename",
            r"(?i)\b(?:Project|Codename|Code name)\s+[A-Z][A-Za-z0-9]+\b",
            "[PROJECT_REDACTED]",
            Corporate,
        ),
        detector(
            "Confidential",
            r"(?i)\b(?:Confidential|Proprietary|Internal Only)\b",
            "[CONFIDENTIAL]",
            Corporate,
        ),
    ]
}
