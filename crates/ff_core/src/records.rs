//! Record domains: closed enums with their fixed alias tables.
//!
//! Alias mapping is the only "interpretation" the engine ever performs on raw
//! values; anything outside the tables is a canonical violation upstream.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Canonical record kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Invoice,
    Payment,
    CreditNote,
    JournalLine,
}

impl RecordType {
    /// Fixed alias table; lowercased/trimmed input only.
    pub fn from_alias(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "invoice" | "inv" => Some(Self::Invoice),
            "payment" | "pay" => Some(Self::Payment),
            "credit_note" | "credit" | "cn" => Some(Self::CreditNote),
            "journal_line" | "journal" | "jl" => Some(Self::JournalLine),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Payment => "payment",
            Self::CreditNote => "credit_note",
            Self::JournalLine => "journal_line",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accounting direction, normalized from a fixed alias table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn from_alias(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debit" | "dr" | "d" => Some(Self::Debit),
            "credit" | "cr" | "c" => Some(Self::Credit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_aliases() {
        assert_eq!(RecordType::from_alias(" INV "), Some(RecordType::Invoice));
        assert_eq!(RecordType::from_alias("cn"), Some(RecordType::CreditNote));
        assert_eq!(RecordType::from_alias("jl"), Some(RecordType::JournalLine));
        assert_eq!(RecordType::from_alias("receipt"), None);
    }

    #[test]
    fn direction_aliases() {
        assert_eq!(Direction::from_alias("DR"), Some(Direction::Debit));
        assert_eq!(Direction::from_alias("c"), Some(Direction::Credit));
        assert_eq!(Direction::from_alias("both"), None);
    }

    #[test]
    fn serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&RecordType::CreditNote).unwrap(),
            "\"credit_note\""
        );
        assert_eq!(serde_json::to_string(&Direction::Debit).unwrap(), "\"debit\"");
    }
}
