use std::fmt;

use serde::{Deserialize, Serialize};

/// A rate-limited operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    ScrapingJob,
    BulkAssignment,
    Other(String),
}

impl OperationType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            OperationType::ScrapingJob => "scraping_job",
            OperationType::BulkAssignment => "bulk_assignment",
            OperationType::Other(name) => name,
        }
    }

    /// Parses a wire name; unknown names become [`OperationType::Other`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "scraping_job" => OperationType::ScrapingJob,
            "bulk_assignment" => OperationType::BulkAssignment,
            other => OperationType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_parse_to_dedicated_variants() {
        assert_eq!(
            OperationType::from_name("scraping_job"),
            OperationType::ScrapingJob
        );
        assert_eq!(
            OperationType::from_name("bulk_assignment"),
            OperationType::BulkAssignment
        );
        assert_eq!(
            OperationType::from_name("export_csv"),
            OperationType::Other("export_csv".to_string())
        );
    }
}
