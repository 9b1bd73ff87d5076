//! Result aggregation and the final report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::model::ExtractionResult;

/// Deduplicated users, emails and hosts across every stored result.
///
/// Duplicate detection is exact, case-sensitive string equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestReport {
    pub users: BTreeSet<String>,
    pub emails: BTreeSet<String>,
    pub hosts: BTreeSet<String>,
}

impl HarvestReport {
    /// Folds `items` into the report. Order-independent and idempotent.
    pub fn aggregate<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a ExtractionResult>,
    {
        let mut report = Self::default();
        for item in items {
            report.absorb(item);
        }
        report
    }

    pub fn absorb(&mut self, item: &ExtractionResult) {
        self.users.extend(item.users.iter().cloned());
        self.emails.extend(item.emails.iter().cloned());
        self.hosts.extend(item.hosts.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.emails.is_empty() && self.hosts.is_empty()
    }
}

fn write_section(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    empty_label: &str,
    values: &BTreeSet<String>,
) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "--- {title} {}", "-".repeat(28usize.saturating_sub(title.len())))?;
    if values.is_empty() {
        writeln!(f, "[!] Warning: No {empty_label} found")?;
    } else {
        for value in values {
            writeln!(f, "  * {value}")?;
        }
    }
    Ok(())
}

impl fmt::Display for HarvestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, "USERS", "users", &self.users)?;
        write_section(f, "EMAILS", "emails", &self.emails)?;
        write_section(f, "HOSTS", "hosts", &self.hosts)?;
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(users: &[&str], emails: &[&str], hosts: &[&str]) -> ExtractionResult {
        ExtractionResult {
            users: users.iter().map(|s| s.to_string()).collect(),
            emails: emails.iter().map(|s| s.to_string()).collect(),
            hosts: hosts.iter().map(|s| s.to_string()).collect(),
            misc: vec![],
        }
    }

    #[test]
    fn test_aggregate_deduplicates() {
        let items = vec![
            item(&["alice", "alice"], &["a@example.com"], &["srv1"]),
            item(&["alice", "Alice"], &["a@example.com"], &["srv1", "srv2"]),
        ];
        let report = HarvestReport::aggregate(&items);

        assert_eq!(report.users.len(), 2);
        assert_eq!(report.emails.len(), 1);
        assert_eq!(report.hosts.len(), 2);
    }

    #[test]
    fn test_aggregate_is_order_independent_and_idempotent() {
        let items = vec![
            item(&["a"], &["x@example.com"], &[]),
            item(&["b"], &[], &["h"]),
        ];
        let forward = HarvestReport::aggregate(&items);
        let backward = HarvestReport::aggregate(items.iter().rev());
        assert_eq!(forward, backward);

        let mut twice = forward.clone();
        for i in &items {
            twice.absorb(i);
        }
        assert_eq!(twice, forward);
    }

    #[test]
    fn test_empty_sections_render_warnings() {
        let rendered = HarvestReport::default().to_string();
        assert!(rendered.contains("--- USERS"));
        assert!(rendered.contains("No users found"));
        assert!(rendered.contains("No emails found"));
        assert!(rendered.contains("No hosts found"));
    }

    #[test]
    fn test_sections_list_values() {
        let report = HarvestReport::aggregate(&[item(&[], &["jane@example.com"], &["srv1"])]);
        let rendered = report.to_string();
        assert!(rendered.contains("  * jane@example.com"));
        assert!(rendered.contains("  * srv1"));
        assert!(rendered.contains("No users found"));
    }
}
