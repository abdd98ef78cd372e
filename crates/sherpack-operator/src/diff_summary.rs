//! Human-readable rendering of a drift diff, for the `DriftDetected` event
//! body (spec §6) and for per-change logging when drift-detection is
//! disabled (spec §4.4's `Drifted` row).

use crate::state::{DiffChangeType, DiffEntry};

/// Renders a diff as a body suitable for an event message or log line.
pub trait DiffSummarizer: Send + Sync {
    fn summarize(&self, diff: &[DiffEntry]) -> String;
}

/// Compact, bullet-list rendering: one line per changed resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulletDiffSummarizer;

impl DiffSummarizer for BulletDiffSummarizer {
    fn summarize(&self, diff: &[DiffEntry]) -> String {
        diff.iter()
            .map(|entry| format!("  {} {}", symbol(entry.change), entry.path))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn symbol(change: DiffChangeType) -> &'static str {
    match change {
        DiffChangeType::Create => "+",
        DiffChangeType::Update => "~",
        DiffChangeType::Delete => "-",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_renders_one_line_per_entry() {
        let diff = vec![
            DiffEntry {
                change: DiffChangeType::Create,
                path: "v1/ConfigMap/default/cfg".to_string(),
            },
            DiffEntry {
                change: DiffChangeType::Delete,
                path: "v1/Secret/default/creds".to_string(),
            },
        ];
        let summary = BulletDiffSummarizer.summarize(&diff);
        assert_eq!(summary, "  + v1/ConfigMap/default/cfg\n  - v1/Secret/default/creds");
    }
}
