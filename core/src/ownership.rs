//! File-pattern overlap decisions and conflict reports.
//!
//! Matching is deliberately conservative: a pattern is reduced to the
//! directory-style prefix before its first `*`, and two patterns overlap
//! whenever one normalized prefix is a prefix of the other. That catches
//! real collisions (two workers editing `src/db/**`) without a full glob
//! engine; false positives surface as warnings, never as hard failures.

use crate::models::{OwnershipType, PatternClaim};

/// The portion of a pattern before its first `*`. An empty prefix
/// matches everything.
pub fn normalized_prefix(pattern: &str) -> &str {
    match pattern.find('*') {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}

/// Whether two patterns can cover the same files. Symmetric, reflexive.
pub fn patterns_overlap(a: &str, b: &str) -> bool {
    let na = normalized_prefix(a);
    let nb = normalized_prefix(b);
    na.starts_with(nb) || nb.starts_with(na)
}

/// Whether a concrete file path falls under a pattern: the path begins
/// with the normalized prefix, or equals the pattern exactly.
pub fn file_matches(file: &str, pattern: &str) -> bool {
    file == pattern || file.starts_with(normalized_prefix(pattern))
}

/// Another task's declared patterns, labelled for human-readable reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPatterns {
    pub task_id: String,
    /// Display label used in warnings, e.g. `task 2 'Auth'`
    pub label: String,
    pub patterns: Vec<PatternClaim>,
}

/// A pattern-level collision between two tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternConflict {
    pub task_id: String,
    pub label: String,
    pub pattern: String,
    pub ownership: OwnershipType,
}

/// Find every pattern of `others` that overlaps one of `mine` where at
/// least one side is exclusive. Two shared patterns never conflict.
pub fn find_pattern_conflicts(
    mine: &[PatternClaim],
    others: &[TaskPatterns],
) -> Vec<PatternConflict> {
    let mut conflicts = Vec::new();
    for other in others {
        for theirs in &other.patterns {
            let collides = mine.iter().any(|m| {
                patterns_overlap(&m.pattern, &theirs.pattern)
                    && (m.ownership == OwnershipType::Exclusive
                        || theirs.ownership == OwnershipType::Exclusive)
            });
            if collides {
                conflicts.push(PatternConflict {
                    task_id: other.task_id.clone(),
                    label: other.label.clone(),
                    pattern: theirs.pattern.clone(),
                    ownership: theirs.ownership,
                });
            }
        }
    }
    conflicts
}

/// One warning per (changed file, other task) where an *exclusive*
/// pattern of the other task matches the file.
pub fn check_file_conflicts(changed_files: &[String], others: &[TaskPatterns]) -> Vec<String> {
    let mut warnings = Vec::new();
    for file in changed_files {
        for other in others {
            if let Some(claim) = other
                .patterns
                .iter()
                .find(|c| c.ownership == OwnershipType::Exclusive && file_matches(file, &c.pattern))
            {
                warnings.push(format!(
                    "File '{}' matches exclusive pattern '{}' owned by {}",
                    file, claim.pattern, other.label
                ));
            }
        }
    }
    warnings
}
