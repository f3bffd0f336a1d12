//! Reverse-diff synthesis for rollback.
//!
//! Walking the changelog entries in `(target, current]`, adds become deletes
//! and deletes become adds. Updates are not inverted: pre-images are not
//! stored, so rollback restores add/delete only and flags the updates it
//! skipped in the diff reason.

use crate::changelog::ChangelogEntry;
use crate::diff::Diff;
use crate::error::{KgError, Result};
use chrono::Utc;

/// Synthesize the reverse diff that undoes every entry after
/// `target_version`, given the entries in `(target_version, current]` in
/// ascending version order.
///
/// Returns an error when the target is not strictly before the current
/// version (rollback to the current or a future version is meaningless).
pub fn reverse_diff_for_rollback(
    entries: &[ChangelogEntry],
    target_version: i64,
    current_version: i64,
) -> Result<Diff> {
    if target_version < 0 || target_version >= current_version {
        return Err(KgError::RollbackTarget {
            target: target_version,
            current: current_version,
        });
    }

    let mut reverse = Diff::empty();
    let mut skipped_updates = 0usize;

    for entry in entries {
        if entry.version <= target_version || entry.version > current_version {
            continue;
        }
        let diff = &entry.diff;

        reverse.nodes.delete.extend(diff.nodes.add.iter().cloned());
        reverse.nodes.add.extend(diff.nodes.delete.iter().cloned());
        reverse.edges.delete.extend(diff.edges.add.iter().cloned());
        reverse.edges.add.extend(diff.edges.delete.iter().cloned());
        skipped_updates += diff.nodes.update.len() + diff.edges.update.len();
    }

    reverse.metadata.created_at = Utc::now();
    reverse.metadata.source = Some("rollback".to_string());
    let mut reason = format!(
        "Rollback from version {} to {}",
        current_version, target_version
    );
    if skipped_updates > 0 {
        reason.push_str(&format!(
            " ({} update(s) not inverted: no pre-image stored)",
            skipped_updates
        ));
    }
    reverse.metadata.reason = Some(reason);

    Ok(reverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{Edge, Node};

    fn entry(version: i64, add_ids: &[&str], delete_ids: &[&str]) -> ChangelogEntry {
        let mut diff = Diff::empty();
        for id in add_ids {
            diff.nodes.add.push(Node::new(*id, "Concept"));
        }
        for id in delete_ids {
            diff.nodes.delete.push(Node::new(*id, "Concept"));
        }
        ChangelogEntry::new(version, format!("d{}", version), diff)
    }

    #[test]
    fn test_reverse_inverts_add_and_delete() {
        let entries = vec![
            entry(8, &["C:n8"], &[]),
            entry(9, &["C:n9a", "C:n9b"], &["C:old"]),
        ];
        let reverse = reverse_diff_for_rollback(&entries, 7, 9).unwrap();

        let deleted: Vec<_> = reverse.nodes.delete.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(deleted, vec!["C:n8", "C:n9a", "C:n9b"]);
        let added: Vec<_> = reverse.nodes.add.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(added, vec!["C:old"]);
        assert_eq!(reverse.metadata.source.as_deref(), Some("rollback"));
    }

    #[test]
    fn test_entries_outside_range_ignored() {
        let entries = vec![entry(5, &["C:n5"], &[]), entry(8, &["C:n8"], &[])];
        let reverse = reverse_diff_for_rollback(&entries, 7, 9).unwrap();
        let deleted: Vec<_> = reverse.nodes.delete.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(deleted, vec!["C:n8"]);
    }

    #[test]
    fn test_rollback_to_current_or_future_errors() {
        let entries = vec![entry(1, &["C:n1"], &[])];
        assert!(reverse_diff_for_rollback(&entries, 1, 1).is_err());
        assert!(reverse_diff_for_rollback(&entries, 2, 1).is_err());
        assert!(reverse_diff_for_rollback(&entries, -1, 1).is_err());
    }

    #[test]
    fn test_updates_noted_in_reason() {
        let mut diff = Diff::empty();
        diff.nodes.update.push(Node::new("C:u", "Concept"));
        diff.edges.update.push(Edge::new("C:a", "C:b", "RELATED_TO"));
        let entries = vec![ChangelogEntry::new(2, "d2", diff)];

        let reverse = reverse_diff_for_rollback(&entries, 1, 2).unwrap();
        assert!(reverse.nodes.update.is_empty());
        assert!(reverse
            .metadata
            .reason
            .as_deref()
            .unwrap()
            .contains("2 update(s) not inverted"));
    }
}
