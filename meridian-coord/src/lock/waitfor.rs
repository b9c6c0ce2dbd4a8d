//! Wait-for-graph cycle detection.
//!
//! Edges run from a holder to the holders of the locks it is waiting on.
//! The check runs under the manager mutex so the graph is consistent for
//! the duration of the search.

// Layer 1: Standard library imports
use std::collections::HashSet;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::manager::LockTables;

/// Whether `requester` blocking on `lock` would close a cycle.
///
/// Depth-first walk starting from the current holder of `lock`, following
/// each holder's awaited lock to that lock's holder. Any path back to
/// `requester` is a would-be deadlock, including the degenerate case of a
/// holder re-acquiring its own (non-reentrant) lock. The visited set keeps
/// the walk linear in the number of holders.
pub(crate) fn would_deadlock(tables: &LockTables, requester: &str, lock: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();

    if let Some(entry) = tables.locks.get(lock) {
        if let Some(holder) = entry.holder.as_deref() {
            stack.push(holder);
        }
    }

    while let Some(holder) = stack.pop() {
        if holder == requester {
            return true;
        }
        if !visited.insert(holder) {
            continue;
        }
        if let Some(awaited) = tables.waits_for.get(holder) {
            if let Some(entry) = tables.locks.get(awaited) {
                if let Some(next_holder) = entry.holder.as_deref() {
                    stack.push(next_holder);
                }
            }
        }
    }

    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::super::manager::{LockEntry, LockTables};
    use super::*;

    fn tables_with(locks: &[(&str, Option<&str>)], waits: &[(&str, &str)]) -> LockTables {
        let mut tables = LockTables::default();
        for (name, holder) in locks {
            let mut entry = LockEntry::new(None);
            entry.holder = holder.map(str::to_string);
            tables.locks.insert((*name).to_string(), entry);
        }
        for (holder, lock) in waits {
            tables
                .waits_for
                .insert((*holder).to_string(), (*lock).to_string());
        }
        tables
    }

    #[test]
    fn test_free_lock_no_deadlock() {
        let tables = tables_with(&[("l1", None)], &[]);
        assert!(!would_deadlock(&tables, "h1", "l1"));
    }

    #[test]
    fn test_two_party_cycle() {
        // h1 holds l1 and waits for l2; h2 holds l2 and asks for l1.
        let tables = tables_with(
            &[("l1", Some("h1")), ("l2", Some("h2"))],
            &[("h1", "l2")],
        );
        assert!(would_deadlock(&tables, "h2", "l1"));
    }

    #[test]
    fn test_no_cycle_without_back_edge() {
        let tables = tables_with(&[("l1", Some("h1")), ("l2", Some("h2"))], &[]);
        assert!(!would_deadlock(&tables, "h2", "l1"));
    }

    #[test]
    fn test_self_reacquire_is_deadlock() {
        let tables = tables_with(&[("l1", Some("h1"))], &[]);
        assert!(would_deadlock(&tables, "h1", "l1"));
    }

    #[test]
    fn test_three_party_cycle() {
        // h1 -> l2(h2), h2 -> l3(h3), h3 asks for l1(h1).
        let tables = tables_with(
            &[("l1", Some("h1")), ("l2", Some("h2")), ("l3", Some("h3"))],
            &[("h1", "l2"), ("h2", "l3")],
        );
        assert!(would_deadlock(&tables, "h3", "l1"));
        // A bystander acquiring l1 is fine.
        assert!(!would_deadlock(&tables, "h9", "l1"));
    }

    #[test]
    fn test_visited_set_terminates_on_foreign_cycle() {
        // Cycle between h2/h3 that does not involve the requester.
        let tables = tables_with(
            &[("l2", Some("h2")), ("l3", Some("h3")), ("l1", Some("h2"))],
            &[("h2", "l3"), ("h3", "l2")],
        );
        assert!(!would_deadlock(&tables, "h1", "l1"));
    }
}
