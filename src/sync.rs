use crate::error::Result;
use crate::index::{IndexBatch, IndexStore, Record};
use crate::object::ObjectId;
use crate::payload::TimestampSource;
use crate::repo::Repository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Result of one synchronization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub head: ObjectId,
    /// False when the head had not moved and nothing was written.
    pub refreshed: bool,
    pub appended: usize,
    pub removed: usize,
}

/// Reconcile the persisted index against the direct file entries of
/// `dir_path` at the repository head.
///
/// A head matching the persisted sync state short-circuits with no writes.
/// Otherwise the record set is diffed against the directory snapshot:
/// records whose blob vanished are removed, newly appeared blobs get fresh
/// uids (ascending, in sort-key order) and everything is applied as one
/// atomic batch together with the new sync state. If the head advances
/// while reconciling, the computed batch is discarded and reconciliation
/// starts over against the new head.
pub fn synchronize<R, I>(
    repo: &R,
    index: &mut I,
    dir_path: &str,
    timestamps: &dyn TimestampSource,
) -> Result<SyncOutcome>
where
    R: Repository + ?Sized,
    I: IndexStore + ?Sized,
{
    loop {
        let head = repo.head()?;
        let state = index.sync_state()?;
        if state.head == Some(head) {
            return Ok(SyncOutcome {
                head,
                refreshed: false,
                appended: 0,
                removed: 0,
            });
        }

        let batch = reconcile(repo, index, dir_path, timestamps, head, state.next_uid)?;

        // Everything above was computed against one fixed head. If it
        // moved meanwhile, a commit now would mix two snapshots.
        if repo.head()? != head {
            debug!(stale_head = %head, "head advanced during reconciliation, retrying");
            continue;
        }

        let appended = batch.appends.len();
        let removed = batch.removals.len();
        index.apply(&batch)?;
        info!(head = %head, appended, removed, "index synchronized");
        return Ok(SyncOutcome {
            head,
            refreshed: true,
            appended,
            removed,
        });
    }
}

fn reconcile<R, I>(
    repo: &R,
    index: &I,
    dir_path: &str,
    timestamps: &dyn TimestampSource,
    head: ObjectId,
    next_uid: u32,
) -> Result<IndexBatch>
where
    R: Repository + ?Sized,
    I: IndexStore + ?Sized,
{
    let commit = repo.commit(&head)?;
    let tree = repo.tree(&commit.tree)?;

    // Keyed by content id: two names sharing identical bytes contribute a
    // single element.
    let mut incoming: BTreeSet<ObjectId> = repo
        .list_dir(&tree, dir_path)?
        .into_iter()
        .map(|(_, id)| id)
        .collect();

    let mut removals = Vec::new();
    for record in index.records()? {
        if !incoming.remove(&record.blob) {
            removals.push(record.uid);
        }
    }

    // What's left is the newly appeared content. Fetching a sort key makes
    // sync a little slower; all it does is cause uids to be assigned more
    // or less in transaction-time order.
    let mut fresh: Vec<(Option<DateTime<Utc>>, ObjectId)> = Vec::with_capacity(incoming.len());
    for id in incoming {
        let stamp = repo
            .blob(&id)
            .ok()
            .and_then(|payload| timestamps.timestamp(&payload));
        if stamp.is_none() {
            debug!(blob = %id, "no sort key in payload");
        }
        fresh.push((stamp, id));
    }
    fresh.sort();

    let mut next_uid = next_uid;
    let mut appends = Vec::with_capacity(fresh.len());
    for (_, blob) in fresh {
        appends.push(Record {
            uid: next_uid,
            blob,
        });
        next_uid += 1;
    }

    Ok(IndexBatch {
        removals,
        appends,
        next_uid,
        head,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SqliteIndex;
    use crate::object::{EntryKind, Tree, TreeEntry};
    use crate::payload::{JsonTimestamp, NoTimestamp};
    use crate::repo::testutil::{author, flat_tree, when};
    use crate::repo::MemoryRepository;

    const DIR: &str = "ledger";

    fn tree_with(repo: &mut MemoryRepository, entries: &[(&str, ObjectId)]) -> ObjectId {
        let inner = repo.put_tree(flat_tree(entries));
        let mut root = Tree::new();
        root.insert(TreeEntry::new(DIR, inner, EntryKind::Tree));
        repo.put_tree(root)
    }

    fn payload(repo: &mut MemoryRepository, day: u32) -> ObjectId {
        repo.put_blob(
            format!(
                "{{\"transactionTime\": \"2024-03-{:02}T09:00:00Z\", \"amount\": {}}}\n",
                day, day
            )
            .into_bytes(),
        )
    }

    #[test]
    fn test_first_sync_orders_by_timestamp() {
        let mut repo = MemoryRepository::new();
        let newest = payload(&mut repo, 20);
        let middle = payload(&mut repo, 10);
        let oldest = payload(&mut repo, 2);
        // Names deliberately disagree with transaction-time order.
        let tree = tree_with(
            &mut repo,
            &[("a.json", newest), ("b.json", middle), ("c.json", oldest)],
        );
        repo.commit_tree(tree, vec![], author(), "import", when(21));

        let mut index = SqliteIndex::in_memory().unwrap();
        let outcome =
            synchronize(&repo, &mut index, DIR, &JsonTimestamp::default()).unwrap();

        assert!(outcome.refreshed);
        assert_eq!(outcome.appended, 3);
        assert_eq!(outcome.removed, 0);
        assert_eq!(
            index.records().unwrap(),
            vec![
                Record { uid: 1, blob: oldest },
                Record { uid: 2, blob: middle },
                Record { uid: 3, blob: newest },
            ]
        );
        assert_eq!(index.sync_state().unwrap().head, Some(repo.head().unwrap()));
    }

    #[test]
    fn test_second_sync_is_a_no_op() {
        let mut repo = MemoryRepository::new();
        let blob = payload(&mut repo, 2);
        let tree = tree_with(&mut repo, &[("a.json", blob)]);
        repo.commit_tree(tree, vec![], author(), "import", when(3));

        let mut index = SqliteIndex::in_memory().unwrap();
        let first = synchronize(&repo, &mut index, DIR, &NoTimestamp).unwrap();
        assert!(first.refreshed);

        let second = synchronize(&repo, &mut index, DIR, &NoTimestamp).unwrap();
        assert_eq!(
            second,
            SyncOutcome {
                head: repo.head().unwrap(),
                refreshed: false,
                appended: 0,
                removed: 0,
            }
        );
        assert_eq!(index.records().unwrap().len(), 1);
    }

    #[test]
    fn test_set_difference_keeps_existing_records() {
        let mut repo = MemoryRepository::new();
        let kept_a = payload(&mut repo, 1);
        let kept_b = payload(&mut repo, 2);
        let tree = tree_with(&mut repo, &[("a.json", kept_a), ("b.json", kept_b)]);
        let c1 = repo.commit_tree(tree, vec![], author(), "import", when(3));

        let mut index = SqliteIndex::in_memory().unwrap();
        synchronize(&repo, &mut index, DIR, &JsonTimestamp::default()).unwrap();
        let before = index.records().unwrap();
        assert_eq!(before.len(), 2);

        // Two more files land in a later commit.
        let new_a = payload(&mut repo, 4);
        let new_b = payload(&mut repo, 5);
        let tree2 = tree_with(
            &mut repo,
            &[
                ("a.json", kept_a),
                ("b.json", kept_b),
                ("d.json", new_a),
                ("e.json", new_b),
            ],
        );
        repo.commit_tree(tree2, vec![c1], author(), "import", when(6));

        let outcome =
            synchronize(&repo, &mut index, DIR, &JsonTimestamp::default()).unwrap();
        assert_eq!(outcome.appended, 2);
        assert_eq!(outcome.removed, 0);

        let after = index.records().unwrap();
        assert_eq!(after.len(), 4);
        // Existing records untouched, new uids strictly above the old max.
        assert_eq!(&after[..2], &before[..]);
        let prior_max = before.iter().map(|r| r.uid).max().unwrap();
        assert!(after[2..].iter().all(|r| r.uid > prior_max));
        assert_eq!(after[2].blob, new_a);
        assert_eq!(after[3].blob, new_b);
    }

    #[test]
    fn test_vanished_content_is_expunged() {
        let mut repo = MemoryRepository::new();
        let gone = payload(&mut repo, 1);
        let kept = payload(&mut repo, 2);
        let tree = tree_with(&mut repo, &[("a.json", gone), ("b.json", kept)]);
        let c1 = repo.commit_tree(tree, vec![], author(), "import", when(3));

        let mut index = SqliteIndex::in_memory().unwrap();
        synchronize(&repo, &mut index, DIR, &JsonTimestamp::default()).unwrap();

        let tree2 = tree_with(&mut repo, &[("b.json", kept)]);
        repo.commit_tree(tree2, vec![c1], author(), "prune", when(4));

        let outcome =
            synchronize(&repo, &mut index, DIR, &JsonTimestamp::default()).unwrap();
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.appended, 0);

        let records = index.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].blob, kept);
        // The freed uid is never handed out again.
        assert_eq!(index.sync_state().unwrap().next_uid, 3);
    }

    #[test]
    fn test_identical_content_under_two_names_indexes_once() {
        let mut repo = MemoryRepository::new();
        let shared = payload(&mut repo, 1);
        let tree = tree_with(&mut repo, &[("a.json", shared), ("copy.json", shared)]);
        repo.commit_tree(tree, vec![], author(), "import", when(2));

        let mut index = SqliteIndex::in_memory().unwrap();
        let outcome = synchronize(&repo, &mut index, DIR, &NoTimestamp).unwrap();
        assert_eq!(outcome.appended, 1);
        assert_eq!(
            index.records().unwrap(),
            vec![Record { uid: 1, blob: shared }]
        );
    }

    #[test]
    fn test_missing_sort_key_sorts_first() {
        let mut repo = MemoryRepository::new();
        let dated = payload(&mut repo, 5);
        let undated = repo.put_blob(b"opaque bytes\n".to_vec());
        let tree = tree_with(&mut repo, &[("a.json", dated), ("b.bin", undated)]);
        repo.commit_tree(tree, vec![], author(), "import", when(6));

        let mut index = SqliteIndex::in_memory().unwrap();
        synchronize(&repo, &mut index, DIR, &JsonTimestamp::default()).unwrap();

        let records = index.records().unwrap();
        assert_eq!(records[0].blob, undated);
        assert_eq!(records[1].blob, dated);
    }

    #[test]
    fn test_head_move_only_still_updates_state() {
        let mut repo = MemoryRepository::new();
        let blob = payload(&mut repo, 1);
        let tree = tree_with(&mut repo, &[("a.json", blob)]);
        let c1 = repo.commit_tree(tree, vec![], author(), "import", when(2));

        let mut index = SqliteIndex::in_memory().unwrap();
        synchronize(&repo, &mut index, DIR, &NoTimestamp).unwrap();

        // A commit that does not touch the directory still advances the
        // recorded head so the next call can short-circuit.
        let c2 = repo.commit_tree(tree, vec![c1], author(), "noop", when(3));
        let outcome = synchronize(&repo, &mut index, DIR, &NoTimestamp).unwrap();
        assert!(outcome.refreshed);
        assert_eq!(outcome.appended, 0);
        assert_eq!(outcome.removed, 0);
        assert_eq!(index.sync_state().unwrap().head, Some(c2));
    }
}
