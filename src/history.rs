use crate::error::{Error, Result};
use crate::object::{Commit, ObjectId};
use crate::repo::Repository;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One coalesced historical state of an item, anchored at the oldest commit
/// sharing that state. `state` is `None` where the path did not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub commit_id: ObjectId,
    pub commit: Commit,
    pub state: Option<ObjectId>,
}

/// Reconstruct the full lifecycle of the content currently at head.
///
/// Locates `target` somewhere in the head snapshot to fix the path, then
/// follows the commit graph backward resolving that path in every reachable
/// commit. Runs of identical state collapse to a single [`Revision`] kept at
/// the oldest commit of the run; a trailing pre-creation run is stripped.
/// The result is ordered newest-first and its first entry's state is always
/// `target` itself.
pub fn walk<R: Repository + ?Sized>(repo: &R, target: &ObjectId) -> Result<Vec<Revision>> {
    let head = repo.head()?;
    let head_commit = repo.commit(&head)?;
    let head_tree = repo.tree(&head_commit.tree)?;
    let path = repo
        .find_blob_path(&head_tree, target)?
        .ok_or(Error::NotFound(*target))?;
    debug!(content = %target, path = %path, "located content at head");

    let states = repo.rev_walk(&head)?.map(|id| -> Result<Revision> {
        let commit_id = id?;
        let commit = repo.commit(&commit_id)?;
        let tree = repo.tree(&commit.tree)?;
        let state = repo.resolve_path(&tree, &path)?;
        Ok(Revision {
            commit_id,
            commit,
            state,
        })
    });
    let revisions = coalesce(states)?;
    debug!(content = %target, revisions = revisions.len(), "coalesced history");
    Ok(revisions)
}

/// The oldest surviving state of the item and the commit that introduced
/// it. A presentation layer uses this commit's timestamp as the item date.
pub fn first_occurrence<R: Repository + ?Sized>(repo: &R, target: &ObjectId) -> Result<Revision> {
    let mut revisions = walk(repo, target)?;
    revisions.pop().ok_or(Error::NoHistory(*target))
}

fn coalesce(states: impl Iterator<Item = Result<Revision>>) -> Result<Vec<Revision>> {
    let mut revisions = Vec::new();
    let mut open: Option<Revision> = None;
    for revision in states {
        let revision = revision?;
        match open.as_mut() {
            // Same state as the run in progress. This commit is older, so
            // it replaces the run's anchor.
            Some(run) if run.state == revision.state => {
                run.commit_id = revision.commit_id;
                run.commit = revision.commit;
            }
            _ => {
                revisions.extend(open.take());
                open = Some(revision);
            }
        }
    }
    // The oldest run saying "did not exist yet" carries no content.
    if let Some(run) = open {
        if run.state.is_some() {
            revisions.push(run);
        }
    }
    Ok(revisions)
}
