use crate::error::{Error, Result};
use crate::object::{Commit, EntryKind, ObjectId, Signature, Tree};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};

/// Lazy backward walk over commit ids, descendants before ancestors.
pub type RevWalk<'a> = Box<dyn Iterator<Item = Result<ObjectId>> + 'a>;

/// Read-only view of a version-control repository. This crate only ever
/// consumes it; the backing store belongs to the host.
pub trait Repository {
    fn head(&self) -> Result<ObjectId>;

    fn commit(&self, id: &ObjectId) -> Result<Commit>;

    fn tree(&self, id: &ObjectId) -> Result<Tree>;

    fn blob(&self, id: &ObjectId) -> Result<Vec<u8>>;

    /// Walk the graph backward from `start` in a topological order
    /// consistent with ancestry: every commit is yielded before any of its
    /// ancestors, starting with `start` itself.
    fn rev_walk(&self, start: &ObjectId) -> Result<RevWalk<'_>>;

    /// Resolve a slash-separated path to the blob stored there, or `None`
    /// if any component is missing or the path lands on a subtree.
    fn resolve_path(&self, tree: &Tree, path: &str) -> Result<Option<ObjectId>> {
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        let mut current = tree.clone();
        while let Some(component) = components.next() {
            let (kind, id) = match current.get(component) {
                Some(entry) => (entry.kind, entry.id),
                None => return Ok(None),
            };
            match (kind, components.peek().is_some()) {
                (EntryKind::Blob, false) => return Ok(Some(id)),
                (EntryKind::Tree, true) => current = self.tree(&id)?,
                _ => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Direct blob entries of the directory at `dir_path`, name order.
    /// Subtrees below it are not descended into.
    fn list_dir(&self, tree: &Tree, dir_path: &str) -> Result<Vec<(String, ObjectId)>> {
        let mut current = tree.clone();
        for component in dir_path.split('/').filter(|c| !c.is_empty()) {
            let subtree = match current.get(component) {
                Some(entry) if entry.kind == EntryKind::Tree => self.tree(&entry.id)?,
                _ => {
                    return Err(Error::Backend(format!(
                        "directory '{}' not present in snapshot",
                        dir_path
                    )))
                }
            };
            current = subtree;
        }
        Ok(current
            .iter()
            .filter(|entry| entry.kind == EntryKind::Blob)
            .map(|entry| (entry.name.clone(), entry.id))
            .collect())
    }

    /// Depth-first search for a blob with the given id anywhere below
    /// `tree`, returning its slash-separated path.
    fn find_blob_path(&self, tree: &Tree, target: &ObjectId) -> Result<Option<String>> {
        for entry in tree.iter() {
            match entry.kind {
                EntryKind::Blob => {
                    if entry.id == *target {
                        return Ok(Some(entry.name.clone()));
                    }
                }
                EntryKind::Tree => {
                    let subtree = self.tree(&entry.id)?;
                    if let Some(rest) = self.find_blob_path(&subtree, target)? {
                        return Ok(Some(format!("{}/{}", entry.name, rest)));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// In-process reference implementation. Tests and embedding hosts use the
/// write surface to construct history; everything this crate consumes goes
/// through the `Repository` trait.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    blobs: HashMap<ObjectId, Vec<u8>>,
    trees: HashMap<ObjectId, Tree>,
    commits: HashMap<ObjectId, Commit>,
    head: Option<ObjectId>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_blob(&mut self, data: Vec<u8>) -> ObjectId {
        let id = ObjectId::from_data(&data);
        self.blobs.insert(id, data);
        id
    }

    pub fn put_tree(&mut self, tree: Tree) -> ObjectId {
        let id = tree.id();
        self.trees.insert(id, tree);
        id
    }

    /// Record a commit over `tree` and advance head to it.
    pub fn commit_tree(
        &mut self,
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> ObjectId {
        let commit = Commit::new(tree, parents, author, message, timestamp);
        let id = commit.id();
        self.commits.insert(id, commit);
        self.head = Some(id);
        id
    }

    pub fn set_head(&mut self, id: ObjectId) {
        self.head = Some(id);
    }
}

impl Repository for MemoryRepository {
    fn head(&self) -> Result<ObjectId> {
        self.head
            .ok_or_else(|| Error::Backend("repository has no head".to_string()))
    }

    fn commit(&self, id: &ObjectId) -> Result<Commit> {
        self.commits
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("commit {} missing", id)))
    }

    fn tree(&self, id: &ObjectId) -> Result<Tree> {
        self.trees
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("tree {} missing", id)))
    }

    fn blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.blobs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("blob {} missing", id)))
    }

    fn rev_walk(&self, start: &ObjectId) -> Result<RevWalk<'_>> {
        // Reachability scan, counting how many reachable children each
        // commit has.
        let mut children: HashMap<ObjectId, usize> = HashMap::new();
        let mut reachable: HashSet<ObjectId> = HashSet::new();
        let mut pending = vec![*start];
        while let Some(id) = pending.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let commit = self.commit(&id)?;
            for parent in &commit.parents {
                *children.entry(*parent).or_insert(0) += 1;
                pending.push(*parent);
            }
        }

        // Kahn's algorithm from the start commit: a commit becomes ready
        // once every reachable child has been yielded.
        let mut order = Vec::with_capacity(reachable.len());
        let mut ready = VecDeque::from([*start]);
        while let Some(id) = ready.pop_front() {
            order.push(id);
            let commit = self.commit(&id)?;
            for parent in &commit.parents {
                if let Some(count) = children.get_mut(parent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(*parent);
                    }
                }
            }
        }

        Ok(Box::new(order.into_iter().map(Ok)))
    }
}
