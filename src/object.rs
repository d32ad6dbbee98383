use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Content hash identifying any stored object (blob, tree, or commit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_data(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(hash.into())
    }

    /// Fixed-width (64 character) lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Author identity attached to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Blob,
    Tree,
}

/// Directory tree entry pointing at a blob or a nested tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub id: ObjectId,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, id: ObjectId, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            id,
            kind,
        }
    }
}

/// Snapshot of one directory level. Entries stay sorted so hashing is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, entry: TreeEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<TreeEntry> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.values()
    }

    pub fn id(&self) -> ObjectId {
        ObjectId::from_data(&serde_json::to_vec(self).unwrap_or_default())
    }
}

/// Immutable node in the history graph. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Commit {
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tree,
            parents,
            author,
            message: message.into(),
            timestamp,
        }
    }

    pub fn id(&self) -> ObjectId {
        ObjectId::from_data(&serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn is_initial(&self) -> bool {
        self.parents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_object_id_roundtrip() {
        let bytes = [42u8; 32];
        let id = ObjectId::new(bytes);
        let hex = id.to_hex();
        let id2 = ObjectId::from_hex(&hex).unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    fn test_object_id_rejects_short_hex() {
        assert!(ObjectId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_blob_hash_width() {
        let id = ObjectId::from_data(b"hello world");
        assert_eq!(id.to_hex().len(), 64);
    }

    #[test]
    fn test_tree_insert_remove() {
        let mut tree = Tree::new();
        let entry = TreeEntry::new("test.json", ObjectId::new([0u8; 32]), EntryKind::Blob);
        tree.insert(entry);
        assert!(tree.get("test.json").is_some());
        tree.remove("test.json");
        assert!(tree.get("test.json").is_none());
    }

    #[test]
    fn test_tree_id_is_order_independent() {
        let a = ObjectId::from_data(b"a");
        let b = ObjectId::from_data(b"b");

        let mut first = Tree::new();
        first.insert(TreeEntry::new("a.json", a, EntryKind::Blob));
        first.insert(TreeEntry::new("b.json", b, EntryKind::Blob));

        let mut second = Tree::new();
        second.insert(TreeEntry::new("b.json", b, EntryKind::Blob));
        second.insert(TreeEntry::new("a.json", a, EntryKind::Blob));

        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn test_commit_id_depends_on_parents() {
        let author = Signature::new("Transaction Fetcher", "fetcher@example.org");
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let tree = ObjectId::new([1u8; 32]);

        let root = Commit::new(tree, vec![], author.clone(), "Fetched transactions", when);
        let child = Commit::new(
            tree,
            vec![root.id()],
            author,
            "Fetched transactions",
            when,
        );

        assert!(root.is_initial());
        assert!(!child.is_initial());
        assert_ne!(root.id(), child.id());
    }
}
