//! # repomail
//!
//! Present the history of content tracked in a version-control repository
//! as mail-like, timestamped documents.
//!
//! Three pieces cooperate: [`history::walk`] reconstructs the coalesced
//! lifecycle of one item from the commit graph, [`sync::synchronize`]
//! keeps a persisted uid-ordered index in step with the repository head,
//! and [`document::Document`] lazily assembles the multi-part body
//! (revision headers, content, diffs) a presentation layer streams out.
//!
//! The repository backend and the persisted index are consumed through the
//! [`repo::Repository`] and [`index::IndexStore`] traits; reference
//! implementations ([`repo::MemoryRepository`], [`index::SqliteIndex`])
//! are included.

pub mod diff;
pub mod document;
pub mod error;
pub mod history;
pub mod index;
pub mod object;
pub mod payload;
pub mod repo;
pub mod sync;

pub use document::{Document, DocumentPart, DocumentReader, PartKind};
pub use error::{Error, Result};
pub use history::{first_occurrence, walk, Revision};
pub use index::{IndexBatch, IndexStore, Record, SqliteIndex, SyncState};
pub use object::{Commit, EntryKind, ObjectId, Signature, Tree, TreeEntry};
pub use payload::{JsonTimestamp, NoTimestamp, TimestampSource};
pub use repo::{MemoryRepository, Repository, RevWalk};
pub use sync::{synchronize, SyncOutcome};
