use crate::diff;
use crate::error::{Error, Result};
use crate::history::{self, Revision};
use crate::object::ObjectId;
use crate::repo::Repository;
use std::io::Read;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%SZ";
const DELETED_MARKER: &str = "<deleted>\n";

// "\ncommit " + 64 hex + "\nDate: " + "YYYY-MM-DD HH:MM:SSZ" + "\n\n".
pub(crate) const PART_HEADER_LEN: usize = 8 + 64 + 7 + 20 + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// Externally supplied leading part (e.g. rendered message headers).
    Header,
    /// Fixed-width commit id + date line pair.
    RevisionHeader,
    /// Blob bytes, verbatim.
    Content,
    /// Marker standing in for a revision where the item did not exist.
    Placeholder,
    /// Rendered diff against the next older revision.
    Diff,
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentPart<'a> {
    pub kind: PartKind,
    pub bytes: &'a [u8],
}

/// Lazily assembled multi-part body for one item: per-revision headers,
/// content (or a deleted marker), and inter-revision diffs, newest first.
///
/// Assembly only walks history. Content is resolved and diffs are computed
/// on the first size or stream request and cached for the lifetime of the
/// document, so `total_size` and a later stream agree byte for byte.
pub struct Document<'a, R: Repository + ?Sized> {
    repo: &'a R,
    header: Option<Vec<u8>>,
    revisions: Vec<Revision>,
    fetched: bool,
    blobs: Vec<Option<Vec<u8>>>,
    part_headers: Vec<String>,
    diffs: Vec<String>,
}

impl<'a, R: Repository + ?Sized> Document<'a, R> {
    pub fn assemble(repo: &'a R, target: &ObjectId) -> Result<Self> {
        let revisions = history::walk(repo, target)?;
        if revisions.is_empty() {
            return Err(Error::NoHistory(*target));
        }
        let blobs = vec![None; revisions.len()];
        Ok(Self {
            repo,
            header: None,
            revisions,
            fetched: false,
            blobs,
            part_headers: Vec::new(),
            diffs: Vec::new(),
        })
    }

    /// Attach an externally supplied header part. The first revision
    /// header then keeps its leading newline as the separator.
    pub fn with_header(mut self, header: Vec<u8>) -> Self {
        self.header = Some(header);
        self
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    fn fetch_blobs(&mut self) -> Result<()> {
        if self.fetched {
            return Ok(());
        }
        for (i, revision) in self.revisions.iter().enumerate() {
            if let Some(id) = revision.state {
                self.blobs[i] = Some(self.repo.blob(&id)?);
            }
        }
        self.fetched = true;
        Ok(())
    }

    fn generate(&mut self) -> Result<()> {
        if !self.part_headers.is_empty() {
            return Ok(());
        }
        self.fetch_blobs()?;
        self.part_headers = self
            .revisions
            .iter()
            .map(|revision| {
                format!(
                    "\ncommit {}\nDate: {}\n\n",
                    revision.commit_id.to_hex(),
                    revision.commit.timestamp.format(DATE_FORMAT),
                )
            })
            .collect();
        debug_assert!(self
            .part_headers
            .iter()
            .all(|header| header.len() == PART_HEADER_LEN));
        // Diff of each revision against the next older one; the older side
        // is "below".
        self.diffs = (0..self.revisions.len().saturating_sub(1))
            .map(|i| diff::render(self.blobs[i + 1].as_deref(), self.blobs[i].as_deref()))
            .collect();
        Ok(())
    }

    /// The ordered parts of the document. Resolves content and diffs on
    /// first use.
    pub fn parts(&mut self) -> Result<Vec<DocumentPart<'_>>> {
        self.generate()?;
        let mut parts = Vec::with_capacity(1 + self.revisions.len() * 3);
        // Without an external header the very first separator newline
        // would open the document; skip it.
        let mut skip = 1;
        if let Some(header) = &self.header {
            parts.push(DocumentPart {
                kind: PartKind::Header,
                bytes: header,
            });
            skip = 0;
        }
        for i in 0..self.revisions.len() {
            parts.push(DocumentPart {
                kind: PartKind::RevisionHeader,
                bytes: &self.part_headers[i].as_bytes()[skip..],
            });
            skip = 0;
            match &self.blobs[i] {
                Some(blob) => parts.push(DocumentPart {
                    kind: PartKind::Content,
                    bytes: blob,
                }),
                None => parts.push(DocumentPart {
                    kind: PartKind::Placeholder,
                    bytes: DELETED_MARKER.as_bytes(),
                }),
            }
            if i + 1 < self.revisions.len() {
                parts.push(DocumentPart {
                    kind: PartKind::Diff,
                    bytes: self.diffs[i].as_bytes(),
                });
            }
        }
        Ok(parts)
    }

    /// Total byte size of the document, equal to the length of the fully
    /// streamed body.
    pub fn total_size(&mut self) -> Result<u64> {
        Ok(self
            .parts()?
            .iter()
            .map(|part| part.bytes.len() as u64)
            .sum())
    }

    /// Single-pass reader over the concatenated parts.
    pub fn reader(&mut self) -> Result<DocumentReader<'_>> {
        let parts = self.parts()?;
        Ok(DocumentReader {
            parts: parts.into_iter().map(|part| part.bytes).collect(),
            part: 0,
            offset: 0,
        })
    }
}

pub struct DocumentReader<'a> {
    parts: Vec<&'a [u8]>,
    part: usize,
    offset: usize,
}

impl Read for DocumentReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut written = 0;
        while written < buf.len() && self.part < self.parts.len() {
            let rest = &self.parts[self.part][self.offset..];
            if rest.is_empty() {
                self.part += 1;
                self.offset = 0;
                continue;
            }
            let n = rest.len().min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&rest[..n]);
            written += n;
            self.offset += n;
        }
        Ok(written)
    }
}
