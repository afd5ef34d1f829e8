// One contiguous memory region participating in a buffer. See spec §3.

use crate::alloc::Allocator;
use crate::error::{BufError, Result};
use crate::flags::PageFlags;
use bytes::Bytes;
use std::fmt;

/// Invoked exactly once, when the engine is done with an externally
/// referenced page's memory. Takes the region it was given at
/// `add_reference` time (the `Bytes` carries both the data and its size).
pub type UnrefCallback = Box<dyn FnOnce(Bytes) + Send>;

/// Which of the three closed ownership variants a page belongs to. Folds
/// the READONLY/UNMANAGED flag set into the discriminant itself (spec §9,
/// "Ownership variants") rather than storing flags alongside the data —
/// flags and ownership can never disagree because flags are derived from
/// this enum, never stored independently.
pub(crate) enum Ownership {
    /// Engine-owned, growable, freely writable and reallocatable.
    Owned(Vec<u8>),
    /// Caller-owned, read-only memory. Never freed, never written, no
    /// release callback — the caller is responsible for keeping it alive
    /// for as long as the page is reachable.
    ReadOnly(Bytes),
    /// Caller-owned memory with a release callback, fired exactly once
    /// when this page is dropped.
    Reference { data: Bytes, unref: UnrefCallback },
}

impl Ownership {
    fn as_slice(&self) -> &[u8] {
        match self {
            Ownership::Owned(v) => v,
            Ownership::ReadOnly(b) => b,
            Ownership::Reference { data, .. } => data,
        }
    }
}

/// A page: a base region plus a read/write cursor into it. See spec §3
/// for the field-level invariants (`read_pos <= write_pos <= size`).
pub(crate) struct Page {
    ownership: Ownership,
    read_pos: usize,
    write_pos: usize,
    size: usize,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("size", &self.size)
            .field("read_pos", &self.read_pos)
            .field("write_pos", &self.write_pos)
            .field("flags", &self.flags())
            .finish()
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        // Swap out the ownership so we can move the Reference variant's
        // `unref` out of `&mut self` and invoke it. Every other variant is
        // a no-op here. This is the one and only place `unref` is called,
        // so it fires exactly once no matter how the page stops being
        // reachable (explicit drain, panic unwind, buffer destruction).
        let ownership = std::mem::replace(&mut self.ownership, Ownership::ReadOnly(Bytes::new()));
        if let Ownership::Reference { data, unref } = ownership {
            unref(data);
        }
    }
}

impl Page {
    pub(crate) fn owned(data: Vec<u8>) -> Self {
        let size = data.len();
        Self { ownership: Ownership::Owned(data), read_pos: 0, write_pos: 0, size }
    }

    /// An owned page with `len` bytes already committed as content —
    /// used when transplanting data that's already been written.
    pub(crate) fn owned_with_content(data: Vec<u8>, content_len: usize) -> Self {
        let size = data.len();
        debug_assert!(content_len <= size);
        Self { ownership: Ownership::Owned(data), read_pos: 0, write_pos: content_len, size }
    }

    pub(crate) fn readonly(data: Bytes) -> Self {
        let size = data.len();
        Self { ownership: Ownership::ReadOnly(data), read_pos: 0, write_pos: size, size }
    }

    pub(crate) fn reference(data: Bytes, unref: UnrefCallback) -> Self {
        let size = data.len();
        Self { ownership: Ownership::Reference { data, unref }, read_pos: 0, write_pos: size, size }
    }

    pub(crate) fn content_len(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub(crate) fn space_len(&self) -> usize {
        self.size - self.write_pos
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub(crate) fn write_pos(&self) -> usize {
        self.write_pos
    }

    pub(crate) fn is_readonly(&self) -> bool {
        matches!(self.ownership, Ownership::ReadOnly(_))
    }

    pub(crate) fn is_unmanaged(&self) -> bool {
        !matches!(self.ownership, Ownership::Owned(_))
    }

    pub(crate) fn is_writable(&self) -> bool {
        !self.is_readonly()
    }

    /// Neither READONLY nor UNMANAGED: safe to realloc/grow.
    pub(crate) fn is_reallocatable(&self) -> bool {
        matches!(self.ownership, Ownership::Owned(_))
    }

    /// Owned, non-readonly, no release callback: eligible to be retained
    /// across a drain-all instead of freed.
    pub(crate) fn is_recyclable(&self) -> bool {
        matches!(self.ownership, Ownership::Owned(_))
    }

    pub(crate) fn flags(&self) -> PageFlags {
        match &self.ownership {
            Ownership::Owned(_) => PageFlags::NONE,
            Ownership::ReadOnly(_) => PageFlags::READONLY,
            Ownership::Reference { .. } => PageFlags::UNMANAGED,
        }
    }

    /// The page's content, `[read_pos, write_pos)`.
    pub(crate) fn content(&self) -> &[u8] {
        &self.ownership.as_slice()[self.read_pos..self.write_pos]
    }

    /// Content starting `extra` bytes past `read_pos`, clamped to
    /// `write_pos`. Used when the first/last contributing page of a
    /// `peek` must be trimmed.
    pub(crate) fn content_from(&self, extra: usize) -> &[u8] {
        let start = (self.read_pos + extra).min(self.write_pos);
        &self.ownership.as_slice()[start..self.write_pos]
    }

    /// The tail's pre-existing free space, `[write_pos, size)`. `None` for
    /// non-owned pages — they can never be written into.
    pub(crate) fn space_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.ownership {
            Ownership::Owned(v) => Some(&mut v[self.write_pos..]),
            _ => None,
        }
    }

    /// Advance `read_pos` by `n` bytes, consuming that much content.
    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(self.read_pos + n <= self.write_pos);
        self.read_pos += n;
    }

    /// Mark `n` bytes of existing space as content. `n` is clamped to the
    /// currently writable size per spec §4.5.
    pub(crate) fn commit(&mut self, n: usize) -> Result<()> {
        if !self.is_writable() {
            return Err(BufError::Unsupported("commit on a READONLY page"));
        }
        let n = n.min(self.space_len());
        self.write_pos += n;
        Ok(())
    }

    /// Grow an owned page's underlying storage to at least `new_size`
    /// bytes via the given allocator. Doubling policy lives in the caller
    /// (pages.rs); this just performs the actual grow-or-fail.
    pub(crate) fn grow_storage(&mut self, new_size: usize, allocator: &dyn Allocator) -> Result<()> {
        match &mut self.ownership {
            Ownership::Owned(v) => {
                debug_assert!(new_size >= v.len());
                let taken = std::mem::take(v);
                let grown = allocator.grow(taken, new_size)?;
                *v = grown;
                self.size = new_size;
                Ok(())
            }
            _ => Err(BufError::Unsupported("grow on a non-owned page")),
        }
    }

    /// Shift content down to offset 0 within the same owned storage, so
    /// that the full tail is contiguous free space. Only ever called on
    /// reallocatable pages (spec §4.3, "split space").
    pub(crate) fn compact(&mut self) {
        if let Ownership::Owned(v) = &mut self.ownership {
            if self.read_pos > 0 {
                v.copy_within(self.read_pos..self.write_pos, 0);
                self.write_pos -= self.read_pos;
                self.read_pos = 0;
            }
        }
    }

    /// Reset an owned page to empty, for recycling across a drain-all.
    pub(crate) fn reset_for_recycle(&mut self) {
        debug_assert!(self.is_recyclable());
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Take ownership of an owned page's storage directly, trimmed down to
    /// just its content — the zero-allocation path behind
    /// `Buffer::remove_string`. `None` for non-owned pages. Leaves `self`
    /// reset to an empty owned page of size 0.
    pub(crate) fn take_owned_content(&mut self) -> Option<Vec<u8>> {
        match &mut self.ownership {
            Ownership::Owned(v) => {
                let mut taken = std::mem::take(v);
                let (read, write) = (self.read_pos, self.write_pos);
                self.read_pos = 0;
                self.write_pos = 0;
                self.size = 0;
                if read > 0 {
                    taken.drain(0..read);
                }
                taken.truncate(write - read);
                Some(taken)
            }
            _ => None,
        }
    }
}
