// The core component: an ordered sequence of pages, appended at the tail,
// consumed from the head. See spec §3–§4.
//
// Grounded on the teacher's `storage::buffer::BufferPoolManager` and
// `storage::page::Page` (src/storage/{buffer,page}.rs): same idea of a
// page set with explicit lifecycle, generalized from a fixed-size disk
// frame pool to a variable-length, growable in-memory page sequence.

use crate::alloc::{self, Allocator};
use crate::change::{ChangeCallback, ChangeTracker};
use crate::error::{BufError, Result};
use crate::fmt as fmtglue;
use crate::iovec::Iovec;
use crate::page::{Page, UnrefCallback};
use crate::pages::PageArray;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Start-of-growth floor: a brand new tail page is never smaller than
/// this, regardless of how small the first write into it is.
const MIN_PAGE_SIZE: usize = 1024;

/// Double `current` (or `MIN_PAGE_SIZE` if larger) until it can hold
/// `requested` bytes. See spec §4.3.
fn grow_size(current: usize, requested: usize) -> usize {
    let mut size = current.max(MIN_PAGE_SIZE);
    while size < requested {
        size = size.saturating_mul(2);
    }
    size
}

/// A paged byte buffer: content is appended at the tail and consumed from
/// the head. See the crate's module docs for the full operation set.
pub struct Buffer {
    pages: PageArray,
    content_len: usize,
    change: ChangeTracker,
    allocator: Arc<dyn Allocator>,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("pages", &self.pages.len())
            .field("content_len", &self.content_len)
            .finish()
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    /// A fresh, empty buffer. Captures whatever allocator is currently
    /// installed via [`crate::set_allocator`]; later calls to
    /// `set_allocator` do not affect buffers already constructed.
    pub fn new() -> Self {
        Self {
            pages: PageArray::new(),
            content_len: 0,
            change: ChangeTracker::new(),
            allocator: alloc::current_allocator(),
        }
    }

    /// A buffer whose sole initial content is a read-only, zero-copy view
    /// over caller-owned memory (READONLY | UNMANAGED, per spec §3). The
    /// caller must keep `data` reachable for as long as this buffer (or
    /// anything it's transferred into) is.
    pub fn new_unmanaged(data: Bytes) -> Self {
        let mut buf = Self::new();
        buf.init_unmanaged(data);
        buf
    }

    /// Reset to a fresh empty buffer, dropping all current pages (and so
    /// firing any pending `unref` callbacks) — the buffer-level analogue
    /// of the teacher's `Component::initialize` (src/common/mod.rs).
    pub fn init(&mut self) {
        *self = Self::new();
    }

    pub fn init_unmanaged(&mut self, data: Bytes) {
        let len = data.len();
        self.pages = PageArray::new();
        self.content_len = 0;
        if len > 0 {
            self.pages.push_back(Page::readonly(data));
            self.content_len = len;
        }
    }

    /// Drain all content, firing every pending `unref`. Equivalent to the
    /// teacher's `Component::shutdown` (src/common/mod.rs) — an explicit
    /// early finalize; dropping the buffer does the same thing implicitly.
    pub fn destruct(&mut self) {
        self.drain_all();
    }

    // ---- inspection -----------------------------------------------------

    pub fn content_len(&self) -> usize {
        self.content_len
    }

    pub fn len(&self) -> usize {
        self.content_len
    }

    pub fn is_empty(&self) -> bool {
        self.content_len == 0
    }

    /// Pre-existing free space at the tail (0 if the tail isn't writable,
    /// or there is no tail).
    pub fn space_len(&self) -> usize {
        let n = self.pages.len();
        if n == 0 {
            return 0;
        }
        self.pages.get(n - 1).map(|p| p.space_len()).unwrap_or(0)
    }

    /// Fill up to `max` [`Iovec`]s describing content in `[begin, end)`,
    /// returning how many iovecs *would* be required — pass `max == 0` to
    /// size a later call without writing anything. See spec §4.2.
    pub fn peek(&self, begin: usize, end: usize, max: usize) -> (Vec<Iovec<'_>>, usize) {
        let begin = begin.min(self.content_len);
        let end = end.clamp(begin, self.content_len);
        let mut iovecs = Vec::new();
        let mut needed = 0usize;
        if begin >= end {
            return (iovecs, needed);
        }
        let mut running = 0usize;
        for page in self.pages.iter() {
            let content = page.content();
            let page_start = running;
            let page_end = running + content.len();
            running = page_end;
            if page_end <= begin {
                continue;
            }
            if page_start >= end {
                break;
            }
            let lo = begin.max(page_start) - page_start;
            let hi = end.min(page_end) - page_start;
            if lo >= hi {
                continue;
            }
            needed += 1;
            if iovecs.len() < max {
                iovecs.push(Iovec::new(&content[lo..hi]));
            }
        }
        (iovecs, needed)
    }

    pub fn peek_all(&self) -> (Vec<Iovec<'_>>, usize) {
        self.peek(0, self.content_len, usize::MAX)
    }

    /// A contiguous view of the entire content, if it already happens to
    /// live in a single page. Call [`Buffer::make_all_contiguous`] first
    /// to guarantee `Some`.
    pub fn peek_string(&self) -> Option<&[u8]> {
        if self.pages.len() <= 1 {
            self.pages.get(0).map(|p| p.content())
        } else {
            None
        }
    }

    /// Copy up to `out.len()` bytes starting at content offset `begin`
    /// into `out`, without touching buffer state. Returns bytes copied.
    pub fn copyout(&self, begin: usize, out: &mut [u8]) -> usize {
        let begin = begin.min(self.content_len);
        let end = begin.saturating_add(out.len()).min(self.content_len);
        let (iovecs, _) = self.peek(begin, end, usize::MAX);
        let mut copied = 0;
        for iov in iovecs {
            let slice = iov.as_slice();
            out[copied..copied + slice.len()].copy_from_slice(slice);
            copied += slice.len();
        }
        copied
    }

    // ---- search -----------------------------------------------------

    pub fn search(&self, needle: &[u8]) -> Result<usize> {
        self.search_range(0, self.content_len, needle)
    }

    pub fn search_range(&self, begin: usize, end: usize, needle: &[u8]) -> Result<usize> {
        crate::search::search_range(&self.pages, self.content_len, begin, end, needle)
            .ok_or(BufError::NotFound)
    }

    // ---- adding content -----------------------------------------------

    /// Append `data` to the tail, growing storage if needed.
    pub fn add(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.ensure_tail_capacity(data.len())?;
        self.append_into_existing_space(data)
    }

    pub fn add_ch(&mut self, byte: u8) -> Result<()> {
        self.add(&[byte])
    }

    /// The `add_vprintf` primitive `add_printf!` expands into. Formats
    /// `args` and appends the result; returns the number of bytes
    /// written (no trailing nul — Rust strings aren't C strings, so
    /// unlike the source there's no terminator byte to reserve and
    /// discard).
    pub fn add_vprintf(&mut self, args: std::fmt::Arguments<'_>) -> Result<usize> {
        let rendered = fmtglue::render(args);
        self.add(rendered.as_bytes())?;
        Ok(rendered.len())
    }

    /// Append a new READONLY | UNMANAGED page wrapping `data` — zero-copy.
    /// A later `add` never writes into this page; it opens a new one.
    pub fn add_readonly(&mut self, data: Bytes) {
        let len = data.len();
        if len == 0 {
            return;
        }
        self.pages.push_back(Page::readonly(data));
        self.content_len += len;
        self.change.on_added(len);
        trace!(len, "add_readonly");
    }

    /// Append a new UNMANAGED page wrapping `data`; `unref` fires exactly
    /// once when this page is no longer reachable from any buffer.
    pub fn add_reference(&mut self, data: Bytes, unref: UnrefCallback) {
        let len = data.len();
        self.pages.push_back(Page::reference(data, unref));
        self.content_len += len;
        self.change.on_added(len);
        trace!(len, "add_reference");
    }

    /// Force subsequent `add`s into a fresh page.
    pub fn add_pagebreak(&mut self) {
        self.pages.push_back(Page::owned(Vec::new()));
    }

    pub fn add_hton_u8(&mut self, v: u8) -> Result<()> {
        self.add(&[v])
    }

    pub fn add_hton_u16(&mut self, v: u16) -> Result<()> {
        self.add(&v.to_be_bytes())
    }

    pub fn add_hton_u32(&mut self, v: u32) -> Result<()> {
        self.add(&v.to_be_bytes())
    }

    pub fn add_hton_u64(&mut self, v: u64) -> Result<()> {
        self.add(&v.to_be_bytes())
    }

    /// Move all of `src`'s content onto the tail of `self`. Sugar over
    /// [`remove_buffer`].
    pub fn add_buffer(&mut self, src: &mut Buffer) -> Result<usize> {
        let n = src.content_len;
        remove_buffer(src, self, n)
    }

    // ---- removing and draining -----------------------------------------

    /// Copy up to `out.len()` bytes from the head into `out` and drain
    /// them. Returns bytes moved.
    pub fn remove(&mut self, out: &mut [u8]) -> usize {
        let copied = self.copyout(0, out);
        self.drain(copied);
        copied
    }

    /// Take ownership of the entire content as a byte vector. When the
    /// content already lives in (or can be made to live in) a single
    /// reallocatable page, this is zero-copy: the page's storage is
    /// handed to the caller directly instead of copied.
    pub fn remove_string(&mut self) -> Vec<u8> {
        if self.content_len == 0 {
            return Vec::new();
        }
        let total = self.content_len;
        if self.make_all_contiguous().is_ok() && self.pages.len() == 1 {
            let taken = self.pages.first_mut().and_then(|p| p.take_owned_content());
            if let Some(bytes) = taken {
                self.pages = PageArray::new();
                self.content_len = 0;
                self.change.on_deleted(total);
                return bytes;
            }
        }
        let mut out = vec![0u8; total];
        let n = self.copyout(0, &mut out);
        out.truncate(n);
        self.drain_all();
        out
    }

    pub fn remove_ntoh_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        if self.copyout(0, &mut b) < 1 {
            return Err(BufError::InvalidArgument("not enough content for u8"));
        }
        self.drain(1);
        Ok(b[0])
    }

    pub fn remove_ntoh_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        if self.copyout(0, &mut b) < 2 {
            return Err(BufError::InvalidArgument("not enough content for u16"));
        }
        self.drain(2);
        Ok(u16::from_be_bytes(b))
    }

    pub fn remove_ntoh_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        if self.copyout(0, &mut b) < 4 {
            return Err(BufError::InvalidArgument("not enough content for u32"));
        }
        self.drain(4);
        Ok(u32::from_be_bytes(b))
    }

    pub fn remove_ntoh_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        if self.copyout(0, &mut b) < 8 {
            return Err(BufError::InvalidArgument("not enough content for u64"));
        }
        self.drain(8);
        Ok(u64::from_be_bytes(b))
    }

    /// Drain up to `len` bytes from the head, releasing any pages that
    /// become fully consumed. Returns bytes drained. Draining exactly to
    /// end-of-buffer performs a recycling drain-all (spec §4.1, §4.6).
    pub fn drain(&mut self, len: usize) -> usize {
        let len = len.min(self.content_len);
        if len == 0 {
            return 0;
        }
        if len == self.content_len {
            self.drain_all();
            return len;
        }
        let pos = self.pages.position_of(len, self.content_len);
        self.pages.release_first_n(pos.page_idx, false);
        if pos.page_pos > 0 {
            if let Some(page) = self.pages.first_mut() {
                page.consume(pos.page_pos);
            }
        }
        self.content_len -= len;
        self.change.on_deleted(len);
        trace!(len, "drain");
        len
    }

    /// Drain everything. The largest recyclable page is retained (reset)
    /// as the embedded page rather than freed, per spec §4.1.
    pub fn drain_all(&mut self) {
        let amount = self.content_len;
        let n = self.pages.len();
        self.pages.release_first_n(n, true);
        self.content_len = 0;
        if amount > 0 {
            self.change.on_deleted(amount);
        }
        trace!(amount, "drain_all");
    }

    // ---- space API -------------------------------------------------------

    /// Pre-existing free space at the tail, without growing anything.
    pub fn peek_space(&mut self) -> Option<&mut [u8]> {
        self.pages.last_mut().and_then(|p| p.space_mut())
    }

    /// Grow the tail (if needed) to hold at least `len` bytes and return a
    /// view of its writable space. The view is invalidated by the next
    /// mutating call on this buffer (spec invariant 8).
    pub fn reserve_space(&mut self, len: usize) -> Result<&mut [u8]> {
        self.ensure_tail_capacity(len)?;
        self.pages
            .last_mut()
            .and_then(|p| p.space_mut())
            .ok_or(BufError::Unsupported("reserve_space: tail not writable"))
    }

    /// Mark `len` bytes of previously reserved space as content. `len` is
    /// clamped to the tail's currently writable size; committing more
    /// than was reserved trips a debug assertion.
    pub fn commit_space(&mut self, len: usize) -> Result<()> {
        let page = self
            .pages
            .last_mut()
            .ok_or(BufError::InvalidArgument("commit_space: no pages"))?;
        debug_assert!(len <= page.space_len(), "commit_space: committing more than reserved");
        let actual = len.min(page.space_len());
        page.commit(actual)?;
        self.content_len += actual;
        self.change.on_added(actual);
        Ok(())
    }

    pub fn ensure_space(&mut self, len: usize) -> Result<()> {
        self.ensure_tail_capacity(len)
    }

    // ---- layout -----------------------------------------------------

    /// Make the first `min(wanted, content_len)` bytes contiguous in a
    /// single page in place, returning a view of it. See spec §4.8.
    pub fn make_contiguous(&mut self, wanted: usize) -> Result<&[u8]> {
        let wanted = wanted.min(self.content_len);
        let already = self
            .pages
            .get(0)
            .map(|p| p.content_len() >= wanted)
            .unwrap_or(wanted == 0);
        if !already {
            self.change.mute();
            let result = self.make_contiguous_inner(wanted);
            self.change.unmute();
            result?;
        }
        Ok(self.pages.get(0).map(|p| p.content()).unwrap_or(&[]))
    }

    pub fn make_all_contiguous(&mut self) -> Result<&[u8]> {
        let n = self.content_len;
        self.make_contiguous(n)
    }

    fn make_contiguous_inner(&mut self, wanted: usize) -> Result<()> {
        if wanted == self.content_len {
            let fits_in_tail = self
                .pages
                .last_mut()
                .map(|p| p.is_reallocatable() && p.space_len() >= wanted)
                .unwrap_or(false);
            if fits_in_tail {
                let mut tmp = vec![0u8; wanted];
                let n = self.copyout(0, &mut tmp);
                debug_assert_eq!(n, wanted);
                self.append_into_existing_space(&tmp)?;
                self.drain(wanted);
                return Ok(());
            }
        }
        // General path: fresh page sized exactly `wanted`, prefix copied in,
        // original prefix drained, new page prepended. Preserves order even
        // when there's content after `wanted` (spec §4.8 step 4).
        let mut fresh = self.allocator.allocate(wanted)?;
        let n = self.copyout(0, &mut fresh);
        debug_assert_eq!(n, wanted);
        self.drain(wanted);
        self.pages.push_front(Page::owned_with_content(fresh, wanted));
        self.content_len += wanted;
        self.change.on_added(wanted);
        Ok(())
    }

    // ---- change notification -----------------------------------------------

    pub fn set_changed_cb(&mut self, cb: ChangeCallback) {
        self.change.set_callback(cb, self.content_len);
    }

    pub fn clear_changed_cb(&mut self) {
        self.change.clear_callback();
    }

    pub fn begin_coalescing(&mut self) {
        self.change.begin_coalescing();
    }

    pub fn end_coalescing(&mut self) {
        self.change.end_coalescing();
    }

    // ---- internal helpers -----------------------------------------------

    /// Ensure the tail page has room for `additional` more bytes, growing
    /// or allocating as needed. See spec §4.3.
    fn ensure_tail_capacity(&mut self, additional: usize) -> Result<()> {
        if additional == 0 {
            return Ok(());
        }
        let need_new_page = match self.pages.last_mut() {
            None => true,
            Some(page) => !page.is_reallocatable(),
        };
        if need_new_page {
            let size = grow_size(0, additional);
            let data = self.allocator.allocate(size).map_err(|e| {
                debug!(size, "allocator failed to grow buffer tail");
                e
            })?;
            self.pages.push_back(Page::owned(data));
            return Ok(());
        }
        let page = self.pages.last_mut().expect("checked Some above");
        if page.space_len() >= additional {
            return Ok(());
        }
        if page.read_pos() > 0 {
            page.compact();
            if page.space_len() >= additional {
                return Ok(());
            }
        }
        let new_total = grow_size(page.size(), page.write_pos() + additional);
        page.grow_storage(new_total, &*self.allocator)?;
        Ok(())
    }

    /// Copy `data` into the tail's existing free space and commit it.
    /// Caller must have already ensured enough space exists.
    fn append_into_existing_space(&mut self, data: &[u8]) -> Result<()> {
        let page = self
            .pages
            .last_mut()
            .ok_or(BufError::InvalidArgument("no tail page to append into"))?;
        let space = page
            .space_mut()
            .ok_or(BufError::Unsupported("tail page is not writable"))?;
        if space.len() < data.len() {
            return Err(BufError::InvalidArgument("tail space shorter than data"));
        }
        space[..data.len()].copy_from_slice(data);
        page.commit(data.len())?;
        self.content_len += data.len();
        self.change.on_added(data.len());
        Ok(())
    }
}

/// Move `wanted` bytes (clamped to `src`'s content) from `src` to the tail
/// of `dst`. Whole pages move by pointer (zero-copy, `unref` travels with
/// them); a trailing partial page is copied byte-for-byte after a
/// pagebreak in `dst`. See spec §4.7.
pub fn remove_buffer(src: &mut Buffer, dst: &mut Buffer, wanted: usize) -> Result<usize> {
    let wanted = wanted.min(src.content_len);
    let end = src.pages.position_of(wanted, src.content_len);

    if end.page_idx > 0 {
        let moved_pages = src.pages.take_front(end.page_idx);
        let moved_len: usize = moved_pages.iter().map(|p| p.content_len()).sum();
        dst.pages.splice_back(moved_pages);
        dst.content_len += moved_len;
        dst.change.on_added(moved_len);
        src.content_len -= moved_len;
        src.change.on_deleted(moved_len);
    }

    if end.page_pos > 0 {
        let mut tmp = vec![0u8; end.page_pos];
        let copied = match src.pages.first_mut() {
            Some(page) => {
                let content = page.content();
                let n = end.page_pos.min(content.len());
                tmp[..n].copy_from_slice(&content[..n]);
                n
            }
            None => 0,
        };
        dst.add_pagebreak();
        dst.add(&tmp[..copied])?;
        if let Some(page) = src.pages.first_mut() {
            page.consume(copied);
        }
        src.content_len -= copied;
        src.change.on_deleted(copied);
    }

    trace!(wanted, "remove_buffer");
    Ok(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn add_then_remove_round_trips() {
        let mut buf = Buffer::new();
        buf.add(b"hello world").unwrap();
        assert_eq!(buf.content_len(), 11);
        let mut out = [0u8; 11];
        let n = buf.remove(&mut out);
        assert_eq!(n, 11);
        assert_eq!(&out, b"hello world");
        assert_eq!(buf.content_len(), 0);
    }

    #[test]
    fn add_grows_tail_across_1024_floor() {
        let mut buf = Buffer::new();
        let chunk = vec![b'a'; 2000];
        buf.add(&chunk).unwrap();
        assert_eq!(buf.content_len(), 2000);
        let mut out = vec![0u8; 2000];
        buf.copyout(0, &mut out);
        assert_eq!(out, chunk);
    }

    #[test]
    fn add_readonly_then_add_does_not_reuse_page() {
        let mut buf = Buffer::new();
        buf.add(b"foo").unwrap();
        buf.add_readonly(Bytes::from_static(b"bar"));
        buf.add_ch(b'!').unwrap();
        assert_eq!(buf.content_len(), 7);
        let (iovecs, needed) = buf.peek_all();
        assert_eq!(needed, 3);
        assert_eq!(iovecs[0].as_slice(), b"foo");
        assert_eq!(iovecs[1].as_slice(), b"bar");
        assert_eq!(iovecs[2].as_slice(), b"!");
    }

    #[test]
    fn drain_then_copyout_yields_suffix() {
        let mut buf = Buffer::new();
        buf.add(b"abcdef").unwrap();
        buf.drain(2);
        let mut out = [0u8; 4];
        buf.copyout(0, &mut out);
        assert_eq!(&out, b"cdef");
    }

    #[test]
    fn make_all_contiguous_preserves_content() {
        let mut buf = Buffer::new();
        buf.add(b"hello ").unwrap();
        buf.add_pagebreak();
        buf.add(b"world").unwrap();
        let view = buf.make_all_contiguous().unwrap().to_vec();
        assert_eq!(view, b"hello world");
        assert_eq!(buf.content_len(), 11);
    }

    #[test]
    fn make_contiguous_partial_preserves_order() {
        let mut buf = Buffer::new();
        buf.add(b"abc").unwrap();
        buf.add_pagebreak();
        buf.add(b"def").unwrap();
        let view = buf.make_contiguous(4).unwrap().to_vec();
        assert_eq!(view, b"abcd");
        let mut out = [0u8; 6];
        buf.copyout(0, &mut out);
        assert_eq!(&out, b"abcdef");
    }

    #[test]
    fn remove_buffer_is_zero_copy_for_whole_pages() {
        let mut src = Buffer::new();
        src.add(b"firstpage").unwrap();
        src.add_pagebreak();
        src.add(b"secondpage").unwrap();
        let mut dst = Buffer::new();
        let moved = super::remove_buffer(&mut src, &mut dst, src.content_len()).unwrap();
        assert_eq!(moved, 19);
        assert_eq!(src.content_len(), 0);
        assert_eq!(dst.content_len(), 19);
        let mut out = vec![0u8; 19];
        dst.copyout(0, &mut out);
        assert_eq!(out, b"firstpagesecondpage");
    }

    #[test]
    fn unref_fires_once_after_coalesced_drain() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let mut buf = Buffer::new();
        buf.add_reference(Bytes::from_static(b"0123456789"), Box::new(move |got| {
            f.fetch_add(1, Ordering::SeqCst);
            assert_eq!(got.len(), 10);
        }));
        let deliveries = Arc::new(AtomicUsize::new(0));
        let d = deliveries.clone();
        buf.set_changed_cb(Box::new(move |_| { d.fetch_add(1, Ordering::SeqCst); }));
        buf.begin_coalescing();
        buf.drain_all();
        buf.end_coalescing();
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hton_ntoh_round_trip() {
        let mut buf = Buffer::new();
        buf.add_hton_u32(0x0102_0304).unwrap();
        let mut raw = [0u8; 4];
        buf.copyout(0, &mut raw);
        assert_eq!(raw, [0x01, 0x02, 0x03, 0x04]);
        let v = buf.remove_ntoh_u32().unwrap();
        assert_eq!(v, 0x0102_0304);
    }
}
