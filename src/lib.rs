//! `pagebuf` — a paged byte-buffer engine.
//!
//! Content lives in a sequence of pages: appended at the tail, consumed
//! from the head. Large or externally-owned regions can be wrapped
//! without copying (`add_readonly`, `add_reference`), and content can be
//! moved between two buffers without copying the bytes themselves
//! (`add_buffer`, `remove_buffer`) — only page pointers move.
//!
//! ```
//! use pagebuf::Buffer;
//!
//! let mut buf = Buffer::new();
//! buf.add(b"hello, ").unwrap();
//! buf.add(b"world").unwrap();
//! assert_eq!(buf.content_len(), 12);
//!
//! let mut out = [0u8; 12];
//! buf.remove(&mut out);
//! assert_eq!(&out, b"hello, world");
//! ```

mod alloc;
mod buffer;
mod change;
mod error;
mod flags;
mod fmt;
mod iovec;
mod page;
mod pages;
mod position;
mod search;

pub use alloc::{set_allocator, Allocator, SystemAllocator};
pub use buffer::{remove_buffer, Buffer};
pub use change::{ChangeCallback, ChangeInfo};
pub use error::{BufError, Result};
pub use flags::PageFlags;
pub use iovec::Iovec;
pub use page::UnrefCallback;
pub use position::Position;
