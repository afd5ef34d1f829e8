// End-to-end scenarios, one #[test] fn each, flat style — no harness
// macros, no BDD wrapper (teacher convention, see src/io/ring_buffer.rs).

use bytes::Bytes;
use pagebuf::{add_printf, Buffer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn string_build() {
    let mut buf = Buffer::new();
    let n = add_printf!(buf, "Hello, {}!", "world").unwrap();
    assert_eq!(n, 13);
    let out = buf.remove_string();
    assert_eq!(out, b"Hello, world!");
}

#[test]
fn mixed_add() {
    let mut buf = Buffer::new();
    buf.add(b"foo").unwrap();
    buf.add_readonly(Bytes::from_static(b"bar"));
    buf.add_ch(b'!').unwrap();

    assert_eq!(buf.content_len(), 7);

    let (iovecs, needed) = buf.peek_all();
    assert_eq!(needed, 3);
    assert_eq!(iovecs.len(), 3);
    assert_eq!(iovecs[0].as_slice(), b"foo");
    assert_eq!(iovecs[1].as_slice(), b"bar");
    assert_eq!(iovecs[2].as_slice(), b"!");

    assert_eq!(buf.remove_string(), b"foobar!");
}

#[test]
fn endian_round_trip() {
    let mut buf = Buffer::new();
    buf.add_hton_u32(0x0102_0304).unwrap();

    let mut raw = [0u8; 4];
    buf.copyout(0, &mut raw);
    assert_eq!(raw, [0x01, 0x02, 0x03, 0x04]);

    let v = buf.remove_ntoh_u32().unwrap();
    assert_eq!(v, 0x0102_0304);
}

#[test]
fn cross_page_search() {
    let mut buf = Buffer::new();
    buf.add(b"hello ").unwrap();
    buf.add_pagebreak();
    buf.add(b"world").unwrap();

    let o = buf.search(b"lo wo");
    assert_eq!(o, Ok(3));
}

#[test]
fn zero_copy_transfer() {
    let mut src = Buffer::new();
    src.add(&vec![b'a'; 2000]).unwrap();
    src.add_pagebreak();
    src.add(&vec![b'b'; 2000]).unwrap();

    // Capture the base pointer of each page's content before the move.
    let (before, before_needed) = src.peek_all();
    assert_eq!(before_needed, 2);
    let ptrs_before: Vec<*const u8> = before.iter().map(|iov| iov.base()).collect();
    drop(before); // end the borrow of `src` explicitly before the move below

    let pre_total = src.content_len();
    let mut dst = Buffer::new();
    dst.add_buffer(&mut src).unwrap();

    assert_eq!(src.content_len(), 0);
    assert_eq!(dst.content_len(), pre_total);

    let (after, after_needed) = dst.peek_all();
    assert_eq!(after_needed, 2);
    let ptrs_after: Vec<*const u8> = after.iter().map(|iov| iov.base()).collect();
    assert_eq!(ptrs_before, ptrs_after, "page storage must move, not copy");

    let mut out = vec![0u8; pre_total];
    dst.copyout(0, &mut out);
    assert_eq!(&out[..2000], &vec![b'a'; 2000][..]);
    assert_eq!(&out[2000..], &vec![b'b'; 2000][..]);
}

#[test]
fn coalesce_and_unref() {
    let deliveries = Arc::new(AtomicUsize::new(0));
    let d = deliveries.clone();

    let unref_fired = Arc::new(AtomicUsize::new(0));
    let f = unref_fired.clone();

    let mut buf = Buffer::new();
    buf.set_changed_cb(Box::new(move |_info| {
        d.fetch_add(1, Ordering::SeqCst);
    }));

    // Both mutations sit inside one coalescing bracket so they fold into a
    // single delivery — add_reference alone (outside the bracket) would
    // deliver immediately and double-count against drain_all's event.
    buf.begin_coalescing();
    let blob = Bytes::from(vec![7u8; 64]);
    buf.add_reference(
        blob.clone(),
        Box::new(move |got| {
            f.fetch_add(1, Ordering::SeqCst);
            assert_eq!(got, blob);
        }),
    );
    buf.drain_all();
    buf.end_coalescing();

    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    assert_eq!(unref_fired.load(Ordering::SeqCst), 1);
}
