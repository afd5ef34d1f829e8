// Needle search across the page array. See spec §4.9.
//
// Per spec §9's resolved Open Question, the cross-page match is iterative
// (a `while` loop walking page-by-page) rather than recursive in the
// needle's tail length, so pathological needle sizes never risk stack
// growth.

use crate::pages::PageArray;
use crate::position::Position;

/// Find the first occurrence of `needle` with its start offset in
/// `[begin, end)`, scanning full buffer content for the match itself (a
/// match starting just before `end` may extend past it). Returns the
/// content offset of the match, or `None`.
pub(crate) fn search_range(
    pages: &PageArray,
    content_len: usize,
    begin: usize,
    end: usize,
    needle: &[u8],
) -> Option<usize> {
    if needle.is_empty() {
        return Some(begin.min(end).min(content_len));
    }
    let begin = begin.min(content_len);
    let end = end.min(content_len);
    if begin >= end {
        return None;
    }

    let mut pos = pages.position_of(begin, content_len);
    let mut content_offset = begin;

    while content_offset < end {
        let page = match pages.get(pos.page_idx) {
            Some(p) => p,
            None => break,
        };
        let page_content = page.content();
        let avail_in_page = page_content.len() - pos.page_pos;
        if avail_in_page == 0 {
            pos = Position::new(pos.page_idx + 1, 0, content_offset);
            continue;
        }
        let scan_len = avail_in_page.min(end - content_offset);
        let slice = &page_content[pos.page_pos..pos.page_pos + scan_len];

        for (i, &byte) in slice.iter().enumerate() {
            if byte == needle[0] && matches_from(pages, content_len, content_offset + i, needle) {
                return Some(content_offset + i);
            }
        }

        content_offset += scan_len;
        pos = Position::new(pos.page_idx + 1, 0, content_offset);
    }
    None
}

/// Verify `needle` occurs starting at `start`, advancing page-by-page
/// iteratively (never recursively) across page boundaries.
fn matches_from(pages: &PageArray, content_len: usize, start: usize, needle: &[u8]) -> bool {
    if start + needle.len() > content_len {
        return false;
    }
    let mut pos = pages.position_of(start, content_len);
    let mut needle_idx = 0;

    while needle_idx < needle.len() {
        let page = match pages.get(pos.page_idx) {
            Some(p) => p,
            None => return false,
        };
        let page_content = page.content();
        let avail = page_content.len() - pos.page_pos;
        if avail == 0 {
            pos = Position::new(pos.page_idx + 1, 0, pos.content_pos);
            continue;
        }
        let take = avail.min(needle.len() - needle_idx);
        if page_content[pos.page_pos..pos.page_pos + take] != needle[needle_idx..needle_idx + take] {
            return false;
        }
        needle_idx += take;
        pos = Position::new(pos.page_idx, pos.page_pos + take, pos.content_pos + take);
        if pos.page_pos == page_content.len() {
            pos = Position::new(pos.page_idx + 1, 0, pos.content_pos);
        }
    }
    true
}
