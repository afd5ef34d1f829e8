// Change notification: coalescing and muting around a `content_len`
// delta. See spec §4.10.

/// Accumulated `{orig_size, n_added, n_deleted}` since the last delivered
/// change event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeInfo {
    pub orig_size: usize,
    pub n_added: usize,
    pub n_deleted: usize,
}

impl ChangeInfo {
    fn is_empty(&self) -> bool {
        self.n_added == 0 && self.n_deleted == 0
    }
}

pub type ChangeCallback = Box<dyn FnMut(&ChangeInfo) + Send>;

/// The per-buffer change-notification state machine. Owns the callback,
/// the pending delta, and the independent mute/coalesce depth counters.
/// Delivery requires both depths to be zero (spec §4.10).
#[derive(Default)]
pub(crate) struct ChangeTracker {
    callback: Option<ChangeCallback>,
    info: ChangeInfo,
    coalesce_depth: u32,
    mute_depth: u32,
}

impl ChangeTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_callback(&mut self, cb: ChangeCallback, current_content_len: usize) {
        self.callback = Some(cb);
        self.info = ChangeInfo { orig_size: current_content_len, n_added: 0, n_deleted: 0 };
    }

    pub(crate) fn clear_callback(&mut self) {
        self.callback = None;
        self.info = ChangeInfo::default();
    }

    pub(crate) fn on_added(&mut self, n: usize) {
        if n == 0 || self.callback.is_none() {
            return;
        }
        if self.mute_depth == 0 {
            self.info.n_added += n;
            self.maybe_deliver();
        }
    }

    pub(crate) fn on_deleted(&mut self, n: usize) {
        if n == 0 || self.callback.is_none() {
            return;
        }
        if self.mute_depth == 0 {
            self.info.n_deleted += n;
            self.maybe_deliver();
        }
    }

    pub(crate) fn begin_coalescing(&mut self) {
        self.coalesce_depth += 1;
    }

    pub(crate) fn end_coalescing(&mut self) {
        debug_assert!(self.coalesce_depth > 0, "end_coalescing without matching begin_coalescing");
        self.coalesce_depth = self.coalesce_depth.saturating_sub(1);
        if self.coalesce_depth == 0 {
            self.maybe_deliver();
        }
    }

    pub(crate) fn mute(&mut self) {
        self.mute_depth += 1;
    }

    pub(crate) fn unmute(&mut self) {
        debug_assert!(self.mute_depth > 0, "unmute without matching mute");
        self.mute_depth = self.mute_depth.saturating_sub(1);
        if self.mute_depth == 0 {
            self.maybe_deliver();
        }
    }

    fn maybe_deliver(&mut self) {
        if self.coalesce_depth != 0 || self.mute_depth != 0 || self.info.is_empty() {
            return;
        }
        if let Some(cb) = self.callback.as_mut() {
            let new_orig_size = (self.info.orig_size + self.info.n_added)
                .saturating_sub(self.info.n_deleted);
            cb(&self.info);
            self.info = ChangeInfo { orig_size: new_orig_size, n_added: 0, n_deleted: 0 };
        }
    }
}
