//! Decoded-picture-buffer model.
//!
//! Tracks which emitted frames the downstream encoder still holds. Only
//! explicitly kept frames live here; the short-term sliding window is the
//! encoder's own business.

use crate::frame::Frame;

/// A retained frame: display order plus the flags eviction cares about.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DpbEntry {
    pub poc: u32,
    pub ltr: bool,
}

/// Which retained frames an eviction pass targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictCriterion {
    /// Any long-term reference (or key P occupying the LTR slot).
    AnyLtr,
}

#[derive(Debug, Default)]
pub(crate) struct Dpb {
    entries: Vec<DpbEntry>,
}

impl Dpb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict the first entry matching `criterion`, recording the eviction on
    /// `f` so the host encoder performs it when `f` is coded.
    pub fn evict_matching(&mut self, f: &mut Frame, criterion: EvictCriterion) {
        let matches = |entry: &DpbEntry| match criterion {
            EvictCriterion::AnyLtr => entry.ltr,
        };
        if let Some(pos) = self.entries.iter().position(matches) {
            f.remove_from_dpb.push(self.entries[pos].poc);
            self.entries.remove(pos);
        }
    }

    /// Retain `f` beyond its natural lifetime.
    pub fn keep(&mut self, f: &mut Frame) {
        f.keep_in_dpb = true;
        self.entries.push(DpbEntry {
            poc: f.poc,
            ltr: f.ltr,
        });
    }

    /// Display order of the retained LTR, if one exists.
    pub fn ltr_poc(&self) -> Option<u32> {
        self.entries.iter().find(|entry| entry.ltr).map(|entry| entry.poc)
    }
}
