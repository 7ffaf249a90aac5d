//! Degradation ladder for writes that hit the storage capacity limit.
//!
//! Each step is a pure function from the entries we tried to write to a
//! smaller set. The entry store walks [`Degradation::LADDER`] in order,
//! re-attempting the write after every applied step, until a write fits or
//! no step can shrink the data any further.

use std::cmp::Reverse;
use std::collections::HashSet;

use crate::models::Entry;

/// One way to shrink the local data set, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    /// Replace inline media payloads with `None`
    StripInlineMedia,
    /// Drop the single oldest entry; repeats while more than one remains
    DropOldest,
    /// Drop everything
    Clear,
}

impl Degradation {
    /// The ladder, mildest step first.
    pub const LADDER: [Self; 3] = [Self::StripInlineMedia, Self::DropOldest, Self::Clear];

    pub const fn label(self) -> &'static str {
        match self {
            Self::StripInlineMedia => "strip_inline_media",
            Self::DropOldest => "drop_oldest",
            Self::Clear => "clear",
        }
    }

    /// Apply this step, or `None` when it cannot shrink `entries`.
    pub fn apply(self, entries: &[Entry]) -> Option<Vec<Entry>> {
        match self {
            Self::StripInlineMedia => {
                if !entries.iter().any(Entry::has_inline_media) {
                    return None;
                }
                Some(
                    entries
                        .iter()
                        .cloned()
                        .map(|mut entry| {
                            entry.strip_inline_media();
                            entry
                        })
                        .collect(),
                )
            }
            Self::DropOldest => {
                if entries.len() <= 1 {
                    return None;
                }
                let (oldest, _) = entries
                    .iter()
                    .enumerate()
                    .min_by_key(|(index, entry)| (entry.modified_at(), Reverse(*index)))?;
                let mut remaining = entries.to_vec();
                remaining.remove(oldest);
                Some(remaining)
            }
            Self::Clear => {
                if entries.is_empty() {
                    None
                } else {
                    Some(Vec::new())
                }
            }
        }
    }
}

/// What the ladder discarded to make a write fit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// Entries whose inline media was removed
    pub stripped_media: Vec<String>,
    /// Entries dropped entirely
    pub dropped: Vec<String>,
}

impl PersistReport {
    pub fn is_empty(&self) -> bool {
        self.stripped_media.is_empty() && self.dropped.is_empty()
    }

    /// Record the difference between `before` and `after` for `step`.
    pub fn record(&mut self, step: Degradation, before: &[Entry], after: &[Entry]) {
        match step {
            Degradation::StripInlineMedia => {
                self.stripped_media.extend(
                    before
                        .iter()
                        .filter(|entry| entry.has_inline_media())
                        .map(|entry| entry.id.clone()),
                );
            }
            Degradation::DropOldest | Degradation::Clear => {
                let kept: HashSet<&str> = after.iter().map(|entry| entry.id.as_str()).collect();
                self.dropped.extend(
                    before
                        .iter()
                        .filter(|entry| !kept.contains(entry.id.as_str()))
                        .map(|entry| entry.id.clone()),
                );
            }
        }
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.stripped_media.extend(other.stripped_media);
        self.dropped.extend(other.dropped);
    }
}
