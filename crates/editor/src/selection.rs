use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Where the floating toolbar for a selection should appear.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenAnchor {
    pub top: f32,
    pub left: f32,
}

/// A captured span of the buffer.  `text` is what `start..end` held at
/// capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<ScreenAnchor>,
}

impl Selection {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// True once `buffer` no longer holds the captured text at the captured
    /// offsets.  Check right before applying anything keyed off this span.
    pub fn is_stale(&self, buffer: &str) -> bool {
        buffer.get(self.range()) != Some(self.text.as_str())
    }

    /// `buffer` with the selected span replaced.  Callers check
    /// [`is_stale`](Self::is_stale) first.
    pub fn splice(&self, buffer: &str, replacement: &str) -> String {
        let mut out = String::with_capacity(buffer.len() - self.text.len() + replacement.len());
        out.push_str(&buffer[..self.start]);
        out.push_str(replacement);
        out.push_str(&buffer[self.end..]);
        out
    }
}

#[derive(Debug, Default)]
pub struct SelectionTracker {
    current: Option<Selection>,
}

impl SelectionTracker {
    /// Record the span `start..end` of `buffer` (in either order).  An empty
    /// span, or one that is out of bounds or splits a char, clears the
    /// selection instead.
    pub fn capture(
        &mut self,
        buffer: &str,
        start: usize,
        end: usize,
        anchor: Option<ScreenAnchor>,
    ) -> Option<&Selection> {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.current = match buffer.get(start..end) {
            Some(text) if !text.is_empty() => Some(Selection {
                start,
                end,
                text: text.to_string(),
                anchor,
            }),
            _ => None,
        };
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&Selection> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Stale check against `buffer`; false when nothing is selected.
    pub fn is_stale(&self, buffer: &str) -> bool {
        self.current.as_ref().is_some_and(|sel| sel.is_stale(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_slices_the_buffer() {
        let mut tracker = SelectionTracker::default();
        let anchor = ScreenAnchor { top: 10.0, left: 4.0 };
        let sel = tracker.capture("The cat sat.", 4, 7, Some(anchor)).unwrap();
        assert_eq!(sel.text, "cat");
        assert_eq!(sel.anchor, Some(anchor));
    }

    #[test]
    fn reversed_span_is_normalized() {
        let mut tracker = SelectionTracker::default();
        let sel = tracker.capture("The cat sat.", 7, 4, None).unwrap();
        assert_eq!(sel.range(), 4..7);
    }

    #[test]
    fn empty_or_invalid_span_clears() {
        let mut tracker = SelectionTracker::default();
        tracker.capture("The cat sat.", 4, 7, None);
        assert!(tracker.capture("The cat sat.", 5, 5, None).is_none());
        assert!(tracker.current().is_none());

        tracker.capture("The cat sat.", 4, 7, None);
        assert!(tracker.capture("The cat sat.", 4, 99, None).is_none());
        // Splits the two-byte "é".
        assert!(tracker.capture("café", 0, 4, None).is_none());
    }

    #[test]
    fn staleness_follows_the_buffer() {
        let mut tracker = SelectionTracker::default();
        tracker.capture("The cat sat.", 4, 7, None);
        assert!(!tracker.is_stale("The cat sat."));
        assert!(!tracker.is_stale("The cat ran."));
        assert!(tracker.is_stale("The dog sat."));
        assert!(tracker.is_stale("The"));

        tracker.clear();
        assert!(!tracker.is_stale("anything"));
    }

    #[test]
    fn splice_replaces_the_span() {
        let sel = Selection {
            start: 4,
            end: 7,
            text: "cat".into(),
            anchor: None,
        };
        assert_eq!(sel.splice("The cat sat.", "tabby"), "The tabby sat.");
    }
}
