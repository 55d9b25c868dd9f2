//! Map a quoted fragment (usually copied by a model, so not always verbatim)
//! back to a byte range of the live buffer.

use std::ops::Range;

/// Quotes longer than this are anchored on their first `ANCHOR_CHARS` chars.
const ANCHOR_CHARS: usize = 20;
/// Longest prefix used to re-anchor a whitespace-normalized match.
const PREFIX_CHARS: usize = 10;
/// Bytes searched on either side of the normalized match index.
const WINDOW_BYTES: usize = 50;

/// Locate `quote` in `text`.
///
/// Tries, in order: the exact quote, the trimmed quote, the first 20 chars
/// of a long quote (tolerating a garbled tail), and finally a match that
/// treats every run of whitespace as a single space.  Returned ranges always
/// lie on char boundaries.  Empty or whitespace-only quotes never match.
pub fn find_range(text: &str, quote: &str) -> Option<Range<usize>> {
    let trimmed = quote.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(start) = text.find(quote) {
        return Some(start..start + quote.len());
    }
    if let Some(start) = text.find(trimmed) {
        return Some(start..start + trimmed.len());
    }

    if trimmed.chars().count() > ANCHOR_CHARS {
        let anchor = char_prefix(trimmed, ANCHOR_CHARS);
        if let Some(start) = text.find(anchor) {
            let end = floor_boundary(text, start + trimmed.len());
            return Some(start..end);
        }
    }

    normalized_match(text, trimmed)
}

fn normalized_match(text: &str, trimmed: &str) -> Option<Range<usize>> {
    let needle = collapse_whitespace(trimmed);
    let approx = collapse_whitespace(text).find(&needle)?;

    // Collapsing only ever shortens text, so `approx` is a lower bound on the
    // real offset; find the quote's leading token near it.  An earlier copy
    // of that token can sit closer to `approx` than the real match, so only a
    // candidate the whole quote walks from is accepted.
    let prefix = char_prefix(trimmed, PREFIX_CHARS)
        .split(char::is_whitespace)
        .next()
        .unwrap_or_default();
    let lo = floor_boundary(text, approx.saturating_sub(WINDOW_BYTES));
    let hi = floor_boundary(text, approx + WINDOW_BYTES + prefix.len());
    let mut candidates: Vec<usize> = text[lo..hi]
        .match_indices(prefix)
        .map(|(offset, _)| lo + offset)
        .collect();
    candidates.sort_by_key(|&candidate| candidate.abs_diff(approx));

    candidates
        .into_iter()
        .find_map(|start| span_end(text, start, trimmed).map(|end| start..end))
}

/// Walk `text` from `start`, matching `needle` with whitespace runs treated
/// as equal, and return the byte offset just past the match.
fn span_end(text: &str, start: usize, needle: &str) -> Option<usize> {
    let mut hay = text[start..].char_indices().peekable();
    let mut pins = needle.chars().peekable();
    let mut end = start;

    while let Some(pin) = pins.next() {
        if pin.is_whitespace() {
            while pins.next_if(|c| c.is_whitespace()).is_some() {}
            match hay.next() {
                Some((_, c)) if c.is_whitespace() => {}
                _ => return None,
            }
            while hay.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        } else {
            match hay.next() {
                Some((_, c)) if c == pin => {}
                _ => return None,
            }
        }
        end = hay.peek().map_or(text.len(), |&(offset, _)| start + offset);
    }
    Some(end)
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn char_prefix(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((offset, _)) => &s[..offset],
        None => s,
    }
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located<'a>(text: &'a str, quote: &str) -> Option<&'a str> {
        find_range(text, quote).map(|r| &text[r])
    }

    #[test]
    fn exact_match() {
        assert_eq!(find_range("The cat sat.", "cat"), Some(4..7));
    }

    #[test]
    fn trimmed_quote_matches() {
        assert_eq!(located("The cat sat.", "  cat sat \n"), Some("cat sat"));
    }

    #[test]
    fn long_quote_with_garbled_tail_anchors_on_prefix() {
        let text = "She opened the door slowly and stepped into the rain.";
        let quote = "She opened the door slowly and walked into a storm";
        let range = find_range(text, quote).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, quote.len());
    }

    #[test]
    fn anchored_end_is_clamped_to_text() {
        let text = "xx She opened the door slowly";
        let quote = "She opened the door slowly, then much more happened";
        assert_eq!(find_range(text, quote), Some(3..text.len()));
    }

    #[test]
    fn whitespace_normalized_match() {
        assert_eq!(located("Hello   world", "Hello world"), Some("Hello   world"));
    }

    #[test]
    fn whitespace_normalized_match_recovers_offset_after_collapsed_runs() {
        let text = "Intro.\n\n\n\n      Then   the\tstorm    broke over us.";
        assert_eq!(
            located(text, "the storm broke"),
            Some("the\tstorm    broke")
        );
    }

    #[test]
    fn whitespace_normalized_match_skips_nearer_copy_of_leading_word() {
        let text = format!("a the{}the  storm broke", " ".repeat(10));
        assert_eq!(located(&text, "the storm broke"), Some("the  storm broke"));
        assert_eq!(find_range(&text, "the storm broke"), Some(15..text.len()));
    }

    #[test]
    fn whitespace_normalized_match_without_a_verified_start_is_none() {
        let text = format!("x{}cat sat", " ".repeat(120));
        assert_eq!(located(&text, "x cat sat"), Some(text.as_str()));

        // Found once whitespace is collapsed, but the leading word sits
        // beyond the search window, so no start can be verified.
        let padded = format!("start{}the   end", " ".repeat(200));
        assert_eq!(find_range(&padded, "the end"), None);
    }

    #[test]
    fn multibyte_text_stays_on_boundaries() {
        let text = "Café  au lait, s'il vous plaît — merci beaucoup";
        assert_eq!(located(text, "Café au lait"), Some("Café  au lait"));
        let quote = "plaît — merci beaucoup et encore";
        let range = find_range(text, quote).unwrap();
        assert!(text.is_char_boundary(range.start) && text.is_char_boundary(range.end));
    }

    #[test]
    fn empty_and_missing_quotes_are_none() {
        assert_eq!(find_range("The cat sat.", ""), None);
        assert_eq!(find_range("The cat sat.", "  \n\t"), None);
        assert_eq!(find_range("The cat sat.", "dog"), None);
        assert_eq!(find_range("", "dog"), None);
    }

    #[test]
    fn repeated_calls_agree() {
        let text = "Hello   world, hello again";
        assert_eq!(find_range(text, "Hello world"), find_range(text, "Hello world"));
    }
}
