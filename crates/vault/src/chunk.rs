//! Paragraph-boundary text fragmenter.
//!
//! Splits extracted item text into [`Fragment`]s that respect a
//! configurable character cap. Splitting occurs on paragraph boundaries
//! (`\n\n`) to preserve semantic coherence; a single oversized paragraph
//! is hard-split at the nearest newline or space.

use uuid::Uuid;

use vault_core::models::Fragment;

/// Split text into fragments on paragraph boundaries.
///
/// Fragments carry contiguous sequence indices starting at 0. Empty or
/// whitespace-only input produces no fragments; anything else produces at
/// least one.
pub fn fragment_text(item_id: &str, text: &str, max_chars: usize) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut buf = String::new();
    let mut seq: i64 = 0;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            fragments.push(make_fragment(item_id, seq, &buf));
            seq += 1;
            buf.clear();
        }

        if trimmed.len() > max_chars {
            if !buf.is_empty() {
                fragments.push(make_fragment(item_id, seq, &buf));
                seq += 1;
                buf.clear();
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let cut = split_point(remaining, max_chars);
                let piece = remaining[..cut].trim();
                if !piece.is_empty() {
                    fragments.push(make_fragment(item_id, seq, piece));
                    seq += 1;
                }
                remaining = &remaining[cut..];
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() {
        fragments.push(make_fragment(item_id, seq, &buf));
    }

    fragments
}

/// Pick a split index ≤ `max_chars`, preferring a newline or space, and
/// always landing on a UTF-8 char boundary with forward progress.
fn split_point(s: &str, max_chars: usize) -> usize {
    if s.len() <= max_chars {
        return s.len();
    }
    let mut cut = max_chars;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let soft = s[..cut]
        .rfind('\n')
        .or_else(|| s[..cut].rfind(' '))
        .map(|pos| pos + 1)
        .unwrap_or(cut);
    let soft = if soft == 0 { cut } else { soft };
    if soft == 0 {
        // Degenerate case: advance one full character.
        s.char_indices()
            .nth(1)
            .map(|(i, _)| i)
            .unwrap_or(s.len())
    } else {
        soft
    }
}

fn make_fragment(item_id: &str, seq: i64, text: &str) -> Fragment {
    Fragment {
        id: Uuid::new_v4().to_string(),
        item_id: item_id.to_string(),
        seq,
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_fragment() {
        let frags = fragment_text("item1", "Hello, world!", 500);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].seq, 0);
        assert_eq!(frags[0].text, "Hello, world!");
        assert_eq!(frags[0].item_id, "item1");
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(fragment_text("item1", "", 500).is_empty());
        assert!(fragment_text("item1", "  \n\n  ", 500).is_empty());
    }

    #[test]
    fn test_paragraphs_accumulate_under_cap() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let frags = fragment_text("item1", text, 500);
        assert_eq!(frags.len(), 1);
        assert!(frags[0].text.contains("First paragraph."));
        assert!(frags[0].text.contains("Third paragraph."));
    }

    #[test]
    fn test_sequence_indices_contiguous() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {i} with some length to it."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let frags = fragment_text("item1", &text, 90);
        assert!(frags.len() > 1);
        for (i, f) in frags.iter().enumerate() {
            assert_eq!(f.seq, i as i64);
        }
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        let text = "word ".repeat(200);
        let frags = fragment_text("item1", text.trim(), 100);
        assert!(frags.len() > 1);
        for f in &frags {
            assert!(f.text.len() <= 100);
            assert!(!f.text.is_empty());
        }
    }

    #[test]
    fn test_multibyte_input_splits_on_char_boundaries() {
        let text = "ñandú ".repeat(100);
        let frags = fragment_text("item1", text.trim(), 50);
        assert!(!frags.is_empty());
        // Reassembled text loses only whitespace.
        let total: usize = frags.iter().map(|f| f.text.chars().count()).sum();
        assert!(total > 0);
    }
}
