//! Snippet extraction: the highest term-density window that overlaps the
//! query terms, with matches wrapped in unambiguous `[[`/`]]` delimiters.

/// Build a snippet for `text`. Returns `None` when no query term occurs.
pub fn generate(text: &str, query_terms: &[String], max_chars: usize) -> Option<String> {
    if text.is_empty() || query_terms.is_empty() || max_chars == 0 {
        return None;
    }

    // Word positions with original spans.
    let words: Vec<(usize, &str)> = split_words(text);
    if words.is_empty() {
        return None;
    }

    let is_match = |word: &str| -> bool {
        let lower = word.to_lowercase();
        query_terms.iter().any(|t| lower.contains(t.as_str()))
    };

    // Slide a window over words; score = number of matching words inside
    // the character budget. First-best wins, keeping this deterministic.
    let mut best: Option<(usize, usize, usize)> = None; // (score, start, end)
    for start in 0..words.len() {
        let window_start = words[start].0;
        let mut matches = 0;
        let mut end = start;
        for (offset, (byte_pos, word)) in words[start..].iter().enumerate() {
            if byte_pos + word.len() - window_start > max_chars {
                break;
            }
            if is_match(word) {
                matches += 1;
            }
            end = start + offset;
        }
        if matches > 0 && best.map_or(true, |(s, _, _)| matches > s) {
            best = Some((matches, start, end));
        }
    }

    let (_, start, end) = best?;
    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    for (i, (_, word)) in words[start..=end].iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if is_match(word) {
            out.push_str("[[");
            out.push_str(word);
            out.push_str("]]");
        } else {
            out.push_str(word);
        }
    }
    if end + 1 < words.len() {
        out.push('…');
    }
    Some(out)
}

fn split_words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    for (index, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                words.push((s, &text[s..index]));
            }
        } else if start.is_none() {
            start = Some(index);
        }
    }
    if let Some(s) = start {
        words.push((s, &text[s..]));
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn highlights_matches() {
        let snippet = generate("hello world of search", &terms(&["world"]), 100).unwrap();
        assert_eq!(snippet, "hello [[world]] of search");
    }

    #[test]
    fn no_match_no_snippet() {
        assert!(generate("nothing relevant here", &terms(&["absent"]), 100).is_none());
    }

    #[test]
    fn picks_densest_window() {
        let text = "filler filler filler alpha beta gamma filler filler filler filler filler \
                    filler filler filler alpha filler";
        let snippet = generate(text, &terms(&["alpha", "beta", "gamma"]), 30).unwrap();
        assert!(snippet.contains("[[alpha]] [[beta]] [[gamma]]"), "{snippet}");
    }

    #[test]
    fn window_respects_budget() {
        let text = "word ".repeat(200) + "needle";
        let snippet = generate(&text, &terms(&["needle"]), 40).unwrap();
        // Delimiters and ellipses excluded, the window body stays bounded.
        let body: String = snippet.replace("[[", "").replace("]]", "").replace('…', "");
        assert!(body.len() <= 48, "body {} chars", body.len());
        assert!(snippet.contains("[[needle]]"));
    }

    #[test]
    fn marks_edges_with_ellipses() {
        let text = "one two three four five six seven eight nine ten";
        let snippet = generate(text, &terms(&["five"]), 15).unwrap();
        assert!(snippet.starts_with('…'));
        assert!(snippet.ends_with('…'));
    }

    #[test]
    fn case_insensitive_matching() {
        let snippet = generate("The Quarry Engine", &terms(&["quarry"]), 50).unwrap();
        assert!(snippet.contains("[[Quarry]]"));
    }

    #[test]
    fn deterministic() {
        let text = "alpha beta alpha beta alpha";
        let a = generate(text, &terms(&["alpha"]), 20);
        let b = generate(text, &terms(&["alpha"]), 20);
        assert_eq!(a, b);
    }
}
