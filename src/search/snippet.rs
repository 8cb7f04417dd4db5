//! Highlighted snippet construction

use crate::lemma::Lemmatizer;
use std::collections::BTreeSet;
use unicode_segmentation::UnicodeSegmentation;

/// Separator between non-adjacent fragments
pub const ELLIPSIS: &str = "...";

/// Matched words closer than this many words apart form one run
const RUN_GAP: usize = 2;

/// Snippet sizing
#[derive(Debug, Clone, Copy)]
pub struct SnippetOptions {
    /// Visible characters allowed across all fragments, markup excluded
    pub max_chars: usize,

    /// Words of context kept on each side of a match run
    pub context_words: usize,
}

struct Word<'a> {
    start: usize,
    end: usize,
    text: &'a str,
    matched: bool,
}

/// Build a snippet of `text` with every query-lemma match wrapped in `<b>`
///
/// Returns an empty string when no word of `text` matches.
pub fn build_snippet(
    text: &str,
    query_lemmas: &BTreeSet<String>,
    lemmatizer: &Lemmatizer,
    options: SnippetOptions,
) -> String {
    let words: Vec<Word<'_>> = text
        .split_word_bound_indices()
        .filter(|(_, segment)| segment.chars().any(char::is_alphanumeric))
        .map(|(start, segment)| Word {
            start,
            end: start + segment.len(),
            text: segment,
            matched: lemmatizer
                .word_lemmas(segment)
                .iter()
                .any(|lemma| query_lemmas.contains(lemma)),
        })
        .collect();

    let windows = match_windows(&words, options.context_words);
    if windows.is_empty() {
        return String::new();
    }

    let mut budget = options.max_chars;
    let mut fragments = Vec::new();
    let mut truncated = false;
    for &(from, to) in &windows {
        let (fragment, cut) = render_window(text, &words[from..=to], &mut budget);
        if !fragment.is_empty() {
            fragments.push(fragment);
        }
        if cut {
            truncated = true;
            break;
        }
    }

    if fragments.is_empty() {
        return String::new();
    }

    let mut snippet = String::new();
    if windows[0].0 > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.push_str(&fragments.join(ELLIPSIS));
    let last_window_end = windows[fragments.len() - 1].1;
    if truncated || last_window_end + 1 < words.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

/// Word-index windows around match runs, merged where they overlap
fn match_windows(words: &[Word<'_>], context: usize) -> Vec<(usize, usize)> {
    let matches: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(_, w)| w.matched)
        .map(|(i, _)| i)
        .collect();
    let Some(&first) = matches.first() else {
        return Vec::new();
    };

    let mut runs = vec![(first, first)];
    for &i in &matches[1..] {
        let last = runs.len() - 1;
        if i - runs[last].1 <= RUN_GAP + 1 {
            runs[last].1 = i;
        } else {
            runs.push((i, i));
        }
    }

    let last_word = words.len() - 1;
    let mut windows: Vec<(usize, usize)> = Vec::new();
    for (start, end) in runs {
        let from = start.saturating_sub(context);
        let to = (end + context).min(last_word);
        match windows.last_mut() {
            Some(prev) if from <= prev.1 + 1 => prev.1 = prev.1.max(to),
            _ => windows.push((from, to)),
        }
    }
    windows
}

/// Render words with their original separators; stops when the budget runs out
fn render_window(text: &str, words: &[Word<'_>], budget: &mut usize) -> (String, bool) {
    let mut out = String::new();
    let mut prev_end: Option<usize> = None;

    for word in words {
        let gap = prev_end.map(|end| &text[end..word.start]).unwrap_or("");
        let cost = gap.chars().count() + word.text.chars().count();
        if cost > *budget {
            return (out, true);
        }
        *budget -= cost;

        out.push_str(gap);
        if word.matched {
            out.push_str("<b>");
            out.push_str(word.text);
            out.push_str("</b>");
        } else {
            out.push_str(word.text);
        }
        prev_end = Some(word.end);
    }

    (out, false)
}
