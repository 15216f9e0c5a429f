//! Sentence splitting and sentence-grouped chunking of note text.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_SENTENCES: usize = 5;

/// Page separator emitted by most PDF-to-text extractors.
pub const PAGE_BREAK: char = '\u{0C}';

/// Lower-cased tokens that end in a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "e.g", "i.e", "cf", "al", "fig",
    "figs", "eq", "eqs", "no", "nos", "vol", "approx", "dept", "est", "inc", "ltd", "co", "corp",
    "ch", "sec", "pp", "ed", "eds", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept",
    "oct", "nov", "dec",
];

const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '\u{201D}', '\u{2019}', '\u{00BB}'];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteChunk {
    /// Position of the chunk within the whole run.
    pub index: usize,
    /// Source page the chunk was cut from.
    pub page: usize,
    pub text: String,
    pub sentences: Vec<String>,
}

/// Split `text` into chunks of at most `max_sentences` consecutive sentences.
pub fn chunk(text: &str, max_sentences: usize) -> Vec<NoteChunk> {
    chunk_page(text, 0, 0, max_sentences)
}

/// Chunk each page on its own so that no chunk straddles a page boundary.
pub fn chunk_pages<S: AsRef<str>>(pages: &[S], max_sentences: usize) -> Vec<NoteChunk> {
    let mut chunks = Vec::new();
    for (page, text) in pages.iter().enumerate() {
        let page_chunks = chunk_page(text.as_ref(), page, chunks.len(), max_sentences);
        chunks.extend(page_chunks);
    }
    chunks
}

/// Split extracted document text into pages on form feeds. A trailing empty
/// page left by a final separator is dropped.
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

fn chunk_page(text: &str, page: usize, first_index: usize, max_sentences: usize) -> Vec<NoteChunk> {
    let max_sentences = max_sentences.max(1);
    split_sentences(text)
        .chunks(max_sentences)
        .enumerate()
        .map(|(offset, group)| NoteChunk {
            index: first_index + offset,
            page,
            text: group.join(" "),
            sentences: group.to_vec(),
        })
        .collect()
}

/// Rule-based sentence boundary detection for English prose.
///
/// A boundary is a run of `.`, `!` or `?` (plus any closing quotes or
/// brackets) followed by whitespace, or a blank line. A lone period does not
/// end a sentence after a known abbreviation, a single-letter initial, a
/// dotted token such as `U.S`, a list number opening the sentence, or when
/// the next word starts in lower case.
/// Whitespace inside each sentence is collapsed to single spaces.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i].1;

        if ch == '\n' && is_paragraph_break(&chars, i) {
            push_sentence(&mut sentences, &text[start..chars[i].0]);
            while i < chars.len() && chars[i].1.is_whitespace() {
                i += 1;
            }
            start = chars.get(i).map_or(text.len(), |&(offset, _)| offset);
            continue;
        }

        if is_terminator(ch) {
            let term = i;
            let mut j = i + 1;
            while j < chars.len() && is_terminator(chars[j].1) {
                j += 1;
            }
            while j < chars.len() && CLOSERS.contains(&chars[j].1) {
                j += 1;
            }

            if j >= chars.len() {
                push_sentence(&mut sentences, &text[start..]);
                start = text.len();
            } else if chars[j].1.is_whitespace() && ends_sentence(text, &chars, start, term, j) {
                let end = chars[j].0;
                push_sentence(&mut sentences, &text[start..end]);
                start = end;
            }
            i = j;
            continue;
        }

        i += 1;
    }

    if start < text.len() {
        push_sentence(&mut sentences, &text[start..]);
    }
    sentences
}

fn is_terminator(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '\u{2026}')
}

fn is_paragraph_break(chars: &[(usize, char)], newline: usize) -> bool {
    chars[newline + 1..]
        .iter()
        .take_while(|(_, c)| c.is_whitespace())
        .any(|&(_, c)| c == '\n')
}

fn ends_sentence(text: &str, chars: &[(usize, char)], start: usize, term: usize, after: usize) -> bool {
    let lone_period = chars[term].1 == '.' && !chars.get(term + 1).is_some_and(|&(_, c)| is_terminator(c));
    if !lone_period {
        return true;
    }

    let next_word = chars[after..].iter().map(|&(_, c)| c).find(|c| !c.is_whitespace());
    if next_word.is_some_and(char::is_lowercase) {
        return false;
    }

    let word_start = chars[..term]
        .iter()
        .rposition(|&(_, c)| c.is_whitespace())
        .map_or(0, |p| p + 1);
    let word_offset = chars[word_start].0.max(start);
    let word = text[word_offset..chars[term].0].trim_start_matches(|c: char| !c.is_alphanumeric());
    if word.is_empty() {
        return true;
    }
    // "1." opening a sentence is a list marker for the text that follows.
    if word.chars().all(|c| c.is_ascii_digit()) && text[start..word_offset].trim().is_empty() {
        return false;
    }

    let lower = word.to_lowercase();
    if ABBREVIATIONS.contains(&lower.as_str()) {
        return false;
    }
    let mut letters = word.chars();
    if matches!((letters.next(), letters.next()), (Some(c), None) if c.is_alphabetic()) {
        return false;
    }
    !word.contains('.')
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let sentence = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
}
