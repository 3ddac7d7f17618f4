// Caption segmentation for phrase-level highlight sync. A chunk closes on
// trailing punctuation once it is long enough to read as a beat, on the
// caption's final word, or at the hard word cap. Whitespace runs collapse.

use crate::types::Phrase;

/// Minimum words in a chunk before trailing punctuation may close it.
const MIN_WORDS_FOR_PUNCT_BREAK: usize = 3;
/// A punctuation close also requires the chunk to exceed this many characters.
const MIN_CHARS_FOR_PUNCT_BREAK: usize = 15;
/// A chunk never grows past this many words.
const MAX_WORDS_PER_PHRASE: usize = 6;

const BREAK_PUNCTUATION: [char; 6] = ['.', ',', '!', '?', ';', ':'];

/// Split a caption into the phrases the highlight walks through during
/// narration. Deterministic; empty and whitespace-only captions yield no
/// phrases. Joining the result with single spaces reconstructs the
/// whitespace-normalized caption.
pub fn segment_caption(caption: &str) -> Vec<Phrase> {
    let words: Vec<&str> = caption.split_whitespace().collect();
    let mut phrases = Vec::new();
    let mut chunk = String::new();
    let mut chunk_words = 0usize;
    let mut chunk_chars = 0usize;

    for (i, word) in words.iter().enumerate() {
        if !chunk.is_empty() {
            chunk.push(' ');
            chunk_chars += 1;
        }
        chunk.push_str(word);
        chunk_words += 1;
        chunk_chars += word.chars().count();

        let punct_close = chunk_words >= MIN_WORDS_FOR_PUNCT_BREAK
            && chunk_chars > MIN_CHARS_FOR_PUNCT_BREAK
            && ends_with_break_punctuation(word);
        let is_final_word = i == words.len() - 1;

        if punct_close || is_final_word || chunk_words >= MAX_WORDS_PER_PHRASE {
            phrases.push(Phrase::new(std::mem::take(&mut chunk)));
            chunk_words = 0;
            chunk_chars = 0;
        }
    }

    phrases
}

fn ends_with_break_punctuation(word: &str) -> bool {
    word.chars()
        .last()
        .map(|c| BREAK_PUNCTUATION.contains(&c))
        .unwrap_or(false)
}
