//! Text chunking for synthesis.
//!
//! Splits input text into chunks no longer than the configured limit,
//! preferring sentence boundaries so the synthesized speech does not
//! break mid-sentence. A single sentence longer than the limit is
//! hard-split on whitespace.

/// Split `text` into synthesis chunks of at most `max_chars` characters.
///
/// Whitespace-only input yields no chunks.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences(text) {
        if sentence.len() > max_chars {
            // Flush what we have, then hard-split the oversized sentence.
            push_chunk(&mut chunks, &mut current);
            for piece in hard_split(&sentence, max_chars) {
                chunks.push(piece);
            }
            continue;
        }

        if !current.is_empty() && current.len() + 1 + sentence.len() > max_chars {
            push_chunk(&mut chunks, &mut current);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }

    push_chunk(&mut chunks, &mut current);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        chunks.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Split text into sentences on terminal punctuation and blank lines.
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch == '\n' {
            if !current.trim().is_empty() {
                current.push(' ');
            }
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | ';') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    out
}

/// Split an oversized sentence on whitespace into pieces of at most
/// `max_chars`; a single oversized word is split at the limit.
fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for word in sentence.split_whitespace() {
        if word.len() > max_chars {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                out.push(piece.iter().collect());
            }
            continue;
        }
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}
