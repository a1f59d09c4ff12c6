use super::buffer::Buffer;

/// Separator appended after a split head and after the re-queued remainder.
pub(crate) const PARAGRAPH_BREAK: &str = "\n\n";

const ELLIPSIS: &str = "…";
const TERMINATORS: [char; 4] = ['.', '!', '?', '…'];

/// Collapse literal `". . ."` and `"..."` into a single ellipsis character.
pub fn normalize_ellipsis(text: &str) -> String {
    text.replace(". . .", ELLIPSIS).replace("...", ELLIPSIS)
}

/// Split `text` into sentences by scanning whitespace-delimited words and
/// closing a sentence on every word that ends with a terminator.
///
/// Inner whitespace collapses to single spaces; a trailing unterminated run
/// becomes the last sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut sentence = String::new();
    for word in text.split_whitespace() {
        if !sentence.is_empty() {
            sentence.push(' ');
        }
        sentence.push_str(word);
        if word.ends_with(&TERMINATORS[..]) {
            sentences.push(std::mem::take(&mut sentence));
        }
    }
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
    sentences
}

/// Move a head of whole sentences from `overflow` into `current`.
///
/// Sentences are taken while `current` stays below `optimal`; the first one
/// that would reach it starts the new overflow. When nothing fits and
/// `current` is empty the first sentence is taken anyway, so every call on a
/// non-empty overflow makes progress even if that sentence exceeds `max`.
pub(crate) fn split_overflow(overflow: &mut Buffer, current: &mut Buffer, optimal: usize) {
    let text = overflow.take();
    let mut sentences = split_sentences(&text).into_iter().peekable();

    let mut taken = 0usize;
    while let Some(sentence) = sentences.peek() {
        let len = sentence.chars().count();
        let fits = current.len() + len < optimal;
        let forced = taken == 0 && current.is_empty();
        if !fits && !forced {
            break;
        }
        current.push_str(sentence);
        current.push_str(" ");
        taken += 1;
        sentences.next();
        if !fits {
            break;
        }
    }
    if taken > 0 {
        current.trim_end();
        current.push_str(PARAGRAPH_BREAK);
    }

    let rest: Vec<String> = sentences.collect();
    if !rest.is_empty() {
        overflow.push_str(&rest.join(" "));
        overflow.push_str(PARAGRAPH_BREAK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipsis_variants_collapse() {
        assert_eq!(normalize_ellipsis("Wait. . . what..."), "Wait… what…");
        assert_eq!(normalize_ellipsis("no dots"), "no dots");
    }

    #[test]
    fn sentences_close_on_terminators() {
        let s = split_sentences("One two. Three!  Four?\nFive… six");
        assert_eq!(s, vec!["One two.", "Three!", "Four?", "Five…", "six"]);
    }

    #[test]
    fn abbreviations_close_sentences_too() {
        let s = split_sentences("Dr. Smith arrived.");
        assert_eq!(s, vec!["Dr.", "Smith arrived."]);
    }

    #[test]
    fn whitespace_only_text_has_no_sentences() {
        assert!(split_sentences(" \n\t ").is_empty());
    }

    #[test]
    fn head_stops_before_optimal() {
        let mut overflow = Buffer::from("Aaaa. Bbbb. Cccc. Dddd.");
        let mut current = Buffer::default();
        split_overflow(&mut overflow, &mut current, 12);
        assert_eq!(current.as_str(), "Aaaa. Bbbb.\n\n");
        assert_eq!(overflow.as_str(), "Cccc. Dddd.\n\n");
    }

    #[test]
    fn oversized_first_sentence_is_forced_into_empty_current() {
        let mut overflow = Buffer::from("A very long single sentence without end");
        let mut current = Buffer::default();
        split_overflow(&mut overflow, &mut current, 5);
        assert_eq!(current.as_str(), "A very long single sentence without end\n\n");
        assert!(overflow.is_empty());
    }

    #[test]
    fn nothing_moves_when_current_is_already_full() {
        let mut overflow = Buffer::from("Aaaa. Bbbb.");
        let mut current = Buffer::from("0123456789");
        split_overflow(&mut overflow, &mut current, 10);
        assert_eq!(current.as_str(), "0123456789");
        assert_eq!(overflow.as_str(), "Aaaa. Bbbb.\n\n");
    }
}
