//! Small text helpers shared by the fetchers and the formatter.

/// Appended to a document chunk that was cut short.
pub const CONTINUATION_MARKER: &str = " [...]";

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "all", "any", "can", "had", "her",
    "was", "one", "our", "out", "has", "have", "him", "his", "how", "its", "let", "may", "who",
    "did", "get", "got", "she", "too", "use", "that", "this", "with", "from", "they", "them",
    "then", "than", "what", "when", "where", "which", "will", "would", "could", "should", "been",
    "being", "were", "there", "their", "about", "into", "just", "like", "some", "such", "very",
    "also", "much", "more", "most", "over", "only", "really", "want", "need", "feel", "feeling",
    "think", "know", "today", "i'm", "it's", "don't", "im", "dont",
];

/// Whether `word` carries no topical signal.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lower-cased words of `text`, split on anything that is not alphanumeric
/// or an apostrophe.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Distinct topical keywords of `text`, in first-seen order.
///
/// Words shorter than three characters and stopwords are dropped.
pub fn keywords(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in words(text) {
        if word.chars().count() >= 3 && !is_stopword(&word) && !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

/// The longest prefix of `s` that is at most `max` bytes and ends on a
/// char boundary.
pub fn prefix_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Cut `s` to at most `max` bytes, preferring to end just after the last
/// `.` of the allowed prefix. Returns the cut text and whether anything
/// was removed.
pub fn truncate_at_sentence(s: &str, max: usize) -> (&str, bool) {
    if s.len() <= max {
        return (s, false);
    }
    let prefix = prefix_at_boundary(s, max);
    match prefix.rfind('.') {
        Some(i) => (&prefix[..=i], true),
        None => (prefix, true),
    }
}

/// Chunk document content to `max_chars`.
///
/// Content that fits is returned unchanged. Longer content becomes a prefix
/// of the input followed by [`CONTINUATION_MARKER`]; the prefix ends at the
/// last sentence break when that break lies in the second half of the
/// allowed span.
pub fn chunk(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        return content.to_string();
    }
    let prefix = prefix_at_boundary(content, max_chars);
    let cut = match prefix.rfind('.') {
        Some(i) if i + 1 > prefix.len() / 2 => &prefix[..=i],
        _ => prefix,
    };
    format!("{}{CONTINUATION_MARKER}", cut.trim_end())
}
