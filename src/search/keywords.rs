use regex::Regex;
use std::sync::LazyLock;

/// Words that carry no topical signal in a code-search query.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "this", "that", "are", "with", "what", "from", "how", "where", "when",
    "who", "why", "which",
];

/// Returned by [`extract_query_keyword`] when the query has no keywords.
pub const FALLBACK_KEYWORD: &str = "query";

const MIN_KEYWORD_CHARS: usize = 3;

/// Split a query into lowercase keywords, in query order.
///
/// Punctuation is stripped from each token; tokens shorter than three
/// characters and stop words are dropped. Duplicates are kept.
pub fn extract_keywords(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(strip_punctuation)
        .filter(|word| word.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|word| !is_stop_word(word))
        .collect()
}

/// The longest keyword in the query (first wins on ties), for naming output.
pub fn extract_query_keyword(query: &str) -> String {
    let mut longest: Option<String> = None;
    for kw in extract_keywords(query) {
        let longer = match &longest {
            None => true,
            Some(cur) => kw.chars().count() > cur.chars().count(),
        };
        if longer {
            longest = Some(kw);
        }
    }
    longest.unwrap_or_else(|| FALLBACK_KEYWORD.to_string())
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Unicode punctuation (general category P*).
///
/// Symbols such as `+`, `$` or `|` are category S and are kept.
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{P}").expect("punctuation pattern is valid"));

fn strip_punctuation(word: &str) -> String {
    PUNCTUATION.replace_all(word, "").into_owned()
}
