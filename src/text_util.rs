use once_cell::sync::Lazy;
use regex::Regex;

/// Parenthesised emoticons such as `(・∀・)` or `（＾▽＾）`.
static KAOMOJI_PAREN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[(（](?:[^\p{L}\p{N}\s()（）]|[ωдДεσっﾟᴗ]){2,12}[)）]").expect("valid regex")
});

/// Bare eye-mouth-eye emoticons such as `^_^` or `>_<`.
static KAOMOJI_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\^[_\-ωo]?\^|[>＞][_\-ω＿][<＜]|;_;|-_-|=_=").expect("valid regex"));

static PUNCT_OR_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{P}\s]").expect("valid regex"));

/// Minimum number of non-punctuation, non-whitespace characters in a sentence.
const MIN_SUBSTANCE: usize = 2;

fn is_sentence_punct(ch: char) -> bool {
    matches!(ch, '.' | ',' | '!' | '?' | ';' | ':' | '\'' | '"' | '-')
}

fn paren_matches(text: &str) -> impl Iterator<Item = regex::Match<'_>> {
    KAOMOJI_PAREN.find_iter(text).filter(|m| {
        let s = m.as_str();
        let inner = &s[s.chars().next().map_or(0, char::len_utf8)..];
        !inner
            .trim_end_matches([')', '）'])
            .chars()
            .all(is_sentence_punct)
    })
}

/// Returns `true` if `text` holds a kaomoji.
///
/// ```
/// use murmur_rs::text_util::contains_kaomoji;
///
/// assert!(contains_kaomoji("好的(・_・)"));
/// assert!(!contains_kaomoji("see (above)"));
/// ```
pub fn contains_kaomoji(text: &str) -> bool {
    paren_matches(text).next().is_some() || KAOMOJI_BARE.is_match(text)
}

/// Remove every kaomoji from `text`.
pub fn strip_kaomoji(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in paren_matches(text) {
        out.push_str(&text[last..m.start()]);
        last = m.end();
    }
    out.push_str(&text[last..]);
    KAOMOJI_BARE.replace_all(&out, "").into_owned()
}

/// The speakable form of a raw sentence buffer: trimmed, kaomoji removed.
pub fn speakable(buffer: &str) -> String {
    strip_kaomoji(buffer.trim()).trim().to_string()
}

/// Count of characters left once punctuation and whitespace are removed.
fn substance(text: &str) -> usize {
    PUNCT_OR_SPACE.replace_all(text, "").chars().count()
}

/// Whether `text` is worth speaking as a sentence of its own.
///
/// The trimmed text must be at least `min_len` characters long and keep at
/// least two characters once punctuation and whitespace are removed.
pub fn is_substantial(text: &str, min_len: usize) -> bool {
    text.trim().chars().count() >= min_len && substance(text) >= MIN_SUBSTANCE
}

/// Whether `text` contains anything besides punctuation and whitespace.
pub fn has_speech(text: &str) -> bool {
    substance(text) > 0
}
