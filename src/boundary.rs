use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;

/// Number of trailing characters kept for decimal-point disambiguation.
pub const CONTEXT_WINDOW_CAPACITY: usize = 20;

/// A decimal match must end this close to the window end to neutralise a `.`.
const DECIMAL_TAIL: usize = 3;

static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+\.[0-9]+").expect("valid regex"));

static SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{So}\p{Sk}\p{Sm}]$").expect("valid regex"));

/// How a single character affects the sentence currently being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Terminal punctuation or a newline. Ends the sentence regardless of length.
    Strong,
    /// Pause punctuation or an emoji. Ends the sentence once it is long enough.
    Soft,
    /// Everything else.
    Neutral,
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub boundary: Boundary,
    /// The character is a single-character emoji (`So`, `Sk` or `Sm`).
    pub emoji: bool,
}

impl Classification {
    fn of(boundary: Boundary) -> Self {
        Self {
            boundary,
            emoji: false,
        }
    }
}

/// Bounded ring of the most recently seen characters.
#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    chars: VecDeque<char>,
}

impl ContextWindow {
    pub fn new() -> Self {
        Self {
            chars: VecDeque::with_capacity(CONTEXT_WINDOW_CAPACITY),
        }
    }

    /// Append `ch`, dropping the oldest character once the window is full.
    pub fn push(&mut self, ch: char) {
        if self.chars.len() == CONTEXT_WINDOW_CAPACITY {
            self.chars.pop_front();
        }
        self.chars.push_back(ch);
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The character seen before the most recent one.
    pub fn previous(&self) -> Option<char> {
        self.chars.iter().rev().nth(1).copied()
    }

    pub fn clear(&mut self) {
        self.chars.clear();
    }

    /// True when the window holds a `\d+\.\d+` literal ending near its tail.
    /// Whether a `\d+\.\d+` literal ends within the last few characters.
    pub fn ends_in_decimal(&self) -> bool {
        let text: String = self.chars.iter().collect();
        let total = self.chars.len();
        DECIMAL.find_iter(&text).any(|m| {
            let end = text[..m.end()].chars().count();
            end + DECIMAL_TAIL >= total
        })
    }
}

fn is_end_mark(ch: char) -> bool {
    matches!(ch, '。' | '！' | '？' | '!' | '?')
}

/// A `.` inside a number such as `0.271`.
fn is_decimal_point(ch: char, window: &ContextWindow) -> bool {
    ch == '.' && window.ends_in_decimal()
}

fn is_newline(ch: char) -> bool {
    matches!(ch, '\n' | '\r')
}

fn is_pause_mark(ch: char) -> bool {
    matches!(ch, '，' | '、' | '；' | ',' | ';')
}

fn is_special_mark(ch: char) -> bool {
    matches!(ch, '：' | ':' | '"')
}

/// Whether `ch` belongs to the Unicode symbol categories `So`, `Sk` or `Sm`.
pub fn is_emoji(ch: char) -> bool {
    if ch.is_ascii() {
        return matches!(ch, '+' | '<' | '=' | '>' | '|' | '~' | '^' | '`');
    }
    let mut buf = [0u8; 4];
    SYMBOL.is_match(ch.encode_utf8(&mut buf))
}

/// Classify `ch`, which must already have been pushed onto `window`.
///
/// ```
/// use murmur_rs::boundary::{classify, Boundary, ContextWindow};
///
/// let mut window = ContextWindow::new();
/// for ch in "ok?".chars() {
///     window.push(ch);
/// }
/// assert_eq!(classify('?', &window).boundary, Boundary::Strong);
/// ```
pub fn classify(ch: char, window: &ContextWindow) -> Classification {
    if is_newline(ch) {
        return Classification::of(Boundary::Strong);
    }
    if is_decimal_point(ch, window) {
        return Classification::of(Boundary::Neutral);
    }
    if is_end_mark(ch) {
        return Classification::of(Boundary::Strong);
    }
    if is_pause_mark(ch) || is_special_mark(ch) {
        return Classification::of(Boundary::Soft);
    }
    if is_emoji(ch) {
        return Classification {
            emoji: true,
            ..Classification::of(Boundary::Soft)
        };
    }
    Classification::of(Boundary::Neutral)
}
