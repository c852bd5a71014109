//! Text normalisation for synthesis.
//!
//! Telephony TTS reads raw digits and symbols poorly, so money, percentages,
//! phone numbers and small counts are rewritten into words before a sentence
//! is submitted. The rewrite is idempotent: running it over its own output
//! changes nothing.
//!
//! Order matters: phone numbers first (so their digits are consumed before
//! the generic passes), then currency, then percent, then standalone small
//! integers. Integers ≥ 100 and digits glued to `:`/`-`/`.`/`/` (times,
//! dates, decimals) are kept as digits.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b(\d{3})[-.\s]?(\d{3})[-.\s]?(\d{4})\b").unwrap()
});
static DOLLARS_CENTS_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\$(\d+)\.(\d{2})\b").unwrap()
});
static DOLLARS_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\$(\d+)\b").unwrap()
});
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(\d+)\s?%").unwrap()
});
static INT_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\d+").unwrap()
});

/// Rewrite `text` into its speakable form.
pub fn normalize(text: &str) -> String {
    let out = PHONE_RE.replace_all(text, |c: &Captures| {
        let digits: String = [&c[1], &c[2], &c[3]].concat();
        spell_phone(&digits)
    });
    let out = DOLLARS_CENTS_RE.replace_all(&out, "$1 dollars and $2 cents");
    let out = DOLLARS_RE.replace_all(&out, "$1 dollars");
    let out = PERCENT_RE.replace_all(&out, "$1 percent");
    small_int_pass(&out)
}

/// "5551234567" → "five five five, one two three, four five six seven".
fn spell_phone(digits: &str) -> String {
    let spelled: Vec<String> = digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| digit_word(d).to_string())
        .collect();
    format!(
        "{}, {}, {}",
        spelled[..3].join(" "),
        spelled[3..6].join(" "),
        spelled[6..].join(" ")
    )
}

/// Convert standalone integers in 1..=99 to words; keep everything else.
fn small_int_pass(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in INT_RE.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        last = m.end();

        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        if is_glued(before) || is_glued(after) {
            out.push_str(m.as_str());
            continue;
        }
        match m.as_str().parse::<u32>() {
            Ok(n @ 1..=99) => out.push_str(&small_int_words(n)),
            _ => out.push_str(m.as_str()),
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Digits glued to these stay digits: times, dates, decimals, compounds.
fn is_glued(c: Option<char>) -> bool {
    matches!(c, Some(c) if c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '/' | '.'))
}

fn digit_word(d: u32) -> &'static str {
    const DIGITS: [&str; 10] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    ];
    DIGITS[(d as usize) % 10]
}

fn small_int_words(n: u32) -> String {
    const TEENS: [&str; 20] = [
        "zero",
        "one",
        "two",
        "three",
        "four",
        "five",
        "six",
        "seven",
        "eight",
        "nine",
        "ten",
        "eleven",
        "twelve",
        "thirteen",
        "fourteen",
        "fifteen",
        "sixteen",
        "seventeen",
        "eighteen",
        "nineteen",
    ];
    const TENS: [&str; 10] = [
        "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];
    if n < 20 {
        TEENS[n as usize].to_string()
    } else if n % 10 == 0 {
        TENS[(n / 10) as usize].to_string()
    } else {
        format!("{} {}", TENS[(n / 10) as usize], TEENS[(n % 10) as usize])
    }
}
