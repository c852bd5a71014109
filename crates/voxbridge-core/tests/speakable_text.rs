//! Speakable-text normalisation tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use voxbridge_core::speakable::normalize;

#[test]
fn dollars_and_cents() {
    assert_eq!(
        normalize("That's $49.99 per visit."),
        "That's forty nine dollars and ninety nine cents per visit."
    );
}

#[test]
fn whole_dollars() {
    assert_eq!(normalize("It costs $49 today."), "It costs forty nine dollars today.");
    assert_eq!(normalize("Plans start at $120."), "Plans start at 120 dollars.");
}

#[test]
fn percentages() {
    assert_eq!(normalize("Save 15% this week."), "Save fifteen percent this week.");
    assert_eq!(normalize("Up to 150% more."), "Up to 150 percent more.");
}

#[test]
fn phone_numbers_digit_by_digit_in_triplets() {
    assert_eq!(
        normalize("Call 5551234567 anytime."),
        "Call five five five, one two three, four five six seven anytime."
    );
    assert_eq!(
        normalize("Call 555-123-4567 anytime."),
        "Call five five five, one two three, four five six seven anytime."
    );
}

#[test]
fn small_integers_become_words_large_stay_digits() {
    assert_eq!(normalize("We have 3 openings."), "We have three openings.");
    assert_eq!(normalize("Over 200 clients."), "Over 200 clients.");
}

#[test]
fn times_and_dates_keep_their_digits() {
    assert_eq!(normalize("See you at 14:00."), "See you at 14:00.");
    assert_eq!(normalize("On 2025-12-01 then."), "On 2025-12-01 then.");
}

#[test]
fn normalisation_is_idempotent() {
    let cases = [
        "That's $49.99 per visit.",
        "Call 555-123-4567 anytime.",
        "Save 15% this week.",
        "We have 3 openings at 14:00.",
        "forty nine dollars",
    ];
    for case in cases {
        let once = normalize(case);
        assert_eq!(normalize(&once), once, "not idempotent for {case:?}");
    }
}
