//! Dice Notation
//!
//! Parses expressions such as `2d6+1d20+5` into one [`DieKind`] entry per
//! die plus a signed constant.
//!
//! ## Grammar
//!
//! ```text
//! notation := term*
//! term     := ws* count? letters sides (ws* sign ws* constant)? ws* ('+' | end)
//! ```
//!
//! Parsing is best-effort: the scanner looks for the next term from the
//! current position, skipping characters that cannot start one. A term with
//! a command other than `d`, or with an unknown side count, sets the error
//! flag and is dropped while later terms are still parsed. Fragments that
//! never form a term (a leading bare constant, trailing garbage) are skipped
//! silently.

use std::fmt;
use serde::{Serialize, Deserialize};

use super::kind::DieKind;

/// Upper bound on dice produced by a single notation.
pub const MAX_DICE: usize = 100;

/// Upper bound on the absolute value of the constant modifier.
pub const MAX_CONSTANT: i32 = 1_000_000;

/// Result of parsing a dice expression.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceNotation {
    /// One entry per die, in the order written.
    pub set: Vec<DieKind>,
    /// Sum of all signed constants.
    pub constant: i32,
    /// Set when any term was rejected.
    pub error: bool,
}

/// A notation rejected by strict parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed dice notation: {0:?}")]
pub struct NotationError(pub String);

impl DiceNotation {
    /// Build from parts.
    pub fn new(set: Vec<DieKind>, constant: i32) -> Self {
        Self { set, constant, error: false }
    }

    /// Parse best-effort. Never fails; check [`DiceNotation::error`].
    ///
    /// Anything after `@` (requested results) is discarded: only the
    /// server decides outcomes.
    pub fn parse(input: &str) -> Self {
        let lowered = input.to_lowercase();
        let expression = lowered.split_once('@').map_or(lowered.as_str(), |(head, _)| head);
        let mut scanner = Scanner::new(expression.as_bytes());
        let mut out = DiceNotation::default();

        while !scanner.at_end() {
            match scanner.term() {
                Some(term) => out.apply(term),
                None => scanner.skip(),
            }
        }

        out
    }

    /// Parse, rejecting any notation whose error flag would be set.
    pub fn parse_strict(input: &str) -> Result<Self, NotationError> {
        let parsed = Self::parse(input);
        if parsed.error {
            Err(NotationError(input.to_string()))
        } else {
            Ok(parsed)
        }
    }

    /// Number of dice.
    pub fn dice_count(&self) -> usize {
        self.set.len()
    }

    /// Count of dice per type, in canonical order, omitting absent types.
    pub fn counts(&self) -> Vec<(DieKind, usize)> {
        DieKind::ALL
            .iter()
            .map(|kind| (*kind, self.set.iter().filter(|k| *k == kind).count()))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    fn apply(&mut self, term: Term) {
        let kind = match term.command {
            Command::Die => DieKind::from_sides(term.sides),
            Command::Other => None,
        };
        let Some(kind) = kind else {
            self.error = true;
            return;
        };
        if self.set.len().saturating_add(term.count as usize) > MAX_DICE {
            self.error = true;
            return;
        }
        let constant = match self.constant.checked_add(term.constant) {
            Some(c) if c.abs() <= MAX_CONSTANT => c,
            _ => {
                self.error = true;
                return;
            }
        };
        self.set.extend(std::iter::repeat(kind).take(term.count as usize));
        self.constant = constant;
    }
}

impl fmt::Display for DiceNotation {
    /// Canonical form: dice grouped by type in canonical order, then the
    /// constant. Renders `0` when there is nothing to roll.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .counts()
            .into_iter()
            .map(|(kind, n)| format!("{n}{kind}"))
            .collect();
        let mut text = parts.join("+");
        if self.constant > 0 {
            if text.is_empty() {
                text = self.constant.to_string();
            } else {
                text.push_str(&format!("+{}", self.constant));
            }
        } else if self.constant < 0 {
            text.push_str(&self.constant.to_string());
        }
        if text.is_empty() {
            text.push('0');
        }
        f.write_str(&text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Die,
    Other,
}

#[derive(Clone, Copy, Debug)]
struct Term {
    count: u32,
    command: Command,
    sides: u32,
    constant: i32,
}

struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip(&mut self) {
        self.pos += 1;
    }

    /// Try to read one term at the current position. On failure the
    /// position is left untouched.
    fn term(&mut self) -> Option<Term> {
        let start = self.pos;
        let term = self.term_at(start);
        match term {
            Some((term, end)) => {
                self.pos = end;
                Some(term)
            }
            None => {
                self.pos = start;
                None
            }
        }
    }

    fn term_at(&self, mut pos: usize) -> Option<(Term, usize)> {
        pos = self.whitespace(pos);

        let (count, after_count) = self.digits(pos);
        let (letters, after_letters) = self.letters(after_count);
        if letters.is_empty() {
            return None;
        }
        let (sides, after_sides) = self.digits(after_letters);
        let sides = sides?;

        let command = if letters == b"d" { Command::Die } else { Command::Other };
        let count = match count {
            Some(Some(n)) => n,
            // all digits but overflowing u32
            Some(None) => u32::MAX,
            None => 1,
        };
        let sides = sides.unwrap_or(u32::MAX);

        // Prefer the form with a trailing constant, fall back to none.
        if let Some((constant, end)) = self.constant(after_sides) {
            if let Some(end) = self.terminator(end) {
                return Some((Term { count, command, sides, constant }, end));
            }
        }
        let end = self.terminator(after_sides)?;
        Some((Term { count, command, sides, constant: 0 }, end))
    }

    fn whitespace(&self, mut pos: usize) -> usize {
        while pos < self.input.len() && self.input[pos].is_ascii_whitespace() {
            pos += 1;
        }
        pos
    }

    /// Read a run of digits. Outer `None` means no digits; inner `None`
    /// means the run overflowed.
    fn digits(&self, pos: usize) -> (Option<Option<u32>>, usize) {
        let mut end = pos;
        while end < self.input.len() && self.input[end].is_ascii_digit() {
            end += 1;
        }
        if end == pos {
            return (None, pos);
        }
        let value = std::str::from_utf8(&self.input[pos..end])
            .ok()
            .and_then(|s| s.parse::<u32>().ok());
        (Some(value), end)
    }

    fn letters(&self, pos: usize) -> (&'a [u8], usize) {
        let mut end = pos;
        while end < self.input.len() && self.input[end].is_ascii_lowercase() {
            end += 1;
        }
        (&self.input[pos..end], end)
    }

    fn constant(&self, pos: usize) -> Option<(i32, usize)> {
        let pos = self.whitespace(pos);
        let sign = match self.input.get(pos) {
            Some(b'+') => 1,
            Some(b'-') => -1,
            _ => return None,
        };
        let pos = self.whitespace(pos + 1);
        let (digits, end) = self.digits(pos);
        let magnitude = digits?.and_then(|n| i32::try_from(n).ok())?;
        Some((sign * magnitude, end))
    }

    fn terminator(&self, pos: usize) -> Option<usize> {
        let pos = self.whitespace(pos);
        match self.input.get(pos) {
            None => Some(pos),
            Some(b'+') => Some(pos + 1),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_terms() {
        let n = DiceNotation::parse("2d6+1d20+5");
        assert_eq!(n.set, vec![DieKind::D6, DieKind::D6, DieKind::D20]);
        assert_eq!(n.constant, 5);
        assert!(!n.error);
    }

    #[test]
    fn test_constant_is_bounded() {
        let n = DiceNotation::parse("1d6+2147483647");
        assert!(n.error);
        assert_eq!(n.constant, 0);
        assert!(DiceNotation::parse_strict("1d6+1000001").is_err());
        assert!(DiceNotation::parse_strict("2d6-1000001").is_err());

        let edge = DiceNotation::parse_strict("1d6+1000000").unwrap();
        assert_eq!(edge.constant, MAX_CONSTANT);
        assert!(DiceNotation::parse("1d4+999999+1d4+2").error);
    }

    #[test]
    fn test_requested_results_are_discarded() {
        let n = DiceNotation::parse("2d6+1@6,6");
        assert_eq!(n.set, vec![DieKind::D6, DieKind::D6]);
        assert_eq!(n.constant, 1);
        assert!(!n.error);
    }

    #[test]
    fn test_empty_string() {
        let n = DiceNotation::parse("");
        assert!(n.set.is_empty());
        assert_eq!(n.constant, 0);
        assert!(!n.error);
    }

    #[test]
    fn test_count_defaults_to_one() {
        let n = DiceNotation::parse("d20");
        assert_eq!(n.set, vec![DieKind::D20]);
    }

    #[test]
    fn test_negative_constant_and_whitespace() {
        let n = DiceNotation::parse(" 3d8 - 2 ");
        assert_eq!(n.set.len(), 3);
        assert_eq!(n.constant, -2);
        assert!(!n.error);
    }

    #[test]
    fn test_constants_accumulate_across_terms() {
        let n = DiceNotation::parse("1d4+2+1d6-5");
        assert_eq!(n.set, vec![DieKind::D4, DieKind::D6]);
        assert_eq!(n.constant, -3);
    }

    #[test]
    fn test_uppercase_is_accepted() {
        let n = DiceNotation::parse("2D10");
        assert_eq!(n.set, vec![DieKind::D10, DieKind::D10]);
        assert!(!n.error);
    }

    #[test]
    fn test_unknown_type_keeps_valid_terms() {
        let n = DiceNotation::parse("1d6+2d7+1d8");
        assert!(n.error);
        assert_eq!(n.set, vec![DieKind::D6, DieKind::D8]);
    }

    #[test]
    fn test_unknown_command_sets_error() {
        let n = DiceNotation::parse("2x6+1d4");
        assert!(n.error);
        assert_eq!(n.set, vec![DieKind::D4]);
    }

    #[test]
    fn test_trailing_garbage_ignored() {
        let n = DiceNotation::parse("1d12+foo");
        assert_eq!(n.set, vec![DieKind::D12]);
        assert!(!n.error);
    }

    #[test]
    fn test_zero_count_adds_nothing() {
        let n = DiceNotation::parse("0d6+1");
        assert!(n.set.is_empty());
        assert_eq!(n.constant, 1);
    }

    #[test]
    fn test_dice_cap() {
        let n = DiceNotation::parse("60d6+60d6");
        assert!(n.error);
        assert_eq!(n.set.len(), 60);

        let huge = DiceNotation::parse("99999999999d6");
        assert!(huge.error);
        assert!(huge.set.is_empty());
    }

    #[test]
    fn test_strict_parse() {
        assert!(DiceNotation::parse_strict("2d6+3").is_ok());
        assert!(DiceNotation::parse_strict("2d7").is_err());
    }

    #[test]
    fn test_canonical_display() {
        assert_eq!(DiceNotation::parse("1d20+2d6+3").to_string(), "2d6+1d20+3");
        assert_eq!(DiceNotation::parse("1d8-2").to_string(), "1d8-2");
        assert_eq!(DiceNotation::parse("").to_string(), "0");
        assert_eq!(DiceNotation::new(vec![], 4).to_string(), "4");
    }

    #[test]
    fn test_counts_grouped() {
        let n = DiceNotation::parse("1d6+1d4+1d6");
        assert_eq!(n.counts(), vec![(DieKind::D4, 1), (DieKind::D6, 2)]);
    }

    fn kind_strategy() -> impl Strategy<Value = DieKind> {
        prop::sample::select(DieKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_well_formed_notation_parses_exactly(
            terms in prop::collection::vec((1u32..5, kind_strategy()), 1..6),
            constant in -50i32..50,
        ) {
            let mut text = terms
                .iter()
                .map(|(n, kind)| format!("{n}{kind}"))
                .collect::<Vec<_>>()
                .join("+");
            if constant > 0 {
                text.push_str(&format!("+{constant}"));
            } else if constant < 0 {
                text.push_str(&constant.to_string());
            }

            let parsed = DiceNotation::parse(&text);
            let expected: Vec<DieKind> = terms
                .iter()
                .flat_map(|(n, kind)| std::iter::repeat(*kind).take(*n as usize))
                .collect();

            prop_assert!(!parsed.error);
            prop_assert_eq!(parsed.set, expected);
            prop_assert_eq!(parsed.constant, constant);
        }

        #[test]
        fn prop_unknown_sides_never_drop_valid_terms(
            before in prop::collection::vec((1u32..4, kind_strategy()), 0..4),
            bad_sides in prop::sample::select(vec![3u32, 5, 7, 11, 13, 30, 99]),
        ) {
            let mut parts: Vec<String> = before.iter().map(|(n, k)| format!("{n}{k}")).collect();
            parts.push(format!("1d{bad_sides}"));
            let parsed = DiceNotation::parse(&parts.join("+"));
            let valid: usize = before.iter().map(|(n, _)| *n as usize).sum();

            prop_assert!(parsed.error);
            prop_assert_eq!(parsed.set.len(), valid);
        }

        #[test]
        fn prop_parse_never_panics(input in ".{0,40}") {
            let _ = DiceNotation::parse(&input);
        }
    }
}
