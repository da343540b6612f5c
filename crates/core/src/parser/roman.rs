//! Roman numeral conversion for sequence markers ("Part II", "Rocky IV").

pub const MIN_VALUE: u32 = 1;
pub const MAX_VALUE: u32 = 3999;

// Each table is ordered so that greedy prefix matching never picks a shorter
// symbol when a longer one applies.
const THOUSANDS: [(&str, u32); 3] = [("MMM", 3000), ("MM", 2000), ("M", 1000)];
const HUNDREDS: [(&str, u32); 9] = [
    ("CM", 900),
    ("DCCC", 800),
    ("DCC", 700),
    ("DC", 600),
    ("D", 500),
    ("CD", 400),
    ("CCC", 300),
    ("CC", 200),
    ("C", 100),
];
const TENS: [(&str, u32); 9] = [
    ("XC", 90),
    ("LXXX", 80),
    ("LXX", 70),
    ("LX", 60),
    ("L", 50),
    ("XL", 40),
    ("XXX", 30),
    ("XX", 20),
    ("X", 10),
];
const UNITS: [(&str, u32); 9] = [
    ("IX", 9),
    ("VIII", 8),
    ("VII", 7),
    ("VI", 6),
    ("V", 5),
    ("IV", 4),
    ("III", 3),
    ("II", 2),
    ("I", 1),
];

/// Convert an integer in `1..=3999` to its roman representation.
pub fn to_roman(value: u32) -> Option<String> {
    if !(MIN_VALUE..=MAX_VALUE).contains(&value) {
        return None;
    }

    let mut out = String::new();
    let mut rest = value;
    for table in [&THOUSANDS[..], &HUNDREDS[..], &TENS[..], &UNITS[..]] {
        if let Some((symbol, amount)) = table.iter().find(|(_, amount)| *amount <= rest) {
            out.push_str(symbol);
            rest -= amount;
        }
    }
    Some(out)
}

/// Parse a roman numeral (case-insensitive). Returns `None` for anything that
/// is not a canonical numeral in `1..=3999`.
pub fn from_roman(input: &str) -> Option<u32> {
    let upper = input.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return None;
    }

    let mut rest = upper.as_str();
    let mut total = 0;
    for table in [&THOUSANDS[..], &HUNDREDS[..], &TENS[..], &UNITS[..]] {
        if let Some((symbol, amount)) = table.iter().find(|(symbol, _)| rest.starts_with(symbol)) {
            total += amount;
            rest = &rest[symbol.len()..];
        }
    }

    if rest.is_empty() && total >= MIN_VALUE {
        Some(total)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_values() {
        assert_eq!(to_roman(1).as_deref(), Some("I"));
        assert_eq!(to_roman(4).as_deref(), Some("IV"));
        assert_eq!(to_roman(1994).as_deref(), Some("MCMXCIV"));
        assert_eq!(to_roman(3999).as_deref(), Some("MMMCMXCIX"));
        assert_eq!(from_roman("xiv"), Some(14));
        assert_eq!(from_roman("MMXXIV"), Some(2024));
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(to_roman(0), None);
        assert_eq!(to_roman(4000), None);
    }

    #[test]
    fn test_rejects_non_canonical_input() {
        assert_eq!(from_roman(""), None);
        assert_eq!(from_roman("IIII"), None);
        assert_eq!(from_roman("VX"), None);
        assert_eq!(from_roman("MMMM"), None);
        assert_eq!(from_roman("Part"), None);
    }

    proptest! {
        #[test]
        fn prop_round_trip(value in MIN_VALUE..=MAX_VALUE) {
            let roman = to_roman(value).unwrap();
            prop_assert_eq!(from_roman(&roman), Some(value));
        }
    }
}
