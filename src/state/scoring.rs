//! Dart sector tokens and the scoring rules applied to them.
//!
//! Tokens come straight from the board adapter (`"S20"`, `"D16"`, `"T19"`,
//! `"25"`, `"Bull"`, `"None"`). Anything that does not parse is a miss: an
//! unreadable token scores zero instead of failing the throw.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Highest score that can still be finished within a single visit.
pub const MAX_CHECKOUT: u32 = 170;

/// Ring hit by a numbered dart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Multiplier {
    /// Single ring, face value.
    Single,
    /// Outer double ring.
    Double,
    /// Inner treble ring.
    Treble,
}

impl Multiplier {
    fn factor(self) -> u32 {
        match self {
            Multiplier::Single => 1,
            Multiplier::Double => 2,
            Multiplier::Treble => 3,
        }
    }
}

/// A decoded dart landing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sector {
    /// Numbered segment 1..=20 in one of the three rings.
    Number {
        /// Ring that was hit.
        multiplier: Multiplier,
        /// Segment value, always within 1..=20.
        value: u8,
    },
    /// Outer bull, 25 points, not a double.
    OuterBull,
    /// Inner bull, 50 points, counts as a double for checkout.
    InnerBull,
    /// Missed the scoring area or unreadable token.
    Miss,
}

impl Sector {
    /// Parse an adapter token. Never fails: unknown input is a [`Sector::Miss`].
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token {
            "25" => return Sector::OuterBull,
            "50" | "Bull" => return Sector::InnerBull,
            _ => {}
        }

        let mut chars = token.chars();
        let multiplier = match chars.next() {
            Some('S') => Multiplier::Single,
            Some('D') => Multiplier::Double,
            Some('T') => Multiplier::Treble,
            _ => return Sector::Miss,
        };

        let digits = chars.as_str();
        if digits.is_empty() || digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Sector::Miss;
        }

        match digits.parse::<u8>() {
            Ok(value @ 1..=20) => Sector::Number { multiplier, value },
            _ => Sector::Miss,
        }
    }

    /// Points scored by this dart.
    pub fn points(self) -> u32 {
        match self {
            Sector::Number { multiplier, value } => multiplier.factor() * u32::from(value),
            Sector::OuterBull => 25,
            Sector::InnerBull => 50,
            Sector::Miss => 0,
        }
    }

    /// Whether this dart satisfies a double-out requirement.
    pub fn is_double(self) -> bool {
        matches!(
            self,
            Sector::Number {
                multiplier: Multiplier::Double,
                ..
            } | Sector::InnerBull
        )
    }
}

impl From<&str> for Sector {
    fn from(token: &str) -> Self {
        Sector::parse(token)
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sector::Number { multiplier, value } => {
                let prefix = match multiplier {
                    Multiplier::Single => 'S',
                    Multiplier::Double => 'D',
                    Multiplier::Treble => 'T',
                };
                write!(f, "{prefix}{value}")
            }
            Sector::OuterBull => f.write_str("25"),
            Sector::InnerBull => f.write_str("Bull"),
            Sector::Miss => f.write_str("None"),
        }
    }
}

/// Rule deciding how a leg may be finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutMode {
    /// The finishing dart must be a double (inner bull included).
    #[default]
    Double,
    /// Any dart reaching exactly zero finishes the leg.
    Single,
}

/// Points scored by a raw adapter token.
pub fn points_of(token: &str) -> u32 {
    Sector::parse(token).points()
}

/// Whether a raw adapter token counts as a double.
pub fn is_double(token: &str) -> bool {
    Sector::parse(token).is_double()
}

/// Whether throwing `sector` from `remaining` busts the visit.
///
/// Going below zero always busts. Under [`OutMode::Double`] a remaining score
/// of exactly one busts (no double can finish it) and so does reaching zero
/// with a dart that is not a double.
pub fn will_bust(remaining: u32, sector: Sector, out_mode: OutMode) -> bool {
    let points = sector.points();
    if points > remaining {
        return true;
    }

    let after = remaining - points;
    match out_mode {
        OutMode::Double => after == 1 || (after == 0 && !sector.is_double()),
        OutMode::Single => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn all_tokens() -> Vec<String> {
        let mut tokens = Vec::with_capacity(62);
        for prefix in ["S", "D", "T"] {
            for value in 1..=20 {
                tokens.push(format!("{prefix}{value}"));
            }
        }
        tokens.extend(["25".to_string(), "Bull".to_string()]);
        tokens
    }

    #[test]
    fn sector_space_has_sixty_two_tokens() {
        let mut tokens = all_tokens();
        tokens.push("None".into());
        assert_eq!(tokens.len(), 63);
        assert_eq!(
            tokens.iter().filter(|t| Sector::parse(t) != Sector::Miss).count(),
            62
        );
    }

    #[test]
    fn points_stay_inside_the_legal_set() {
        for token in all_tokens() {
            let sector = Sector::parse(&token);
            let points = points_of(&token);
            let legal = match sector {
                Sector::Number {
                    multiplier: Multiplier::Single,
                    value,
                } => points == u32::from(value) && (1..=20).contains(&points),
                Sector::Number {
                    multiplier: Multiplier::Double,
                    value,
                } => points == 2 * u32::from(value) && points % 2 == 0,
                Sector::Number {
                    multiplier: Multiplier::Treble,
                    value,
                } => points == 3 * u32::from(value) && points % 3 == 0,
                Sector::OuterBull => points == 25,
                Sector::InnerBull => points == 50,
                Sector::Miss => false,
            };
            assert!(legal, "token {token} scored {points}");
        }
    }

    #[rstest]
    #[case("S1", 1)]
    #[case("S20", 20)]
    #[case("D1", 2)]
    #[case("D20", 40)]
    #[case("T1", 3)]
    #[case("T19", 57)]
    #[case("T20", 60)]
    #[case("25", 25)]
    #[case("50", 50)]
    #[case("Bull", 50)]
    #[case("None", 0)]
    #[case("", 0)]
    #[case("S0", 0)]
    #[case("S21", 0)]
    #[case("T25", 0)]
    #[case("X5", 0)]
    #[case("s20", 0)]
    #[case("D100", 0)]
    #[case(" T20 ", 60)]
    fn points_of_token(#[case] token: &str, #[case] expected: u32) {
        assert_eq!(points_of(token), expected);
    }

    #[rstest]
    #[case("D1", true)]
    #[case("D20", true)]
    #[case("Bull", true)]
    #[case("50", true)]
    #[case("25", false)]
    #[case("S20", false)]
    #[case("T20", false)]
    #[case("None", false)]
    #[case("D21", false)]
    fn double_classification(#[case] token: &str, #[case] expected: bool) {
        assert_eq!(is_double(token), expected);
    }

    #[test]
    fn only_doubles_and_inner_bull_are_doubles() {
        for token in all_tokens() {
            let expected = token.starts_with('D') || token == "Bull";
            assert_eq!(is_double(&token), expected, "token {token}");
        }
    }

    #[test]
    fn double_out_bust_rule_over_every_token() {
        for remaining in [2u32, 3, 40, 50, 61, 170, 171, 180] {
            for token in all_tokens() {
                let sector = Sector::parse(&token);
                let points = sector.points();
                let expected = points > remaining
                    || remaining - points == 1
                    || (remaining == points && !sector.is_double());
                assert_eq!(
                    will_bust(remaining, sector, OutMode::Double),
                    expected,
                    "remaining {remaining} token {token}"
                );
            }
        }
    }

    #[rstest]
    #[case(40, "D20", false)]
    #[case(2, "D1", false)]
    #[case(50, "Bull", false)]
    #[case(25, "25", true)]
    #[case(20, "S20", true)]
    #[case(3, "S2", true)]
    #[case(10, "T20", true)]
    #[case(60, "T20", true)]
    #[case(61, "T20", true)]
    #[case(62, "T20", false)]
    #[case(1, "None", true)]
    #[case(5, "None", false)]
    fn double_out_cases(#[case] remaining: u32, #[case] token: &str, #[case] bust: bool) {
        assert_eq!(will_bust(remaining, Sector::parse(token), OutMode::Double), bust);
    }

    #[rstest]
    #[case(20, "S20", false)]
    #[case(21, "S20", false)]
    #[case(19, "S20", true)]
    #[case(25, "25", false)]
    fn single_out_cases(#[case] remaining: u32, #[case] token: &str, #[case] bust: bool) {
        assert_eq!(will_bust(remaining, Sector::parse(token), OutMode::Single), bust);
    }

    #[test]
    fn display_round_trips_canonical_tokens() {
        for token in all_tokens() {
            assert_eq!(Sector::parse(&token).to_string(), token);
        }
        assert_eq!(Sector::parse("50").to_string(), "Bull");
        assert_eq!(Sector::Miss.to_string(), "None");
    }
}
