//! Dice roller for `NdM[+/-K]` expressions

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Default cap on dice per roll
pub const DEFAULT_MAX_DICE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiceError {
    #[error("invalid dice expression: {0}")]
    Invalid(String),
    #[error("dice count and sides must be at least 1: {0}")]
    OutOfRange(String),
    #[error("too many dice (max {max}): {expr}")]
    TooMany { expr: String, max: u32 },
    #[error("dice total out of range: {0}")]
    Overflow(String),
}

/// A parsed dice expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiceExpr {
    pub count: u32,
    pub sides: u32,
    pub modifier: i64,
}

impl DiceExpr {
    /// Parse `2d6`, `1d20+5`, `3D8 - 2`. Whitespace and case are ignored.
    pub fn parse(input: &str) -> Result<Self, DiceError> {
        let compact: String = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let invalid = || DiceError::Invalid(input.trim().to_string());

        let (count, rest) = compact.split_once('d').ok_or_else(invalid)?;
        let (sides, modifier) = match rest.find(['+', '-']) {
            Some(at) => (&rest[..at], Some(&rest[at..])),
            None => (rest, None),
        };

        let count: u32 = parse_digits(count).ok_or_else(invalid)?;
        let sides: u32 = parse_digits(sides).ok_or_else(invalid)?;
        let modifier = match modifier {
            Some(m) => {
                let (sign, digits) = m.split_at(1);
                let value: i64 = parse_digits(digits).ok_or_else(invalid)?;
                if sign == "-" {
                    -value
                } else {
                    value
                }
            }
            None => 0,
        };

        if count == 0 || sides == 0 {
            return Err(DiceError::OutOfRange(input.trim().to_string()));
        }
        Ok(Self {
            count,
            sides,
            modifier,
        })
    }
}

impl fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{}", m),
            m => write!(f, "{}", m),
        }
    }
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Outcome of one roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiceRoll {
    pub expression: DiceExpr,
    pub rolls: Vec<u32>,
    pub modifier: i64,
    pub total: i64,
}

impl fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rolled {}: {}", self.expression, self.total)?;
        if self.rolls.len() <= 1 && self.modifier == 0 {
            return Ok(());
        }

        let dice = self
            .rolls
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(" + ");
        match self.modifier {
            0 => write!(f, " ({})", dice),
            m if m > 0 => write!(f, " ({} + {})", dice, m),
            m => write!(f, " ({} - {})", dice, m.unsigned_abs()),
        }
    }
}

/// Rolls dice and remembers the last result
pub struct DiceRoller {
    rng: StdRng,
    max_dice: u32,
    last: Option<DiceRoll>,
}

impl Default for DiceRoller {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DICE)
    }
}

impl DiceRoller {
    /// Roller seeded from the OS
    pub fn new(max_dice: u32) -> Self {
        Self::with_rng(StdRng::from_entropy(), max_dice)
    }

    /// Deterministic roller
    pub fn seeded(seed: u64, max_dice: u32) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), max_dice)
    }

    fn with_rng(rng: StdRng, max_dice: u32) -> Self {
        Self {
            rng,
            max_dice,
            last: None,
        }
    }

    /// Parse and roll an expression
    pub fn roll_str(&mut self, input: &str) -> Result<&DiceRoll, DiceError> {
        let expr = DiceExpr::parse(input)?;
        self.roll(expr)
    }

    pub fn roll(&mut self, expr: DiceExpr) -> Result<&DiceRoll, DiceError> {
        if expr.count > self.max_dice {
            return Err(DiceError::TooMany {
                expr: expr.to_string(),
                max: self.max_dice,
            });
        }

        let rolls: Vec<u32> = (0..expr.count)
            .map(|_| self.rng.gen_range(1..=expr.sides))
            .collect();
        let total = rolls
            .iter()
            .try_fold(expr.modifier, |acc, &r| acc.checked_add(i64::from(r)))
            .ok_or_else(|| DiceError::Overflow(expr.to_string()))?;

        tracing::debug!(%expr, total, "rolled dice");
        let roll = self.last.insert(DiceRoll {
            expression: expr,
            rolls,
            modifier: expr.modifier,
            total,
        });
        Ok(&*roll)
    }

    pub fn last_roll(&self) -> Option<&DiceRoll> {
        self.last.as_ref()
    }
}
