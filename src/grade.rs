//! Grade and term identifiers, and the informal-grade mapping table.
//!
//! Bucket paths use grade *codes* (`KG1`, `P5`, `G10`) while callers usually
//! know a grade as a number (`"5"`, `"10"`). [`map_user_grade`] is the single
//! place where informal values are turned into a [`Grade`].
//!
//! # Mapping Table
//!
//! | Input (trimmed, case-insensitive) | Grade |
//! |-----------------------------------|-------|
//! | `kg1`, `k1` | `KG1` |
//! | `kg2`, `k2` | `KG2` |
//! | `1`–`6`, `p1`–`p6`, `grade 1`–`grade 6` | `P1`–`P6` |
//! | `7`–`12`, `g7`–`g12`, `grade 7`–`grade 12` | `G7`–`G12` |
//!
//! Everything else is an [`UnknownGrade`] error. There is no silent default.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A curriculum level. Variants are declared in curriculum order, so the
/// derived `Ord` sorts `KG1 < P1 < … < P6 < G7 < … < G12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Grade {
    #[serde(rename = "KG1")]
    Kg1,
    #[serde(rename = "KG2")]
    Kg2,
    P1,
    P2,
    P3,
    P4,
    P5,
    P6,
    G7,
    G8,
    G9,
    G10,
    G11,
    G12,
}

impl Grade {
    /// Every grade, in curriculum order.
    pub const ALL: [Grade; 14] = [
        Grade::Kg1,
        Grade::Kg2,
        Grade::P1,
        Grade::P2,
        Grade::P3,
        Grade::P4,
        Grade::P5,
        Grade::P6,
        Grade::G7,
        Grade::G8,
        Grade::G9,
        Grade::G10,
        Grade::G11,
        Grade::G12,
    ];

    /// The bucket path token for this grade.
    pub fn code(self) -> &'static str {
        match self {
            Grade::Kg1 => "KG1",
            Grade::Kg2 => "KG2",
            Grade::P1 => "P1",
            Grade::P2 => "P2",
            Grade::P3 => "P3",
            Grade::P4 => "P4",
            Grade::P5 => "P5",
            Grade::P6 => "P6",
            Grade::G7 => "G7",
            Grade::G8 => "G8",
            Grade::G9 => "G9",
            Grade::G10 => "G10",
            Grade::G11 => "G11",
            Grade::G12 => "G12",
        }
    }

    /// Parse an exact grade code (`"P5"`, `"g10"`, `"KG1"`), ignoring case.
    pub fn from_code(code: &str) -> Option<Grade> {
        let code = code.trim();
        Grade::ALL
            .into_iter()
            .find(|g| g.code().eq_ignore_ascii_case(code))
    }

    /// Numbered school years: 1–6 are primary, 7–12 are secondary.
    pub fn from_number(n: u8) -> Option<Grade> {
        match n {
            1 => Some(Grade::P1),
            2 => Some(Grade::P2),
            3 => Some(Grade::P3),
            4 => Some(Grade::P4),
            5 => Some(Grade::P5),
            6 => Some(Grade::P6),
            7 => Some(Grade::G7),
            8 => Some(Grade::G8),
            9 => Some(Grade::G9),
            10 => Some(Grade::G10),
            11 => Some(Grade::G11),
            12 => Some(Grade::G12),
            _ => None,
        }
    }

    pub fn is_primary(self) -> bool {
        matches!(
            self,
            Grade::P1 | Grade::P2 | Grade::P3 | Grade::P4 | Grade::P5 | Grade::P6
        )
    }

    pub fn is_secondary(self) -> bool {
        matches!(
            self,
            Grade::G7 | Grade::G8 | Grade::G9 | Grade::G10 | Grade::G11 | Grade::G12
        )
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Returned when an input is outside the documented grade domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown grade: '{0}'")]
pub struct UnknownGrade(pub String);

/// Map an informal grade value onto its bucket grade code.
///
/// See the module docs for the full table.
pub fn map_user_grade(input: &str) -> Result<Grade, UnknownGrade> {
    let trimmed = input.trim();
    let normalized = trimmed.to_ascii_lowercase();

    let grade = match normalized.as_str() {
        "kg1" | "k1" => Some(Grade::Kg1),
        "kg2" | "k2" => Some(Grade::Kg2),
        other => {
            if let Some(rest) = other.strip_prefix("grade") {
                parse_year(rest.trim_start())
            } else if let Some(rest) = other.strip_prefix('p') {
                parse_year(rest).filter(|g| g.is_primary())
            } else if let Some(rest) = other.strip_prefix('g') {
                parse_year(rest).filter(|g| g.is_secondary())
            } else {
                parse_year(other)
            }
        }
    };

    grade.ok_or_else(|| UnknownGrade(trimmed.to_string()))
}

fn parse_year(digits: &str) -> Option<Grade> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u8>().ok().and_then(Grade::from_number)
}

/// A curriculum sub-period within a grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Term {
    Term1,
    Term2,
}

impl Term {
    pub fn code(self) -> &'static str {
        match self {
            Term::Term1 => "Term1",
            Term::Term2 => "Term2",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown term: '{0}'")]
pub struct UnknownTerm(pub String);

impl FromStr for Term {
    type Err = UnknownTerm;

    /// Accepts `Term1`, `term1`, `term 1`, and bare `1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let number = normalized
            .strip_prefix("term")
            .map(str::trim_start)
            .unwrap_or(&normalized);
        match number {
            "1" => Ok(Term::Term1),
            "2" => Ok(Term::Term2),
            _ => Err(UnknownTerm(s.trim().to_string())),
        }
    }
}
