//! Query expression tree

use std::fmt;

/// Compiled query expression
///
/// Literal values are stored NFKC-normalized and lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Substring match
    Word(String),
    /// Substring match on a quoted, whitespace-collapsed phrase
    Phrase(String),
    /// Any token starting with the prefix
    Prefix(String),
    /// Any token within `distance` edits
    Fuzzy { value: String, distance: u8 },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    pub fn not(child: Expr) -> Self {
        Self::Not(Box::new(child))
    }

    /// Whether this node is a literal term
    pub fn is_term(&self) -> bool {
        matches!(
            self,
            Self::Word(_) | Self::Phrase(_) | Self::Prefix(_) | Self::Fuzzy { .. }
        )
    }
}

/// Renders the expression back into query syntax, fully parenthesized
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(value) => write!(f, "{}", value),
            Self::Phrase(value) => write!(f, "\"{}\"", value),
            Self::Prefix(prefix) => write!(f, "{}*", prefix),
            Self::Fuzzy { value, distance } => write!(f, "{}~{}", value, distance),
            Self::Not(child) => write!(f, "NOT {}", child),
            Self::And(left, right) => write!(f, "({} AND {})", left, right),
            Self::Or(left, right) => write!(f, "({} OR {})", left, right),
        }
    }
}
