use std::fmt;

use super::RexScalar;

#[derive(Debug, Clone, PartialEq)]
pub struct RexCase {
    /// (WHEN, THEN) pairs in evaluation order.
    pub when_then: Vec<(RexScalar, RexScalar)>,
    pub else_expr: Option<Box<RexScalar>>,
}

impl fmt::Display for RexCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CASE")?;
        for (when, then) in &self.when_then {
            write!(f, " WHEN {when} THEN {then}")?;
        }
        if let Some(else_expr) = &self.else_expr {
            write!(f, " ELSE {else_expr}")?;
        }
        write!(f, " END")
    }
}
