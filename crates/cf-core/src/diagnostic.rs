use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Reasons a line of iptables-save input was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ParseError {
    #[error("unrecognized line")]
    Unrecognized,
    #[error("{directive} outside of a table")]
    NoActiveTable { directive: &'static str },
    #[error("rule appended to undeclared chain {chain} in table {table}")]
    UnknownChain { table: String, chain: String },
    #[error("rule in chain {chain} has an empty target")]
    EmptyTarget { chain: String },
}

/// A skipped input line. Parsing continues past every diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub line_no: usize,
    pub line: String,
    pub error: ParseError,
}

impl Diagnostic {
    pub fn new(line_no: usize, line: &str, error: ParseError) -> Self {
        Self {
            line_no,
            line: line.to_string(),
            error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line_no, self.error, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_line_and_reason() {
        let diag = Diagnostic::new(7, "bogus", ParseError::Unrecognized);
        assert_eq!(diag.to_string(), "line 7: unrecognized line: bogus");

        let diag = Diagnostic::new(
            3,
            "-A X -j ACCEPT",
            ParseError::UnknownChain {
                table: "filter".into(),
                chain: "X".into(),
            },
        );
        assert_eq!(
            diag.to_string(),
            "line 3: rule appended to undeclared chain X in table filter: -A X -j ACCEPT"
        );
    }
}
