//! Command line tokenization and redirection operators
//!
//! A line is split with shell-like quoting. A trailing `<< name` pair runs the
//! command on behalf of the session reading `name`; a trailing `>> name` (or
//! `> name`) pair sends the output to the stream `name`. Only the last two
//! tokens are ever considered.

use super::error::DispatchError;

/// Input redirection operator
pub const OPERATOR_IN: &str = "<<";

/// Output redirection operator
pub const OPERATOR_OUT: &str = ">>";

/// Short form of the output redirection operator
pub const OPERATOR_OUT_SHORT: &str = ">";

/// Tokenized line with its redirection resolved
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine {
    /// Command name followed by its arguments
    pub tokens: Vec<String>,
    /// Input name to run the command for, from `<<`
    pub source: Option<String>,
    /// Output name to write to, from `>>` or `>`
    pub destination: Option<String>,
}

impl CommandLine {
    /// Tokenize a trimmed line and strip its redirection pair
    pub fn parse(line: &str) -> Result<Self, DispatchError> {
        let mut tokens =
            shlex::split(line).ok_or_else(|| DispatchError::Tokenize("unbalanced quotes".to_string()))?;

        let has_in = tokens.iter().any(|t| t == OPERATOR_IN);
        let has_out = tokens.iter().any(|t| is_output_operator(t));
        if has_in && has_out {
            return Err(DispatchError::MalformedRedirection(
                "input and output redirection in one line".to_string(),
            ));
        }

        let mut parsed = Self::default();
        if has_in {
            parsed.source = Some(strip_trailing_pair(&mut tokens, |t| t == OPERATOR_IN)?);
        } else if has_out {
            parsed.destination = Some(strip_trailing_pair(&mut tokens, is_output_operator)?);
        }
        parsed.tokens = tokens;
        Ok(parsed)
    }

    /// Command name and its arguments
    pub fn split_command(&self) -> Option<(&str, &[String])> {
        self.tokens
            .split_first()
            .map(|(command, args)| (command.as_str(), args))
    }
}

fn is_output_operator(token: &str) -> bool {
    token == OPERATOR_OUT || token == OPERATOR_OUT_SHORT
}

fn strip_trailing_pair(tokens: &mut Vec<String>, is_operator: impl Fn(&str) -> bool) -> Result<String, DispatchError> {
    let len = tokens.len();
    if len < 2 || !is_operator(&tokens[len - 2]) || is_operator(&tokens[len - 1]) {
        return Err(DispatchError::MalformedRedirection(
            "operator must be followed by exactly one stream name at the end of the line".to_string(),
        ));
    }
    let name = tokens.pop().unwrap_or_default();
    tokens.pop();
    Ok(name)
}
