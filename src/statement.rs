//! Statement preparation for the shell.
//!
//! The grammar is two statements: `insert <id> <username> <email>` and
//! `select`. Validation failures are reported with the exact shell wording,
//! so `PrepareError`'s `Display` is part of the protocol.

use crate::storage::row::{Row, COLUMN_EMAIL_SIZE, COLUMN_USERNAME_SIZE};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static INSERT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^insert\s+(-?\d+)\s+(\S+)\s+(\S+)\s*$").expect("valid pattern"));

#[derive(Debug)]
pub enum Statement {
    Insert(Row),
    Select,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PrepareError {
    NegativeId,
    StringTooLong,
    SyntaxError,
    UnrecognizedKeyword(String),
}

impl fmt::Display for PrepareError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrepareError::NegativeId => write!(f, "ID must be positive."),
            PrepareError::StringTooLong => write!(f, "String is too long."),
            PrepareError::SyntaxError => write!(f, "Syntax error. Could not parse statement."),
            PrepareError::UnrecognizedKeyword(line) => {
                write!(f, "Unrecognized keyword at start of '{}'.", line)
            }
        }
    }
}

pub fn prepare(input: &str) -> Result<Statement, PrepareError> {
    if input == "select" {
        return Ok(Statement::Select);
    }
    if input.starts_with("insert") {
        return prepare_insert(input);
    }
    Err(PrepareError::UnrecognizedKeyword(input.to_string()))
}

fn prepare_insert(input: &str) -> Result<Statement, PrepareError> {
    let captures = INSERT_RE
        .captures(input)
        .ok_or(PrepareError::SyntaxError)?;

    // Keys are unsigned; a negative id is rejected here, before the id is
    // narrowed. Anything that does not fit u32 is a malformed statement
    // rather than a silently truncated key.
    let id: i64 = captures[1].parse().map_err(|_| PrepareError::SyntaxError)?;
    if id < 0 {
        return Err(PrepareError::NegativeId);
    }
    let id = u32::try_from(id).map_err(|_| PrepareError::SyntaxError)?;

    let username = &captures[2];
    let email = &captures[3];
    if username.len() > COLUMN_USERNAME_SIZE || email.len() > COLUMN_EMAIL_SIZE {
        return Err(PrepareError::StringTooLong);
    }

    let row = Row::new(id, username, email).map_err(|_| PrepareError::StringTooLong)?;
    Ok(Statement::Insert(row))
}
