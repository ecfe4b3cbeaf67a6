//! The fixed row schema: `(id, username, email)`.
//!
//! The tree itself treats a row as an opaque `ROW_SIZE`-byte payload; this
//! module is the one place that knows what those bytes mean. Strings are
//! NUL-padded fixed-width fields so a row always serializes to exactly
//! `ROW_SIZE` bytes and rows never cross page boundaries.

use crate::errors::Error;
use std::fmt;

pub const COLUMN_USERNAME_SIZE: usize = 32;
pub const COLUMN_EMAIL_SIZE: usize = 255;

/// One extra byte per string column keeps room for a terminator, matching
/// the on-disk format.
pub const USERNAME_SIZE: usize = COLUMN_USERNAME_SIZE + 1;
pub const EMAIL_SIZE: usize = COLUMN_EMAIL_SIZE + 1;

pub const ID_SIZE: usize = std::mem::size_of::<u32>();
pub const ID_OFFSET: usize = 0;
pub const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;

pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

#[derive(Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: [u8; USERNAME_SIZE],
    pub email: [u8; EMAIL_SIZE],
}

fn str_to_fixed_bytes<const N: usize>(input: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    buf[..input.len()].copy_from_slice(input.as_bytes());
    buf
}

fn fixed_bytes_to_str(buf: &[u8]) -> &str {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).unwrap_or("")
}

impl Row {
    pub fn new(id: u32, username: &str, email: &str) -> Result<Self, Error> {
        if username.len() > COLUMN_USERNAME_SIZE {
            return Err(err!(
                Storage,
                "Username exceeds {} bytes.",
                COLUMN_USERNAME_SIZE
            ));
        }
        if email.len() > COLUMN_EMAIL_SIZE {
            return Err(err!(Storage, "Email exceeds {} bytes.", COLUMN_EMAIL_SIZE));
        }
        Ok(Row {
            id,
            username: str_to_fixed_bytes(username),
            email: str_to_fixed_bytes(email),
        })
    }

    pub fn username(&self) -> &str {
        fixed_bytes_to_str(&self.username)
    }

    pub fn email(&self) -> &str {
        fixed_bytes_to_str(&self.email)
    }

    /// Writes exactly `ROW_SIZE` bytes into `dest`.
    pub fn serialize(&self, dest: &mut [u8]) {
        dest[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_le_bytes());
        dest[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE].copy_from_slice(&self.username);
        dest[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE].copy_from_slice(&self.email);
    }

    /// Reads a row back from a `ROW_SIZE`-byte payload.
    pub fn deserialize(source: &[u8]) -> Self {
        let mut id_bytes = [0u8; ID_SIZE];
        id_bytes.copy_from_slice(&source[ID_OFFSET..ID_OFFSET + ID_SIZE]);

        let mut username = [0u8; USERNAME_SIZE];
        username.copy_from_slice(&source[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE]);

        let mut email = [0u8; EMAIL_SIZE];
        email.copy_from_slice(&source[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE]);

        Row {
            id: u32::from_le_bytes(id_bytes),
            username,
            email,
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username(), self.email())
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Row")
            .field("id", &self.id)
            .field("username", &self.username())
            .field("email", &self.email())
            .finish()
    }
}
