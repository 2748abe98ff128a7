// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Packed changeset text form.
//!
//! Layout:
//!
//! ``Z:<oldLen>(>|<)<delta><ops>$<charBank>``
//!
//! * every number is lowercase base 36
//! * each op is ``(*<code>)*(|<lines>)?(=|+|-)<chars>``
//! * `=` keeps existing chars (optionally applying the `*` attribute codes),
//!   `+` inserts chars taken from the char bank, `-` deletes existing chars

use thiserror::Error;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Errors produced while unpacking a changeset or walking its ops.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChangesetError {
    /// Text does not start with a `Z:<len>(>|<)` header.
    #[error("missing changeset header")]
    MissingHeader,
    /// Header lengths are not base-36 numbers or the new length underflows.
    #[error("bad length in changeset header")]
    BadHeaderLength,
    /// No `$` separating ops from the char bank.
    #[error("missing char bank separator")]
    MissingCharBank,
    /// Op text does not match the op grammar (offset is relative to the op section).
    #[error("malformed op at offset {offset}")]
    MalformedOp {
        /// Byte offset into the op section.
        offset: usize,
    },
    /// A base-36 number does not fit the target integer.
    #[error("number out of range at offset {offset}")]
    NumberOverflow {
        /// Byte offset into the op section.
        offset: usize,
    },
}

/// Operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Retain existing chars (`=`).
    Keep,
    /// Insert new chars (`+`).
    Insert,
    /// Remove existing chars (`-`).
    Delete,
}

impl OpCode {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'=' => Some(Self::Keep),
            b'+' => Some(Self::Insert),
            b'-' => Some(Self::Delete),
            _ => None,
        }
    }

    /// Symbol used in the packed form.
    pub fn symbol(self) -> char {
        match self {
            Self::Keep => '=',
            Self::Insert => '+',
            Self::Delete => '-',
        }
    }
}

/// One decoded op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Op kind.
    pub opcode: OpCode,
    /// Number of chars covered.
    pub chars: usize,
    /// Number of newlines among those chars.
    pub lines: usize,
    /// Attribute codes in declaration order; resolve them through the pool
    /// shipped with the same changeset.
    pub attribs: Vec<u32>,
}

/// An unpacked changeset borrowing from its packed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Changeset<'a> {
    old_len: usize,
    new_len: usize,
    ops: &'a str,
    char_bank: &'a str,
}

impl<'a> Changeset<'a> {
    /// Split packed text into header lengths, op section and char bank.
    pub fn unpack(packed: &'a str) -> Result<Self, ChangesetError> {
        let rest = packed
            .strip_prefix("Z:")
            .ok_or(ChangesetError::MissingHeader)?;
        let sign_at = rest
            .find(['>', '<'])
            .ok_or(ChangesetError::MissingHeader)?;
        let old_len = parse_base36(&rest[..sign_at]).ok_or(ChangesetError::BadHeaderLength)?;
        let grows = rest.as_bytes()[sign_at] == b'>';

        let after_sign = &rest[sign_at + 1..];
        let digits = count_base36_digits(after_sign.as_bytes());
        let delta =
            parse_base36(&after_sign[..digits]).ok_or(ChangesetError::BadHeaderLength)?;
        let new_len = if grows {
            old_len.checked_add(delta)
        } else {
            old_len.checked_sub(delta)
        }
        .ok_or(ChangesetError::BadHeaderLength)?;

        let body = &after_sign[digits..];
        let bank_at = body.find('$').ok_or(ChangesetError::MissingCharBank)?;
        Ok(Self {
            old_len,
            new_len,
            ops: &body[..bank_at],
            char_bank: &body[bank_at + 1..],
        })
    }

    /// Document length before the edit.
    pub fn old_len(&self) -> usize {
        self.old_len
    }

    /// Document length after the edit.
    pub fn new_len(&self) -> usize {
        self.new_len
    }

    /// Raw op section.
    pub fn op_text(&self) -> &'a str {
        self.ops
    }

    /// Chars consumed by insert ops.
    pub fn char_bank(&self) -> &'a str {
        self.char_bank
    }

    /// Iterate ops in order. The iterator yields one error and then stops
    /// when the op section is malformed.
    pub fn ops(&self) -> Ops<'a> {
        Ops {
            src: self.ops,
            pos: 0,
            failed: false,
        }
    }
}

/// Iterator over the ops of a [`Changeset`].
#[derive(Debug, Clone)]
pub struct Ops<'a> {
    src: &'a str,
    pos: usize,
    failed: bool,
}

impl Ops<'_> {
    fn parse_op(&mut self) -> Result<Operation, ChangesetError> {
        let bytes = self.src.as_bytes();
        let mut attribs = Vec::new();
        while bytes.get(self.pos) == Some(&b'*') {
            self.pos += 1;
            let offset = self.pos;
            let code = self.take_num()?;
            let code = u32::try_from(code).map_err(|_| ChangesetError::NumberOverflow { offset })?;
            attribs.push(code);
        }

        let mut lines = 0;
        if bytes.get(self.pos) == Some(&b'|') {
            self.pos += 1;
            lines = self.take_num()?;
        }

        let opcode = bytes
            .get(self.pos)
            .copied()
            .and_then(OpCode::from_byte)
            .ok_or(ChangesetError::MalformedOp { offset: self.pos })?;
        self.pos += 1;
        let chars = self.take_num()?;

        Ok(Operation {
            opcode,
            chars,
            lines,
            attribs,
        })
    }

    fn take_num(&mut self) -> Result<usize, ChangesetError> {
        let start = self.pos;
        let digits = count_base36_digits(&self.src.as_bytes()[start..]);
        if digits == 0 {
            return Err(ChangesetError::MalformedOp { offset: start });
        }
        self.pos += digits;
        parse_base36(&self.src[start..self.pos])
            .ok_or(ChangesetError::NumberOverflow { offset: start })
    }
}

impl Iterator for Ops<'_> {
    type Item = Result<Operation, ChangesetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.src.len() {
            return None;
        }
        let item = self.parse_op();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

/// Incrementally builds packed changesets; lengths in the header are derived
/// from the ops pushed.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    ops: String,
    bank: String,
    old_len: usize,
    new_len: usize,
}

impl Builder {
    /// Start an empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain `chars` existing chars (spanning `lines` newlines), applying `attribs`.
    pub fn keep(mut self, chars: usize, lines: usize, attribs: &[u32]) -> Self {
        self.push_op(OpCode::Keep, chars, lines, attribs);
        self.old_len += chars;
        self.new_len += chars;
        self
    }

    /// Insert `text` with `attribs`.
    pub fn insert(mut self, text: &str, attribs: &[u32]) -> Self {
        let chars = text.chars().count();
        let lines = text.matches('\n').count();
        self.push_op(OpCode::Insert, chars, lines, attribs);
        self.bank.push_str(text);
        self.new_len += chars;
        self
    }

    /// Delete `chars` existing chars spanning `lines` newlines.
    pub fn remove(mut self, chars: usize, lines: usize) -> Self {
        self.push_op(OpCode::Delete, chars, lines, &[]);
        self.old_len += chars;
        self
    }

    /// Packed text for the ops pushed so far.
    pub fn build(&self) -> String {
        let (sign, delta) = if self.new_len >= self.old_len {
            ('>', self.new_len - self.old_len)
        } else {
            ('<', self.old_len - self.new_len)
        };
        format!(
            "Z:{}{sign}{}{}${}",
            to_base36(self.old_len),
            to_base36(delta),
            self.ops,
            self.bank
        )
    }

    fn push_op(&mut self, opcode: OpCode, chars: usize, lines: usize, attribs: &[u32]) {
        for code in attribs {
            self.ops.push('*');
            self.ops.push_str(&to_base36(*code as usize));
        }
        if lines > 0 {
            self.ops.push('|');
            self.ops.push_str(&to_base36(lines));
        }
        self.ops.push(opcode.symbol());
        self.ops.push_str(&to_base36(chars));
    }
}

/// Render `n` in lowercase base 36.
pub fn to_base36(mut n: usize) -> String {
    if n == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(char::from(BASE36_DIGITS[n % 36]));
        n /= 36;
    }
    digits.iter().rev().collect()
}

/// Parse a lowercase base-36 number. Empty or non-digit input yields `None`.
pub fn parse_base36(s: &str) -> Option<usize> {
    if s.is_empty() || count_base36_digits(s.as_bytes()) != s.len() {
        return None;
    }
    usize::from_str_radix(s, 36).ok()
}

fn count_base36_digits(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take_while(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
        .count()
}
