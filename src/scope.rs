// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Scope syntax helpers (§6 "Scope syntax"): strings beginning with `@`
//! (e.g. `@t`, `@n`, `@:stuff`) or `/` (e.g. `//stuff`,
//! `/collection/stuff`), plus the grammar for a bare collection name.

use crate::error::{ProtocolError, Result};

const MAX_NAME_LEN: usize = 255;

/// Whether `s` is a valid bare collection name: `[A-Za-z_][0-9A-Za-z_]{0,254}`.
pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if s.len() > MAX_NAME_LEN {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Extracts the collection name embedded in a scope string, e.g.
/// `cnscope("//stuff")` and `cnscope("@:stuff")` both return `"stuff"`.
/// Fails if the trailing segment is not a valid collection name.
pub fn cnscope(scope: &str) -> Result<&str> {
    let name = if let Some(idx) = scope.rfind(':') {
        &scope[idx + 1..]
    } else if let Some(idx) = scope.rfind('/') {
        &scope[idx + 1..]
    } else {
        ""
    };

    if is_name(name) {
        Ok(name)
    } else {
        Err(ProtocolError::ValueError(format!(
            "invalid (collection) scope name: {scope}"
        )))
    }
}
