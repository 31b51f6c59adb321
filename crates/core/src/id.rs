// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process identifier generation.

use uuid::Uuid;

/// Maximum length of a gupid, in bytes.
pub const GUPID_MAX_LEN: usize = 20;

/// Generate a globally unique per-process identifier (gupid).
///
/// Consumers store this in fixed-size records, hence the 20-byte cap.
pub fn generate_gupid() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(GUPID_MAX_LEN);
    id
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
