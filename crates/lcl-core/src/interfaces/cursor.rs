// crates/lcl-core/src/interfaces/cursor.rs
// ============================================================================
// Module: Page Cursors
// Description: Opaque keyset pagination tokens.
// Purpose: Encode store-internal row ids as stable, versioned page tokens.
// Dependencies: base64, thiserror
// ============================================================================

//! ## Overview
//! Page tokens are opaque to clients: base64 of `v1:<internal id>`. The id
//! refers to the store-internal monotonic insertion id of the last row on the
//! previous page. Tokens are deterministic, so identical queries produce
//! identical `next_page_token` values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Cursor decoding failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// Token is not valid base64, has the wrong prefix, or a non-numeric id.
    #[error("malformed page token")]
    Malformed,
}

// ============================================================================
// SECTION: Cursor
// ============================================================================

/// Version prefix baked into every encoded token.
const CURSOR_PREFIX: &str = "v1:";

/// Keyset pagination cursor wrapping a store-internal row id.
///
/// # Invariants
/// - The wrapped id refers to the last row of the previous page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor(i64);

impl PageCursor {
    /// Creates a cursor from a store-internal row id.
    #[must_use]
    pub const fn new(last_row_id: i64) -> Self {
        Self(last_row_id)
    }

    /// Returns the wrapped row id.
    #[must_use]
    pub const fn last_row_id(self) -> i64 {
        self.0
    }

    /// Encodes the cursor as an opaque page token.
    #[must_use]
    pub fn encode(self) -> String {
        BASE64.encode(format!("{CURSOR_PREFIX}{}", self.0))
    }

    /// Decodes an opaque page token.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Malformed`] when the token is not base64, lacks
    /// the version prefix, or carries a non-numeric id.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = BASE64.decode(token).map_err(|_| CursorError::Malformed)?;
        let text = String::from_utf8(bytes).map_err(|_| CursorError::Malformed)?;
        let id_text = text.strip_prefix(CURSOR_PREFIX).ok_or(CursorError::Malformed)?;
        let id: i64 = id_text.parse().map_err(|_| CursorError::Malformed)?;
        Ok(Self(id))
    }
}
