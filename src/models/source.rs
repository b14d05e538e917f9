// src/models/source.rs

//! Upstream ban source identity.

use serde::{Deserialize, Serialize};

/// A logical upstream origin of bans.
///
/// The `name` is globally unique and stable; `id` is store-assigned.
/// Rows are created lazily the first time an adapter declaring the name
/// runs, and are never mutated or deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BanSource {
    pub id: i64,
    pub name: String,
}

impl BanSource {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
