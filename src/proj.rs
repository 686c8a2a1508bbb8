//! Projection-operator cache with content-hash invalidation.
//!
//! The composed operator is expensive enough to cache but must never be
//! stale: a stale operator silently corrupts every subsequent read. The
//! cache therefore carries an explicit `Invalid` state (set on any
//! mutation of the projection list) in addition to a digest over the
//! vectors and the cached operator, so both flag flips and data edits
//! force a rebuild before the next read.

use polyrec_meta::{Matrix, Projection};
use sha2::{Digest, Sha256};
use tracing::debug;

#[derive(Debug, Clone)]
enum CacheState {
    /// The cached operator may not match the projection list.
    Invalid,
    /// Operator known to match the digest.
    Valid {
        operator: Option<Matrix>,
        hash: [u8; 32],
    },
}

/// Cache for the composed projection operator.
#[derive(Debug, Clone)]
pub struct ProjectorCache {
    state: CacheState,
}

impl Default for ProjectorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectorCache {
    /// New cache in the invalid state; the first `ensure_with` rebuilds.
    pub fn new() -> Self {
        Self {
            state: CacheState::Invalid,
        }
    }

    /// Mark the cache invalid. Called on every mutation of the
    /// projection list.
    pub fn invalidate(&mut self) {
        self.state = CacheState::Invalid;
    }

    /// The cached operator, if the cache is valid and any active
    /// vectors exist.
    pub fn operator(&self) -> Option<&Matrix> {
        match &self.state {
            CacheState::Valid { operator, .. } => operator.as_ref(),
            CacheState::Invalid => None,
        }
    }

    /// Rebuild the operator via `builder` if the projection list no
    /// longer matches the cached state. Returns whether a rebuild
    /// happened.
    ///
    /// The builder is injected so production uses the projection math
    /// while tests count invocations.
    pub fn ensure_with<F>(&mut self, projs: &[Projection], builder: F) -> bool
    where
        F: FnOnce(&[Projection]) -> Option<Matrix>,
    {
        let current_operator = match &self.state {
            CacheState::Valid { operator, .. } => operator.as_ref(),
            CacheState::Invalid => None,
        };
        let candidate = digest(projs, current_operator);

        if let CacheState::Valid { hash, .. } = &self.state {
            if *hash == candidate {
                return false;
            }
        }

        let operator = builder(projs);
        let hash = digest(projs, operator.as_ref());
        debug!(
            n_projs = projs.len(),
            has_operator = operator.is_some(),
            "rebuilt projection operator"
        );
        self.state = CacheState::Valid { operator, hash };
        true
    }
}

/// Digest over every vector's raw numeric payload and active flag, plus
/// the operator itself when present.
fn digest(projs: &[Projection], operator: Option<&Matrix>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for p in projs {
        for v in &p.data {
            hasher.update(v.to_le_bytes());
        }
        hasher.update([u8::from(p.active)]);
    }
    if let Some(op) = operator {
        for v in op.as_slice() {
            hasher.update(v.to_le_bytes());
        }
    }
    hasher.finalize().into()
}
