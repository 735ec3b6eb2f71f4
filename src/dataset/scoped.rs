use tracing::warn;

use crate::{
    error::{Result, Step},
    storage::{Identity, Storage},
};

/// Holds one backend identity for the length of an operation.
///
/// The success path hands it back with `close`, so a failed release is an
/// error like any other step. On every other path it is released on drop,
/// where a failure can only be logged.
pub(crate) struct Scoped<'a, S: Storage, I: Identity> {
    storage: &'a S,
    id: I,
    armed: bool,
}

impl<'a, S: Storage, I: Identity> Scoped<'a, S, I> {
    pub(crate) fn acquire(storage: &'a S, res: anyhow::Result<I>, step: &str) -> Result<Self> {
        Ok(Scoped {
            storage,
            id: res.step(step)?,
            armed: true,
        })
    }

    pub(crate) fn id(&self) -> I {
        self.id
    }

    pub(crate) fn close(mut self, step: &str) -> Result<()> {
        self.armed = false;
        self.id.release(self.storage).step(step)
    }

    /// Keeps the identity alive past this operation.
    pub(crate) fn into_inner(mut self) -> I {
        self.armed = false;
        self.id
    }
}

impl<'a, S: Storage, I: Identity> Drop for Scoped<'a, S, I> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.id.release(self.storage) {
                warn!(id = ?self.id, error = %err, "failed to release identity");
            }
        }
    }
}
