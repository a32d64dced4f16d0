// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lazy buffer → kernel-framebuffer bindings.
//!
//! Scan-out needs a kernel framebuffer object wrapping the client's
//! buffer. Creating one is an ioctl round-trip, so the binding is made on
//! first presentation of each buffer and reused for every later flip of
//! the same buffer. Engines render into a small rotating set of buffers;
//! after the first lap the cache serves every frame without touching the
//! kernel.

use std::collections::HashMap;

use scoria_core::buffer::{BufferId, ScanoutBuffer};

use crate::device::{FramebufferId, KmsDevice};
use crate::error::KmsError;

/// Cache of kernel framebuffer objects keyed by buffer identity.
#[derive(Debug, Default)]
pub struct FramebufferCache {
    bindings: HashMap<BufferId, FramebufferId>,
}

impl FramebufferCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The framebuffer bound to `buffer`, creating it on first use.
    ///
    /// A buffer whose format/modifier combination the device cannot scan
    /// out fails with [`KmsError::Framebuffer`] and leaves no binding.
    pub fn get_or_create<D: KmsDevice>(
        &mut self,
        device: &D,
        buffer: &dyn ScanoutBuffer,
    ) -> Result<FramebufferId, KmsError> {
        let id = buffer.identity();
        if let Some(&fb) = self.bindings.get(&id) {
            return Ok(fb);
        }
        let fb = device.create_framebuffer(&buffer.layout())?;
        log::debug!("bound buffer {id:?} to framebuffer {fb:?}");
        self.bindings.insert(id, fb);
        Ok(fb)
    }

    /// Drops the binding for `buffer` and destroys its framebuffer.
    ///
    /// For use when a buffer is retired for good; a buffer that was never
    /// bound is a no-op. The caller must ensure the buffer is no longer
    /// being scanned out.
    pub fn release<D: KmsDevice>(&mut self, device: &D, buffer: BufferId) -> Result<(), KmsError> {
        if let Some(fb) = self.bindings.remove(&buffer) {
            device.destroy_framebuffer(fb)?;
        }
        Ok(())
    }

    /// Destroys every binding. Errors are logged, not propagated; this
    /// runs on teardown when there is nothing left to fail over to.
    pub fn clear<D: KmsDevice>(&mut self, device: &D) {
        for (buffer, fb) in self.bindings.drain() {
            if let Err(e) = device.destroy_framebuffer(fb) {
                log::warn!("failed to destroy framebuffer {fb:?} for buffer {buffer:?}: {e}");
            }
        }
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// No live bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
