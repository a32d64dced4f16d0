// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The scan-out buffer contract.
//!
//! The rendering engine owns its GPU buffers; the presentation side only
//! needs enough of a description to bind one to a kernel framebuffer and to
//! key the framebuffer cache on a stable identity. [`ScanoutBuffer`] is
//! that surface — object-safe so frame submissions can carry
//! `Arc<dyn ScanoutBuffer>` across threads without the runtime knowing the
//! allocator behind it.

use core::fmt;

/// Stable identity of one GPU buffer object.
///
/// The renderer assigns these; the same underlying buffer must always report
/// the same id for the lifetime of the buffer. A buffer-object pointer value
/// or allocator handle is a fine source.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u64);

impl fmt::Debug for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferId({})", self.0)
    }
}

/// One memory plane of a buffer (multi-planar formats have up to four).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferPlane {
    /// Driver buffer handle for this plane.
    pub handle: u32,
    /// Bytes per row.
    pub pitch: u32,
    /// Byte offset of the plane within the buffer.
    pub offset: u32,
}

/// Everything the kernel needs to create a framebuffer from a buffer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferLayout {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format as a DRM fourcc code.
    pub fourcc: u32,
    /// Format modifier, when the allocator produced a tiled/compressed
    /// layout. `None` means linear-or-implicit.
    pub modifier: Option<u64>,
    /// Memory planes, in format order.
    pub planes: Vec<BufferPlane>,
}

/// A renderer-owned buffer eligible for scan-out.
///
/// Implemented by the rendering engine for its buffer objects (e.g. a
/// `gbm` buffer object wrapper). The presentation side holds these only
/// between submission and release.
pub trait ScanoutBuffer: Send + Sync {
    /// Stable identity used to key the framebuffer cache.
    fn identity(&self) -> BufferId;

    /// Layout description used to create the kernel framebuffer on first
    /// scan-out of this buffer.
    fn layout(&self) -> BufferLayout;
}

impl fmt::Debug for dyn ScanoutBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanoutBuffer({:?})", self.identity())
    }
}
