// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy of the KMS backend.
//!
//! Every failure path maps to one distinguishable kind; nothing is
//! suppressed or retried silently. Recovery policy lives with the callers:
//! only [`KmsError::CommitRejected`] is survivable (the presentation loop
//! drops the frame and keeps the previous buffer on screen), everything
//! else tears the session down.

use std::io;

use thiserror::Error;

/// Errors produced by the KMS backend.
#[derive(Debug, Error)]
pub enum KmsError {
    /// The device is missing a hard capability requirement (atomic
    /// mode-setting, universal planes) or could not be opened. Fatal; the
    /// session cannot start.
    #[error("display device unsuitable: {0}")]
    Resource(String),

    /// The requested output path or session state is invalid (encoder not
    /// reachable from connector, CRTC not reachable from encoder, commit
    /// without configuration). A programmer or driver-mismatch error,
    /// surfaced immediately.
    #[error("invalid display configuration: {0}")]
    Configuration(String),

    /// No property of the given name exists on the addressed object.
    #[error("object {object} has no property named {name:?}")]
    UnknownProperty {
        /// Kernel object id the write addressed.
        object: u32,
        /// Requested property name.
        name: String,
    },

    /// The kernel refused an atomic commit (bandwidth, format or
    /// constraint violation). The frame is droppable; the session
    /// survives.
    #[error("atomic commit rejected")]
    CommitRejected(#[source] io::Error),

    /// The buffer's format/modifier combination cannot be scanned out.
    /// Fatal for that buffer only.
    #[error("buffer not scanout-capable: {0}")]
    Framebuffer(String),

    /// A page-flip confirmation never arrived. The pipeline state is
    /// unknown; fatal to the session.
    #[error("page-flip confirmation timed out")]
    FlipTimeout,

    /// Underlying device or wait-set I/O failure.
    #[error("display device i/o")]
    Io(#[from] io::Error),
}
