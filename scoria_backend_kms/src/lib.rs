// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linux DRM/KMS backend for the scoria presentation runtime.
//!
//! This crate owns everything that talks to the kernel display interface:
//!
//! **[`device`]** — The [`KmsDevice`](device::KmsDevice) seam: the narrow
//! set of kernel operations the runtime needs, implemented by the real
//! [`Card`](card::Card) and by test doubles.
//!
//! **[`resources`]** — [`DisplaySession`](resources::DisplaySession):
//! enumerated connectors/encoders/CRTCs/planes with their property tables,
//! the selected output configuration, and the commit-serializing lock.
//!
//! **[`atomic`]** — [`AtomicRequest`](atomic::AtomicRequest): a single-use
//! accumulator of by-name property writes, committed as one kernel atomic
//! operation.
//!
//! **[`framebuffer`]** — [`FramebufferCache`](framebuffer::FramebufferCache):
//! lazy buffer-object → kernel-framebuffer bindings.
//!
//! **[`present`]** — [`PresentLoop`](present::PresentLoop): the
//! presentation thread's orchestrator, interleaving queue work with
//! page-flip completions under the one-commit-in-flight invariant.
//!
//! # Threading
//!
//! Exactly one thread runs the presentation loop and touches the kernel.
//! Every other thread reaches it through
//! [`TaskQueue`](scoria_core::queue::TaskQueue). The session's commit lock
//! is a correctness backstop, not the primary concurrency mechanism.

pub mod atomic;
pub mod card;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod present;
pub mod resources;

#[cfg(test)]
pub(crate) mod fake;

pub use error::KmsError;
