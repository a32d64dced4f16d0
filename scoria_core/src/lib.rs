// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core task scheduling and pointer model for direct-scanout presentation.
//!
//! `scoria_core` holds everything in the presentation runtime that does not
//! touch the kernel display interface: monotonic time, the cross-thread task
//! queue consumed by the single presentation thread, the normalized
//! pointer/multitouch model, the scan-out buffer contract, and the callback
//! seam to the rendering engine.
//!
//! # Architecture
//!
//! Work flows one direction into the presentation thread and one direction
//! back out to the engine:
//!
//! ```text
//!   engine / input threads
//!       │ post / post_delayed
//!       ▼
//!   TaskQueue ──► wait_and_take_next() ──► WorkItem
//!                                             │
//!                     ┌───────────────────────┘
//!                     ▼
//!   presentation loop (backend crate) ──► EngineCallbacks
//! ```
//!
//! **[`time`]** — [`TimePoint`](time::TimePoint) in monotonic nanoseconds
//! and the [`now()`](time::now) clock read.
//!
//! **[`task`]** — The closed [`Task`](task::Task) sum type and the
//! [`EngineCallbacks`](task::EngineCallbacks) outbound contract.
//!
//! **[`queue`]** — The many-producer, single-consumer
//! [`TaskQueue`](queue::TaskQueue) with deadline ordering and an integrated
//! hardware wait set.
//!
//! **[`buffer`]** — The [`ScanoutBuffer`](buffer::ScanoutBuffer) trait
//! describing renderer-owned buffers to the scan-out path.
//!
//! **[`pointer`]** / **[`touch`]** — Normalized pointer phases, the shared
//! mouse slot, and per-device multitouch slot tracking.

pub mod buffer;
pub mod pointer;
pub mod queue;
pub mod task;
pub mod time;
pub mod touch;
