// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The presentation loop.
//!
//! [`PresentLoop`] runs on the single presentation thread. Each iteration
//! takes one unit of work from the [`TaskQueue`] — a task, a readable
//! display fd, or an expired wait cap — and dispatches it. Frame
//! submissions become atomic commits; everything else is routed to the
//! host engine's callbacks.
//!
//! At most one commit is in flight at any time. A submission arriving
//! while a flip is pending is deferred in FIFO order and committed from
//! the completion handler, so every submitted frame reaches the kernel as
//! its own commit and batons come back in submission order. A commit the
//! kernel rejects is a dropped frame: the previous buffer stays on
//! screen, the baton is returned immediately, and the loop stays up. A
//! flip confirmation that never arrives is fatal, because the pipeline
//! state is unknowable from then on.

use std::collections::VecDeque;
use std::sync::Arc;

use scoria_core::buffer::{BufferId, ScanoutBuffer};
use scoria_core::queue::{TaskQueue, WorkItem};
use scoria_core::task::{Baton, EngineCallbacks, FrameSubmission, Task};
use scoria_core::time::{self, TimePoint};

use crate::device::{CommitFlags, DisplayEvent, KmsDevice};
use crate::error::KmsError;
use crate::framebuffer::FramebufferCache;
use crate::resources::DisplaySession;

/// How long a flip confirmation may be outstanding before the session is
/// declared wedged.
const DEFAULT_FLIP_TIMEOUT_NANOS: u64 = 1_000_000_000;

/// The one commit currently in flight.
struct PendingFlip {
    /// Buffer being scanned out until this flip lands; handed back to the
    /// renderer on completion.
    releasable: Option<Arc<dyn ScanoutBuffer>>,
    /// Buffer the commit switches to.
    next: Arc<dyn ScanoutBuffer>,
    /// Returned to the producer once the flip is confirmed.
    baton: Baton,
    /// When the commit was issued; bounds the wait for confirmation.
    issued_at: TimePoint,
}

enum FlipState {
    Idle,
    CommitPending(PendingFlip),
}

/// Single-threaded presentation orchestrator.
pub struct PresentLoop<D: KmsDevice, E: EngineCallbacks> {
    session: DisplaySession<D>,
    queue: TaskQueue,
    engine: E,
    framebuffers: FramebufferCache,
    state: FlipState,
    deferred: VecDeque<FrameSubmission>,
    displayed: Option<Arc<dyn ScanoutBuffer>>,
    last_vblank: Option<TimePoint>,
    flip_timeout_nanos: u64,
}

impl<D: KmsDevice, E: EngineCallbacks> PresentLoop<D, E> {
    /// Builds a loop over a configured session.
    #[must_use]
    pub fn new(session: DisplaySession<D>, queue: TaskQueue, engine: E) -> Self {
        Self {
            session,
            queue,
            engine,
            framebuffers: FramebufferCache::new(),
            state: FlipState::Idle,
            deferred: VecDeque::new(),
            displayed: None,
            last_vblank: None,
            flip_timeout_nanos: DEFAULT_FLIP_TIMEOUT_NANOS,
        }
    }

    /// The queue producers should post into.
    #[must_use]
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// The session this loop drives.
    #[must_use]
    pub fn session(&self) -> &DisplaySession<D> {
        &self.session
    }

    /// The host engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Overrides the flip-confirmation timeout.
    pub fn set_flip_timeout_nanos(&mut self, nanos: u64) {
        self.flip_timeout_nanos = nanos;
    }

    /// Runs until a fatal error.
    pub fn run(&mut self) -> Result<(), KmsError> {
        loop {
            self.run_once()?;
        }
    }

    /// Processes exactly one unit of work, blocking until one arrives.
    pub fn run_once(&mut self) -> Result<(), KmsError> {
        let wait_cap = match &self.state {
            FlipState::CommitPending(pending) => {
                Some(pending.issued_at.saturating_add_nanos(self.flip_timeout_nanos))
            }
            FlipState::Idle => None,
        };

        let item = self
            .queue
            .wait_and_take_next(self.session.device().event_fd(), wait_cap)?;
        match item {
            WorkItem::Task(task) => self.dispatch(task),
            WorkItem::DisplayReady => self.service_display(),
            WorkItem::WaitLapsed => {
                if matches!(self.state, FlipState::CommitPending(_)) {
                    log::error!(
                        "no flip confirmation within {}ms; display pipeline state unknown",
                        self.flip_timeout_nanos / 1_000_000,
                    );
                    Err(KmsError::FlipTimeout)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn dispatch(&mut self, task: Task) -> Result<(), KmsError> {
        match task {
            Task::SubmitFrame(submission) => {
                // Always lands behind any already-deferred frames; the
                // pump commits it straight away when nothing is ahead of
                // it and no commit is in flight.
                self.deferred.push_back(submission);
                self.pump_deferred()
            }
            Task::VblankRequest { baton } => {
                let timestamp = self.last_vblank.unwrap_or_else(time::now);
                self.queue.post(Task::VblankReply { timestamp, baton });
                Ok(())
            }
            Task::VblankReply { timestamp, baton } => {
                self.engine.frame_presented(baton, timestamp);
                Ok(())
            }
            Task::OrientationUpdate(orientation) => {
                self.engine.orientation_changed(orientation);
                Ok(())
            }
            Task::PlatformMessage {
                channel,
                payload,
                response,
            } => {
                self.engine.message_received(&channel, &payload, response);
                Ok(())
            }
            Task::MessageResponse { handle, payload } => {
                self.engine.message_response(handle, &payload);
                Ok(())
            }
            Task::Callback(callback) => {
                callback();
                Ok(())
            }
            Task::RegisterTexture(id) => {
                self.engine.texture_registered(id);
                Ok(())
            }
            Task::UnregisterTexture(id) => {
                self.engine.texture_unregistered(id);
                Ok(())
            }
            Task::TextureFrameAvailable(id) => {
                self.engine.texture_frame_available(id);
                Ok(())
            }
            Task::EngineTask(task) => {
                self.engine.run_engine_task(task);
                Ok(())
            }
            Task::RetireBuffer(buffer) => {
                self.retire_buffer(buffer);
                Ok(())
            }
            Task::PointerBatch(samples) => {
                self.engine.pointer_events(&samples);
                Ok(())
            }
        }
    }

    /// Drains hardware completion events and folds them into the flip
    /// state machine.
    fn service_display(&mut self) -> Result<(), KmsError> {
        let configured_crtc = self.session.config().map(|config| config.crtc);
        for event in self.session.device().drain_events()? {
            match event {
                DisplayEvent::PageFlip { crtc, timestamp }
                    if configured_crtc == Some(crtc) =>
                {
                    self.complete_flip(timestamp)?;
                }
                DisplayEvent::PageFlip { crtc, .. } => {
                    log::warn!("page flip on unconfigured crtc {crtc:?}");
                }
                DisplayEvent::Vblank { timestamp, .. } => {
                    self.last_vblank = Some(timestamp);
                }
            }
        }
        Ok(())
    }

    /// Turns a submission into an atomic commit with a flip event.
    fn begin_flip(&mut self, submission: FrameSubmission) -> Result<(), KmsError> {
        let fb = match self
            .framebuffers
            .get_or_create(self.session.device(), submission.buffer.as_ref())
        {
            Ok(fb) => fb,
            Err(e @ KmsError::Framebuffer(_)) => {
                log::error!("dropping frame, buffer cannot be scanned out: {e}");
                self.drop_frame(submission.baton);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let modeset = self.session.modeset_needed();
        let Some(config) = self.session.config() else {
            return Err(KmsError::Configuration(
                "frame submitted before output configuration".to_owned(),
            ));
        };
        let plane = config.primary_plane;
        let crtc = config.crtc;
        let (width, height) = (u64::from(config.mode.width), u64::from(config.mode.height));

        let mut request = self.session.begin_request();
        request.put_modeset_properties()?;
        if modeset {
            // First scan-out on this configuration: route the plane and
            // set its full geometry. Source coordinates are 16.16 fixed
            // point.
            request.put_plane_property(plane, "CRTC_ID", u64::from(crtc.0))?;
            request.put_plane_property(plane, "SRC_X", 0)?;
            request.put_plane_property(plane, "SRC_Y", 0)?;
            request.put_plane_property(plane, "SRC_W", width << 16)?;
            request.put_plane_property(plane, "SRC_H", height << 16)?;
            request.put_plane_property(plane, "CRTC_X", 0)?;
            request.put_plane_property(plane, "CRTC_Y", 0)?;
            request.put_plane_property(plane, "CRTC_W", width)?;
            request.put_plane_property(plane, "CRTC_H", height)?;
        }
        request.put_plane_property(plane, "FB_ID", u64::from(fb.0))?;

        match request.commit(CommitFlags::PAGE_FLIP_EVENT | CommitFlags::NONBLOCK) {
            Ok(()) => {
                self.state = FlipState::CommitPending(PendingFlip {
                    releasable: self.displayed.take(),
                    next: submission.buffer,
                    baton: submission.baton,
                    issued_at: time::now(),
                });
                Ok(())
            }
            Err(e @ KmsError::CommitRejected(_)) => {
                // The previous frame stays on screen; the producer gets
                // its baton back so the frame pipeline keeps moving.
                log::warn!("dropping frame, commit rejected: {e}");
                self.drop_frame(submission.baton);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Tears down the framebuffer binding of a buffer the renderer has
    /// destroyed.
    ///
    /// A retire arriving while the buffer is still referenced by
    /// scan-out is refused; the submission/release protocol means a
    /// correct renderer never sends one.
    fn retire_buffer(&mut self, buffer: BufferId) {
        let in_pending = match &self.state {
            FlipState::CommitPending(pending) => {
                pending.next.identity() == buffer
                    || pending
                        .releasable
                        .as_ref()
                        .is_some_and(|b| b.identity() == buffer)
            }
            FlipState::Idle => false,
        };
        let in_use = in_pending
            || self.displayed.as_ref().is_some_and(|b| b.identity() == buffer)
            || self.deferred.iter().any(|s| s.buffer.identity() == buffer);
        if in_use {
            log::warn!("ignoring retire of buffer {buffer:?} still referenced by scan-out");
            return;
        }
        if let Err(e) = self.framebuffers.release(self.session.device(), buffer) {
            log::warn!("failed to destroy framebuffer of retired buffer {buffer:?}: {e}");
        }
    }

    fn drop_frame(&mut self, baton: Baton) {
        self.queue.post(Task::VblankReply {
            timestamp: time::now(),
            baton,
        });
    }

    /// A flip landed: release the outgoing buffer, return the baton, and
    /// push out the next deferred frame if one is waiting.
    fn complete_flip(&mut self, timestamp: TimePoint) -> Result<(), KmsError> {
        let pending = match std::mem::replace(&mut self.state, FlipState::Idle) {
            FlipState::CommitPending(pending) => pending,
            FlipState::Idle => {
                log::warn!("page-flip event with no commit in flight");
                return Ok(());
            }
        };

        if let Some(released) = pending.releasable {
            self.engine.buffer_released(&released);
        }
        self.displayed = Some(pending.next);
        self.last_vblank = Some(timestamp);
        self.queue.post(Task::VblankReply {
            timestamp,
            baton: pending.baton,
        });

        self.pump_deferred()
    }

    /// Commits deferred frames in FIFO order until one is in flight or
    /// the queue runs dry.
    ///
    /// A rejected commit drops that frame only; the frames behind it
    /// still go out, in order.
    fn pump_deferred(&mut self) -> Result<(), KmsError> {
        while matches!(self.state, FlipState::Idle) {
            let Some(next) = self.deferred.pop_front() else {
                return Ok(());
            };
            self.begin_flip(next)?;
        }
        Ok(())
    }
}

impl<D: KmsDevice, E: EngineCallbacks> Drop for PresentLoop<D, E> {
    fn drop(&mut self) {
        self.framebuffers.clear(self.session.device());
    }
}
