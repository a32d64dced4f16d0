// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The cross-thread task queue and its integrated wait set.
//!
//! [`TaskQueue`] is a many-producer, single-consumer work list ordered by
//! target time. Producers on any thread call [`TaskQueue::post`] /
//! [`TaskQueue::post_delayed`]; the presentation thread alone calls
//! [`TaskQueue::wait_and_take_next`], which suspends until one of
//!
//! - the earliest pending target time arrives,
//! - a producer posts a task that precedes every pending deadline, or
//! - the caller-supplied display fd becomes readable (a hardware
//!   completion event is waiting), or
//! - the caller-supplied wait cap expires.
//!
//! The delivered order is the contract: non-decreasing target time, with
//! FIFO submission order among equal targets. Storage is an unordered
//! `Vec` scanned at dequeue time — at queue depths this runtime sees
//! (tens of entries), a scan beats maintaining a heap, and the scan keeps
//! the FIFO tie-break trivially correct.
//!
//! Wakeups ride an `eventfd`: a producer writes it only when its task
//! improves on the soonest pending deadline, so a consumer sleeping
//! toward the right deadline is never woken pointlessly.

use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::{Arc, Mutex};

use rustix::event::{EventfdFlags, PollFd, PollFlags, eventfd, poll};
use rustix::time::Timespec;

use crate::task::Task;
use crate::time::{self, TimePoint};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// What [`TaskQueue::wait_and_take_next`] woke up for.
#[derive(Debug)]
pub enum WorkItem {
    /// The globally earliest due task.
    Task(Task),
    /// The display fd is readable; the caller should drain hardware
    /// events before waiting again.
    DisplayReady,
    /// The caller's wait cap expired with nothing else actionable.
    WaitLapsed,
}

struct Entry {
    seq: u64,
    target: TimePoint,
    task: Task,
}

#[derive(Default)]
struct QueueState {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl QueueState {
    /// Index of the entry with the smallest `(target, seq)`.
    fn earliest_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| (entry.target, entry.seq))
            .map(|(index, _)| index)
    }

    fn soonest_target(&self) -> Option<TimePoint> {
        self.entries.iter().map(|entry| entry.target).min()
    }
}

struct Shared {
    state: Mutex<QueueState>,
    wake: OwnedFd,
}

/// Time-ordered, cross-thread work queue.
///
/// Cloning yields another handle to the same queue; producer operations
/// are safe from any number of threads, while exactly one thread may
/// consume.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue").field("len", &self.len()).finish()
    }
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> io::Result<Self> {
        let wake = eventfd(0, EventfdFlags::CLOEXEC | EventfdFlags::NONBLOCK)
            .map_err(io::Error::from)?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                wake,
            }),
        })
    }

    /// Appends a task for immediate dispatch. Callable from any thread.
    pub fn post(&self, task: Task) {
        self.post_at(task, TimePoint::IMMEDIATE);
    }

    /// Appends a task to dispatch once `target` arrives. Callable from any
    /// thread.
    pub fn post_delayed(&self, task: Task, target: TimePoint) {
        self.post_at(task, target);
    }

    fn post_at(&self, task: Task, target: TimePoint) {
        let improves_deadline = {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            let improves = match state.soonest_target() {
                Some(soonest) => target < soonest,
                None => true,
            };
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.push(Entry { seq, target, task });
            improves
        };
        if improves_deadline {
            self.ring_wake();
        }
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    /// Returns `true` when no tasks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until one unit of work is available and returns it.
    ///
    /// `display_fd`, when given, joins the wait set; readability is
    /// reported as [`WorkItem::DisplayReady`] without reading from the fd.
    /// `wait_cap`, when given, bounds the sleep; an expired cap with no
    /// due task and no readable fd yields [`WorkItem::WaitLapsed`].
    ///
    /// Single consumer only. Suspension happens only here; every producer
    /// operation is non-blocking and bounded.
    pub fn wait_and_take_next(
        &self,
        display_fd: Option<BorrowedFd<'_>>,
        wait_cap: Option<TimePoint>,
    ) -> io::Result<WorkItem> {
        loop {
            let now = time::now();

            let next_deadline = {
                let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
                match state.earliest_index() {
                    Some(index) if state.entries[index].target.is_due(now) => {
                        let entry = state.entries.remove(index);
                        return Ok(WorkItem::Task(entry.task));
                    }
                    Some(index) => Some(state.entries[index].target),
                    None => None,
                }
            };

            if wait_cap.is_some_and(|cap| cap.is_due(now)) {
                return Ok(WorkItem::WaitLapsed);
            }

            let deadline = match (next_deadline, wait_cap) {
                (Some(task), Some(cap)) => Some(task.min(cap)),
                (Some(task), None) => Some(task),
                (None, cap) => cap,
            };
            let timeout = deadline.map(|target| nanos_to_timespec(target.nanos_until(now)));

            let mut fds = Vec::with_capacity(2);
            fds.push(PollFd::from_borrowed_fd(self.shared.wake.as_fd(), PollFlags::IN));
            if let Some(fd) = display_fd {
                fds.push(PollFd::from_borrowed_fd(fd, PollFlags::IN));
            }

            match poll(&mut fds, timeout.as_ref()) {
                Ok(_) => {}
                Err(rustix::io::Errno::INTR) => continue,
                Err(errno) => return Err(io::Error::from(errno)),
            }

            if fds.len() == 2 && fds[1].revents().contains(PollFlags::IN) {
                // Drain a pending wake too so it does not spin us later.
                if fds[0].revents().contains(PollFlags::IN) {
                    self.drain_wake();
                }
                return Ok(WorkItem::DisplayReady);
            }
            if fds[0].revents().contains(PollFlags::IN) {
                self.drain_wake();
            }
            // Either a wake or a timeout: re-evaluate from the top.
        }
    }

    fn ring_wake(&self) {
        let _ = rustix::io::write(&self.shared.wake, &1_u64.to_ne_bytes());
    }

    fn drain_wake(&self) {
        let mut buf = [0_u8; 8];
        let _ = rustix::io::read(&self.shared.wake, &mut buf);
    }
}

fn nanos_to_timespec(nanos: u64) -> Timespec {
    Timespec {
        tv_sec: i64::try_from(nanos / NANOS_PER_SECOND).unwrap_or(i64::MAX),
        tv_nsec: i64::try_from(nanos % NANOS_PER_SECOND).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::{TaskQueue, WorkItem};
    use crate::task::{Baton, Task};
    use crate::time::{self, TimePoint};
    use std::os::fd::AsFd;
    use std::time::Duration;

    fn vblank(n: i64) -> Task {
        Task::VblankRequest { baton: Baton(n) }
    }

    fn take_baton(item: WorkItem) -> i64 {
        match item {
            WorkItem::Task(Task::VblankRequest { baton }) => baton.0,
            other => panic!("expected a vblank-request task, got {other:?}"),
        }
    }

    #[test]
    fn immediate_tasks_come_out_in_submission_order() {
        let queue = TaskQueue::new().unwrap();
        queue.post(vblank(1));
        queue.post(vblank(2));
        queue.post(vblank(3));

        for expected in 1..=3 {
            let item = queue.wait_and_take_next(None, None).unwrap();
            assert_eq!(take_baton(item), expected);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn delayed_tasks_come_out_in_target_order() {
        let queue = TaskQueue::new().unwrap();
        // Both targets are already in the past, so neither wait blocks;
        // order must follow the targets, not submission.
        queue.post_delayed(vblank(2), TimePoint(20));
        queue.post_delayed(vblank(1), TimePoint(10));

        assert_eq!(take_baton(queue.wait_and_take_next(None, None).unwrap()), 1);
        assert_eq!(take_baton(queue.wait_and_take_next(None, None).unwrap()), 2);
    }

    #[test]
    fn equal_targets_tie_break_by_submission() {
        let queue = TaskQueue::new().unwrap();
        queue.post_delayed(vblank(1), TimePoint(5));
        queue.post_delayed(vblank(2), TimePoint(5));
        queue.post(vblank(3)); // IMMEDIATE sorts before any real target

        assert_eq!(take_baton(queue.wait_and_take_next(None, None).unwrap()), 3);
        assert_eq!(take_baton(queue.wait_and_take_next(None, None).unwrap()), 1);
        assert_eq!(take_baton(queue.wait_and_take_next(None, None).unwrap()), 2);
    }

    #[test]
    fn future_task_is_held_until_due() {
        let queue = TaskQueue::new().unwrap();
        let target = time::now().saturating_add_nanos(20_000_000); // 20ms
        queue.post_delayed(vblank(9), target);

        let before = time::now();
        let item = queue.wait_and_take_next(None, None).unwrap();
        let elapsed = time::now().nanos() - before.nanos();

        assert_eq!(take_baton(item), 9);
        assert!(
            elapsed >= 15_000_000,
            "task released {elapsed}ns after wait start, before its target"
        );
    }

    #[test]
    fn cross_thread_post_wakes_a_blocked_consumer() {
        let queue = TaskQueue::new().unwrap();
        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.post(vblank(42));
        });

        // No deadline at all: only the producer's wake can release this.
        let item = queue.wait_and_take_next(None, None).unwrap();
        assert_eq!(take_baton(item), 42);
        handle.join().unwrap();
    }

    #[test]
    fn earlier_post_preempts_a_long_sleep() {
        let queue = TaskQueue::new().unwrap();
        let far = time::now().saturating_add_nanos(60 * 1_000_000_000);
        queue.post_delayed(vblank(1), far);

        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.post(vblank(2));
        });

        let item = queue.wait_and_take_next(None, None).unwrap();
        assert_eq!(take_baton(item), 2, "the immediate task must jump the queue");
        handle.join().unwrap();
        assert_eq!(queue.len(), 1, "the far-future task stays pending");
    }

    #[test]
    fn readable_display_fd_reports_display_ready() {
        let queue = TaskQueue::new().unwrap();
        let hw = rustix::event::eventfd(0, rustix::event::EventfdFlags::CLOEXEC).unwrap();
        rustix::io::write(&hw, &1_u64.to_ne_bytes()).unwrap();

        let item = queue.wait_and_take_next(Some(hw.as_fd()), None).unwrap();
        assert!(matches!(item, WorkItem::DisplayReady));
    }

    #[test]
    fn due_task_and_display_event_arrive_one_per_call() {
        // One unit of work per call: the hardware event is delivered
        // first, the task on the next call.
        let queue = TaskQueue::new().unwrap();
        queue.post(vblank(7));
        let hw = rustix::event::eventfd(0, rustix::event::EventfdFlags::CLOEXEC).unwrap();
        rustix::io::write(&hw, &1_u64.to_ne_bytes()).unwrap();

        let first = queue.wait_and_take_next(Some(hw.as_fd()), None).unwrap();
        assert!(
            matches!(first, WorkItem::Task(_)),
            "a due task is returned without polling"
        );
        let second = queue.wait_and_take_next(Some(hw.as_fd()), None).unwrap();
        assert!(matches!(second, WorkItem::DisplayReady));
    }

    #[test]
    fn expired_cap_yields_wait_lapsed() {
        let queue = TaskQueue::new().unwrap();
        let cap = time::now(); // already due
        let item = queue.wait_and_take_next(None, Some(cap)).unwrap();
        assert!(matches!(item, WorkItem::WaitLapsed));
    }

    #[test]
    fn cap_does_not_preempt_a_due_task() {
        let queue = TaskQueue::new().unwrap();
        queue.post(vblank(1));
        let cap = time::now();
        let item = queue.wait_and_take_next(None, Some(cap)).unwrap();
        assert!(matches!(item, WorkItem::Task(_)), "due tasks outrank the cap");
    }
}
