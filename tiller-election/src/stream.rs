//! # Leadership Event Stream
//!
//! Bounded, deduplicated delivery of [`LeadershipState`] values to a
//! single downstream subscriber. Leadership events are idempotent
//! observations of current state, so the queue drops its oldest element
//! on overflow; a newer observation always supersedes an older one.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

use tiller_core::LeadershipState;

use crate::errors::{ElectionError, ElectionResult};

/// Maximum number of undelivered leadership events.
const QUEUE_CAPACITY: usize = 16;

enum Completion {
    Closed,
    Failed(ElectionError),
}

struct StreamShared {
    queue: Mutex<VecDeque<LeadershipState>>,
    /// Dedup state, seeded with `Standby(None)` so nothing is delivered
    /// until something definite is known.
    last_emitted: Mutex<LeadershipState>,
    completion: Mutex<Option<Completion>>,
    emitted_any: AtomicBool,
    notify: Notify,
}

/// Creates a connected publisher/subscriber pair.
pub(crate) fn leadership_stream() -> (EventPublisher, LeadershipEvents) {
    let shared = Arc::new(StreamShared {
        queue: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
        last_emitted: Mutex::new(LeadershipState::Standby(None)),
        completion: Mutex::new(None),
        emitted_any: AtomicBool::new(false),
        notify: Notify::new(),
    });
    (
        EventPublisher {
            shared: Arc::clone(&shared),
        },
        LeadershipEvents { shared },
    )
}

/// Producer side of the stream, held by the watch/poll loop and the
/// lifecycle controller.
#[derive(Clone)]
pub(crate) struct EventPublisher {
    shared: Arc<StreamShared>,
}

impl EventPublisher {
    /// Offers a leadership observation. Returns whether it was emitted;
    /// observations equal to the immediately preceding emission are
    /// filtered out.
    pub(crate) fn offer(&self, state: LeadershipState) -> bool {
        if self.shared.completion.lock().is_some() {
            return false;
        }
        {
            let mut last = self.shared.last_emitted.lock();
            if *last == state {
                return false;
            }
            *last = state.clone();
        }

        match &state {
            LeadershipState::ElectedAsLeader => info!("leader won"),
            LeadershipState::Standby(Some(leader)) => {
                info!("leader defeated; current leader = {}", leader)
            }
            LeadershipState::Standby(None) => info!("leader unknown"),
        }

        self.push(state);
        self.shared.emitted_any.store(true, Ordering::SeqCst);
        true
    }

    /// Completes the stream normally, appending the terminal
    /// `Standby(None)` so every subscriber's last observed state is
    /// "not leader". The terminal event goes through the same dedup as
    /// every other emission, which keeps the no-consecutive-equals
    /// guarantee when the loop already reported an unknown leader.
    /// Already-completed streams are left as they are.
    pub(crate) fn complete(&self) {
        {
            let completion = self.shared.completion.lock();
            if completion.is_some() {
                return;
            }
        }

        self.offer(LeadershipState::Standby(None));

        let mut completion = self.shared.completion.lock();
        if completion.is_none() {
            *completion = Some(Completion::Closed);
        }
        drop(completion);
        self.shared.notify.notify_one();
    }

    /// Fails the stream. The first completion wins; later calls are
    /// ignored.
    pub(crate) fn fail(&self, error: ElectionError) {
        let mut completion = self.shared.completion.lock();
        if completion.is_some() {
            return;
        }
        *completion = Some(Completion::Failed(error));
        drop(completion);
        self.shared.notify.notify_one();
    }

    /// Whether any event has been emitted since stream start.
    pub(crate) fn any_emitted(&self) -> bool {
        self.shared.emitted_any.load(Ordering::SeqCst)
    }

    /// Whether the stream has completed or failed.
    pub(crate) fn is_complete(&self) -> bool {
        self.shared.completion.lock().is_some()
    }

    fn push(&self, state: LeadershipState) {
        {
            let mut queue = self.shared.queue.lock();
            if queue.len() == QUEUE_CAPACITY {
                let dropped = queue.pop_front();
                debug!("leadership queue full, dropping oldest event {:?}", dropped);
            }
            queue.push_back(state);
        }
        self.shared.notify.notify_one();
    }
}

/// Subscriber side of the stream.
///
/// A slow subscriber only loses the oldest undelivered observations;
/// the newest state is always retained.
pub struct LeadershipEvents {
    shared: Arc<StreamShared>,
}

impl LeadershipEvents {
    /// Waits for the next leadership event.
    ///
    /// Returns `Ok(Some(state))` for each event, `Ok(None)` once the
    /// stream has completed and drained, and `Err` exactly once if the
    /// stream failed.
    pub async fn next(&mut self) -> ElectionResult<Option<LeadershipState>> {
        loop {
            let notified = self.shared.notify.notified();

            if let Some(state) = self.shared.queue.lock().pop_front() {
                return Ok(Some(state));
            }

            {
                let mut completion = self.shared.completion.lock();
                match completion.as_ref() {
                    Some(Completion::Closed) => return Ok(None),
                    Some(Completion::Failed(_)) => {
                        let failed =
                            std::mem::replace(&mut *completion, Some(Completion::Closed));
                        if let Some(Completion::Failed(err)) = failed {
                            return Err(err);
                        }
                        return Ok(None);
                    }
                    None => {}
                }
            }

            notified.await;
        }
    }
}
