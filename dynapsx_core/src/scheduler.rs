// SPDX-License-Identifier: GPL-3.0
// scheduler.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

use log::trace;

/// Clock rate of the R3000A in cycles per second.
pub const PSX_CPU_FREQ: u64 = 33_868_800;

/// Cycles per NTSC frame (60 Hz).
pub const CYCLES_PER_FRAME_NTSC: u64 = PSX_CPU_FREQ / 60;

/// Cycles per PAL frame (50 Hz).
pub const CYCLES_PER_FRAME_PAL: u64 = PSX_CPU_FREQ / 50;

/// Identifies one of the fixed event slots. Scheduling an id that is already
/// pending moves its deadline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventId {
    VBlank,
}

/// Number of event slots.
const EVENT_COUNT: usize = 1;

/// An event callback. It receives the context the scheduler was dispatched
/// with, the scheduler itself (to reschedule), and the deadline it was due at.
pub type EventCallback<C> = fn(&mut C, &mut Scheduler<C>, u64);

/// One event slot.
struct ScheduledEvent<C> {
    deadline: u64,
    callback: EventCallback<C>,
}

/// A cycle-deadline event queue with one slot per `EventId`. Events only fire
/// from `dispatch_events`, which the dispatch loop calls between blocks.
pub struct Scheduler<C> {
    events: [Option<ScheduledEvent<C>>; EVENT_COUNT],

    // Earliest pending deadline, kept current on every change.
    cached_earliest: Option<u64>,
}

impl<C> Scheduler<C> {

    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Scheduler {
            events: std::array::from_fn(|_| None),
            cached_earliest: None,
        }
    }

    /// Schedules (or reschedules) an event to fire at an absolute cycle.
    pub fn schedule_event(&mut self, id: EventId, cycle: u64, callback: EventCallback<C>) {
        trace!("scheduling {:?} at cycle {}", id, cycle);
        self.events[id as usize] = Some(ScheduledEvent { deadline: cycle, callback });
        self.refresh_earliest();
    }

    /// Removes a pending event. Removing an idle slot does nothing.
    pub fn remove_event(&mut self, id: EventId) {
        self.events[id as usize] = None;
        self.refresh_earliest();
    }

    /// Returns true if the event is pending.
    pub fn is_scheduled(&self, id: EventId) -> bool {
        self.events[id as usize].is_some()
    }

    /// The earliest pending deadline, or `None` when nothing is scheduled.
    #[inline(always)]
    pub fn next_deadline(&self) -> Option<u64> {
        self.cached_earliest
    }

    /// Fires every event whose deadline is at or before `current_cycle`, in
    /// deadline order. A callback that reschedules itself into the past
    /// fires again within the same call.
    pub fn dispatch_events(&mut self, context: &mut C, current_cycle: u64) {

        while let Some(deadline) = self.cached_earliest {
            if deadline > current_cycle {
                break;
            }

            let Some(slot) = self.events.iter().position(|event| {
                event.as_ref().is_some_and(|event| event.deadline == deadline)
            }) else {
                break;
            };
            let Some(event) = self.events[slot].take() else {
                break;
            };
            self.refresh_earliest();

            trace!("dispatching event slot {} due at {} (now {})", slot, deadline, current_cycle);
            (event.callback)(context, self, event.deadline);
        }
    }

    fn refresh_earliest(&mut self) {
        self.cached_earliest = self.events.iter().flatten().map(|event| event.deadline).min();
    }
}
