//! One-shot and repeating timers on a virtual millisecond clock.
//!
//! Tasks are plain values; the owner pops the due ones and dispatches them
//! itself, so a timer never holds a borrow of the engine.

use crate::voice::VoiceNodes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Work carried by a timer.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerTask {
    /// Periodic modulation firing for session `session`.
    ModulationTick { session: u64 },
    /// Second half of a modulation cycle: ramp back to base by `end_time`.
    ModulationDownRamp { session: u64, end_time: f64 },
    /// Fade window elapsed: halt and discard a released voice.
    FadeComplete { voice: VoiceNodes },
}

#[derive(Debug, Clone)]
struct Timer {
    id: TimerId,
    deadline_ms: f64,
    period_ms: Option<f64>,
    task: TimerTask,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `task` once, `delay_ms` after `now_ms`.
    pub fn set_timeout(&mut self, now_ms: f64, delay_ms: f64, task: TimerTask) -> TimerId {
        self.push(now_ms + delay_ms.max(0.0), None, task)
    }

    /// Fire `task` every `period_ms`, first at `now_ms + period_ms`.
    pub fn set_interval(&mut self, now_ms: f64, period_ms: f64, task: TimerTask) -> TimerId {
        // A zero period would fire forever within one instant.
        let period = period_ms.max(1.0);
        self.push(now_ms + period, Some(period), task)
    }

    fn push(&mut self, deadline_ms: f64, period_ms: Option<f64>, task: TimerTask) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.push(Timer {
            id,
            deadline_ms,
            period_ms,
            task,
        });
        id
    }

    /// Cancel a timer. Unknown or already fired ids are ignored.
    pub fn clear(&mut self, id: TimerId) -> Option<TimerTask> {
        let idx = self.timers.iter().position(|t| t.id == id)?;
        Some(self.timers.remove(idx).task)
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Deadline of a pending timer.
    pub fn deadline(&self, id: TimerId) -> Option<f64> {
        self.timers.iter().find(|t| t.id == id).map(|t| t.deadline_ms)
    }

    /// Period of a pending repeating timer.
    pub fn period(&self, id: TimerId) -> Option<f64> {
        self.timers.iter().find(|t| t.id == id).and_then(|t| t.period_ms)
    }

    /// Remove and return the earliest timer due at `now_ms`. Ties go to the
    /// timer registered first. Repeating timers are re-armed for their next
    /// period before being returned.
    pub fn pop_due(&mut self, now_ms: f64) -> Option<(TimerId, TimerTask)> {
        let idx = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline_ms <= now_ms)
            .min_by(|(_, a), (_, b)| {
                a.deadline_ms
                    .total_cmp(&b.deadline_ms)
                    .then(a.id.cmp(&b.id))
            })
            .map(|(i, _)| i)?;

        let timer = &mut self.timers[idx];
        match timer.period_ms {
            Some(period) => {
                timer.deadline_ms += period;
                Some((timer.id, timer.task.clone()))
            }
            None => {
                let timer = self.timers.remove(idx);
                Some((timer.id, timer.task))
            }
        }
    }
}
