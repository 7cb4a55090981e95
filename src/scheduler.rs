use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a timer is for; the engine dispatches on this when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Countdown,
    Decay,
    Feedback,
    Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub id: TimerId,
    pub kind: TimerKind,
    /// The instant the timer was due, which may be earlier than the poll
    pub due: Duration,
}

#[derive(Debug, Clone)]
struct Timer {
    id: TimerId,
    kind: TimerKind,
    due: Duration,
    period: Option<Duration>,
}

/// Deterministic timer queue driven by an external notion of "now".
///
/// Nothing fires on its own: the owner pops due timers one at a time, so a
/// handler may cancel other timers before they get a chance to fire.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: u64,
    timers: Vec<Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn once(&mut self, kind: TimerKind, due: Duration) -> TimerId {
        self.push(kind, due, None)
    }

    /// Fires at `start + period`, then every `period` after that
    pub fn repeating(&mut self, kind: TimerKind, start: Duration, period: Duration) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        self.push(kind, start + period, Some(period))
    }

    fn push(&mut self, kind: TimerKind, due: Duration, period: Option<Duration>) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            kind,
            due,
            period,
        });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.timers.iter().map(|t| t.due).min()
    }

    /// Removes and returns the earliest timer due at or before `now`.
    /// Ties go to the timer scheduled first. Repeating timers are re-armed one
    /// period later.
    pub fn pop_due(&mut self, now: Duration) -> Option<Fired> {
        let pos = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= now)
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(pos, _)| pos)?;

        let fired = Fired {
            id: self.timers[pos].id,
            kind: self.timers[pos].kind,
            due: self.timers[pos].due,
        };

        match self.timers[pos].period {
            Some(period) => self.timers[pos].due += period,
            None => {
                self.timers.remove(pos);
            }
        }

        Some(fired)
    }
}
