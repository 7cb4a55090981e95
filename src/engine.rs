use std::time::Duration;
use tracing::debug;

use crate::challenge::ChallengeSequence;
use crate::clock::Clock;
use crate::config::TimingConfig;
use crate::direction::Direction;
use crate::outcome::Outcome;
use crate::scheduler::{Fired, Scheduler, TimerId, TimerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Seconds left before play starts
    Countdown(u8),
    Playing,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

/// Transient flash shown after an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Feedback {
    #[default]
    None,
    Correct,
    Wrong,
}

/// State of one play-through. Only the engine mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSession {
    pub current_index: usize,
    /// Percent of the current symbol's budget still left, 0 to 100
    pub remaining_fraction: f64,
    pub correct_count: usize,
    /// Time taken for each correctly answered symbol, in order
    pub sample_durations: Vec<Duration>,
    pub phase: Phase,
}

impl TimingSession {
    fn new(countdown_from: u8) -> Self {
        Self {
            current_index: 0,
            remaining_fraction: 100.0,
            correct_count: 0,
            sample_durations: Vec::new(),
            phase: Phase::Countdown(countdown_from),
        }
    }
}

/// Something the engine did in response to a tick or an input
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CountdownTick(u8),
    Started,
    Correct { index: usize, elapsed: Duration },
    Wrong { index: usize, pressed: Direction },
    TimedOut { index: usize },
    Advanced { index: usize },
    Finished(Phase),
    FeedbackCleared,
    /// The result is ready to be reported, after the post-game display delay
    Completed(Outcome),
}

/// Quick-time-event state machine.
///
/// Time only moves when the owner calls [`QteEngine::poll`] or
/// [`QteEngine::press`]; both read the injected clock and fire every timer
/// that has come due since the last call, in order.
#[derive(Debug)]
pub struct QteEngine<C: Clock> {
    sequence: ChallengeSequence,
    timing: TimingConfig,
    clock: C,
    scheduler: Scheduler,
    session: TimingSession,
    countdown_timer: Option<TimerId>,
    decay_timer: Option<TimerId>,
    feedback_timer: Option<TimerId>,
    completion_timer: Option<TimerId>,
    decay_elapsed: Duration,
    playing_since: Option<Duration>,
    symbol_since: Duration,
    feedback: Feedback,
    outcome: Option<Outcome>,
    delivered: bool,
}

impl<C: Clock> QteEngine<C> {
    pub fn new(sequence: ChallengeSequence, timing: TimingConfig, clock: C) -> Self {
        let now = clock.now();
        let mut engine = Self {
            session: TimingSession::new(timing.countdown_from),
            sequence,
            timing,
            clock,
            scheduler: Scheduler::new(),
            countdown_timer: None,
            decay_timer: None,
            feedback_timer: None,
            completion_timer: None,
            decay_elapsed: Duration::ZERO,
            playing_since: None,
            symbol_since: now,
            feedback: Feedback::None,
            outcome: None,
            delivered: false,
        };

        if timing.countdown_from == 0 {
            engine.begin_playing(now, &mut Vec::new());
        } else {
            engine.countdown_timer = Some(engine.scheduler.repeating(
                TimerKind::Countdown,
                now,
                timing.countdown_step(),
            ));
        }

        debug!(
            symbols = engine.sequence.len(),
            budget_ms = engine.sequence.time_per_symbol().as_millis() as u64,
            "qte session created"
        );
        engine
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn session(&self) -> &TimingSession {
        &self.session
    }

    pub fn sequence(&self) -> &ChallengeSequence {
        &self.sequence
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn feedback(&self) -> Feedback {
        self.feedback
    }

    pub fn remaining_fraction(&self) -> f64 {
        self.session.remaining_fraction
    }

    pub fn countdown_value(&self) -> Option<u8> {
        match self.session.phase {
            Phase::Countdown(n) => Some(n),
            _ => None,
        }
    }

    /// Symbol awaiting input, if the game is on
    pub fn current_symbol(&self) -> Option<Direction> {
        match self.session.phase {
            Phase::Playing => self.sequence.get(self.session.current_index),
            _ => None,
        }
    }

    /// Up to `n` symbols after the current one
    pub fn upcoming(&self, n: usize) -> &[Direction] {
        let symbols = self.sequence.symbols();
        let start = (self.session.current_index + 1).min(symbols.len());
        let end = (start + n).min(symbols.len());
        &symbols[start..end]
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }

    /// Manual close is refused while a symbol is on the clock
    pub fn can_close(&self) -> bool {
        self.session.phase != Phase::Playing
    }

    /// Processes every timer due by now
    pub fn poll(&mut self) -> Vec<EngineEvent> {
        let now = self.clock.now();
        let mut events = Vec::new();
        while let Some(fired) = self.scheduler.pop_due(now) {
            self.fire(fired, &mut events);
        }
        events
    }

    /// Feeds one directional input. Timers that came due before the input are
    /// handled first, so a timeout that already happened wins over the key.
    /// Input outside of play is ignored.
    pub fn press(&mut self, pressed: Direction) -> Vec<EngineEvent> {
        let mut events = self.poll();
        if self.session.phase != Phase::Playing {
            return events;
        }

        let now = self.clock.now();
        let index = self.session.current_index;
        let expected = self.sequence.get(index);

        if expected == Some(pressed) {
            let elapsed = now.saturating_sub(self.symbol_since);
            self.session.sample_durations.push(elapsed);
            self.session.correct_count += 1;
            self.pulse(Feedback::Correct, now);
            debug!(index, elapsed_ms = elapsed.as_millis() as u64, "correct input");
            events.push(EngineEvent::Correct { index, elapsed });

            if index + 1 == self.sequence.len() {
                self.finish(Phase::Succeeded, now, &mut events);
            } else {
                self.session.current_index += 1;
                self.start_symbol(now);
                events.push(EngineEvent::Advanced {
                    index: self.session.current_index,
                });
            }
        } else {
            debug!(index, %pressed, "wrong input");
            events.push(EngineEvent::Wrong { index, pressed });
            self.fail(now, &mut events);
        }

        events
    }

    /// Tears the session down and cancels all of its timers.
    ///
    /// Returns the outcome only when the game already ended and its result was
    /// not delivered yet; closing mid-game yields nothing.
    pub fn close(mut self) -> Option<Outcome> {
        self.scheduler.cancel_all();
        debug!(phase = ?self.session.phase, "qte session closed");
        if self.session.phase.is_terminal() && !self.delivered {
            self.outcome.take()
        } else {
            None
        }
    }

    fn fire(&mut self, fired: Fired, events: &mut Vec<EngineEvent>) {
        match fired.kind {
            TimerKind::Countdown => self.on_countdown(fired.due, events),
            TimerKind::Decay => self.on_decay(fired.due, events),
            TimerKind::Feedback => {
                self.feedback_timer = None;
                self.feedback = Feedback::None;
                events.push(EngineEvent::FeedbackCleared);
            }
            TimerKind::Completion => {
                self.completion_timer = None;
                if let (Some(outcome), false) = (&self.outcome, self.delivered) {
                    self.delivered = true;
                    events.push(EngineEvent::Completed(outcome.clone()));
                }
            }
        }
    }

    fn on_countdown(&mut self, at: Duration, events: &mut Vec<EngineEvent>) {
        let Phase::Countdown(n) = self.session.phase else {
            self.disarm(TimerKind::Countdown);
            return;
        };

        let n = n.saturating_sub(1);
        self.session.phase = Phase::Countdown(n);
        events.push(EngineEvent::CountdownTick(n));

        if n == 0 {
            self.disarm(TimerKind::Countdown);
            self.begin_playing(at, events);
        }
    }

    fn on_decay(&mut self, at: Duration, events: &mut Vec<EngineEvent>) {
        if self.session.phase != Phase::Playing {
            self.disarm(TimerKind::Decay);
            return;
        }

        let budget = self.sequence.time_per_symbol();
        self.decay_elapsed += self.timing.decay_interval();
        let left = 1.0 - self.decay_elapsed.as_secs_f64() / budget.as_secs_f64();
        self.session.remaining_fraction = (left * 100.0).clamp(0.0, 100.0);

        if self.decay_elapsed >= budget {
            let index = self.session.current_index;
            debug!(index, "symbol timed out");
            events.push(EngineEvent::TimedOut { index });
            self.fail(at, events);
        }
    }

    fn begin_playing(&mut self, at: Duration, events: &mut Vec<EngineEvent>) {
        self.session.phase = Phase::Playing;
        self.playing_since = Some(at);
        self.start_symbol(at);
        debug!("qte started");
        events.push(EngineEvent::Started);
    }

    fn start_symbol(&mut self, at: Duration) {
        self.disarm(TimerKind::Decay);
        self.symbol_since = at;
        self.decay_elapsed = Duration::ZERO;
        self.session.remaining_fraction = 100.0;
        self.decay_timer = Some(self.scheduler.repeating(
            TimerKind::Decay,
            at,
            self.timing.decay_interval(),
        ));
    }

    fn fail(&mut self, at: Duration, events: &mut Vec<EngineEvent>) {
        self.pulse(Feedback::Wrong, at);
        self.finish(Phase::Failed, at, events);
    }

    fn finish(&mut self, phase: Phase, at: Duration, events: &mut Vec<EngineEvent>) {
        self.disarm(TimerKind::Decay);
        self.disarm(TimerKind::Countdown);
        self.session.phase = phase;

        let time_taken = at.saturating_sub(self.playing_since.unwrap_or(at));
        let outcome = Outcome::evaluate(&self.session, &self.sequence, time_taken);
        debug!(
            success = outcome.success,
            buttons_correct = outcome.buttons_correct,
            perfect = outcome.perfect,
            "qte finished"
        );
        self.outcome = Some(outcome);
        self.completion_timer = Some(
            self.scheduler
                .once(TimerKind::Completion, at + self.timing.result_delay()),
        );
        events.push(EngineEvent::Finished(phase));
    }

    fn pulse(&mut self, feedback: Feedback, at: Duration) {
        self.disarm(TimerKind::Feedback);
        self.feedback = feedback;
        self.feedback_timer = Some(
            self.scheduler
                .once(TimerKind::Feedback, at + self.timing.feedback_duration()),
        );
    }

    fn disarm(&mut self, kind: TimerKind) {
        let slot = match kind {
            TimerKind::Countdown => &mut self.countdown_timer,
            TimerKind::Decay => &mut self.decay_timer,
            TimerKind::Feedback => &mut self.feedback_timer,
            TimerKind::Completion => &mut self.completion_timer,
        };
        if let Some(id) = slot.take() {
            self.scheduler.cancel(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use assert_matches::assert_matches;

    fn sequence(secs: f64) -> ChallengeSequence {
        ChallengeSequence::new(vec![Direction::Up, Direction::Down, Direction::Left], secs).unwrap()
    }

    fn engine(secs: f64) -> (QteEngine<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let engine = QteEngine::new(sequence(secs), TimingConfig::default(), clock.clone());
        (engine, clock)
    }

    fn past_countdown(engine: &mut QteEngine<ManualClock>, clock: &ManualClock) {
        clock.advance_ms(3000);
        engine.poll();
    }

    #[test]
    fn starts_in_countdown_from_three() {
        let (engine, _clock) = engine(1.0);
        let session = engine.session();

        assert_eq!(session.phase, Phase::Countdown(3));
        assert_eq!(session.current_index, 0);
        assert_eq!(session.remaining_fraction, 100.0);
        assert_eq!(session.correct_count, 0);
        assert!(session.sample_durations.is_empty());
        assert_eq!(engine.feedback(), Feedback::None);
        assert!(engine.outcome().is_none());
    }

    #[test]
    fn countdown_ticks_once_per_second() {
        let (mut engine, clock) = engine(1.0);

        clock.advance_ms(999);
        assert!(engine.poll().is_empty());
        assert_eq!(engine.countdown_value(), Some(3));

        clock.advance_ms(1);
        assert_eq!(engine.poll(), vec![EngineEvent::CountdownTick(2)]);

        clock.advance_ms(1000);
        assert_eq!(engine.poll(), vec![EngineEvent::CountdownTick(1)]);

        clock.advance_ms(1000);
        assert_eq!(
            engine.poll(),
            vec![EngineEvent::CountdownTick(0), EngineEvent::Started]
        );
        assert_eq!(engine.phase(), Phase::Playing);
        assert_eq!(engine.current_symbol(), Some(Direction::Up));
    }

    #[test]
    fn input_during_countdown_is_ignored() {
        let (mut engine, clock) = engine(1.0);
        clock.advance_ms(500);

        assert!(engine.press(Direction::Right).is_empty());
        assert_eq!(engine.phase(), Phase::Countdown(3));
        assert_eq!(engine.session().correct_count, 0);
    }

    #[test]
    fn zero_countdown_starts_playing_immediately() {
        let clock = ManualClock::new();
        let timing = TimingConfig {
            countdown_from: 0,
            ..TimingConfig::default()
        };
        let engine = QteEngine::new(sequence(1.0), timing, clock);
        assert_eq!(engine.phase(), Phase::Playing);
    }

    #[test]
    fn bar_decays_linearly_over_the_budget() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);

        clock.advance_ms(250);
        engine.poll();
        assert!((engine.remaining_fraction() - 75.0).abs() < 1e-9);

        clock.advance_ms(500);
        engine.poll();
        assert!((engine.remaining_fraction() - 25.0).abs() < 1e-9);
        assert_eq!(engine.phase(), Phase::Playing);
    }

    #[test]
    fn correct_input_advances_and_refills() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);

        clock.advance_ms(300);
        let events = engine.press(Direction::Up);

        assert_eq!(
            events.last(),
            Some(&EngineEvent::Advanced { index: 1 })
        );
        assert_matches!(
            events.iter().find(|e| matches!(e, EngineEvent::Correct { .. })),
            Some(EngineEvent::Correct { index: 0, elapsed }) if *elapsed == Duration::from_millis(300)
        );
        assert_eq!(engine.session().current_index, 1);
        assert_eq!(engine.session().correct_count, 1);
        assert_eq!(engine.remaining_fraction(), 100.0);
        assert_eq!(engine.feedback(), Feedback::Correct);
        assert_eq!(engine.current_symbol(), Some(Direction::Down));
        assert_eq!(engine.upcoming(2), &[Direction::Left]);
    }

    #[test]
    fn feedback_pulse_clears_after_its_duration() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);

        engine.press(Direction::Up);
        assert_eq!(engine.feedback(), Feedback::Correct);

        clock.advance_ms(299);
        engine.poll();
        assert_eq!(engine.feedback(), Feedback::Correct);

        clock.advance_ms(1);
        assert!(engine.poll().contains(&EngineEvent::FeedbackCleared));
        assert_eq!(engine.feedback(), Feedback::None);
    }

    #[test]
    fn wrong_input_fails_and_stops_the_clock() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);

        clock.advance_ms(100);
        let events = engine.press(Direction::Right);

        assert!(events.contains(&EngineEvent::Wrong {
            index: 0,
            pressed: Direction::Right
        }));
        assert!(events.contains(&EngineEvent::Finished(Phase::Failed)));
        assert_eq!(engine.phase(), Phase::Failed);
        assert_eq!(engine.feedback(), Feedback::Wrong);

        // later key presses and ticks change nothing
        clock.advance_ms(5000);
        engine.press(Direction::Up);
        assert_eq!(engine.session().correct_count, 0);
        assert_eq!(engine.phase(), Phase::Failed);
    }

    #[test]
    fn timeout_fires_exactly_at_the_budget() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);

        clock.advance_ms(990);
        engine.poll();
        assert_eq!(engine.phase(), Phase::Playing);

        clock.advance_ms(10);
        let events = engine.poll();
        assert!(events.contains(&EngineEvent::TimedOut { index: 0 }));
        assert_eq!(engine.phase(), Phase::Failed);
        assert_eq!(engine.remaining_fraction(), 0.0);

        let outcome = engine.outcome().unwrap();
        assert!((outcome.time_taken_seconds - 1.0).abs() < 1e-9);
    }

    #[test]
    fn late_key_loses_to_the_timeout_that_already_happened() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);

        // no poll in between: the key arrives after the budget ran out
        clock.advance_ms(1005);
        let events = engine.press(Direction::Up);

        assert!(events.contains(&EngineEvent::TimedOut { index: 0 }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::Correct { .. })));
        assert_eq!(engine.session().correct_count, 0);
    }

    #[test]
    fn terminal_phase_leaves_no_decay_timer_behind() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);

        engine.press(Direction::Right);
        // feedback pulse and completion delay only
        assert_eq!(engine.pending_timers(), 2);

        clock.advance_ms(1000);
        engine.poll();
        assert_eq!(engine.pending_timers(), 0);
    }

    #[test]
    fn outcome_is_delivered_after_the_display_delay() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);

        engine.press(Direction::Up);
        engine.press(Direction::Down);
        let events = engine.press(Direction::Left);
        assert!(events.contains(&EngineEvent::Finished(Phase::Succeeded)));
        assert!(!engine.is_delivered());

        clock.advance_ms(999);
        assert!(!engine
            .poll()
            .iter()
            .any(|e| matches!(e, EngineEvent::Completed(_))));

        clock.advance_ms(1);
        let events = engine.poll();
        assert_matches!(
            events.iter().find(|e| matches!(e, EngineEvent::Completed(_))),
            Some(EngineEvent::Completed(o)) if o.success && o.buttons_correct == 3
        );
        assert!(engine.is_delivered());

        // delivered exactly once
        clock.advance_ms(5000);
        assert!(engine.poll().is_empty());
    }

    #[test]
    fn manual_close_is_refused_only_while_playing() {
        let (mut engine, clock) = engine(1.0);
        assert!(engine.can_close());

        past_countdown(&mut engine, &clock);
        assert!(!engine.can_close());

        engine.press(Direction::Down);
        assert!(engine.can_close());
    }

    #[test]
    fn closing_mid_game_yields_no_outcome() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);
        engine.press(Direction::Up);

        assert_eq!(engine.close(), None);
    }

    #[test]
    fn closing_before_delivery_hands_back_the_outcome() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);
        engine.press(Direction::Left);

        let outcome = engine.close().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.buttons_correct, 0);
    }

    #[test]
    fn closing_after_delivery_yields_nothing_more() {
        let (mut engine, clock) = engine(1.0);
        past_countdown(&mut engine, &clock);
        engine.press(Direction::Left);
        clock.advance_ms(1000);
        engine.poll();

        assert!(engine.is_delivered());
        assert_eq!(engine.close(), None);
    }

    #[test]
    fn samples_track_correct_count() {
        let (mut engine, clock) = engine(1.5);
        past_countdown(&mut engine, &clock);

        for (dir, wait) in [(Direction::Up, 120), (Direction::Down, 480)] {
            clock.advance_ms(wait);
            engine.press(dir);
            let s = engine.session();
            assert_eq!(s.sample_durations.len(), s.correct_count);
        }
        assert_eq!(
            engine.session().sample_durations,
            vec![Duration::from_millis(120), Duration::from_millis(480)]
        );
    }

    #[test]
    fn budget_not_a_multiple_of_the_tick_times_out_on_next_tick() {
        let clock = ManualClock::new();
        let seq = ChallengeSequence::new(vec![Direction::Up], 0.015).unwrap();
        let mut engine = QteEngine::new(seq, TimingConfig::default(), clock.clone());
        clock.advance_ms(3000);
        engine.poll();

        clock.advance_ms(10);
        engine.poll();
        assert_eq!(engine.phase(), Phase::Playing);

        clock.advance_ms(10);
        engine.poll();
        assert_eq!(engine.phase(), Phase::Failed);
    }
}
