//! Repeating particle streams.
//!
//! A [`ParticleStream`] owns an emitter and bursts it at a fixed interval.
//! Streams do not poll: each burst schedules the next one on the domain's
//! deferred queue, `max(particles_per_burst / particles_per_second,
//! min_burst_delay)` seconds later.

use ember_core::{Emitter, SimTime};

/// Hook run before every burst. Returning `false` ends the stream.
pub type BeforeGenerating = Box<dyn FnMut(&mut dyn Emitter) -> bool>;

/// Hook run once when a stream ends, for whatever reason.
pub type WhenFinished = Box<dyn FnOnce(&mut dyn Emitter)>;

/// Parameters of a stream, built with chained setters.
pub struct StreamSpec {
    /// Particles generated per burst.
    pub particles_per_burst: usize,
    /// Average emission rate.
    pub particles_per_second: f32,
    /// Lifetime of the stream, or `None` to run until stopped.
    pub max_duration: Option<SimTime>,
    before_generating: Option<BeforeGenerating>,
    when_finished: Option<WhenFinished>,
}

impl StreamSpec {
    /// A stream that never expires on its own.
    pub fn new(particles_per_burst: usize, particles_per_second: f32) -> Self {
        Self {
            particles_per_burst,
            particles_per_second,
            max_duration: None,
            before_generating: None,
            when_finished: None,
        }
    }

    /// Stop the stream `duration` seconds after it starts. A negative
    /// duration means the stream never expires.
    pub fn with_max_duration(mut self, duration: SimTime) -> Self {
        self.max_duration = (duration >= 0.0).then_some(duration);
        self
    }

    /// Run `hook` before each burst; the stream ends when it returns `false`.
    pub fn before_generating(mut self, hook: impl FnMut(&mut dyn Emitter) -> bool + 'static) -> Self {
        self.before_generating = Some(Box::new(hook));
        self
    }

    /// Run `hook` once when the stream ends.
    pub fn when_finished(mut self, hook: impl FnOnce(&mut dyn Emitter) + 'static) -> Self {
        self.when_finished = Some(Box::new(hook));
        self
    }

    /// Whether the stream would ever emit anything.
    pub fn is_valid(&self) -> bool {
        self.particles_per_burst > 0
            && self.particles_per_second.is_finite()
            && self.particles_per_second > 0.0
    }

    /// Seconds between bursts, never below `min_burst_delay`.
    pub fn burst_interval(&self, min_burst_delay: SimTime) -> SimTime {
        (self.particles_per_burst as f32 / self.particles_per_second).max(min_burst_delay)
    }
}

impl std::fmt::Debug for StreamSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSpec")
            .field("particles_per_burst", &self.particles_per_burst)
            .field("particles_per_second", &self.particles_per_second)
            .field("max_duration", &self.max_duration)
            .field("before_generating", &self.before_generating.is_some())
            .field("when_finished", &self.when_finished.is_some())
            .finish()
    }
}

/// A running stream inside a [`SimulationDomain`](crate::SimulationDomain).
pub struct ParticleStream {
    emitter: Box<dyn Emitter>,
    particles_per_burst: usize,
    interval: SimTime,
    expires_at: Option<SimTime>,
    next_index: usize,
    bursts: u64,
    before_generating: Option<BeforeGenerating>,
    when_finished: Option<WhenFinished>,
}

impl ParticleStream {
    pub(crate) fn new(
        emitter: Box<dyn Emitter>,
        spec: StreamSpec,
        now: SimTime,
        min_burst_delay: SimTime,
    ) -> Self {
        Self {
            emitter,
            particles_per_burst: spec.particles_per_burst,
            interval: spec.burst_interval(min_burst_delay),
            expires_at: spec.max_duration.map(|d| now + d),
            next_index: 0,
            bursts: 0,
            before_generating: spec.before_generating,
            when_finished: spec.when_finished,
        }
    }

    /// Particles requested per burst.
    pub fn particles_per_burst(&self) -> usize {
        self.particles_per_burst
    }

    /// Seconds between bursts.
    pub fn interval(&self) -> SimTime {
        self.interval
    }

    /// Time after which the stream ends, if any.
    pub fn expires_at(&self) -> Option<SimTime> {
        self.expires_at
    }

    /// Bursts attempted so far.
    pub fn bursts(&self) -> u64 {
        self.bursts
    }

    /// Whether the stream has outlived its duration at `now`.
    pub fn is_expired(&self, now: SimTime) -> bool {
        self.expires_at.is_some_and(|t| now > t)
    }

    /// Run the before-generating hook. `false` ends the stream.
    pub(crate) fn prepare(&mut self) -> bool {
        match self.before_generating.as_mut() {
            Some(hook) => hook(self.emitter.as_mut()),
            None => true,
        }
    }

    /// Reserve the particle indices of the next burst; returns the first.
    pub(crate) fn next_burst(&mut self) -> usize {
        let start = self.next_index;
        self.next_index += self.particles_per_burst;
        self.bursts += 1;
        start
    }

    pub(crate) fn emitter_mut(&mut self) -> &mut dyn Emitter {
        self.emitter.as_mut()
    }

    /// End the stream, running the when-finished hook.
    pub(crate) fn finish(mut self) {
        if let Some(hook) = self.when_finished.take() {
            hook(self.emitter.as_mut());
        }
    }
}

impl std::fmt::Debug for ParticleStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleStream")
            .field("particles_per_burst", &self.particles_per_burst)
            .field("interval", &self.interval)
            .field("expires_at", &self.expires_at)
            .field("bursts", &self.bursts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::SimpleEmitter;
    use std::cell::Cell;
    use std::rc::Rc;

    fn emitter() -> Box<dyn Emitter> {
        Box::new(SimpleEmitter::new([0.0, 0.0], |_, _, _: &mut [f32]| 1.0))
    }

    #[test]
    fn interval_is_floored_by_min_delay() {
        assert_eq!(StreamSpec::new(10, 20.0).burst_interval(0.1), 0.5);
        assert_eq!(StreamSpec::new(1, 1000.0).burst_interval(0.1), 0.1);
    }

    #[test]
    fn negative_duration_never_expires() {
        let spec = StreamSpec::new(1, 1.0).with_max_duration(-1.0);
        assert_eq!(spec.max_duration, None);
        let stream = ParticleStream::new(emitter(), spec, 0.0, 0.1);
        assert!(!stream.is_expired(1.0e9));
    }

    #[test]
    fn expires_strictly_after_duration() {
        let spec = StreamSpec::new(1, 1.0).with_max_duration(2.0);
        let stream = ParticleStream::new(emitter(), spec, 1.0, 0.1);
        assert!(!stream.is_expired(3.0));
        assert!(stream.is_expired(3.5));
    }

    #[test]
    fn invalid_rates_detected() {
        assert!(!StreamSpec::new(0, 1.0).is_valid());
        assert!(!StreamSpec::new(1, 0.0).is_valid());
        assert!(!StreamSpec::new(1, f32::INFINITY).is_valid());
        assert!(StreamSpec::new(1, 0.5).is_valid());
    }

    #[test]
    fn burst_indices_advance_by_burst_size() {
        let mut stream = ParticleStream::new(emitter(), StreamSpec::new(4, 8.0), 0.0, 0.1);
        assert_eq!(stream.next_burst(), 0);
        assert_eq!(stream.next_burst(), 4);
        assert_eq!(stream.bursts(), 2);
    }

    #[test]
    fn hooks_run() {
        let calls = Rc::new(Cell::new(0));
        let finished = Rc::new(Cell::new(false));
        let (c, done) = (calls.clone(), finished.clone());
        let spec = StreamSpec::new(1, 1.0)
            .before_generating(move |_| {
                c.set(c.get() + 1);
                c.get() < 2
            })
            .when_finished(move |_| done.set(true));
        let mut stream = ParticleStream::new(emitter(), spec, 0.0, 0.1);
        assert!(stream.prepare());
        assert!(!stream.prepare());
        stream.finish();
        assert_eq!(calls.get(), 2);
        assert!(finished.get());
    }
}
