//! Property-based tests for anima_core.
//!
//! Invariants that must hold for every event stream and tick schedule, not
//! just the hand-picked cases in the unit tests.

use anima_core::pid::{PidConfig, PidController};
use anima_core::{
    marginal_delta, DriveConfig, DriveEngine, Dynamics, Emotion, EmotionConfig, EmotionEngine,
    EmotionVector, EndocrineConfig, Event, SemanticField, SemanticFieldConfig, StateVector,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_emotion() -> impl Strategy<Value = Emotion> {
    (0usize..Emotion::COUNT).prop_map(|i| Emotion::ALL[i])
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::Rest),
        Just(Event::MessageReceived),
        Just(Event::IdleTimeout),
        Just(Event::UserDeparted),
        Just(Event::PositiveInteraction),
        Just(Event::NegativeInteraction),
        Just(Event::NovelTopic),
        (arb_emotion(), -1.0f32..=1.0).prop_map(|(c, m)| Event::stimulus(c, m)),
    ]
}

#[derive(Debug, Clone)]
enum Step {
    Tick(f32),
    Apply(Event),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0.0f32..=3600.0).prop_map(Step::Tick),
        2 => arb_event().prop_map(Step::Apply),
    ]
}

fn arb_state() -> impl Strategy<Value = StateVector> {
    (
        prop::array::uniform5(0.0f32..=1.0),
        prop::array::uniform8(0.0f32..=1.0),
    )
        .prop_map(|(d, e)| StateVector {
            energy: d[0],
            entropy: d[1],
            social_hunger: d[2],
            curiosity: d[3],
            rapport: d[4],
            emotion: EmotionVector::from_array(e),
        })
}

struct Engines {
    drives: DriveEngine,
    emotions: EmotionEngine,
}

impl Engines {
    fn new() -> Self {
        Self {
            drives: DriveEngine::new(DriveConfig::default()).unwrap(),
            emotions: EmotionEngine::new(EmotionConfig::default(), EndocrineConfig::default())
                .unwrap(),
        }
    }

    fn run(&mut self, state: &mut StateVector, step: &Step) {
        match step {
            Step::Tick(dt) => {
                self.drives.tick(state, *dt);
                self.emotions.tick(state, *dt);
            }
            Step::Apply(event) => {
                self.drives.apply_event(state, event).unwrap();
                self.emotions.apply_event(state, event).unwrap();
            }
        }
    }
}

// ============================================================================
// Boundedness and determinism
// ============================================================================

proptest! {
    /// **Core invariant**: any interleaving of ticks and valid events keeps
    /// every field finite and inside [0, 1].
    #[test]
    fn state_stays_bounded_under_any_schedule(
        start in arb_state(),
        steps in prop::collection::vec(arb_step(), 1..200),
    ) {
        let mut engines = Engines::new();
        let mut state = start;
        for step in &steps {
            engines.run(&mut state, step);
            prop_assert!(state.is_bounded(), "unbounded after {:?}: {:?}", step, state);
        }
    }

    /// Same configuration and the same input sequence give bit-identical output.
    #[test]
    fn dynamics_are_deterministic(
        start in arb_state(),
        steps in prop::collection::vec(arb_step(), 1..100),
    ) {
        let mut a_engines = Engines::new();
        let mut b_engines = Engines::new();
        let mut a = start;
        let mut b = start;
        for step in &steps {
            a_engines.run(&mut a, step);
            b_engines.run(&mut b, step);
        }
        let (a, b) = (a.to_array(), b.to_array());
        for (x, y) in a.iter().zip(b.iter()) {
            prop_assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    /// Non-finite state values are sanitized before the engines touch them.
    #[test]
    fn nan_injection_recovers(steps in prop::collection::vec(arb_step(), 1..20)) {
        let mut engines = Engines::new();
        let mut state = StateVector {
            energy: f32::NAN,
            entropy: f32::INFINITY,
            curiosity: f32::NEG_INFINITY,
            ..StateVector::default()
        };
        state.emotion.fear = f32::NAN;
        engines.run(&mut state, &Step::Tick(1.0));
        for step in &steps {
            engines.run(&mut state, step);
        }
        prop_assert!(state.is_bounded());
    }

    /// Out-of-range stimuli are rejected and leave the queue untouched.
    #[test]
    fn invalid_stimulus_is_rejected(channel in arb_emotion(), magnitude in 1.001f32..100.0) {
        let mut engine = EmotionEngine::new(EmotionConfig::default(), EndocrineConfig::default())
            .unwrap();
        let mut state = StateVector::default();
        let before = state;
        prop_assert!(engine.apply_event(&mut state, &Event::stimulus(channel, magnitude)).is_err());
        prop_assert!(engine.apply_event(&mut state, &Event::stimulus(channel, -magnitude)).is_err());
        prop_assert_eq!(engine.pending(), 0);
        prop_assert_eq!(state, before);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Boundedness over long horizons: thousands of steps, mostly ticks
    /// with bursts of events, never leave [0, 1].
    #[test]
    fn state_stays_bounded_over_thousands_of_steps(
        start in arb_state(),
        steps in prop::collection::vec(arb_step(), 2_000..5_000),
    ) {
        let mut engines = Engines::new();
        let mut state = start;
        for (i, step) in steps.iter().enumerate() {
            engines.run(&mut state, step);
            prop_assert!(state.is_bounded(), "unbounded at step {} after {:?}: {:?}", i, step, state);
        }
    }
}

// ============================================================================
// PID and marginal-effect properties
// ============================================================================

proptest! {
    /// Output never leaves [output_min, output_max], whatever the input.
    #[test]
    fn pid_output_is_bounded(
        kp in 0.0f32..5.0,
        ki in 0.0f32..5.0,
        kd in 0.0f32..5.0,
        bound in 0.01f32..1.0,
        inputs in prop::collection::vec((-10.0f32..10.0, 0.0f32..100.0), 1..100),
    ) {
        let config = PidConfig { kp, ki, kd, setpoint: 0.0, output_min: -bound, output_max: bound };
        let mut pid = PidController::new(config).unwrap();
        for (measured, dt) in inputs {
            let out = pid.step(measured, dt);
            prop_assert!(out.is_finite());
            prop_assert!((-bound..=bound).contains(&out), "output {} outside ±{}", out, bound);
            if ki > 0.0 {
                let i_term = ki * pid.accumulators().integral;
                prop_assert!(i_term <= bound * 1.0001 && i_term >= -bound * 1.0001);
            }
        }
    }

    /// A push toward a bound never overshoots it, and a stronger push moves
    /// at least as far.
    #[test]
    fn marginal_delta_is_monotone_and_bounded(
        value in 0.0f32..=1.0,
        a in -1.0f32..=1.0,
        b in -1.0f32..=1.0,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(marginal_delta(value, lo) <= marginal_delta(value, hi));
        let next = value + marginal_delta(value, hi);
        prop_assert!((-1e-6..=1.0 + 1e-6).contains(&next));
        prop_assert_eq!(marginal_delta(1.0, hi.abs()), 0.0);
        prop_assert_eq!(marginal_delta(0.0, -hi.abs()), 0.0);
    }
}

// ============================================================================
// Semantic field
// ============================================================================

proptest! {
    /// One correction step never increases the potential.
    #[test]
    fn drift_correction_never_increases_potential(
        state in arb_state(),
        lr in 0.001f32..0.49,
    ) {
        let config = SemanticFieldConfig { learning_rate: lr, ..SemanticFieldConfig::default() };
        let field = SemanticField::new(config).unwrap();
        let mut s = state;
        let report = field.correct_drift(&mut s);
        prop_assert!(report.potential_after <= report.potential_before + 1e-6);
        prop_assert!(s.is_bounded());
        prop_assert_eq!(s.rapport, state.rapport);
    }
}
