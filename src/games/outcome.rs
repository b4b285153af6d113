//! Crash point generation.

use crate::errors::EngineFault;
use crate::games::fairness::RoundSeed;
use crate::games::rng::RandomSource;
use crate::games::types::{Multiplier, RoundId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::VecDeque;

pub const MIN_CRASH_HUNDREDTHS: u64 = 101;
pub const MAX_CRASH_HUNDREDTHS: u64 = 348;

/// Rate of the exponential tail; `1 - ln(u) / LAMBDA` averages about 1.9x
/// before clamping.
pub const LAMBDA: f64 = 1.0 / 0.9;

/// Multiplier at which a round ends, in hundredths (1.01x..=3.48x)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CrashPoint(u64);

impl CrashPoint {
    pub fn new(hundredths: u64) -> Result<Self, EngineFault> {
        if !(MIN_CRASH_HUNDREDTHS..=MAX_CRASH_HUNDREDTHS).contains(&hundredths) {
            return Err(EngineFault::CrashPointOutOfRange(hundredths));
        }
        Ok(Self(hundredths))
    }

    /// Map a uniform draw to a crash point. Degenerate draws clamp:
    /// u at or below zero gives the maximum, u at or above one (or NaN) the
    /// minimum.
    pub fn from_unit(u: f64) -> Self {
        let raw = 1.0 - u.ln() / LAMBDA;
        let hundredths = if raw.is_finite() {
            (raw * 100.0).round()
        } else if u <= 0.0 {
            MAX_CRASH_HUNDREDTHS as f64
        } else {
            MIN_CRASH_HUNDREDTHS as f64
        };
        let clamped = hundredths.clamp(MIN_CRASH_HUNDREDTHS as f64, MAX_CRASH_HUNDREDTHS as f64);
        Self(clamped as u64)
    }

    pub fn hundredths(self) -> u64 {
        self.0
    }

    pub fn multiplier(self) -> Multiplier {
        Multiplier::from_hundredths(self.0)
    }
}

impl Serialize for CrashPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.multiplier().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CrashPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let multiplier = Multiplier::deserialize(deserializer)?;
        CrashPoint::new(multiplier.hundredths()).map_err(serde::de::Error::custom)
    }
}

/// What the engine needs to open a round
#[derive(Debug, Clone, Copy)]
pub struct RoundDraw {
    pub crash_point: CrashPoint,
    pub seed: Option<RoundSeed>,
}

/// Produces one crash point per round, before the round accepts bets
pub trait OutcomeSource: Send {
    fn draw(&mut self, round_id: RoundId) -> Result<RoundDraw, EngineFault>;
}

/// Seeded, verifiable outcomes
pub struct FairOutcomeSource<R> {
    rng: R,
}

impl<R: RandomSource> FairOutcomeSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: RandomSource> OutcomeSource for FairOutcomeSource<R> {
    fn draw(&mut self, round_id: RoundId) -> Result<RoundDraw, EngineFault> {
        let seed = RoundSeed::generate(&mut self.rng)?;
        Ok(RoundDraw {
            crash_point: CrashPoint::from_unit(seed.unit_draw(round_id)),
            seed: Some(seed),
        })
    }
}

/// Plays back a fixed list of crash points (in hundredths), then repeats
/// the last one. Used for demos and deterministic tests.
pub struct ScriptedOutcomes {
    points: VecDeque<u64>,
    last: u64,
}

impl ScriptedOutcomes {
    pub fn new(points: impl IntoIterator<Item = u64>) -> Self {
        Self {
            points: points.into_iter().collect(),
            last: MIN_CRASH_HUNDREDTHS,
        }
    }
}

impl OutcomeSource for ScriptedOutcomes {
    fn draw(&mut self, _round_id: RoundId) -> Result<RoundDraw, EngineFault> {
        if let Some(next) = self.points.pop_front() {
            self.last = next;
        }
        Ok(RoundDraw {
            crash_point: CrashPoint::new(self.last)?,
            seed: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_from_unit_bounds() {
        assert_eq!(CrashPoint::from_unit(1.0).hundredths(), 101);
        assert_eq!(CrashPoint::from_unit(0.999_999).hundredths(), 101);
        assert_eq!(CrashPoint::from_unit(0.0).hundredths(), 348);
        assert_eq!(CrashPoint::from_unit(1e-300).hundredths(), 348);
        assert_eq!(CrashPoint::from_unit(f64::NAN).hundredths(), 101);
        assert_eq!(CrashPoint::from_unit(-0.5).hundredths(), 348);
    }

    #[test]
    fn test_from_unit_matches_curve() {
        // 1 - ln(0.5) * 0.9 = 1.6238
        assert_eq!(CrashPoint::from_unit(0.5).hundredths(), 162);
        // 1 - ln(0.25) * 0.9 = 2.2477
        assert_eq!(CrashPoint::from_unit(0.25).hundredths(), 225);
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(CrashPoint::new(100).is_err());
        assert!(CrashPoint::new(349).is_err());
        assert_eq!(CrashPoint::new(200).unwrap().multiplier(), Multiplier::from_hundredths(200));
    }

    #[test]
    fn test_fair_source_always_in_range() {
        let mut source = FairOutcomeSource::new(StdRng::seed_from_u64(99));
        let mut total = 0u64;
        for round in 1..=2_000 {
            let draw = source.draw(RoundId(round)).unwrap();
            let hundredths = draw.crash_point.hundredths();
            assert!((101..=348).contains(&hundredths));
            let seed = draw.seed.unwrap();
            assert_eq!(
                CrashPoint::from_unit(seed.unit_draw(RoundId(round))),
                draw.crash_point
            );
            total += hundredths;
        }
        let mean = total as f64 / 2_000.0 / 100.0;
        assert!(mean > 1.5 && mean < 2.1, "mean crash point {}", mean);
    }

    #[test]
    fn test_scripted_outcomes_repeat_last() {
        let mut source = ScriptedOutcomes::new([200, 150]);
        assert_eq!(source.draw(RoundId(1)).unwrap().crash_point.hundredths(), 200);
        assert_eq!(source.draw(RoundId(2)).unwrap().crash_point.hundredths(), 150);
        assert_eq!(source.draw(RoundId(3)).unwrap().crash_point.hundredths(), 150);

        let mut broken = ScriptedOutcomes::new([500]);
        assert_eq!(
            broken.draw(RoundId(1)).unwrap_err(),
            EngineFault::CrashPointOutOfRange(500)
        );
    }
}
