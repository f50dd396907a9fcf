use crate::models::{kdr, RatingSet};

/// Interface for any statistics aggregate that ratings can be derived from.
pub trait RatingSource {
    /// Total kills across the aggregate.
    fn total_kills(&self) -> u64;
    /// Total deaths across the aggregate.
    fn total_deaths(&self) -> u64;
    /// Total time played in minutes.
    fn minutes_played(&self) -> f64;
    /// Matches that ran to their end.
    fn completed(&self) -> u64;
    /// Matches the player quit.
    fn quit(&self) -> u64;
}

/// Plain rating inputs, for callers that do not hold an aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatingInputs {
    pub kills: u64,
    pub deaths: u64,
    pub minutes_played: f64,
    pub completed: u64,
    pub quit: u64,
}

impl RatingSource for RatingInputs {
    fn total_kills(&self) -> u64 {
        self.kills
    }

    fn total_deaths(&self) -> u64 {
        self.deaths
    }

    fn minutes_played(&self) -> f64 {
        self.minutes_played
    }

    fn completed(&self) -> u64 {
        self.completed
    }

    fn quit(&self) -> u64 {
        self.quit
    }
}

// ── Weights ───────────────────────────────────────────────────────────────────

const WEIGHT_ATTACK: f64 = 0.25;
const WEIGHT_DEFENSE: f64 = 0.25;
const WEIGHT_CONSISTENCY: f64 = 0.15;
const WEIGHT_EXPERIENCE: f64 = 0.10;
const WEIGHT_PERFORMANCE: f64 = 0.25;

/// KDR at which the performance rating saturates.
const PERFORMANCE_KDR_CAP: f64 = 3.5;

// ── RatingCalculator ──────────────────────────────────────────────────────────

/// Stateless collection of rating formulas.
pub struct RatingCalculator;

impl RatingCalculator {
    /// Compute all five sub-ratings and the weighted overall.
    pub fn calculate<S: RatingSource>(source: &S) -> RatingSet {
        let attack = Self::attack(source);
        let defense = Self::defense(source);
        let consistency = Self::consistency(source);
        let experience = Self::experience(source);
        let performance = Self::performance(source);

        let overall = clamp_rating(
            WEIGHT_ATTACK * attack as f64
                + WEIGHT_DEFENSE * defense as f64
                + WEIGHT_CONSISTENCY * consistency as f64
                + WEIGHT_EXPERIENCE * experience as f64
                + WEIGHT_PERFORMANCE * performance as f64,
        );

        RatingSet {
            attack,
            defense,
            consistency,
            experience,
            performance,
            overall,
        }
    }

    /// Kills per minute, or `0.0` when no time has been played.
    pub fn kills_per_minute<S: RatingSource>(source: &S) -> f64 {
        per_minute(source.total_kills(), source.minutes_played())
    }

    /// Deaths per minute, or `0.0` when no time has been played.
    pub fn deaths_per_minute<S: RatingSource>(source: &S) -> f64 {
        per_minute(source.total_deaths(), source.minutes_played())
    }

    /// `ATK = (kpm * 3 / 20) * 100`.
    pub fn attack<S: RatingSource>(source: &S) -> u8 {
        clamp_rating((Self::kills_per_minute(source) * 3.0 / 20.0) * 100.0)
    }

    /// `DEF = 100 - (dpm * 3 / 10) * 100`.
    pub fn defense<S: RatingSource>(source: &S) -> u8 {
        clamp_rating(100.0 - (Self::deaths_per_minute(source) * 3.0 / 10.0) * 100.0)
    }

    /// Share of finished matches that were completed rather than quit.
    pub fn consistency<S: RatingSource>(source: &S) -> u8 {
        let completed = source.completed();
        let attempts = completed.saturating_add(source.quit());
        if attempts == 0 {
            return 0;
        }
        clamp_rating(100.0 * completed as f64 / attempts as f64)
    }

    /// Logarithmic in total minutes played.
    pub fn experience<S: RatingSource>(source: &S) -> u8 {
        let minutes = source.minutes_played().max(0.0);
        clamp_rating(15.0 * (minutes + 5.0).log10() + 5.0)
    }

    /// KDR scaled so that [`PERFORMANCE_KDR_CAP`] and above is 100.
    pub fn performance<S: RatingSource>(source: &S) -> u8 {
        let ratio = kdr(source.total_kills(), source.total_deaths());
        clamp_rating(100.0 * (ratio / PERFORMANCE_KDR_CAP).min(1.0))
    }
}

fn per_minute(count: u64, minutes: f64) -> f64 {
    if minutes <= 0.0 || !minutes.is_finite() {
        return 0.0;
    }
    count as f64 / minutes
}

/// Round to the nearest integer and saturate into `0..=100`.
fn clamp_rating(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(kills: u64, deaths: u64, minutes: f64, completed: u64, quit: u64) -> RatingInputs {
        RatingInputs {
            kills,
            deaths,
            minutes_played: minutes,
            completed,
            quit,
        }
    }

    fn assert_in_range(set: &RatingSet) {
        for v in [
            set.attack,
            set.defense,
            set.consistency,
            set.experience,
            set.performance,
            set.overall,
        ] {
            assert!(v <= 100, "rating {v} out of range in {set:?}");
        }
    }

    #[test]
    fn test_all_zero_input() {
        let set = RatingCalculator::calculate(&RatingInputs::default());
        assert_eq!(set.attack, 0);
        assert_eq!(set.defense, 100);
        assert_eq!(set.consistency, 0);
        // 15 * log10(5) + 5 = 15.48
        assert_eq!(set.experience, 15);
        assert_eq!(set.performance, 0);
        // 0.25*100 + 0.10*15 = 26.5
        assert_eq!(set.overall, 27);
        assert_in_range(&set);
    }

    #[test]
    fn test_typical_player() {
        // 2 kpm, 1 dpm over 50 minutes; 8 completed, 2 quit.
        let set = RatingCalculator::calculate(&inputs(100, 50, 50.0, 8, 2));
        assert_eq!(set.attack, 30);
        assert_eq!(set.defense, 70);
        assert_eq!(set.consistency, 80);
        // 15 * log10(55) + 5 = 31.1
        assert_eq!(set.experience, 31);
        // kdr 2.0 / 3.5 = 57.1
        assert_eq!(set.performance, 57);
        // 7.5 + 17.5 + 12 + 3.1 + 14.25 = 54.35
        assert_eq!(set.overall, 54);
    }

    #[test]
    fn test_attack_saturates() {
        let set = RatingCalculator::calculate(&inputs(10_000, 0, 1.0, 1, 0));
        assert_eq!(set.attack, 100);
        assert_eq!(set.performance, 100);
        assert_in_range(&set);
    }

    #[test]
    fn test_defense_floors_at_zero() {
        let set = RatingCalculator::calculate(&inputs(0, 10_000, 1.0, 0, 1));
        assert_eq!(set.defense, 0);
        assert_eq!(set.consistency, 0);
        assert_in_range(&set);
    }

    #[test]
    fn test_zero_deaths_uses_kills_as_ratio() {
        assert_eq!(RatingCalculator::performance(&inputs(2, 0, 10.0, 1, 0)), 57);
        assert_eq!(RatingCalculator::performance(&inputs(4, 0, 10.0, 1, 0)), 100);
    }

    #[test]
    fn test_experience_grows_with_time() {
        let low = RatingCalculator::experience(&inputs(0, 0, 10.0, 0, 0));
        let high = RatingCalculator::experience(&inputs(0, 0, 10_000.0, 0, 0));
        assert!(high > low);
        assert_eq!(
            RatingCalculator::experience(&inputs(0, 0, f64::MAX, 0, 0)),
            100
        );
    }

    #[test]
    fn test_non_finite_minutes_are_safe() {
        let set = RatingCalculator::calculate(&inputs(5, 5, f64::NAN, u64::MAX, u64::MAX));
        assert_eq!(set.attack, 0);
        assert_eq!(set.defense, 100);
        assert_in_range(&set);
    }

    #[test]
    fn test_ratings_in_range_over_grid() {
        for kills in [0u64, 1, 7, 500, u32::MAX as u64] {
            for deaths in [0u64, 1, 9, 1_000] {
                for minutes in [0.0, 0.5, 3.0, 600.0] {
                    for (completed, quit) in [(0, 0), (3, 0), (0, 3), (5, 5)] {
                        let set = RatingCalculator::calculate(&inputs(
                            kills, deaths, minutes, completed, quit,
                        ));
                        assert_in_range(&set);
                    }
                }
            }
        }
    }
}
