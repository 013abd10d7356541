//! Rating validation and the five-bucket rating histogram.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{CommerceError, Result};

/// Highest rating a review may carry.
pub const MAX_RATING: f64 = 5.0;

/// Checks that a rating is a finite number in `[0, 5]`.
pub fn validate_rating(rating: f64) -> Result<()> {
    if rating.is_finite() && (0.0..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(CommerceError::Validation(format!(
            "rating must be between 0 and {MAX_RATING}, got {rating}"
        )))
    }
}

/// Returns the star bucket (1..=5) a rating is counted in.
///
/// Ratings are floored; a floor of 0 counts as 1 star. Anything that does
/// not land in 1..=5 after that is not counted.
pub fn bucket(rating: f64) -> Option<u8> {
    if !rating.is_finite() {
        return None;
    }
    let floor = rating.floor();
    let stars = if floor == 0.0 { 1.0 } else { floor };
    (1.0..=MAX_RATING).contains(&stars).then_some(stars as u8)
}

/// Review counts per star bucket.
///
/// Serializes as `{"1": n, "2": n, "3": n, "4": n, "5": n}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingDistribution {
    counts: [u64; 5],
}

impl RatingDistribution {
    pub fn from_ratings(ratings: impl IntoIterator<Item = f64>) -> Self {
        let mut distribution = Self::default();
        for rating in ratings {
            distribution.record(rating);
        }
        distribution
    }

    /// Counts a rating in its bucket; unbucketable ratings are ignored.
    pub fn record(&mut self, rating: f64) {
        if let Some(stars) = bucket(rating) {
            self.counts[usize::from(stars - 1)] += 1;
        }
    }

    /// Number of ratings in the given bucket; 0 outside 1..=5.
    pub fn count(&self, stars: u8) -> u64 {
        match stars {
            1..=5 => self.counts[usize::from(stars - 1)],
            _ => 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

impl Serialize for RatingDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (index, count) in self.counts.iter().enumerate() {
            map.serialize_entry(&(index + 1).to_string(), count)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_floor_and_fold_zero_into_one() {
        assert_eq!(bucket(0.0), Some(1));
        assert_eq!(bucket(0.5), Some(1));
        assert_eq!(bucket(1.0), Some(1));
        assert_eq!(bucket(3.5), Some(3));
        assert_eq!(bucket(4.99), Some(4));
        assert_eq!(bucket(5.0), Some(5));
    }

    #[test]
    fn out_of_range_ratings_are_ignored() {
        assert_eq!(bucket(-0.5), None);
        assert_eq!(bucket(6.0), None);
        assert_eq!(bucket(f64::NAN), None);

        let distribution = RatingDistribution::from_ratings([7.0, -1.0, 2.0]);
        assert_eq!(distribution.total(), 1);
        assert_eq!(distribution.count(2), 1);
    }

    #[test]
    fn distribution_of_known_ratings() {
        let distribution = RatingDistribution::from_ratings([0.5, 3.5, 5.0, 5.0]);
        assert_eq!(distribution.count(1), 1);
        assert_eq!(distribution.count(2), 0);
        assert_eq!(distribution.count(3), 1);
        assert_eq!(distribution.count(4), 0);
        assert_eq!(distribution.count(5), 2);
        assert_eq!(distribution.count(0), 0);
    }

    #[test]
    fn serializes_with_string_keys() {
        let distribution = RatingDistribution::from_ratings([5.0, 1.5]);
        let json = serde_json::to_value(distribution).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"1": 1, "2": 0, "3": 0, "4": 0, "5": 1})
        );
    }

    #[test]
    fn rating_validation() {
        assert!(validate_rating(0.0).is_ok());
        assert!(validate_rating(4.5).is_ok());
        assert!(validate_rating(5.0).is_ok());
        assert!(validate_rating(5.5).is_err());
        assert!(validate_rating(-0.1).is_err());
        assert!(validate_rating(f64::INFINITY).is_err());
    }
}
