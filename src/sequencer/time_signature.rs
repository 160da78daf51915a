// Time signature - Beats per bar and beat unit, with the 2-byte persisted form

use std::fmt;

use super::timeline::Units;
use crate::error::{ClockError, ClockResult};

/// Time signature (beats per bar / beat unit)
/// Example: 3/4 time = `TimeSignature::ThreeFour`
///
/// The named variants are shortcuts; equality compares the resolved
/// `(beats_per_bar, beat_unit)` pair, so `Other { 4, 4 } == FourFour`.
#[derive(Debug, Clone, Copy)]
pub enum TimeSignature {
    FourFour,
    ThreeFour,
    TwoFour,
    Other { beats_per_bar: u8, beat_unit: u8 },
}

impl TimeSignature {
    /// Creates a time signature, picking the named variant when one matches
    pub fn new(beats_per_bar: u8, beat_unit: u8) -> Self {
        assert!(beats_per_bar > 0, "Time signature beats per bar must be > 0");
        assert!(beat_unit > 0, "Time signature beat unit must be > 0");
        match (beats_per_bar, beat_unit) {
            (4, 4) => Self::FourFour,
            (3, 4) => Self::ThreeFour,
            (2, 4) => Self::TwoFour,
            _ => Self::Other {
                beats_per_bar,
                beat_unit,
            },
        }
    }

    pub fn beats_per_bar(&self) -> u8 {
        match self {
            Self::FourFour => 4,
            Self::ThreeFour => 3,
            Self::TwoFour => 2,
            Self::Other { beats_per_bar, .. } => *beats_per_bar,
        }
    }

    pub fn beat_unit(&self) -> u8 {
        match self {
            Self::FourFour | Self::ThreeFour | Self::TwoFour => 4,
            Self::Other { beat_unit, .. } => *beat_unit,
        }
    }

    /// Persisted form `[beat_unit, round(log2(beats_per_bar))]`.
    ///
    /// Only exact for power-of-two bar lengths: 3/4 encodes as `[4, 2]` and
    /// decodes back as 4/4.
    pub fn to_bytes(&self) -> [u8; 2] {
        let exponent = (self.beats_per_bar() as f64).log2().round() as u8;
        [self.beat_unit(), exponent]
    }

    /// Decodes the persisted form, `beats_per_bar = 2^bytes[1]`
    pub fn from_bytes(bytes: [u8; 2]) -> ClockResult<Self> {
        let [beat_unit, exponent] = bytes;
        let beats_per_bar = 1u8
            .checked_shl(exponent as u32)
            .ok_or(ClockError::InvalidTimeSignature(bytes))?;
        if beat_unit == 0 {
            return Err(ClockError::InvalidTimeSignature(bytes));
        }
        Ok(Self::new(beats_per_bar, beat_unit))
    }

    /// Unit configuration for bar-beat times in this signature
    pub fn units(&self, beats_per_minute: u32, subbeat_divisor: u32) -> Units {
        Units::new(self.beats_per_bar() as u32, beats_per_minute, subbeat_divisor)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::FourFour
    }
}

impl PartialEq for TimeSignature {
    fn eq(&self, other: &Self) -> bool {
        self.beats_per_bar() == other.beats_per_bar() && self.beat_unit() == other.beat_unit()
    }
}

impl Eq for TimeSignature {}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar(), self.beat_unit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_variants() {
        let ts = TimeSignature::default();
        assert_eq!(ts.beats_per_bar(), 4);
        assert_eq!(ts.beat_unit(), 4);
        assert_eq!(ts.to_string(), "4/4");
        assert!(matches!(TimeSignature::new(3, 4), TimeSignature::ThreeFour));
        assert!(matches!(TimeSignature::new(6, 8), TimeSignature::Other { .. }));
    }

    #[test]
    fn test_equality_ignores_representation() {
        let general = TimeSignature::Other {
            beats_per_bar: 2,
            beat_unit: 4,
        };
        assert_eq!(general, TimeSignature::TwoFour);
        assert_ne!(TimeSignature::new(6, 8), TimeSignature::new(6, 4));
    }

    #[test]
    fn test_power_of_two_round_trip() {
        for ts in [TimeSignature::FourFour, TimeSignature::TwoFour, TimeSignature::new(8, 8)] {
            assert_eq!(TimeSignature::from_bytes(ts.to_bytes()).unwrap(), ts);
        }
        assert_eq!(TimeSignature::FourFour.to_bytes(), [4, 2]);
        assert_eq!(TimeSignature::new(8, 8).to_bytes(), [8, 3]);
    }

    #[test]
    fn test_three_four_is_lossy() {
        // round(log2 3) = 2
        let bytes = TimeSignature::ThreeFour.to_bytes();
        assert_eq!(bytes, [4, 2]);
        let decoded = TimeSignature::from_bytes(bytes).unwrap();
        assert_eq!(decoded.beats_per_bar(), 4);
        assert_eq!(decoded, TimeSignature::FourFour);

        // 5/8: round(log2 5) = 2 -> 4/8
        assert_eq!(TimeSignature::new(5, 8).to_bytes(), [8, 2]);
    }

    #[test]
    fn test_invalid_bytes() {
        assert!(TimeSignature::from_bytes([4, 8]).is_err());
        assert!(TimeSignature::from_bytes([0, 2]).is_err());
        assert_eq!(TimeSignature::from_bytes([4, 0]).unwrap().beats_per_bar(), 1);
    }

    #[test]
    fn test_units() {
        let units = TimeSignature::ThreeFour.units(90, 480);
        assert_eq!(units, Units::new(3, 90, 480));
    }
}
