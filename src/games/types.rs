use crate::errors::DeclineReason;
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Cents per whole currency unit
pub const CENTS_PER_UNIT: u64 = 100;

/// Basis points in a 1.00x multiplier
pub const BPS_PER_UNIT: u64 = 10_000;

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Crash,
    CoinFlip,
    Dice,
    Limbo,
    Mines,
    Roulette,
}

impl GameType {
    pub const ALL: [GameType; 6] = [
        GameType::Crash,
        GameType::CoinFlip,
        GameType::Dice,
        GameType::Limbo,
        GameType::Mines,
        GameType::Roulette,
    ];
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Crash => write!(f, "crash"),
            GameType::CoinFlip => write!(f, "coinflip"),
            GameType::Dice => write!(f, "dice"),
            GameType::Limbo => write!(f, "limbo"),
            GameType::Mines => write!(f, "mines"),
            GameType::Roulette => write!(f, "roulette"),
        }
    }
}

impl FromStr for GameType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameType::ALL
            .iter()
            .copied()
            .find(|game| game.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown game type '{}'", s))
    }
}

/// Coin flip choice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoinChoice {
    Heads,
    Tails,
}

impl fmt::Display for CoinChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinChoice::Heads => write!(f, "heads"),
            CoinChoice::Tails => write!(f, "tails"),
        }
    }
}

/// Game outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Win,
    Loss,
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameOutcome::Win => write!(f, "win"),
            GameOutcome::Loss => write!(f, "loss"),
        }
    }
}

/// Money in integer cents.
///
/// Serialized as a decimal number of whole units so clients keep seeing
/// `10.5` rather than `1050`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Parse a decimal amount, rounding to the nearest cent.
    /// Returns `None` for non-finite, negative or out-of-range input.
    pub fn from_units(units: f64) -> Option<Self> {
        if !units.is_finite() || units < 0.0 {
            return None;
        }
        let cents = (units * CENTS_PER_UNIT as f64).round();
        if cents > u64::MAX as f64 {
            return None;
        }
        Some(Self(cents as u64))
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    pub fn as_units(self) -> f64 {
        self.0 as f64 / CENTS_PER_UNIT as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Payout for this stake at `multiplier`, floored to the cent.
    pub fn times(self, multiplier: Multiplier) -> Amount {
        let product = self.0 as u128 * multiplier.bps() as u128 / BPS_PER_UNIT as u128;
        Amount(u64::try_from(product).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / CENTS_PER_UNIT, self.0 % CENTS_PER_UNIT)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_units())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let units = f64::deserialize(deserializer)?;
        Amount::from_units(units)
            .ok_or_else(|| de::Error::custom(format!("invalid amount {}", units)))
    }
}

/// Payout multiplier in basis points (10_000 = 1.00x).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u64);

impl Multiplier {
    pub const ZERO: Multiplier = Multiplier(0);
    pub const ONE: Multiplier = Multiplier(BPS_PER_UNIT);

    pub const fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    /// Two-decimal multiplier, e.g. `150` for 1.50x.
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths * 100)
    }

    /// Round a real-valued multiplier to the nearest basis point.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let bps = (value * BPS_PER_UNIT as f64).round();
        if bps > u64::MAX as f64 {
            return None;
        }
        Some(Self(bps as u64))
    }

    pub const fn bps(self) -> u64 {
        self.0
    }

    /// Whole hundredths, truncating any finer precision.
    pub const fn hundredths(self) -> u64 {
        self.0 / 100
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / BPS_PER_UNIT as f64
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}x", self.as_f64())
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Multiplier::from_f64(value)
            .ok_or_else(|| de::Error::custom(format!("invalid multiplier {}", value)))
    }
}

/// Participant identifier (session or account id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Crash round number, increasing from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl RoundId {
    pub const FIRST: RoundId = RoundId(1);

    pub fn next(self) -> RoundId {
        RoundId(self.0 + 1)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive stake bounds applied before any balance is touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BetLimits {
    pub min: Amount,
    pub max: Amount,
}

impl BetLimits {
    pub fn check(&self, stake: Amount) -> Result<(), DeclineReason> {
        if stake.is_zero() || stake < self.min || stake > self.max {
            return Err(DeclineReason::InvalidAmount);
        }
        Ok(())
    }
}

impl Default for BetLimits {
    fn default() -> Self {
        Self {
            min: Amount::from_cents(1),
            max: Amount::from_cents(1_000_000),
        }
    }
}

/// A settled play waiting to be written to history
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryRecord {
    pub participant_id: ParticipantId,
    pub game: GameType,
    pub round_id: Option<RoundId>,
    pub bet: Amount,
    pub multiplier: Multiplier,
    pub payout: Amount,
    pub outcome: GameOutcome,
    pub detail: Option<serde_json::Value>,
}

/// Stored history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: u64,
    pub participant_id: ParticipantId,
    pub game: GameType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<RoundId>,
    pub bet: Amount,
    pub multiplier: Multiplier,
    pub payout: Amount,
    #[serde(rename = "result")]
    pub outcome: GameOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_from_units_rounds_to_cent() {
        assert_eq!(Amount::from_units(10.0), Some(Amount::from_cents(1000)));
        assert_eq!(Amount::from_units(0.016), Some(Amount::from_cents(2)));
        assert_eq!(Amount::from_units(-1.0), None);
        assert_eq!(Amount::from_units(f64::NAN), None);
        assert_eq!(Amount::from_units(f64::INFINITY), None);
    }

    #[test]
    fn test_payout_floors_to_cent() {
        let bet = Amount::from_cents(1000);
        assert_eq!(bet.times(Multiplier::from_hundredths(150)), Amount::from_cents(1500));
        // 3.33 * 1.86 = 6.1938
        assert_eq!(
            Amount::from_cents(333).times(Multiplier::from_bps(18_600)),
            Amount::from_cents(619)
        );
    }

    #[test]
    fn test_wire_format_uses_units() {
        let json = serde_json::to_string(&Amount::from_cents(1050)).unwrap();
        assert_eq!(json, "10.5");
        let multiplier = serde_json::to_string(&Multiplier::from_hundredths(201)).unwrap();
        assert_eq!(multiplier, "2.01");
        let parsed: Amount = serde_json::from_str("12.34").unwrap();
        assert_eq!(parsed.cents(), 1234);
        assert!(serde_json::from_str::<Amount>("-3").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_cents(705).to_string(), "7.05");
        assert_eq!(Multiplier::from_hundredths(348).to_string(), "3.48x");
        assert_eq!(GameType::CoinFlip.to_string(), "coinflip");
    }

    #[test]
    fn test_bet_limits() {
        let limits = BetLimits::default();
        assert!(limits.check(Amount::from_cents(500)).is_ok());
        assert_eq!(limits.check(Amount::ZERO), Err(DeclineReason::InvalidAmount));
        assert_eq!(
            limits.check(Amount::from_cents(1_000_001)),
            Err(DeclineReason::InvalidAmount)
        );
    }

    #[test]
    fn test_game_type_parse() {
        assert_eq!("crash".parse::<GameType>(), Ok(GameType::Crash));
        assert_eq!("Roulette".parse::<GameType>(), Ok(GameType::Roulette));
        assert!("poker".parse::<GameType>().is_err());
    }
}
