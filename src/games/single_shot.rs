//! Single-shot games: coin flip, dice, limbo, mines and roulette.
//!
//! Each play is resolved from fresh randomness in one step. Payouts are the
//! fair multiplier scaled by [`RTP_BPS`] unless noted.

use crate::errors::DeclineReason;
use crate::games::rng::RandomSource;
use crate::games::types::{CoinChoice, GameType, Multiplier, BPS_PER_UNIT};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;
use std::fmt;

/// Return to player, in basis points (93%)
pub const RTP_BPS: u64 = 9_300;

pub const GRID_CELLS: u8 = 25;
pub const LIMBO_MIN_TARGET_HUNDREDTHS: u64 = 101;
pub const LIMBO_MAX_HUNDREDTHS: u64 = 1_056;

const DOUBLE_ZERO: u8 = 37;
const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

/// `nominal` x RTP
const fn with_rtp(nominal: u64) -> Multiplier {
    Multiplier::from_bps(nominal * RTP_BPS)
}

/// American wheel pocket; 37 is "00"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "PocketRepr")]
pub struct Pocket(u8);

#[derive(Deserialize)]
#[serde(untagged)]
enum PocketRepr {
    Number(u8),
    Label(String),
}

impl TryFrom<PocketRepr> for Pocket {
    type Error = String;

    fn try_from(repr: PocketRepr) -> Result<Self, Self::Error> {
        match repr {
            PocketRepr::Number(n) if n <= 36 => Ok(Pocket(n)),
            PocketRepr::Number(n) => Err(format!("pocket {} out of range", n)),
            PocketRepr::Label(label) => label.parse(),
        }
    }
}

impl std::str::FromStr for Pocket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "00" => Ok(Pocket(DOUBLE_ZERO)),
            other => match other.parse::<u8>() {
                Ok(n) if n <= 36 => Ok(Pocket(n)),
                _ => Err(format!("invalid pocket '{}'", s)),
            },
        }
    }
}

impl Pocket {
    pub const ZERO: Pocket = Pocket(0);
    pub const DOUBLE_ZERO: Pocket = Pocket(DOUBLE_ZERO);

    /// 1..=36, `None` for the zeros
    pub fn number(self) -> Option<u8> {
        (1..=36).contains(&self.0).then_some(self.0)
    }

    pub fn is_red(self) -> bool {
        self.number().map_or(false, |n| RED_NUMBERS.contains(&n))
    }

    fn spin(rng: &mut dyn RandomSource) -> Self {
        Pocket(rng.below(38) as u8)
    }
}

impl fmt::Display for Pocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == DOUBLE_ZERO {
            f.write_str("00")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Serialize for Pocket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 == DOUBLE_ZERO {
            serializer.serialize_str("00")
        } else {
            serializer.serialize_u8(self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "bet_type", rename_all = "snake_case")]
pub enum RouletteBet {
    Number { value: Pocket },
    Red,
    Black,
    Odd,
    Even,
    High,
    Low,
    Column { column: u8 },
}

impl RouletteBet {
    fn multiplier(&self) -> Multiplier {
        match self {
            RouletteBet::Number { .. } => with_rtp(36),
            RouletteBet::Column { .. } => with_rtp(3),
            _ => with_rtp(2),
        }
    }

    /// Zeros lose every bet except a straight bet on them.
    fn wins(&self, pocket: Pocket) -> bool {
        if let RouletteBet::Number { value } = self {
            return *value == pocket;
        }
        let Some(n) = pocket.number() else {
            return false;
        };
        match self {
            RouletteBet::Red => pocket.is_red(),
            RouletteBet::Black => !pocket.is_red(),
            RouletteBet::Odd => n % 2 == 1,
            RouletteBet::Even => n % 2 == 0,
            RouletteBet::High => n >= 19,
            RouletteBet::Low => n <= 18,
            RouletteBet::Column { column } => n % 3 == column % 3,
            RouletteBet::Number { .. } => false,
        }
    }
}

/// A single-shot play, already parsed
#[derive(Debug, Clone, PartialEq)]
pub enum InstantBet {
    CoinFlip { choice: CoinChoice },
    Dice { target: u8, over: bool },
    Limbo { target: Multiplier },
    Mines { mines: u8, picks: Vec<u8> },
    Roulette { bet: RouletteBet },
}

/// Result of resolving a play. `multiplier` is what the stake is paid at
/// when `won`.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub won: bool,
    pub multiplier: Multiplier,
    pub detail: serde_json::Value,
}

impl InstantBet {
    pub fn game(&self) -> GameType {
        match self {
            InstantBet::CoinFlip { .. } => GameType::CoinFlip,
            InstantBet::Dice { .. } => GameType::Dice,
            InstantBet::Limbo { .. } => GameType::Limbo,
            InstantBet::Mines { .. } => GameType::Mines,
            InstantBet::Roulette { .. } => GameType::Roulette,
        }
    }

    /// Reject choices with no winning outcome or outside the table.
    pub fn validate(&self) -> Result<(), DeclineReason> {
        let valid = match self {
            InstantBet::CoinFlip { .. } => true,
            InstantBet::Dice { target, over: true } => (1..=99).contains(target),
            InstantBet::Dice { target, over: false } => (2..=100).contains(target),
            InstantBet::Limbo { target } => {
                target.bps() % 100 == 0
                    && (LIMBO_MIN_TARGET_HUNDREDTHS..=LIMBO_MAX_HUNDREDTHS).contains(&target.hundredths())
            }
            InstantBet::Mines { mines, picks } => {
                let mut seen = [false; GRID_CELLS as usize];
                (1..GRID_CELLS).contains(mines)
                    && !picks.is_empty()
                    && picks.len() <= (GRID_CELLS - mines) as usize
                    && picks.iter().all(|&cell| {
                        cell < GRID_CELLS && !std::mem::replace(&mut seen[cell as usize], true)
                    })
            }
            InstantBet::Roulette { bet: RouletteBet::Column { column } } => (1..=3).contains(column),
            InstantBet::Roulette { .. } => true,
        };
        if valid {
            Ok(())
        } else {
            Err(DeclineReason::InvalidChoice)
        }
    }

    /// Win multiplier if this play wins; known before the draw.
    pub fn multiplier(&self) -> Multiplier {
        match self {
            InstantBet::CoinFlip { .. } => with_rtp(2),
            InstantBet::Dice { target, over } => dice_multiplier(*target, *over),
            InstantBet::Limbo { target } => *target,
            InstantBet::Mines { mines, picks } => mines_multiplier(*mines, picks.len() as u8),
            InstantBet::Roulette { bet } => bet.multiplier(),
        }
    }

    /// Draw the outcome. Call [`InstantBet::validate`] first.
    pub fn resolve(&self, rng: &mut dyn RandomSource) -> Resolution {
        let multiplier = self.multiplier();
        let (won, detail) = match self {
            InstantBet::CoinFlip { choice } => {
                let result = if rng.below(2) == 0 {
                    CoinChoice::Heads
                } else {
                    CoinChoice::Tails
                };
                (result == *choice, json!({ "choice": choice, "result": result }))
            }
            InstantBet::Dice { target, over } => {
                let roll = rng.below(100) as u8 + 1;
                let won = if *over { roll > *target } else { roll < *target };
                (won, json!({ "roll": roll, "target": target, "over": over }))
            }
            InstantBet::Limbo { target } => {
                let drawn = limbo_draw(rng.unit());
                (
                    drawn >= *target,
                    json!({ "target": target, "result": drawn }),
                )
            }
            InstantBet::Mines { mines, picks } => {
                let field = place_mines(*mines, rng);
                let hits: Vec<u8> = picks.iter().copied().filter(|cell| field.contains(cell)).collect();
                (
                    hits.is_empty(),
                    json!({ "mines": field, "picks": picks, "hits": hits }),
                )
            }
            InstantBet::Roulette { bet } => {
                let pocket = Pocket::spin(rng);
                (
                    bet.wins(pocket),
                    json!({ "bet": bet, "result": pocket, "color": pocket_color(pocket) }),
                )
            }
        };
        Resolution { won, multiplier, detail }
    }
}

/// `(100 / chance) * RTP`, rounded to the basis point
pub fn dice_multiplier(target: u8, over: bool) -> Multiplier {
    let chance = if over { 100 - target.min(99) as u64 } else { target.max(1) as u64 };
    Multiplier::from_bps((100 * RTP_BPS + chance / 2) / chance)
}

/// `RTP * C(25, picks) / C(safe, picks)`: the inverse chance of every pick
/// being safe.
pub fn mines_multiplier(mines: u8, picks: u8) -> Multiplier {
    let safe = GRID_CELLS.saturating_sub(mines);
    if picks == 0 || picks > safe {
        return Multiplier::ZERO;
    }
    let odds: f64 = (0..picks)
        .map(|i| f64::from(GRID_CELLS - i) / f64::from(safe - i))
        .product();
    let bps = (odds * RTP_BPS as f64).round();
    if bps.is_finite() {
        Multiplier::from_bps(bps as u64)
    } else {
        Multiplier::ZERO
    }
}

/// `RTP / u`, clamped to 1.00..=10.56 and floored to hundredths
pub fn limbo_draw(u: f64) -> Multiplier {
    let raw = RTP_BPS as f64 / BPS_PER_UNIT as f64 / u * 100.0;
    let hundredths = if raw.is_finite() {
        (raw.floor() as u64).clamp(100, LIMBO_MAX_HUNDREDTHS)
    } else {
        LIMBO_MAX_HUNDREDTHS
    };
    Multiplier::from_hundredths(hundredths)
}

/// Partial Fisher-Yates over the grid; returns sorted mine cells.
fn place_mines(mines: u8, rng: &mut dyn RandomSource) -> Vec<u8> {
    let mut cells: Vec<u8> = (0..GRID_CELLS).collect();
    let count = mines.min(GRID_CELLS) as usize;
    for i in 0..count {
        let j = i + rng.below((cells.len() - i) as u32) as usize;
        cells.swap(i, j);
    }
    let mut field = cells[..count].to_vec();
    field.sort_unstable();
    field
}

fn pocket_color(pocket: Pocket) -> &'static str {
    match pocket.number() {
        None => "green",
        Some(_) if pocket.is_red() => "red",
        Some(_) => "black",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_fixed_multipliers() {
        assert_eq!(InstantBet::CoinFlip { choice: CoinChoice::Heads }.multiplier().bps(), 18_600);
        assert_eq!(
            InstantBet::Roulette { bet: RouletteBet::Number { value: Pocket(17) } }.multiplier().bps(),
            334_800
        );
        assert_eq!(InstantBet::Roulette { bet: RouletteBet::Red }.multiplier().bps(), 18_600);
        assert_eq!(
            InstantBet::Roulette { bet: RouletteBet::Column { column: 2 } }.multiplier().bps(),
            27_900
        );
    }

    #[test]
    fn test_dice_multiplier() {
        // 50% chance: 2x * 0.93
        assert_eq!(dice_multiplier(50, false).bps(), 18_600);
        assert_eq!(dice_multiplier(50, true).bps(), 18_600);
        // 1% chance: 100x * 0.93
        assert_eq!(dice_multiplier(99, true).bps(), 930_000);
        // 3% chance rounds to the basis point
        assert_eq!(dice_multiplier(3, false).bps(), 310_000);
        assert_eq!(dice_multiplier(7, false).bps(), 132_857);
    }

    #[test]
    fn test_mines_multiplier_is_exact_odds() {
        // two picks with one mine: 25/23 * 0.93
        assert_eq!(mines_multiplier(1, 2).bps(), 10_109);
        // one safe cell left
        assert_eq!(mines_multiplier(24, 1).bps(), 232_500);
        // every safe cell with one mine: C(25,24)/C(24,24) = 25
        assert_eq!(mines_multiplier(1, 24).bps(), 232_500);
        assert_eq!(mines_multiplier(5, 21), Multiplier::ZERO);
    }

    #[test]
    fn test_limbo_draw_bounds() {
        assert_eq!(limbo_draw(0.93).hundredths(), 100);
        assert_eq!(limbo_draw(0.999).hundredths(), 100);
        assert_eq!(limbo_draw(0.465).hundredths(), 200);
        assert_eq!(limbo_draw(1e-9).hundredths(), LIMBO_MAX_HUNDREDTHS);
        assert_eq!(limbo_draw(0.0).hundredths(), LIMBO_MAX_HUNDREDTHS);
    }

    #[test]
    fn test_validation() {
        let ok = |bet: InstantBet| bet.validate().is_ok();
        assert!(ok(InstantBet::Dice { target: 2, over: false }));
        assert!(!ok(InstantBet::Dice { target: 1, over: false }));
        assert!(!ok(InstantBet::Dice { target: 100, over: true }));
        assert!(ok(InstantBet::Limbo { target: Multiplier::from_hundredths(101) }));
        assert!(!ok(InstantBet::Limbo { target: Multiplier::from_hundredths(100) }));
        assert!(!ok(InstantBet::Limbo { target: Multiplier::from_hundredths(1_057) }));
        assert!(!ok(InstantBet::Limbo { target: Multiplier::from_bps(12_345) }));
        assert!(ok(InstantBet::Mines { mines: 3, picks: vec![0, 24, 7] }));
        assert!(!ok(InstantBet::Mines { mines: 3, picks: vec![4, 4] }));
        assert!(!ok(InstantBet::Mines { mines: 3, picks: vec![25] }));
        assert!(!ok(InstantBet::Mines { mines: 0, picks: vec![1] }));
        assert!(!ok(InstantBet::Mines { mines: 24, picks: vec![1, 2] }));
        assert!(!ok(InstantBet::Mines { mines: 2, picks: vec![] }));
        assert!(!ok(InstantBet::Roulette { bet: RouletteBet::Column { column: 4 } }));
    }

    #[test]
    fn test_roulette_zeros_lose_outside_bets() {
        for bet in [
            RouletteBet::Red,
            RouletteBet::Black,
            RouletteBet::Odd,
            RouletteBet::Even,
            RouletteBet::High,
            RouletteBet::Low,
            RouletteBet::Column { column: 3 },
        ] {
            assert!(!bet.wins(Pocket::ZERO));
            assert!(!bet.wins(Pocket::DOUBLE_ZERO));
        }
        assert!(RouletteBet::Number { value: Pocket::DOUBLE_ZERO }.wins(Pocket::DOUBLE_ZERO));
        assert!(RouletteBet::Red.wins(Pocket(32)));
        assert!(RouletteBet::Black.wins(Pocket(2)));
        assert!(RouletteBet::Column { column: 3 }.wins(Pocket(36)));
        assert!(RouletteBet::Column { column: 1 }.wins(Pocket(34)));
    }

    #[test]
    fn test_pocket_wire_format() {
        let bet: RouletteBet = serde_json::from_str(r#"{"bet_type":"number","value":"00"}"#).unwrap();
        assert_eq!(bet, RouletteBet::Number { value: Pocket::DOUBLE_ZERO });
        let bet: RouletteBet = serde_json::from_str(r#"{"bet_type":"number","value":17}"#).unwrap();
        assert_eq!(bet, RouletteBet::Number { value: Pocket(17) });
        assert!(serde_json::from_str::<RouletteBet>(r#"{"bet_type":"number","value":37}"#).is_err());
        assert_eq!(serde_json::to_string(&Pocket::DOUBLE_ZERO).unwrap(), "\"00\"");
    }

    #[test]
    fn test_mines_placement() {
        let mut rng = StdRng::seed_from_u64(3);
        for mines in [1u8, 12, 24] {
            let field = place_mines(mines, &mut rng);
            assert_eq!(field.len(), mines as usize);
            assert!(field.windows(2).all(|w| w[0] < w[1]));
            assert!(field.iter().all(|&cell| cell < GRID_CELLS));
        }
    }

    #[test]
    fn test_resolve_consistency() {
        let mut rng = StdRng::seed_from_u64(42);
        let bet = InstantBet::Dice { target: 50, over: true };
        for _ in 0..200 {
            let resolution = bet.resolve(&mut rng);
            let roll = resolution.detail["roll"].as_u64().unwrap();
            assert!((1..=100).contains(&roll));
            assert_eq!(resolution.won, roll > 50);
            assert_eq!(resolution.multiplier.bps(), 18_600);
        }
    }
}
