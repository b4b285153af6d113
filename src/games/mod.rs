pub mod clock;
pub mod crash;
pub mod driver;
pub mod fairness;
pub mod ledger;
pub mod outcome;
pub mod processor;
pub mod publisher;
pub mod rng;
pub mod settlement;
pub mod single_shot;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use crash::{BetReceipt, CashOutReceipt, CrashEngine, EngineSettings};
pub use driver::RoundDriver;
pub use outcome::{CrashPoint, FairOutcomeSource, OutcomeSource, ScriptedOutcomes};
pub use processor::{InstantGameProcessor, PlayReceipt};
pub use publisher::{Phase, RoundEvent, RoundOutcome, RoundSnapshot, RoundStatus, StatusPublisher};
pub use settlement::SettlementDispatcher;
pub use single_shot::{InstantBet, RouletteBet};
pub use types::*;
