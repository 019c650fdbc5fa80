//! Decision engine: level projection, signal classification, stake
//! management, and the two drivers (live loop, shared session core).

pub mod executor;
pub mod levels;
pub mod session;
pub mod signal;
pub mod stake;
pub mod trading_loop;

pub use executor::{SimulatedExecutor, TradeExecutor};
pub use levels::{LevelProjector, LevelSet};
pub use session::{Entry, Evaluation, Session, SessionState, SessionSummary};
pub use stake::{StakeController, StakePhase, StakeState};
pub use trading_loop::{CycleOutcome, StopHandle, TradingLoop};
