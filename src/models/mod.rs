//! Domain models shared across the bot: bars coming out of the feed and the
//! trade records the session appends after every executed trade.

pub mod bar;
pub mod trade;

pub use bar::{Bar, Quote};
pub use trade::{Direction, Signal, TradeOutcome, TradeRecord};
