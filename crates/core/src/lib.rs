pub mod normalize;
pub mod period;
pub mod record;

pub use period::StatementPeriod;
pub use record::{MatchStatus, Transaction};
