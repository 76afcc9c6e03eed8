pub mod chain;
pub mod ledger;
pub mod state;
pub mod validation;

pub use chain::*;
pub use ledger::*;
pub use state::*;
pub use validation::*;
