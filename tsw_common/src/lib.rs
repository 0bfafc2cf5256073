mod token_amount;

pub mod helpers;
pub mod op;
mod secret;

pub use token_amount::{TokenAmount, TokenAmountParseError, AMOUNT_DECIMALS, DEFAULT_LEDGER_SCALE};
pub use secret::Secret;
