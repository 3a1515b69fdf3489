//! Credit balances and the append-only transaction ledger.

mod ledger;

pub use ledger::CreditLedger;
