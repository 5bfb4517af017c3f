pub mod crypto;
pub mod dead_letter;
pub mod ledger;
