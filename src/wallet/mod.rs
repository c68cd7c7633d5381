//! Key custody and transaction signing.

pub mod account;

pub use account::Account;
