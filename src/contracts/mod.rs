//! Contract bindings for ERC-20 tokens, the lending pool and ERC-4626 vaults.

pub mod binder;

pub use binder::{decode_result, encode_call, encode_named, ContractCall, ContractFunction, DecodedValue};
