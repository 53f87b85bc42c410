//! Addresses and storage touched by validation
//!
//! The mempool keeps these to invalidate the operation when any of the
//! contracts or slots it depended on change.

use alloy_primitives::Address;
use std::collections::HashSet;

use super::trace::BundlerTracerResult;
use super::types::StorageMap;

/// Every address with a recorded code size, in level order, without duplicates
pub fn collect_addresses(trace: &BundlerTracerResult) -> Vec<Address> {
    let mut seen = HashSet::new();
    trace
        .calls_from_entry_point
        .iter()
        .flat_map(|level| level.contract_size.keys().copied())
        .filter(|address| seen.insert(*address))
        .collect()
}

/// Storage read per address, the first level to touch an address wins
pub fn collect_storage_map(trace: &BundlerTracerResult) -> StorageMap {
    let mut storage_map = StorageMap::new();
    for level in &trace.calls_from_entry_point {
        for (address, access) in &level.access {
            storage_map.entry(*address).or_insert_with(|| access.reads.clone());
        }
    }
    storage_map
}
