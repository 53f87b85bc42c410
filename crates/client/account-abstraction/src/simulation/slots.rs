//! Entity slot association
//!
//! Solidity places `mapping(address => T)` values at `keccak256(key ++ slot)`.
//! Every keccak preimage recorded by the tracer that starts with an entity's
//! left-padded address therefore proves that the resulting hash is a slot the
//! entity owns. Members of a struct stored in such a mapping follow the base
//! slot, so a short range after each derived slot is associated as well.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Slots after a derived base slot that still belong to its owner
pub const ASSOCIATED_SLOT_RANGE: u64 = 128;

/// Entity address to the storage slots derived from it
pub type EntitySlots = HashMap<Address, HashSet<B256>>;

/// Left-pad an address to a 32-byte word
pub fn pad_address(address: Address) -> B256 {
    address.into_word()
}

/// Derive the slots owned by each entity from the recorded keccak preimages
///
/// Every address gets an entry, empty when nothing was derived from it. With
/// `double_mapping` set, a preimage ending in an already associated slot makes
/// its hash associated too, which covers `mapping(x => mapping(address => T))`
/// style layouts at the cost of false positives.
pub fn resolve_entity_slots(
    preimages: &[Bytes],
    addresses: &[Address],
    double_mapping: bool,
) -> EntitySlots {
    let mut slots: EntitySlots =
        addresses.iter().map(|&address| (address, HashSet::new())).collect();
    let padded: Vec<(Address, B256)> =
        addresses.iter().map(|&address| (address, pad_address(address))).collect();

    for preimage in preimages {
        for (address, word) in &padded {
            let owned = slots.entry(*address).or_default();
            if preimage.starts_with(word.as_slice()) {
                owned.insert(keccak256(preimage));
            } else if double_mapping && ends_with_slot(preimage, owned) {
                owned.insert(keccak256(preimage));
            }
        }
    }

    debug!(
        target: "aa-validation",
        preimages = preimages.len(),
        derived = slots.values().map(HashSet::len).sum::<usize>(),
        "Resolved entity storage slots"
    );

    slots
}

fn ends_with_slot(preimage: &[u8], owned: &HashSet<B256>) -> bool {
    preimage.len() > 32 && owned.contains(&B256::from_slice(&preimage[preimage.len() - 32..]))
}

/// Whether `slot` belongs to `address`
///
/// True when the slot holds the padded address itself, or falls within
/// [`ASSOCIATED_SLOT_RANGE`] slots after a slot derived from the address.
pub fn is_associated(slot: B256, address: Address, slots: &EntitySlots) -> bool {
    if slot == pad_address(address) {
        return true;
    }

    let Some(derived) = slots.get(&address) else {
        return false;
    };

    let slot = U256::from_be_bytes(slot.0);
    derived.iter().any(|base| {
        let base = U256::from_be_bytes(base.0);
        slot >= base && slot - base < U256::from(ASSOCIATED_SLOT_RANGE)
    })
}
