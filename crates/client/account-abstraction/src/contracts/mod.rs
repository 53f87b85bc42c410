//! Contract interfaces involved in UserOperation validation.

mod v06;

pub use v06::*;

use alloy_primitives::Selector;
use alloy_sol_types::SolCall;

use crate::simulation::EntityKind;

/// Selector of the top-level call the EntryPoint makes into an entity.
///
/// Each trace level recorded by the tracer is tagged with this selector, which
/// is how the levels are matched back to factory, account and paymaster.
pub const fn entity_selector(entity: EntityKind) -> Selector {
    match entity {
        EntityKind::Factory => Selector::new(ISenderCreatorV06::createSenderCall::SELECTOR),
        EntityKind::Account => Selector::new(IAccountV06::validateUserOpCall::SELECTOR),
        EntityKind::Paymaster => {
            Selector::new(IPaymasterV06::validatePaymasterUserOpCall::SELECTOR)
        }
    }
}
