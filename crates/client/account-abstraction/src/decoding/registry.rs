//! Selector registry
//!
//! Merged ABI of every contract interface known to take part in validation,
//! keyed by canonical signature. Built once on first use and shared read-only
//! afterwards. Lookups never fail the caller: anything that does not match a
//! registered item is handed back as raw bytes.

use alloy_dyn_abi::{FunctionExt, JsonAbiExt};
use alloy_json_abi::{Error, Function, JsonAbi, Param};
use alloy_primitives::{Bytes, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::trace;

use crate::contracts::{
    IAccountV06, IEntryPointV06, INonceManagerV06, IPaymasterV06, ISenderCreatorV06,
    ISolidityErrors, IStakeManagerV06,
};

use super::types::{DecodedField, DecodedPayload};

static REGISTRY: LazyLock<SelectorRegistry> =
    LazyLock::new(SelectorRegistry::from_known_interfaces);

/// Function and error descriptors of the known validation interfaces
#[derive(Debug, Clone, Default)]
pub struct SelectorRegistry {
    /// Canonical signature to function
    functions: HashMap<String, Function>,
    /// Canonical signature to error
    errors: HashMap<String, Error>,
    function_selectors: HashMap<Selector, String>,
    error_selectors: HashMap<Selector, String>,
    /// Function name to the first signature registered under it
    function_names: HashMap<String, String>,
}

impl SelectorRegistry {
    /// The process-wide registry of the EntryPoint v0.6 interfaces
    pub fn global() -> &'static Self {
        &REGISTRY
    }

    fn from_known_interfaces() -> Self {
        Self::from_abis([
            IEntryPointV06::abi::contract(),
            IStakeManagerV06::abi::contract(),
            INonceManagerV06::abi::contract(),
            IAccountV06::abi::contract(),
            IPaymasterV06::abi::contract(),
            ISenderCreatorV06::abi::contract(),
            ISolidityErrors::abi::contract(),
        ])
    }

    /// Merge several ABIs; the first definition of a signature wins
    pub fn from_abis(abis: impl IntoIterator<Item = JsonAbi>) -> Self {
        let mut registry = Self::default();
        for abi in abis {
            for function in abi.functions() {
                registry.register_function(function.clone());
            }
            for error in abi.errors() {
                registry.register_error(error.clone());
            }
        }
        registry
    }

    fn register_function(&mut self, function: Function) {
        let signature = function.signature();
        if self.functions.contains_key(&signature) {
            return;
        }
        self.function_selectors.entry(function.selector()).or_insert_with(|| signature.clone());
        self.function_names.entry(function.name.clone()).or_insert_with(|| signature.clone());
        self.functions.insert(signature, function);
    }

    fn register_error(&mut self, error: Error) {
        let signature = error.signature();
        if self.errors.contains_key(&signature) {
            return;
        }
        self.error_selectors.entry(error.selector()).or_insert_with(|| signature.clone());
        self.errors.insert(signature, error);
    }

    /// Number of registered functions and errors
    pub fn len(&self) -> usize {
        self.functions.len() + self.errors.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Function by canonical signature, e.g. `balanceOf(address)`
    pub fn function(&self, signature: &str) -> Option<&Function> {
        self.functions.get(signature)
    }

    /// Error by canonical signature
    pub fn error(&self, signature: &str) -> Option<&Error> {
        self.errors.get(signature)
    }

    /// Function by 4-byte selector
    pub fn function_by_selector(&self, selector: Selector) -> Option<&Function> {
        self.function_selectors.get(&selector).and_then(|signature| self.function(signature))
    }

    /// Function by bare name
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.function_names.get(name).and_then(|signature| self.function(signature))
    }

    /// Error by 4-byte selector
    pub fn error_by_selector(&self, selector: Selector) -> Option<&Error> {
        self.error_selectors.get(&selector).and_then(|signature| self.error(signature))
    }

    /// Decode returned data against a function's outputs, raw on failure
    pub fn decode_return(&self, function: &Function, data: &Bytes) -> DecodedPayload {
        match function.abi_decode_output(data) {
            Ok(values) => DecodedPayload::abi(&function.name, &function.outputs, values),
            Err(err) => {
                trace!(
                    target: "aa-validation",
                    function = %function.name,
                    error = %err,
                    "Return data did not match function outputs"
                );
                DecodedPayload::Raw(data.clone())
            }
        }
    }

    /// Decode revert data against the registered errors, raw on failure
    pub fn decode_revert(&self, data: &Bytes) -> DecodedPayload {
        let Some(error) = data.get(..4).and_then(|sel| self.error_by_selector(Selector::from_slice(sel)))
        else {
            return DecodedPayload::Raw(data.clone());
        };

        match error.abi_decode_input(&data[4..]) {
            Ok(values) => DecodedPayload::abi(&error.name, &error.inputs, values),
            Err(err) => {
                trace!(
                    target: "aa-validation",
                    error_name = %error.name,
                    error = %err,
                    "Revert data did not match error inputs"
                );
                DecodedPayload::Raw(data.clone())
            }
        }
    }
}

impl DecodedPayload {
    fn abi(name: &str, params: &[Param], values: Vec<alloy_dyn_abi::DynSolValue>) -> Self {
        let fields = params
            .iter()
            .zip(values)
            .map(|(param, value)| DecodedField { name: param.name.clone(), value })
            .collect();
        Self::Abi { name: name.to_string(), fields }
    }
}
