//! Decoded call payloads

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::Bytes;

/// One named value of a decoded payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedField {
    /// Parameter name from the ABI, empty for unnamed outputs
    pub name: String,
    /// The decoded value
    pub value: DynSolValue,
}

/// Return or revert data of a traced call
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    /// Decoded against a registered function or error
    Abi {
        /// Function or error name
        name: String,
        /// Values in declaration order
        fields: Vec<DecodedField>,
    },

    /// Data that did not match any registered ABI item
    Raw(Bytes),

    /// Deployed bytecode returned by a CREATE/CREATE2 frame, only its length is kept
    CreationReceipt {
        /// Length of the returned code
        len: usize,
    },
}

impl DecodedPayload {
    /// Name of the matched function or error
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Abi { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Value of a named field
    pub fn field(&self, name: &str) -> Option<&DynSolValue> {
        match self {
            Self::Abi { fields, .. } => {
                fields.iter().find(|field| field.name == name).map(|field| &field.value)
            }
            _ => None,
        }
    }

    /// Returns true if the payload could not be decoded
    pub const fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_field_lookup() {
        let payload = DecodedPayload::Abi {
            name: "validateUserOp".to_string(),
            fields: vec![DecodedField {
                name: "validationData".to_string(),
                value: DynSolValue::Uint(U256::ZERO, 256),
            }],
        };

        assert_eq!(payload.name(), Some("validateUserOp"));
        assert!(payload.field("validationData").is_some());
        assert!(payload.field("context").is_none());
        assert!(!payload.is_raw());
    }

    #[test]
    fn test_raw_and_receipt_have_no_fields() {
        let raw = DecodedPayload::Raw(Bytes::from_static(&[1, 2, 3]));
        assert!(raw.is_raw());
        assert_eq!(raw.name(), None);
        assert_eq!(raw.field("context"), None);

        let receipt = DecodedPayload::CreationReceipt { len: 42 };
        assert!(!receipt.is_raw());
        assert_eq!(receipt.name(), None);
    }
}
