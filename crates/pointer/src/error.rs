use thiserror::Error;

use crate::machine::MachineError;

/// Resolution failures. All of them abort the enclosing dereference or view;
/// no partial region list is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("unknown region: {0}")]
    UnknownRegion(String),

    #[error("region {region} has no {property}")]
    MissingRegionProperty {
        region: String,
        property: &'static str,
    },

    #[error("Circular reference detected: $this.{0}")]
    CircularReference(&'static str),

    #[error("template {template} expects unbound variable {variable}")]
    UnboundTemplateVariable { template: String, variable: String },

    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("division by zero in pointer expression")]
    DivisionByZero,

    #[error("value {0} exceeds the addressable range")]
    ValueOutOfRange(String),

    #[error("pointer nesting exceeds the resolution depth limit")]
    TooDeep,

    #[error(transparent)]
    Machine(#[from] MachineError),
}
