//! Operator invocations

use super::attribute::AttributeValue;
use crate::{GraphError, Result};
use serde::{Deserialize, Serialize};

/// Canonical name of the default ONNX operator domain
pub const ONNX_DOMAIN: &str = "";

/// Alias accepted for the default ONNX operator domain
pub const ONNX_DOMAIN_ALIAS: &str = "ai.onnx";

/// Map the ONNX domain alias onto the canonical empty domain
pub fn normalize_domain(domain: &str) -> &str {
    if domain == ONNX_DOMAIN_ALIAS {
        ONNX_DOMAIN
    } else {
        domain
    }
}

/// One operator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorNode {
    /// Operation type (e.g., "Gemm", "Cast")
    op_type: String,
    /// Operator domain ("" for default ONNX)
    domain: String,
    /// Instance name, unique within the owning fragment
    name: String,
    /// Consumed value names; "" marks an omitted optional input
    input_names: Vec<String>,
    /// Produced value names
    output_names: Vec<String>,
    attributes: Vec<AttributeValue>,
}

impl OperatorNode {
    /// Create a node, taking ownership of `attributes`
    ///
    /// Instance-name uniqueness is checked when the node is added to a
    /// fragment, not here.
    pub fn new<I, O>(
        op_type: impl Into<String>,
        domain: impl AsRef<str>,
        name: impl Into<String>,
        inputs: I,
        outputs: O,
        attributes: Vec<AttributeValue>,
    ) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        let node = Self {
            op_type: op_type.into(),
            domain: normalize_domain(domain.as_ref()).to_string(),
            name: name.into(),
            input_names: inputs.into_iter().map(Into::into).collect(),
            output_names: outputs.into_iter().map(Into::into).collect(),
            attributes,
        };
        node.validate()?;
        Ok(node)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.op_type.is_empty() {
            return Err(GraphError::InvalidArgument(
                "operator name cannot be empty".to_string(),
            ));
        }
        if self.name.is_empty() {
            return Err(GraphError::InvalidArgument(format!(
                "{} node needs an instance name",
                self.op_type
            )));
        }
        if self.output_names.iter().any(String::is_empty) {
            return Err(GraphError::InvalidArgument(format!(
                "node '{}' has an empty output name",
                self.name
            )));
        }
        for (i, output) in self.output_names.iter().enumerate() {
            if self.output_names[..i].contains(output) {
                return Err(GraphError::DuplicateName(format!(
                    "node '{}' produces '{}' twice",
                    self.name, output
                )));
            }
        }
        for (i, attr) in self.attributes.iter().enumerate() {
            attr.validate()?;
            if self.attributes[..i].iter().any(|a| a.name() == attr.name()) {
                return Err(GraphError::DuplicateName(format!(
                    "node '{}' has attribute '{}' twice",
                    self.name,
                    attr.name()
                )));
            }
        }
        Ok(())
    }

    /// Operation type
    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    /// Operator domain
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input value names in order
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Input names that must resolve to a value (optional inputs skipped)
    pub fn required_inputs(&self) -> impl Iterator<Item = &str> {
        self.input_names.iter().map(String::as_str).filter(|n| !n.is_empty())
    }

    /// Output value names in order
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// All attributes
    pub fn attributes(&self) -> &[AttributeValue] {
        &self.attributes
    }

    /// Get attribute by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.iter().find(|attr| attr.name() == name)
    }
}
