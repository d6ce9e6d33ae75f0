//! Cross-repo taint exchange (CRTEX) canonical names.
//!
//! CRTEX frames use `Anchor` ports paired with a *template* canonical name
//! (containing marker placeholders) and `Producer` ports paired with an
//! *instantiated* name. Mixing the two is a validation error.

use crate::access_path::Root;
use crate::ir::Method;
use serde::{Deserialize, Serialize};

pub const LEAF_NAME_MARKER: &str = "%LEAF_NAME%";
pub const BLOKS_MARKER: &str = "%BLOKS%";
pub const GRAPHQL_ROOT_MARKER: &str = "%GRAPHQL_ROOT%";
pub const VIA_TYPE_OF_MARKER: &str = "%VIA_TYPE_OF%";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalName {
    /// Contains unexpanded markers; pairs with `Root::Anchor`.
    Template(String),
    /// Fully expanded; pairs with `Root::Producer`.
    Instance(String),
}

impl CanonicalName {
    pub fn is_template(&self) -> bool {
        matches!(self, CanonicalName::Template(_))
    }

    /// A template containing `%VIA_TYPE_OF%` requires exactly one
    /// via-type-of port; anchors pair with templates, producers with
    /// instances.
    pub fn validate(&self, root: Root, via_type_of_port_count: usize) -> Result<(), String> {
        match (self, root) {
            (CanonicalName::Template(text), Root::Anchor) => {
                if text.contains(VIA_TYPE_OF_MARKER) && via_type_of_port_count != 1 {
                    return Err(format!(
                        "canonical name template {:?} uses %VIA_TYPE_OF% but has {} via-type-of ports (expected 1)",
                        text, via_type_of_port_count
                    ));
                }
                Ok(())
            }
            (CanonicalName::Instance(_), Root::Producer) => Ok(()),
            (CanonicalName::Template(_), other) => {
                Err(format!("template canonical name requires Anchor port, got {:?}", other))
            }
            (CanonicalName::Instance(_), other) => {
                Err(format!("instantiated canonical name requires Producer port, got {:?}", other))
            }
        }
    }
}

/// Converts a class/method name into the heuristics CRTEX templates rely
/// on; a pluggable converter here rather than baked into the core.
pub trait CanonicalNameConverter: Send + Sync {
    fn strip_suffix(&self, class_name: &str) -> String;
    fn camel_to_snake(&self, name: &str) -> String;
}

#[derive(Default)]
pub struct DefaultCanonicalNameConverter;

impl CanonicalNameConverter for DefaultCanonicalNameConverter {
    fn strip_suffix(&self, class_name: &str) -> String {
        for suffix in ["Action", "Screen", "Data"] {
            if let Some(stripped) = class_name.strip_suffix(suffix) {
                return stripped.to_string();
            }
        }
        class_name.to_string()
    }

    fn camel_to_snake(&self, name: &str) -> String {
        let mut result = String::with_capacity(name.len() + 4);
        for (i, c) in name.chars().enumerate() {
            if c.is_uppercase() {
                if i != 0 {
                    result.push('_');
                }
                result.extend(c.to_lowercase());
            } else {
                result.push(c);
            }
        }
        result
    }
}

/// Expand a template canonical name for a concrete callsite.
pub fn instantiate(
    template: &str,
    method: &Method,
    via_type_of_names: &[String],
    converter: &dyn CanonicalNameConverter,
) -> CanonicalName {
    let mut text = template.to_string();
    if text.contains(LEAF_NAME_MARKER) {
        let snake = converter.camel_to_snake(&converter.strip_suffix(&method.class_name));
        text = text.replace(LEAF_NAME_MARKER, &snake);
    }
    if text.contains(VIA_TYPE_OF_MARKER) {
        let replacement = via_type_of_names.first().cloned().unwrap_or_default();
        text = text.replace(VIA_TYPE_OF_MARKER, &replacement);
    }
    if text.contains(BLOKS_MARKER) {
        text = text.replace(BLOKS_MARKER, &method.class_name);
    }
    if text.contains(GRAPHQL_ROOT_MARKER) {
        text = text.replace(GRAPHQL_ROOT_MARKER, &method.class_name);
    }
    CanonicalName::Instance(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_mixed_anchor_instance() {
        let name = CanonicalName::Instance("foo".to_string());
        assert!(name.validate(Root::Anchor, 0).is_err());
    }

    #[test]
    fn validate_requires_single_via_type_of_port() {
        let name = CanonicalName::Template(format!("prefix.{}", VIA_TYPE_OF_MARKER));
        assert!(name.validate(Root::Anchor, 0).is_err());
        assert!(name.validate(Root::Anchor, 1).is_ok());
        assert!(name.validate(Root::Anchor, 2).is_err());
    }

    #[test]
    fn instantiate_strips_suffix_and_snake_cases() {
        let converter = DefaultCanonicalNameConverter;
        let method = Method {
            signature: "LLoginScreen;.onClick".to_string(),
            class_name: "LoginScreenAction".to_string(),
            parameter_types: vec![],
            return_type: "V".to_string(),
            is_static: false,
        };
        let name = instantiate(LEAF_NAME_MARKER, &method, &[], &converter);
        assert_eq!(name, CanonicalName::Instance("login_screen".to_string()));
    }
}
