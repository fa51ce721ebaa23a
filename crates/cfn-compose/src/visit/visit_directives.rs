use super::Visit;
use crate::directive::{Directive, DirectiveError};
use crate::value::Value;

/// Recursively visit all [Directive]s
///
/// Directives are parsed on the way, so a malformed directive anywhere in the tree fails the
/// walk. Values nested inside a directive (`join` items, the `base64` value) are walked too.
/// Included fragments are not loaded.
pub trait VisitDirectives {
    fn visit_directives(&self, visitor: &mut dyn Visit<Directive>) -> Result<(), DirectiveError>;
}

impl VisitDirectives for Value {
    fn visit_directives(&self, visitor: &mut dyn Visit<Directive>) -> Result<(), DirectiveError> {
        match self {
            Value::Object(object) => {
                if let Some(directive) = Directive::parse(object)? {
                    visitor.visit(&directive);
                    for nested in directive.nested_values() {
                        nested.visit_directives(visitor)?;
                    }
                    return Ok(());
                }

                for value in object.values() {
                    value.visit_directives(visitor)?;
                }
            }
            Value::Array(array) => {
                for value in array {
                    value.visit_directives(visitor)?;
                }
            }
            Value::Tagged { value, .. } => value.visit_directives(visitor)?,
            _ => {}
        }

        Ok(())
    }
}
