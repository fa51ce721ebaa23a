//! typed placeholders inside declaration bodies
//!
//! Any mapping with a `_type` key is a [Directive]. Its other keys are the directive's fields,
//! written with or without a leading underscore (`_id` and `id` are the same field).
//!
//! ```yaml
//! BucketArn:
//!   _type: getatt
//!   _id: artifacts
//!   _attribute: Arn
//! ```
//!
//! Parsing is strict: an unknown `_type` or a missing required field is an error that names the
//! directive type and the field.
use crate::naming::Case;
use crate::value::{Object, Value};
use std::path::PathBuf;

/// The key that turns a mapping into a directive
pub const TYPE_KEY: &str = "_type";

/// Largest `token_hex` length, in bytes
pub const MAX_TOKEN_BYTES: usize = 1024;

/// Fixed first element of the origin access identity joins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPrefix {
    /// `origin-access-identity/cloudfront`
    OriginAccessIdentity,
    /// `arn:aws:iam::cloudfront:user`
    CloudFrontUser,
}

impl JoinPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinPrefix::OriginAccessIdentity => "origin-access-identity/cloudfront",
            JoinPrefix::CloudFrontUser => "arn:aws:iam::cloudfront:user",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `!Ref` to the declaration that owns the value
    SelfRef,
    /// the value, as written
    String(Value),
    /// `length` random bytes, hex encoded; different on every render
    TokenHex { length: usize },
    /// a YAML fragment next to the current file, rendered in place
    Include { filename: PathBuf },
    Ref { id: String },
    /// the resolved id as a plain scalar, for `DependsOn`
    DependsOn { id: String },
    ImportValue { id: String },
    /// `!Join ["/", [prefix, !ImportValue id]]`
    ImportValueJoin { id: String, prefix: JoinPrefix },
    /// `!Join ["/", [prefix, !Ref id]]`
    RefJoin { id: String, prefix: JoinPrefix },
    /// `!Base64`, evaluated by CloudFormation
    Base64(Value),
    /// base64 encoded while rendering
    Base64Encode(String),
    GetAtt { id: String, attribute: String },
    Join { items: Vec<Value>, separator: String },
    Environment(Case),
    Project(Case),
    ProjectDashEnvironment(Case),
    /// resolved id of an arbitrary name
    CamelPrefixed(String),
    /// resolved id of an arbitrary name, snake-cased
    SnakePrefixed(String),
}

impl Directive {
    /// Parse a mapping into a directive
    ///
    /// Returns `Ok(None)` for plain mappings without a `_type` key.
    pub fn parse(object: &Object) -> Result<Option<Self>, DirectiveError> {
        let Some(type_value) = object.get(TYPE_KEY) else {
            return Ok(None);
        };

        let Some(type_name) = type_value.as_str() else {
            return Err(DirectiveError::InvalidType(type_value.type_name()));
        };

        let fields = Fields {
            object,
            directive: type_name,
        };

        let directive = match type_name.to_ascii_lowercase().as_str() {
            "self" => Directive::SelfRef,
            "string" => Directive::String(fields.required("value")?.clone()),
            "token_hex" => Directive::TokenHex {
                length: fields.token_length()?,
            },
            "include" => Directive::Include {
                filename: fields.required_string("filename")?.into(),
            },
            "ref" => Directive::Ref {
                id: fields.required_string("id")?,
            },
            "depends-on" => Directive::DependsOn {
                id: fields.required_string("id")?,
            },
            "importvalue" => Directive::ImportValue {
                id: fields.required_string("id")?,
            },
            "importvalue_origin_access_identity_id" => Directive::ImportValueJoin {
                id: fields.required_string("id")?,
                prefix: JoinPrefix::OriginAccessIdentity,
            },
            "importvalue_origin_access_identity_iam_user" => Directive::ImportValueJoin {
                id: fields.required_string("id")?,
                prefix: JoinPrefix::CloudFrontUser,
            },
            "origin_access_identity_id" => Directive::RefJoin {
                id: fields.required_string("id")?,
                prefix: JoinPrefix::OriginAccessIdentity,
            },
            "base64" => Directive::Base64(fields.required("value")?.clone()),
            "base64_encode" => Directive::Base64Encode(fields.required_string("value")?),
            "getatt" => Directive::GetAtt {
                id: fields.required_string("id")?,
                attribute: fields.required_string("attribute")?,
            },
            "join" => Directive::Join {
                items: fields.required_array("items")?.to_vec(),
                separator: fields.optional_string("join_string")?.unwrap_or_default(),
            },
            "environment" => Directive::Environment(fields.case()?),
            "project" => Directive::Project(fields.case()?),
            "project-dash-environment" => Directive::ProjectDashEnvironment(fields.case()?),
            "camel-prefixed" => Directive::CamelPrefixed(fields.required_string("value")?),
            "snake-prefixed" => Directive::SnakePrefixed(fields.required_string("value")?),
            _ => return Err(DirectiveError::UnknownType(type_name.to_string())),
        };

        tracing::trace!(?directive, "parsed directive");
        Ok(Some(directive))
    }

    /// Canonical `_type` name
    pub fn type_name(&self) -> &'static str {
        match self {
            Directive::SelfRef => "self",
            Directive::String(_) => "string",
            Directive::TokenHex { .. } => "token_hex",
            Directive::Include { .. } => "include",
            Directive::Ref { .. } => "ref",
            Directive::DependsOn { .. } => "depends-on",
            Directive::ImportValue { .. } => "importvalue",
            Directive::ImportValueJoin {
                prefix: JoinPrefix::OriginAccessIdentity,
                ..
            } => "importvalue_origin_access_identity_id",
            Directive::ImportValueJoin {
                prefix: JoinPrefix::CloudFrontUser,
                ..
            } => "importvalue_origin_access_identity_iam_user",
            Directive::RefJoin { .. } => "origin_access_identity_id",
            Directive::Base64(_) => "base64",
            Directive::Base64Encode(_) => "base64_encode",
            Directive::GetAtt { .. } => "getatt",
            Directive::Join { .. } => "join",
            Directive::Environment(_) => "environment",
            Directive::Project(_) => "project",
            Directive::ProjectDashEnvironment(_) => "project-dash-environment",
            Directive::CamelPrefixed(_) => "camel-prefixed",
            Directive::SnakePrefixed(_) => "snake-prefixed",
        }
    }

    /// Id of a declaration in the same stack this directive points at
    ///
    /// Imports are not included, they point at other stacks.
    pub fn referenced_id(&self) -> Option<&str> {
        match self {
            Directive::Ref { id }
            | Directive::DependsOn { id }
            | Directive::RefJoin { id, .. }
            | Directive::GetAtt { id, .. } => Some(id.as_str()),
            _ => None,
        }
    }

    /// Values nested inside this directive that are rendered in turn
    pub fn nested_values(&self) -> &[Value] {
        match self {
            Directive::Base64(value) => std::slice::from_ref(value),
            Directive::Join { items, .. } => items,
            _ => &[],
        }
    }
}

/// Field access on a directive mapping
struct Fields<'a> {
    object: &'a Object,
    directive: &'a str,
}

impl<'a> Fields<'a> {
    fn get(&self, field: &str) -> Option<&'a Value> {
        self.object
            .get(&format!("_{field}"))
            .or_else(|| self.object.get(field))
    }

    fn required(&self, field: &'static str) -> Result<&'a Value, DirectiveError> {
        self.get(field).ok_or_else(|| DirectiveError::MissingField {
            directive: self.directive.to_string(),
            field,
        })
    }

    fn scalar(&self, field: &'static str, value: &Value) -> Result<String, DirectiveError> {
        match value {
            Value::Null => Err(DirectiveError::MissingField {
                directive: self.directive.to_string(),
                field,
            }),
            other => other
                .to_scalar_string()
                .ok_or_else(|| self.invalid(field, "a scalar", other)),
        }
    }

    fn required_string(&self, field: &'static str) -> Result<String, DirectiveError> {
        self.scalar(field, self.required(field)?)
    }

    fn optional_string(&self, field: &'static str) -> Result<Option<String>, DirectiveError> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.scalar(field, value).map(Some),
        }
    }

    fn optional_usize(&self, field: &'static str) -> Result<Option<usize>, DirectiveError> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(i)) => usize::try_from(*i)
                .map(Some)
                .map_err(|_| self.invalid(field, "a positive integer", &Value::Integer(*i))),
            Some(other) => Err(self.invalid(field, "a positive integer", other)),
        }
    }

    fn token_length(&self) -> Result<usize, DirectiveError> {
        match self.optional_usize("length")? {
            None => Ok(16),
            Some(length) if length <= MAX_TOKEN_BYTES => Ok(length),
            Some(_) => Err(DirectiveError::InvalidField {
                directive: self.directive.to_string(),
                field: "length",
                expected: "at most 1024",
                found: "a larger integer",
            }),
        }
    }

    fn required_array(&self, field: &'static str) -> Result<&'a [Value], DirectiveError> {
        match self.required(field)? {
            Value::Array(items) => Ok(items),
            other => Err(self.invalid(field, "a list", other)),
        }
    }

    fn case(&self) -> Result<Case, DirectiveError> {
        let Some(case) = self.optional_string("case")? else {
            return Ok(Case::default());
        };

        case.parse().map_err(|reason| DirectiveError::InvalidCase {
            directive: self.directive.to_string(),
            reason,
        })
    }

    fn invalid(&self, field: &'static str, expected: &'static str, found: &Value) -> DirectiveError {
        DirectiveError::InvalidField {
            directive: self.directive.to_string(),
            field,
            expected,
            found: found.type_name(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DirectiveError {
    #[error("unknown directive type `{0}`")]
    UnknownType(String),
    #[error("directive `_type` must be a string, found {0}")]
    InvalidType(&'static str),
    #[error("`{directive}` directive is missing required field `_{field}`")]
    MissingField {
        directive: String,
        field: &'static str,
    },
    #[error("`{directive}` directive field `_{field}` must be {expected}, found {found}")]
    InvalidField {
        directive: String,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("`{directive}` directive: {reason}")]
    InvalidCase { directive: String, reason: String },
    #[error("keys `{first}` and `{second}` both render as `{key}`")]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },
    #[error("`self` directive used outside of a declaration")]
    NoOwner,
    #[error("`{directive}` directive refers to unknown declaration `{id}`")]
    UnknownDeclaration { directive: &'static str, id: String },
    #[error("unable to read included file {}", path.display())]
    IncludeRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse included file {}", path.display())]
    IncludeParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("include loop detected at {}", path.display())]
    IncludeLoop { path: PathBuf },
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(yaml: &str) -> Result<Option<Directive>, DirectiveError> {
        let value: Value = serde_yaml::from_str::<serde_yaml::Value>(yaml)
            .expect("valid yaml")
            .into();
        Directive::parse(value.as_object().expect("mapping"))
    }

    #[test]
    fn plain_mapping_is_not_a_directive() {
        assert_eq!(parse("type: AWS::S3::Bucket").unwrap(), None);
    }

    #[test]
    fn fields_with_and_without_underscore() {
        assert_eq!(
            parse("{_type: ref, _id: bucket}").unwrap(),
            Some(Directive::Ref {
                id: "bucket".to_string()
            })
        );
        assert_eq!(
            parse("{_type: GetAtt, id: bucket, attribute: Arn}").unwrap(),
            Some(Directive::GetAtt {
                id: "bucket".to_string(),
                attribute: "Arn".to_string()
            })
        );
    }

    #[test]
    fn defaults() {
        assert_eq!(
            parse("{_type: token_hex}").unwrap(),
            Some(Directive::TokenHex { length: 16 })
        );
        assert_eq!(
            parse("{_type: join, _items: []}").unwrap(),
            Some(Directive::Join {
                items: vec![],
                separator: String::new()
            })
        );
        assert_eq!(
            parse("{_type: environment}").unwrap(),
            Some(Directive::Environment(Case::Unchanged))
        );
    }

    #[test]
    fn unknown_type_fails() {
        let err = parse("{_type: nonsense}").unwrap_err();
        assert!(matches!(err, DirectiveError::UnknownType(ref t) if t == "nonsense"));
    }

    #[test]
    fn missing_field_names_directive_and_field() {
        let err = parse("{_type: getatt, _id: bucket}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "`getatt` directive is missing required field `_attribute`"
        );
    }

    #[test]
    fn wrong_field_type() {
        let err = parse("{_type: join, _items: nope}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "`join` directive field `_items` must be a list, found string"
        );

        let err = parse("{_type: token_hex, _length: -1}").unwrap_err();
        assert!(matches!(err, DirectiveError::InvalidField { field: "length", .. }));
    }

    #[test]
    fn token_length_is_bounded() {
        assert_eq!(
            parse("{_type: token_hex, _length: 1024}").unwrap(),
            Some(Directive::TokenHex { length: MAX_TOKEN_BYTES })
        );

        let err = parse("{_type: token_hex, _length: 100000000000}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "`token_hex` directive field `_length` must be at most 1024, found a larger integer"
        );
    }

    #[test]
    fn invalid_case() {
        let err = parse("{_type: project, _case: kebab}").unwrap_err();
        assert!(matches!(err, DirectiveError::InvalidCase { .. }));
    }

    #[test]
    fn referenced_ids() {
        let directive = parse("{_type: depends-on, _id: queue}").unwrap().unwrap();
        assert_eq!(directive.referenced_id(), Some("queue"));

        let directive = parse("{_type: importvalue, _id: vpc}").unwrap().unwrap();
        assert_eq!(directive.referenced_id(), None);
    }

    #[test]
    fn type_names_round_trip() {
        for name in [
            "self",
            "token_hex",
            "importvalue_origin_access_identity_iam_user",
            "origin_access_identity_id",
            "project-dash-environment",
        ] {
            let yaml = format!("{{_type: {name}, _id: x}}");
            let directive = parse(&yaml).unwrap().unwrap();
            assert_eq!(directive.type_name(), name);
        }
    }
}
