//! collection of declarations of one stack
//!
//! [StackDeclarations] accumulates the declarations of every input file that makes up a stack,
//! in load order, and tracks the file each one came from so errors can point at it.
//!
//! Two file layouts are accepted. A *sectioned* file has a `records` key holding the
//! declarations and an optional `template` block:
//!
//! ```yaml
//! template:
//!   description: Shop storage
//! records:
//!   artifacts:
//!     type: resource
//!     config: { type: AWS::S3::Bucket }
//! ```
//!
//! Any other mapping is read as declarations directly.
use crate::directive::{Directive, DirectiveError, TYPE_KEY};
use crate::value::{Object, Value};
use crate::visit::VisitDirectives;
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub type Source = Option<PathBuf>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Parameter,
    Resource,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub id: String,
    pub kind: DeclarationKind,
    pub title: Option<String>,
    pub comment: Option<String>,
    /// inject `Name` and template tags into `properties.tags`
    pub tags: bool,
    pub config: Object,
    pub outputs: Vec<Output>,
    pub source: Source,
}

#[derive(Debug, Clone)]
pub struct Output {
    /// unprefixed export name
    pub name: String,
    pub description: Option<String>,
    /// always a directive mapping
    pub value: Value,
}

/// Scalar fields of a declaration, `config` and `outputs` are taken out beforehand
#[derive(Deserialize)]
struct RawDeclaration {
    #[serde(rename = "type")]
    kind: DeclarationKind,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    tags: bool,
}

#[derive(Default, Debug)]
pub struct StackDeclarations {
    sources: Vec<PathBuf>,
    template: Object,
    declarations: IndexMap<String, Declaration>,
}

impl StackDeclarations {
    /// Inserts the declarations of one document
    pub fn insert(&mut self, document: Value, source: Source) -> Result<(), LoadError> {
        if let Some(path) = &source {
            self.sources.push(path.clone());
        }

        let mut document = match document {
            Value::Object(document) => document,
            Value::Null => Object::new(),
            other => {
                return Err(LoadError::NotAMapping {
                    path: source,
                    found: other.type_name(),
                })
            }
        };

        let records = match document.shift_remove("records") {
            Some(Value::Object(records)) => {
                match document.shift_remove("template") {
                    Some(Value::Object(template)) => self.template.extend(template),
                    Some(other) => {
                        return Err(LoadError::InvalidTemplateBlock {
                            path: source,
                            found: other.type_name(),
                        })
                    }
                    None => {}
                }
                records
            }
            Some(other) => {
                return Err(LoadError::NotAMapping {
                    path: source,
                    found: other.type_name(),
                })
            }
            None => document,
        };

        for (id, body) in records {
            let declaration = Declaration::parse(id, body, &source)?;

            if let Some(existing) = self.declarations.get(&declaration.id) {
                return Err(LoadError::DuplicateDeclaration {
                    id: declaration.id,
                    existing: existing.source.clone(),
                    new: source,
                });
            }

            tracing::debug!(id=%declaration.id, kind=?declaration.kind, "declaration loaded");
            self.declarations
                .insert(declaration.id.clone(), declaration);
        }

        Ok(())
    }

    /// Parse `yaml` and insert its declarations
    pub fn insert_yaml(&mut self, yaml: &str, source: Source) -> Result<(), LoadError> {
        let document: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| LoadError::YamlParseFailed {
                path: source.clone(),
                source: e,
            })?;
        self.insert(document.into(), source)
    }

    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize().map_err(|e| LoadError::IoError {
            path: file_path.to_path_buf(),
            source: e,
        })?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path).map_err(|e| LoadError::IoError {
            path: file_path.clone(),
            source: e,
        })?;

        self.insert_yaml(&file_contents, Some(file_path))
    }

    /// Check every directive and every same-stack reference
    ///
    /// Runs before anything is rendered. References inside included fragments are checked
    /// while rendering.
    pub fn validate(&self) -> Result<(), LoadError> {
        let mut export_names: IndexMap<&str, &str> = IndexMap::new();

        for declaration in self.declarations.values() {
            let mut dangling = None;
            let mut check = |directive: &Directive| {
                if let Some(id) = directive.referenced_id() {
                    if dangling.is_none() && !self.declarations.contains_key(id) {
                        dangling = Some((directive.type_name(), id.to_string()));
                    }
                }
            };

            let walk = Value::Object(declaration.config.clone())
                .visit_directives(&mut check)
                .and_then(|()| {
                    for output in &declaration.outputs {
                        output.value.visit_directives(&mut check)?;
                    }
                    Ok(())
                });

            walk.map_err(|source| LoadError::InvalidDirective {
                id: declaration.id.clone(),
                path: declaration.source.clone(),
                source,
            })?;

            if let Some((directive, id)) = dangling {
                return Err(LoadError::InvalidDirective {
                    id: declaration.id.clone(),
                    path: declaration.source.clone(),
                    source: DirectiveError::UnknownDeclaration { directive, id },
                });
            }

            for output in &declaration.outputs {
                if let Some(existing) = export_names.insert(&output.name, &declaration.id) {
                    return Err(LoadError::DuplicateOutput {
                        name: output.name.clone(),
                        existing: existing.to_string(),
                        new: declaration.id.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Declaration> {
        self.declarations.get(id)
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Declaration> {
        self.of_kind(DeclarationKind::Parameter)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Declaration> {
        self.of_kind(DeclarationKind::Resource)
    }

    fn of_kind(&self, kind: DeclarationKind) -> impl Iterator<Item = &Declaration> {
        self.declarations
            .values()
            .filter(move |declaration| declaration.kind == kind)
    }

    /// Outputs with the id of the declaration they belong to
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &Output)> {
        self.declarations.values().flat_map(|declaration| {
            declaration
                .outputs
                .iter()
                .map(move |output| (declaration.id.as_str(), output))
        })
    }

    pub fn ids(&self) -> IndexSet<String> {
        self.declarations.keys().cloned().collect()
    }

    /// Merged `template` blocks of all sectioned files
    pub fn template(&self) -> &Object {
        &self.template
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl Declaration {
    fn parse(id: String, body: Value, source: &Source) -> Result<Self, LoadError> {
        let malformed = |reason: String| LoadError::MalformedDeclaration {
            id: id.clone(),
            path: source.clone(),
            reason,
        };

        let mut body = match body {
            Value::Object(body) => body,
            other => {
                return Err(malformed(format!(
                    "expected a mapping, found {}",
                    other.type_name()
                )))
            }
        };

        let config = match body.shift_remove("config") {
            Some(Value::Object(config)) => config,
            Some(other) => {
                return Err(malformed(format!(
                    "`config` must be a mapping, found {}",
                    other.type_name()
                )))
            }
            None => return Err(malformed("missing required field `config`".to_string())),
        };

        let outputs = match body.shift_remove("outputs") {
            None | Some(Value::Null) => vec![],
            Some(Value::Array(outputs)) => outputs
                .into_iter()
                .map(|output| match output {
                    Value::Object(output) => Ok(Output::parse(&id, output)),
                    other => Err(malformed(format!(
                        "`outputs` entries must be mappings, found {}",
                        other.type_name()
                    ))),
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(malformed(format!(
                    "`outputs` must be a list, found {}",
                    other.type_name()
                )))
            }
        };

        let raw: RawDeclaration = serde_yaml::to_value(Value::Object(body))
            .and_then(serde_yaml::from_value)
            .map_err(|e| LoadError::InvalidDeclaration {
                id: id.clone(),
                path: source.clone(),
                source: e,
            })?;

        Ok(Self {
            id,
            kind: raw.kind,
            title: raw.title,
            comment: raw.comment,
            tags: raw.tags,
            config,
            outputs,
            source: source.clone(),
        })
    }
}

impl Output {
    /// `_name` and `_description` describe the output, the rest is the value directive
    ///
    /// The name falls back to the directive's `_id`, then to the owning declaration. Without
    /// a `_type` the output refers to its owner.
    fn parse(owner: &str, mut object: Object) -> Self {
        let mut take = |field: &str| {
            object
                .shift_remove(&format!("_{field}"))
                .or_else(|| object.shift_remove(field))
                .and_then(|value| value.to_scalar_string())
        };

        let name = take("name");
        let description = take("description");

        if !object.contains_key(TYPE_KEY) {
            object.insert(TYPE_KEY.to_string(), Value::from("self"));
        }

        let name = name
            .or_else(|| {
                object
                    .get("_id")
                    .or_else(|| object.get("id"))
                    .and_then(Value::to_scalar_string)
            })
            .unwrap_or_else(|| owner.to_string());

        Self {
            name,
            description,
            value: Value::Object(object),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("unable to read {}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse yaml file {}", display(path))]
    YamlParseFailed {
        path: Source,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{} must contain a mapping of declarations, found {found}", display(path))]
    NotAMapping { path: Source, found: &'static str },
    #[error("`template` block in {} must be a mapping, found {found}", display(path))]
    InvalidTemplateBlock { path: Source, found: &'static str },
    #[error("invalid declaration `{id}` in {}", display(path))]
    InvalidDeclaration {
        id: String,
        path: Source,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("malformed declaration `{id}` in {}: {reason}", display(path))]
    MalformedDeclaration {
        id: String,
        path: Source,
        reason: String,
    },
    #[error("declaration `{id}` in {} is already declared in {}", display(new), display(existing))]
    DuplicateDeclaration {
        id: String,
        existing: Source,
        new: Source,
    },
    #[error("output `{name}` of `{new}` is already exported by `{existing}`")]
    DuplicateOutput {
        name: String,
        existing: String,
        new: String,
    },
    #[error("invalid directive in declaration `{id}` in {}", display(path))]
    InvalidDirective {
        id: String,
        path: Source,
        #[source]
        source: DirectiveError,
    },
}

fn display(source: &Source) -> String {
    source
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<inline>".to_string())
}

/// Utility macro to create [StackDeclarations]
///
/// Create from a single document
/// ```
/// # use cfn_compose::stack_declarations;
/// let stack = stack_declarations!("bucket: { type: resource, config: { type: 'AWS::S3::Bucket' } }");
/// assert_eq!(stack.resources().count(), 1);
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use cfn_compose::stack_declarations;
/// let stack = stack_declarations! {
///   "one.yml" => "one: { type: parameter, config: { type: String } }",
///   "two.yml" => "two: { type: resource, config: { type: 'AWS::SQS::Queue' } }"
/// };
/// assert_eq!(stack.source_count(), 2);
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use cfn_compose::stack_declarations;
/// stack_declarations!("bucket: { config: {} }");
/// ```
#[macro_export]
macro_rules! stack_declarations {
    // single document without source
    { $expr:expr } => {{
        let mut stack = $crate::declarations::StackDeclarations::default();
        stack.insert_yaml($expr, None).expect("document must load");
        stack
    }};
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut stack = $crate::declarations::StackDeclarations::default();
        $(
            stack
                .insert_yaml($expr, Some(::std::path::PathBuf::from($source)))
                .expect("document must load");
        )+

        stack
    }};
}
