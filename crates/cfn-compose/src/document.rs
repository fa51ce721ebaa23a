//! assembly of a complete template
//!
//! [render_document] evaluates every declaration of a stack into a [Document]. The document is
//! still structured; [Document::to_yaml] is the only place where text is produced.
use crate::context::RenderContext;
use crate::declarations::{Declaration, StackDeclarations};
use crate::directive::DirectiveError;
use crate::emit::{writer, Node};
use crate::evaluate::evaluate;
use crate::value::{Object, Value};
use indexmap::IndexMap;

pub const FORMAT_VERSION: &str = "2010-09-09";

/// A rendered stack template
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub description: String,
    pub metadata: Vec<(String, String)>,
    pub parameters: Vec<Entry>,
    pub resources: Vec<Entry>,
    pub outputs: Vec<Entry>,
}

/// One named entry of a section
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub logical_id: String,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub body: Node,
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("unable to render `{id}`")]
    Directive {
        id: String,
        #[source]
        source: DirectiveError,
    },
    #[error("unable to tag `{id}`: `{field}` must be {expected}, found {found}")]
    Tagging {
        id: String,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("declarations `{first}` and `{second}` both resolve to `{logical_id}`")]
    DuplicateLogicalId {
        logical_id: String,
        first: String,
        second: String,
    },
    #[error("outputs `{first}` and `{second}` both export `{logical_id}`")]
    DuplicateExport {
        logical_id: String,
        first: String,
        second: String,
    },
}

/// Render all declarations of a stack
///
/// `template` is the template description block. Its `description` becomes the document
/// description and every scalar in it becomes a tag on auto-tagged resources.
pub fn render_document(
    declarations: &StackDeclarations,
    context: &RenderContext,
    template: &Object,
) -> Result<Document, RenderError> {
    let description = template
        .get("description")
        .and_then(Value::to_scalar_string)
        .unwrap_or_else(|| format!("{} {}", context.project, context.environment));

    check_logical_ids(declarations, context)?;

    let parameters = declarations
        .parameters()
        .map(|declaration| render_entry(declaration, context, None))
        .collect::<Result<_, _>>()?;

    let resources = declarations
        .resources()
        .map(|declaration| render_entry(declaration, context, declaration.tags.then_some(template)))
        .collect::<Result<_, _>>()?;

    let mut outputs = Vec::new();
    for (owner, output) in declarations.outputs() {
        let source = declarations
            .get(owner)
            .and_then(|declaration| declaration.source.as_deref());
        let scoped = context.with_owner(owner).with_source(source);

        let logical_id = context.resolve(&output.name);
        let value = evaluate(&output.value, &scoped).map_err(|source| RenderError::Directive {
            id: owner.to_string(),
            source,
        })?;

        let mut body = vec![("Value".to_string(), value)];
        if let Some(description) = &output.description {
            body.push(("Description".to_string(), Node::text(description)));
        }
        body.push((
            "Export".to_string(),
            Node::Mapping(vec![("Name".to_string(), Node::scalar(logical_id.as_str()))]),
        ));

        tracing::trace!(%logical_id, "output rendered");
        outputs.push(Entry {
            logical_id,
            title: None,
            comment: None,
            body: Node::Mapping(body),
        });
    }

    Ok(Document {
        description,
        metadata: vec![
            ("Project".to_string(), context.project.clone()),
            ("Environment".to_string(), context.environment.clone()),
        ],
        parameters,
        resources,
        outputs,
    })
}

/// Parameters and resources share one namespace, outputs have their own
fn check_logical_ids(
    declarations: &StackDeclarations,
    context: &RenderContext,
) -> Result<(), RenderError> {
    let mut ids: IndexMap<String, &str> = IndexMap::new();
    for declaration in declarations.declarations() {
        let logical_id = context.resolve(&declaration.id);
        if let Some(first) = ids.insert(logical_id.clone(), &declaration.id) {
            return Err(RenderError::DuplicateLogicalId {
                logical_id,
                first: first.to_string(),
                second: declaration.id.clone(),
            });
        }
    }

    let mut exports: IndexMap<String, &str> = IndexMap::new();
    for (_, output) in declarations.outputs() {
        let logical_id = context.resolve(&output.name);
        if let Some(first) = exports.insert(logical_id.clone(), &output.name) {
            return Err(RenderError::DuplicateExport {
                logical_id,
                first: first.to_string(),
                second: output.name.clone(),
            });
        }
    }

    Ok(())
}

fn render_entry(
    declaration: &Declaration,
    context: &RenderContext,
    tags: Option<&Object>,
) -> Result<Entry, RenderError> {
    let logical_id = context.resolve(&declaration.id);
    let scoped = context
        .with_owner(&declaration.id)
        .with_source(declaration.source.as_deref());

    let mut config = declaration.config.clone();
    if let Some(template) = tags {
        inject_tags(&mut config, &declaration.id, &logical_id, template, context)?;
    }

    let body = evaluate(&Value::Object(config), &scoped).map_err(|source| {
        RenderError::Directive {
            id: declaration.id.clone(),
            source,
        }
    })?;

    tracing::trace!(%logical_id, "declaration rendered");
    Ok(Entry {
        logical_id,
        title: declaration.title.clone(),
        comment: declaration.comment.clone(),
        body,
    })
}

/// Append `Name` and one tag per template scalar to `properties.tags`
///
/// Both keys are created when missing. Existing keys are found by their rendered form, so
/// `Properties` and `properties` are the same key.
fn inject_tags(
    config: &mut Object,
    id: &str,
    logical_id: &str,
    template: &Object,
    context: &RenderContext,
) -> Result<(), RenderError> {
    let tagging = |field, expected, found: &Value| RenderError::Tagging {
        id: id.to_string(),
        field,
        expected,
        found: found.type_name(),
    };

    let properties = entry(config, "properties", context);
    if matches!(properties, Value::Null) {
        *properties = Value::Object(Object::new());
    }
    let properties = match properties {
        Value::Object(properties) => properties,
        other => return Err(tagging("properties", "a mapping", &*other)),
    };

    let tags = entry(properties, "tags", context);
    if matches!(tags, Value::Null) {
        *tags = Value::Array(Vec::new());
    }
    let tags = match tags {
        Value::Array(tags) => tags,
        other => return Err(tagging("tags", "a list", &*other)),
    };

    let tag = |key: String, value: Value| {
        Value::Object(Object::from([
            ("Key".to_string(), Value::String(key)),
            ("Value".to_string(), value),
        ]))
    };

    tags.push(tag("Name".to_string(), Value::from(logical_id)));
    for (key, value) in template {
        if value.is_scalar() {
            tags.push(tag(context.key(key), value.clone()));
        }
    }

    Ok(())
}

/// The value under `key`, compared in rendered form, inserted as null when missing
fn entry<'a>(object: &'a mut Object, key: &str, context: &RenderContext) -> &'a mut Value {
    let rendered = context.key(key);
    let existing = object
        .keys()
        .find(|candidate| context.key(candidate) == rendered)
        .cloned();

    object
        .entry(existing.unwrap_or_else(|| key.to_string()))
        .or_insert(Value::Null)
}

impl Document {
    /// Serialize to CloudFormation YAML
    ///
    /// Sections without entries are left out. The output contains no blank lines.
    pub fn to_yaml(&self) -> String {
        let mut out = String::new();

        writer::write_entry(
            &mut out,
            0,
            "AWSTemplateFormatVersion",
            &Node::quoted(FORMAT_VERSION),
        );
        writer::write_entry(&mut out, 0, "Description", &Node::text(&self.description));

        writer::write_banner(&mut out, 0, "STACK METADATA");
        let metadata = self
            .metadata
            .iter()
            .map(|(key, value)| (key.clone(), Node::text(value)))
            .collect();
        writer::write_entry(&mut out, 0, "Metadata", &Node::Mapping(metadata));

        for (banner, key, entries) in [
            ("STACK PARAMETERS", "Parameters", &self.parameters),
            ("STACK RESOURCES", "Resources", &self.resources),
            ("STACK OUTPUTS", "Outputs", &self.outputs),
        ] {
            if entries.is_empty() {
                continue;
            }

            writer::write_banner(&mut out, 0, banner);
            out.push_str(key);
            out.push_str(":\n");
            for entry in entries {
                entry.write(&mut out);
            }
        }

        out
    }
}

impl Entry {
    fn write(&self, out: &mut String) {
        if let Some(title) = &self.title {
            writer::write_banner(out, 1, title);
        }
        if let Some(comment) = &self.comment {
            writer::write_comment(out, 1, comment);
        }
        writer::write_entry(out, 1, &self.logical_id, &self.body);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stack_declarations;
    use pretty_assertions::assert_eq;

    fn template(yaml: &str) -> Object {
        match Value::from(serde_yaml::from_str::<serde_yaml::Value>(yaml).unwrap()) {
            Value::Object(object) => object,
            other => panic!("expected a mapping, got {other:?}"),
        }
    }

    fn render(stack: &StackDeclarations, template_yaml: &str) -> Result<Document, RenderError> {
        let context = RenderContext::new("shop", "dev").with_declared(stack.ids());
        render_document(stack, &context, &template(template_yaml))
    }

    #[test]
    fn complete_document() {
        let stack = stack_declarations! {r#"
        size:
          type: parameter
          title: Sizing
          comment: Number of queue shards
          config:
            type: Number
            default: 2
        bucket:
          type: resource
          tags: true
          config:
            type: AWS::S3::Bucket
            properties:
              bucket_name: { _type: snake-prefixed, _value: artifacts }
          outputs:
            - _name: bucket-arn
              _description: Artifact bucket
              _type: getatt
              _id: bucket
              _attribute: Arn
        "#};

        let document = render(&stack, "{description: Shop storage, owner: platform}").unwrap();

        assert_eq!(
            document.to_yaml(),
            r#"AWSTemplateFormatVersion: "2010-09-09"
Description: Shop storage
# ----------------------------------------------------------------------------------------
# STACK METADATA
# ----------------------------------------------------------------------------------------
Metadata:
  Project: shop
  Environment: dev
# ----------------------------------------------------------------------------------------
# STACK PARAMETERS
# ----------------------------------------------------------------------------------------
Parameters:
  # ----------------------------------------------------------------------------------------
  # Sizing
  # ----------------------------------------------------------------------------------------
  # Number of queue shards
  ShopDevSize:
    Type: Number
    Default: 2
# ----------------------------------------------------------------------------------------
# STACK RESOURCES
# ----------------------------------------------------------------------------------------
Resources:
  ShopDevBucket:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: shop-dev-artifacts
      Tags:
        - Key: Name
          Value: ShopDevBucket
        - Key: Description
          Value: Shop storage
        - Key: Owner
          Value: platform
# ----------------------------------------------------------------------------------------
# STACK OUTPUTS
# ----------------------------------------------------------------------------------------
Outputs:
  ShopDevBucketArn:
    Value: !GetAtt ShopDevBucket.Arn
    Description: Artifact bucket
    Export:
      Name: ShopDevBucketArn
"#
        );
    }

    #[test]
    fn empty_sections_are_left_out() {
        let stack = stack_declarations!("queue: { type: resource, config: { type: 'AWS::SQS::Queue' } }");
        let yaml = render(&stack, "{}").unwrap().to_yaml();

        assert!(yaml.contains("Description: shop dev\n"));
        assert!(yaml.contains("Resources:\n  ShopDevQueue:\n"));
        assert!(!yaml.contains("Parameters:"));
        assert!(!yaml.contains("Outputs:"));
        assert!(yaml.lines().all(|line| !line.trim().is_empty()));
    }

    #[test]
    fn tags_extend_existing_list() {
        let stack = stack_declarations! {r#"
        queue:
          type: resource
          tags: true
          config:
            Type: AWS::SQS::Queue
            Properties:
              Tags:
                - { key: Team, value: core }
        "#};

        let document = render(&stack, "{owner: platform, nested: {ignored: true}}").unwrap();
        let yaml = document.to_yaml();

        assert!(yaml.contains(
            "      Tags:
        - Key: Team
          Value: core
        - Key: Name
          Value: ShopDevQueue
        - Key: Owner
          Value: platform
"
        ));
        assert!(!yaml.contains("Ignored"));
    }

    #[test]
    fn tags_need_a_list() {
        let stack = stack_declarations! {r#"
        queue:
          type: resource
          tags: true
          config:
            properties: { tags: none }
        "#};

        let err = render(&stack, "{}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to tag `queue`: `tags` must be a list, found string"
        );
    }

    #[test]
    fn output_defaults_to_self_reference() {
        let stack = stack_declarations! {r#"
        queue:
          type: resource
          config: {}
          outputs: [{ _description: "Queue url: primary" }]
        "#};

        let document = render(&stack, "{}").unwrap();
        assert_eq!(
            document.outputs,
            vec![Entry {
                logical_id: "ShopDevQueue".to_string(),
                title: None,
                comment: None,
                body: Node::Mapping(vec![
                    (
                        "Value".to_string(),
                        Node::call(crate::emit::Function::Ref, Node::scalar("ShopDevQueue"))
                    ),
                    ("Description".to_string(), Node::quoted("Queue url: primary")),
                    (
                        "Export".to_string(),
                        Node::Mapping(vec![("Name".to_string(), Node::scalar("ShopDevQueue"))])
                    ),
                ]),
            }]
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let stack = stack_declarations! {r#"
        role:
          type: resource
          config:
            type: AWS::IAM::Role
            properties:
              role_name: { _type: join, _join_string: '-', _items: [{ _type: project }, role] }
              policies:
                - policy_document: { ~Version: "2012-10-17" }
        "#};

        let first = render(&stack, "{}").unwrap().to_yaml();
        let second = render(&stack, "{}").unwrap().to_yaml();
        assert_eq!(first, second);
        assert!(first.contains("      Policies:\n        - PolicyDocument:\n            Version: 2012-10-17\n"));
    }

    #[test]
    fn failing_directive_names_the_declaration() {
        let stack = stack_declarations!("queue: { type: resource, config: { arn: { _type: ref, _id: topic } } }");

        let (id, source) = match render(&stack, "{}").unwrap_err() {
            RenderError::Directive { id, source } => (id, source),
            other => panic!("expected a directive error, got {other:?}"),
        };
        assert_eq!(id, "queue");
        assert!(matches!(source, DirectiveError::UnknownDeclaration { .. }));
    }

    #[test]
    fn ids_resolving_to_one_logical_id_are_rejected() {
        let stack = stack_declarations! {r#"
        my-bucket: { type: resource, config: { type: 'AWS::S3::Bucket' } }
        my_bucket: { type: resource, config: { type: 'AWS::S3::Bucket' } }
        "#};

        let err = render(&stack, "{}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "declarations `my-bucket` and `my_bucket` both resolve to `ShopDevMyBucket`"
        );
    }

    #[test]
    fn parameters_and_resources_share_logical_ids() {
        let stack = stack_declarations! {r#"
        size: { type: parameter, config: { type: Number } }
        Size: { type: resource, config: { type: 'AWS::SQS::Queue' } }
        "#};

        assert!(matches!(
            render(&stack, "{}"),
            Err(RenderError::DuplicateLogicalId { ref logical_id, .. }) if logical_id == "ShopDevSize"
        ));
    }

    #[test]
    fn exports_resolving_to_one_name_are_rejected() {
        let stack = stack_declarations! {r#"
        one: { type: resource, config: {}, outputs: [{ _name: bucket-arn }] }
        two: { type: resource, config: {}, outputs: [{ _name: bucket_arn }] }
        "#};
        stack.validate().unwrap();

        let err = render(&stack, "{}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "outputs `bucket-arn` and `bucket_arn` both export `ShopDevBucketArn`"
        );
    }

    #[test]
    fn keys_rendering_alike_are_rejected() {
        let stack = stack_declarations! {r#"
        bucket:
          type: resource
          config:
            type: AWS::S3::Bucket
            properties: { bucket-name: a, bucket_name: b }
        "#};

        let (id, source) = match render(&stack, "{}").unwrap_err() {
            RenderError::Directive { id, source } => (id, source),
            other => panic!("expected a directive error, got {other:?}"),
        };
        assert_eq!(id, "bucket");
        assert_eq!(
            source.to_string(),
            "keys `bucket-name` and `bucket_name` both render as `BucketName`"
        );
    }
}
