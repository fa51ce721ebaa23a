//! directive evaluation: [Value] to [Node]
use crate::context::RenderContext;
use crate::directive::{Directive, DirectiveError};
use crate::emit::{Function, Node};
use crate::naming::to_snake_case;
use crate::value::{Object, Value};
use base64::Engine;
use indexmap::IndexMap;
use rand::RngCore;

/// Evaluate a body value
///
/// Plain mappings keep their structure with keys normalised through the context's naming
/// convention. Mappings carrying `_type` are evaluated as directives.
pub fn evaluate(value: &Value, context: &RenderContext) -> Result<Node, DirectiveError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| evaluate(item, context))
            .collect::<Result<_, _>>()
            .map(Node::Sequence),
        Value::Object(object) => match Directive::parse(object)? {
            Some(directive) => evaluate_directive(&directive, context),
            None => evaluate_mapping(object, context),
        },
        Value::Tagged { tag, value } => Ok(Node::call(
            Function::from_tag(tag),
            evaluate(value, context)?,
        )),
        Value::String(text) => Ok(Node::text(text)),
        scalar => Ok(Node::Scalar(scalar.to_scalar_string().unwrap_or_default())),
    }
}

/// Plain mapping; two source keys must not render to the same key
fn evaluate_mapping(object: &Object, context: &RenderContext) -> Result<Node, DirectiveError> {
    let mut seen: IndexMap<String, &str> = IndexMap::with_capacity(object.len());
    let mut entries = Vec::with_capacity(object.len());

    for (key, value) in object {
        let rendered = context.key(key);
        if let Some(first) = seen.insert(rendered.clone(), key) {
            return Err(DirectiveError::DuplicateKey {
                key: rendered,
                first: first.to_string(),
                second: key.clone(),
            });
        }
        entries.push((rendered, evaluate(value, context)?));
    }

    Ok(Node::Mapping(entries))
}

#[tracing::instrument(level = "trace", skip(context))]
fn evaluate_directive(
    directive: &Directive,
    context: &RenderContext,
) -> Result<Node, DirectiveError> {
    let node = match directive {
        Directive::SelfRef => {
            let owner = context.owner().ok_or(DirectiveError::NoOwner)?;
            Node::call(Function::Ref, Node::Scalar(context.resolve(owner)))
        }
        Directive::String(value) => match value.to_scalar_string() {
            Some(literal) => Node::Scalar(literal),
            None => evaluate(value, context)?,
        },
        Directive::TokenHex { length } => {
            let mut bytes = vec![0u8; *length];
            rand::thread_rng().fill_bytes(&mut bytes);
            Node::Scalar(hex::encode(bytes))
        }
        Directive::Include { filename } => {
            let path = context.source_dir().join(filename);
            // canonical, so every spelling of a path names the same include
            let path = path
                .canonicalize()
                .map_err(|source| DirectiveError::IncludeRead { path, source })?;
            let context = context.entering_include(&path)?;
            tracing::debug!(path=%path.display(), "including fragment");

            let contents =
                std::fs::read_to_string(&path).map_err(|source| DirectiveError::IncludeRead {
                    path: path.clone(),
                    source,
                })?;
            let fragment: Value = serde_yaml::from_str::<serde_yaml::Value>(&contents)
                .map_err(|source| DirectiveError::IncludeParse { path, source })?
                .into();

            evaluate(&fragment, &context)?
        }
        Directive::Ref { id } => Node::call(
            Function::Ref,
            Node::Scalar(context.resolve_declared(directive, id)?),
        ),
        Directive::DependsOn { id } => Node::Scalar(context.resolve_declared(directive, id)?),
        Directive::ImportValue { id } => {
            Node::call(Function::ImportValue, Node::Scalar(context.resolve(id)))
        }
        Directive::ImportValueJoin { id, prefix } => Node::join(
            "/",
            vec![
                Node::quoted(prefix.as_str()),
                Node::call(Function::ImportValue, Node::Scalar(context.resolve(id))),
            ],
        ),
        Directive::RefJoin { id, prefix } => Node::join(
            "/",
            vec![
                Node::quoted(prefix.as_str()),
                Node::call(
                    Function::Ref,
                    Node::Scalar(context.resolve_declared(directive, id)?),
                ),
            ],
        ),
        Directive::Base64(value) => Node::call(Function::Base64, evaluate(value, context)?),
        Directive::Base64Encode(value) => {
            Node::Scalar(base64::engine::general_purpose::STANDARD.encode(value))
        }
        Directive::GetAtt { id, attribute } => {
            let logical_id = context.resolve_declared(directive, id)?;
            Node::call(
                Function::GetAtt,
                Node::Scalar(format!("{logical_id}.{attribute}")),
            )
        }
        Directive::Join { items, separator } => Node::join(
            separator,
            items
                .iter()
                .map(|item| evaluate(item, context))
                .collect::<Result<_, _>>()?,
        ),
        Directive::Environment(case) => Node::Scalar(case.apply(&context.environment)),
        Directive::Project(case) => Node::Scalar(case.apply(&context.project)),
        Directive::ProjectDashEnvironment(case) => Node::Scalar(
            case.apply(&format!("{}-{}", context.project, context.environment)),
        ),
        Directive::CamelPrefixed(name) => Node::Scalar(context.resolve(name)),
        Directive::SnakePrefixed(name) => Node::Scalar(to_snake_case(&context.resolve(name), "-")),
    };

    Ok(node)
}
