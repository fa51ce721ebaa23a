//! state of a single render pass
use crate::directive::{Directive, DirectiveError};
use crate::naming::NamingConvention;
use indexmap::IndexSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything directive evaluation may depend on
///
/// A context is built once per stack and narrowed with [RenderContext::with_owner] and
/// [RenderContext::with_source] for each declaration. It is passed explicitly to every
/// evaluation, so stacks can be rendered independently of each other.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub project: String,
    pub environment: String,
    pub naming: NamingConvention,
    /// ids of the stack's declarations; `None` disables the reference check
    declared: Option<Arc<IndexSet<String>>>,
    /// declaration that owns the value currently being rendered
    owner: Option<String>,
    /// directory of the file the current value was loaded from
    source_dir: Option<PathBuf>,
    /// fragments currently being included, outermost first
    includes: Vec<PathBuf>,
}

impl RenderContext {
    pub fn new(project: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            naming: NamingConvention::default(),
            declared: None,
            owner: None,
            source_dir: None,
            includes: Vec::new(),
        }
    }

    pub fn with_naming(mut self, naming: NamingConvention) -> Self {
        self.naming = naming;
        self
    }

    /// Restrict same-stack references to `ids`
    pub fn with_declared<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared = Some(Arc::new(ids.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_owner(&self, id: &str) -> Self {
        let mut context = self.clone();
        context.owner = Some(id.to_string());
        context
    }

    /// Relative includes resolve against the directory of `source`
    pub fn with_source(&self, source: Option<&Path>) -> Self {
        let mut context = self.clone();
        context.source_dir = source.and_then(Path::parent).map(Path::to_path_buf);
        context
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn source_dir(&self) -> &Path {
        self.source_dir.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Context for rendering the fragment at `path`
    pub fn entering_include(&self, path: &Path) -> Result<Self, DirectiveError> {
        if self.includes.iter().any(|included| included == path) {
            return Err(DirectiveError::IncludeLoop {
                path: path.to_path_buf(),
            });
        }

        let mut context = self.with_source(Some(path));
        context.includes.push(path.to_path_buf());
        Ok(context)
    }

    /// Logical id of a declaration name
    pub fn resolve(&self, name: &str) -> String {
        self.naming.aws_ref(name, &self.project, &self.environment)
    }

    /// Rendered form of a mapping key
    pub fn key(&self, key: &str) -> String {
        self.naming.key(key)
    }

    /// Resolve `id` after making sure it names a declaration of this stack
    pub fn resolve_declared(&self, directive: &Directive, id: &str) -> Result<String, DirectiveError> {
        if let Some(declared) = &self.declared {
            if !declared.contains(id) {
                return Err(DirectiveError::UnknownDeclaration {
                    directive: directive.type_name(),
                    id: id.to_string(),
                });
            }
        }

        Ok(self.resolve(id))
    }
}
