//! manifest driven builds
//!
//! A build walks categories, environments and stacks in manifest order. Manifest order is the
//! dependency order: a stack may import values exported by any stack before it.
//!
//! Every selected stack is rendered by [plan] before [write] touches the file system, so a
//! build that fails leaves no artifacts behind.
use crate::context::RenderContext;
use crate::declarations::StackDeclarations;
use crate::document::render_document;
use crate::manifest::{BuildManifest, Category, Environment, StackSpec};
use crate::naming::{to_aws_ref, to_snake_case};
use anyhow::Context;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const TEMPLATES_DIR: &str = "Templates";
pub const TAGS_DIR: &str = "Tags";

/// Stack tag as understood by `aws cloudformation --tags file://...`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_new::new)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// A stack rendered in memory
#[derive(Debug, Clone)]
pub struct RenderedStack {
    pub environment: String,
    /// position within the environment directory, starting at 1
    pub sequence: usize,
    pub stack_name: String,
    pub template: String,
    pub tags: Vec<Tag>,
}

impl RenderedStack {
    fn file_name(&self, extension: &str) -> String {
        format!("{:03}.{}.{extension}", self.sequence, self.stack_name)
    }

    pub fn template_path(&self, output: &Path) -> PathBuf {
        output
            .join(&self.environment)
            .join(TEMPLATES_DIR)
            .join(self.file_name("yml"))
    }

    pub fn tags_path(&self, output: &Path) -> PathBuf {
        output
            .join(&self.environment)
            .join(TAGS_DIR)
            .join(self.file_name("json"))
    }
}

/// Load the manifest, render every selected stack and write the results below `output`
pub fn build(
    manifest_path: &Path,
    output: &Path,
    environment_filter: Option<&str>,
) -> anyhow::Result<Vec<PathBuf>> {
    let manifest = BuildManifest::load(manifest_path)?;
    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let stacks = plan(&manifest, base_dir, environment_filter)?;
    write(&stacks, output)
}

/// Render all stacks of the environments matching `environment_filter` (case-insensitive)
///
/// Template paths are resolved against `base_dir` and the category's `template_path`.
pub fn plan(
    manifest: &BuildManifest,
    base_dir: &Path,
    environment_filter: Option<&str>,
) -> anyhow::Result<Vec<RenderedStack>> {
    let project = to_snake_case(&manifest.project, "-");
    let mut sequences: IndexMap<&str, usize> = IndexMap::new();
    let mut rendered = Vec::new();

    for (category_name, category) in &manifest.categories {
        let template_dir = match &category.template_path {
            Some(template_path) => base_dir.join(template_path),
            None => base_dir.to_path_buf(),
        };

        for (environment_name, environment) in &category.environments {
            if let Some(filter) = environment_filter {
                if !environment_name.eq_ignore_ascii_case(filter) {
                    tracing::debug!(environment=%environment_name, "skipped by filter");
                    continue;
                }
            }

            tracing::info!(
                category=%category_name,
                environment=%environment_name,
                account=%environment.aws_account_id,
                region=%environment.region,
                "building environment"
            );
            if let Some(webhook) = &environment.webhook {
                tracing::info!(
                    application=%webhook.application_id,
                    trigger=%webhook.trigger_id,
                    "environment has a deployment webhook"
                );
            }

            for spec in &environment.stacks {
                let sequence = sequences.entry(environment_name.as_str()).or_default();
                *sequence += 1;

                let stack = Stack {
                    manifest,
                    project: &project,
                    category_name,
                    category,
                    environment_name,
                    environment,
                    spec,
                };

                let stack_name = stack.name();
                let template = stack.render(&template_dir).with_context(|| {
                    format!("unable to build stack `{stack_name}` of {category_name}/{environment_name}")
                })?;

                tracing::info!(stack=%stack_name, sequence=*sequence, "stack rendered");
                rendered.push(RenderedStack {
                    environment: environment_name.clone(),
                    sequence: *sequence,
                    tags: stack.tags(),
                    stack_name,
                    template,
                });
            }
        }
    }

    if let Some(filter) = environment_filter {
        anyhow::ensure!(
            !sequences.is_empty(),
            "environment `{filter}` is not defined in the build manifest"
        );
    }

    Ok(rendered)
}

/// Write rendered stacks, creating `{output}/{environment}/{Templates,Tags}` as needed
pub fn write(stacks: &[RenderedStack], output: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(stacks.len() * 2);

    for stack in stacks {
        let environment_dir = output.join(&stack.environment);
        for dir in [
            environment_dir.clone(),
            environment_dir.join(TEMPLATES_DIR),
            environment_dir.join(TAGS_DIR),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("unable to create directory {}", dir.display()))?;
        }

        let template_path = stack.template_path(output);
        std::fs::write(&template_path, &stack.template)
            .with_context(|| format!("unable to write {}", template_path.display()))?;
        tracing::info!(path=%template_path.display(), bytes=stack.template.len(), "template written");

        let tags_path = stack.tags_path(output);
        std::fs::write(&tags_path, serde_json::to_string_pretty(&stack.tags)?)
            .with_context(|| format!("unable to write {}", tags_path.display()))?;
        tracing::info!(path=%tags_path.display(), "tag file written");

        written.push(template_path);
        written.push(tags_path);
    }

    Ok(written)
}

/// One stack of one environment
struct Stack<'a> {
    manifest: &'a BuildManifest,
    /// snake-cased project id
    project: &'a str,
    category_name: &'a str,
    category: &'a Category,
    environment_name: &'a str,
    environment: &'a Environment,
    spec: &'a StackSpec,
}

impl Stack<'_> {
    /// `stack_name` or the stem of the first template, optionally prefixed with the environment
    /// and the template's folder, always prefixed with project and environment
    fn name(&self) -> String {
        let first = self.spec.templates.first();

        let base = self.spec.stack_name.clone().unwrap_or_else(|| {
            first
                .and_then(|path| path.file_stem())
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let mut parts = Vec::new();
        if self.category.prefix_stack_with_environment {
            parts.push(self.environment_name.to_string());
        }
        if self.category.prefix_stack_with_folder {
            let folder = first
                .and_then(|path| path.parent())
                .and_then(|parent| parent.file_name())
                .map(|name| name.to_string_lossy().into_owned());
            parts.extend(folder);
        }
        parts.push(base);

        to_aws_ref(
            &parts.join("-"),
            Some(self.project),
            Some(self.environment_name),
        )
    }

    fn render(&self, template_dir: &Path) -> anyhow::Result<String> {
        let mut declarations = StackDeclarations::default();
        for template in &self.spec.templates {
            declarations.load_file(&template_dir.join(template))?;
        }
        declarations.validate()?;

        let context = RenderContext::new(self.project, self.environment_name)
            .with_naming(self.manifest.naming)
            .with_declared(declarations.ids());

        let mut template = self.category.template.clone();
        template.extend(
            declarations
                .template()
                .iter()
                .filter(|(_, value)| value.is_scalar())
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        if let Some(description) = &self.spec.description {
            template.insert("description".to_string(), description.as_str().into());
        }

        let document = render_document(&declarations, &context, &template)?;
        Ok(document.to_yaml())
    }

    fn tags(&self) -> Vec<Tag> {
        let mut tags = vec![
            Tag::new("Project".to_string(), self.project.to_string()),
            Tag::new("Environment".to_string(), self.environment_name.to_string()),
            Tag::new(
                "Category".to_string(),
                to_snake_case(self.category_name, "-"),
            ),
            Tag::new(
                "Account".to_string(),
                self.environment.aws_account_id.clone(),
            ),
            Tag::new("Region".to_string(), self.environment.region.clone()),
        ];

        if let Some(author) = &self.manifest.author {
            tags.push(Tag::new("AuthorName".to_string(), author.name.clone()));
            tags.push(Tag::new("AuthorEmail".to_string(), author.email.clone()));
        }

        tags
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manifest(yaml: &str) -> BuildManifest {
        BuildManifest::parse(yaml).expect("valid manifest")
    }

    fn stack_names(manifest: &BuildManifest) -> Vec<String> {
        let project = to_snake_case(&manifest.project, "-");
        let mut names = vec![];
        for (category_name, category) in &manifest.categories {
            for (environment_name, environment) in &category.environments {
                for spec in &environment.stacks {
                    let stack = Stack {
                        manifest,
                        project: &project,
                        category_name,
                        category,
                        environment_name,
                        environment,
                        spec,
                    };
                    names.push(stack.name());
                }
            }
        }
        names
    }

    #[test]
    fn stack_naming() {
        let plain = manifest(
            r#"
project: MyShop
infra:
  region: r
  environments:
    dev:
      aws_account_id: 1
      templates: [network/vpc.yml]
      stacks:
        - { stack_name: storage, templates: [s3.yml] }
"#,
        );
        assert_eq!(stack_names(&plain), vec!["MyShopDevVpc", "MyShopDevStorage"]);

        let prefixed = manifest(
            r#"
project: shop
infra:
  region: r
  prefix_stack_with_environment: true
  prefix_stack_with_folder: true
  environments:
    prod:
      aws_account_id: 1
      templates: [network/vpc.yml, top-level.yml]
"#,
        );
        assert_eq!(
            stack_names(&prefixed),
            vec!["ShopProdProdNetworkVpc", "ShopProdProdTopLevel"]
        );
    }

    #[test]
    fn file_names_are_sequenced() {
        let stack = RenderedStack {
            environment: "dev".to_string(),
            sequence: 7,
            stack_name: "ShopDevVpc".to_string(),
            template: String::new(),
            tags: vec![],
        };

        let output = Path::new("out");
        assert_eq!(
            stack.template_path(output),
            Path::new("out/dev/Templates/007.ShopDevVpc.yml")
        );
        assert_eq!(
            stack.tags_path(output),
            Path::new("out/dev/Tags/007.ShopDevVpc.json")
        );
    }

    #[test]
    fn tags_serialize_for_the_cli() {
        let tags = vec![Tag::new("Project".to_string(), "shop".to_string())];
        assert_eq!(
            serde_json::to_string(&tags).unwrap(),
            r#"[{"Key":"Project","Value":"shop"}]"#
        );
    }

    #[test]
    fn unknown_environment_filter_fails() {
        let manifest = manifest(
            "project: shop\ninfra: { region: r, environments: { dev: { aws_account_id: 1, templates: [a.yml] } } }",
        );

        let err = plan(&manifest, Path::new("."), Some("staging")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "environment `staging` is not defined in the build manifest"
        );
    }
}
