//! build manifest
//!
//! The manifest names the project and one or more delegate categories. Every top-level key
//! other than `project`, `author` and `naming` is a category:
//!
//! ```yaml
//! project: shop
//! infrastructure:
//!   region: ap-southeast-2
//!   template_path: templates
//!   environments:
//!     dev:
//!       aws_account_id: "123456789012"
//!       templates: [network.yml]
//!       stacks:
//!         - stack_name: storage
//!           templates: [s3.yml, s3-policies.yml]
//! ```
//!
//! Loading happens in two steps. The text is parsed into an unchecked shape (JSON first, YAML
//! as fallback) and then validated into a [BuildManifest]. Validation reports every problem
//! found, not just the first one.
use crate::naming::NamingConvention;
use crate::value::{Object, Value};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct BuildManifest {
    pub project: String,
    pub author: Option<Author>,
    pub naming: NamingConvention,
    /// in manifest order
    pub categories: IndexMap<String, Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub region: String,
    /// directory input templates are looked up in, relative to the manifest
    pub template_path: Option<PathBuf>,
    pub prefix_stack_with_environment: bool,
    pub prefix_stack_with_folder: bool,
    /// template description block
    pub template: Object,
    pub environments: IndexMap<String, Environment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub aws_account_id: String,
    /// the category region unless overridden
    pub region: String,
    /// inline templates first (one stack each), then explicit stacks
    pub stacks: Vec<StackSpec>,
    pub webhook: Option<Webhook>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackSpec {
    pub stack_name: Option<String>,
    pub description: Option<String>,
    pub templates: Vec<PathBuf>,
}

/// Deployment trigger, handed through to the driver untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    pub account_id: String,
    pub application_id: String,
    pub trigger_id: String,
}

#[derive(Deserialize)]
struct RawManifest {
    project: Option<String>,
    #[serde(default)]
    author: Option<Author>,
    #[serde(default)]
    naming: NamingConvention,
    #[serde(flatten)]
    categories: IndexMap<String, RawCategory>,
}

#[derive(Deserialize)]
struct RawCategory {
    region: Option<String>,
    template_path: Option<PathBuf>,
    #[serde(default)]
    prefix_stack_with_environment: bool,
    #[serde(default)]
    prefix_stack_with_folder: bool,
    #[serde(default)]
    template: Option<serde_yaml::Mapping>,
    environments: Option<IndexMap<String, RawEnvironment>>,
}

#[derive(Deserialize)]
struct RawEnvironment {
    aws_account_id: Option<AccountId>,
    region: Option<String>,
    templates: Option<Vec<PathBuf>>,
    stacks: Option<Vec<RawStack>>,
    webhook: Option<RawWebhook>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AccountId {
    Text(String),
    Number(u64),
}

#[derive(Deserialize)]
struct RawStack {
    stack_name: Option<String>,
    description: Option<String>,
    templates: Option<Vec<PathBuf>>,
}

#[derive(Deserialize)]
struct RawWebhook {
    account_id: Option<String>,
    application_id: Option<String>,
    trigger_id: Option<String>,
}

impl BuildManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        tracing::info!(path=%path.display(), "loading build manifest");
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse and validate manifest text, JSON or YAML
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let document: serde_yaml::Value = match serde_json::from_str(text) {
            Ok(document) => document,
            Err(json) => {
                tracing::debug!(%json, "build manifest is not json, trying yaml");
                serde_yaml::from_str(text).map_err(|yaml| ManifestError::Parse { json, yaml })?
            }
        };

        let raw: RawManifest = serde_yaml::from_value(document).map_err(ManifestError::Shape)?;
        Self::validate(raw)
    }

    fn validate(raw: RawManifest) -> Result<Self, ManifestError> {
        let mut issues = ManifestIssues::new();

        let project = raw.project.filter(|project| !project.trim().is_empty());
        if project.is_none() {
            issues.log(Issue::Missing("project".to_string()));
        }

        if raw.categories.is_empty() {
            issues.log(Issue::NoCategories);
        }

        let categories = raw
            .categories
            .into_iter()
            .filter_map(|(name, category)| {
                let category = validate_category(&name, category, &mut issues)?;
                Some((name, category))
            })
            .collect();

        match project {
            Some(project) if issues.is_empty() => Ok(Self {
                project,
                author: raw.author,
                naming: raw.naming,
                categories,
            }),
            _ => Err(ManifestError::Invalid(issues)),
        }
    }

    /// Total number of stacks over all categories and environments
    pub fn stack_count(&self) -> usize {
        self.categories
            .values()
            .flat_map(|category| category.environments.values())
            .map(|environment| environment.stacks.len())
            .sum()
    }
}

fn validate_category(
    name: &str,
    raw: RawCategory,
    issues: &mut ManifestIssues,
) -> Option<Category> {
    let region = raw.region.filter(|region| !region.is_empty());
    if region.is_none() {
        issues.log(Issue::Missing(format!("{name}.region")));
    }

    let mut template = Object::new();
    for (key, value) in raw.template.unwrap_or_default() {
        let key = match Value::from(key) {
            Value::String(key) => key,
            other => other.to_scalar_string().unwrap_or_default(),
        };
        let value = Value::from(value);
        if !value.is_scalar() {
            issues.log(Issue::Invalid {
                path: format!("{name}.template.{key}"),
                expected: "a scalar",
            });
            continue;
        }
        template.insert(key, value);
    }

    let environments = match raw.environments {
        Some(environments) if !environments.is_empty() => environments,
        _ => {
            issues.log(Issue::Missing(format!("{name}.environments")));
            IndexMap::new()
        }
    };

    let environments = environments
        .into_iter()
        .filter_map(|(environment_name, environment)| {
            let path = format!("{name}.environments.{environment_name}");
            let environment =
                validate_environment(&path, environment, region.as_deref(), issues)?;
            Some((environment_name, environment))
        })
        .collect();

    Some(Category {
        region: region?,
        template_path: raw.template_path,
        prefix_stack_with_environment: raw.prefix_stack_with_environment,
        prefix_stack_with_folder: raw.prefix_stack_with_folder,
        template,
        environments,
    })
}

fn validate_environment(
    path: &str,
    raw: RawEnvironment,
    category_region: Option<&str>,
    issues: &mut ManifestIssues,
) -> Option<Environment> {
    let aws_account_id = match raw.aws_account_id {
        Some(AccountId::Text(id)) if !id.is_empty() => Some(id),
        Some(AccountId::Number(id)) => Some(id.to_string()),
        _ => {
            issues.log(Issue::Missing(format!("{path}.aws_account_id")));
            None
        }
    };

    let mut stacks = Vec::new();
    for template in raw.templates.iter().flatten() {
        stacks.push(StackSpec {
            stack_name: None,
            description: None,
            templates: vec![template.clone()],
        });
    }
    let mut incomplete_stack = false;
    for (index, stack) in raw.stacks.into_iter().flatten().enumerate() {
        match stack.templates {
            Some(templates) if !templates.is_empty() => stacks.push(StackSpec {
                stack_name: stack.stack_name,
                description: stack.description,
                templates,
            }),
            _ => {
                incomplete_stack = true;
                issues.log(Issue::Missing(format!("{path}.stacks[{index}].templates")));
            }
        }
    }
    if stacks.is_empty() && !incomplete_stack {
        issues.log(Issue::Missing(format!("{path}.templates")));
    }

    let webhook = raw.webhook.and_then(|webhook| {
        let mut field = |value: Option<String>, name: &str| {
            if value.is_none() {
                issues.log(Issue::Missing(format!("{path}.webhook.{name}")));
            }
            value
        };
        let account_id = field(webhook.account_id, "account_id");
        let application_id = field(webhook.application_id, "application_id");
        let trigger_id = field(webhook.trigger_id, "trigger_id");

        Some(Webhook {
            account_id: account_id?,
            application_id: application_id?,
            trigger_id: trigger_id?,
        })
    });

    Some(Environment {
        aws_account_id: aws_account_id?,
        region: raw
            .region
            .or_else(|| category_region.map(str::to_string))?,
        stacks,
        webhook,
    })
}

#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("unable to read build manifest {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("build manifest is neither valid JSON ({json}) nor valid YAML ({yaml})")]
    Parse {
        json: serde_json::Error,
        yaml: serde_yaml::Error,
    },
    #[error("build manifest has an unexpected structure")]
    Shape(#[source] serde_yaml::Error),
    #[error(transparent)]
    Invalid(ManifestIssues),
}

/// All problems found while validating a manifest
#[derive(derive_new::new, Debug)]
pub struct ManifestIssues {
    #[new(default)]
    issues: Vec<Issue>,
}

impl ManifestIssues {
    pub fn log(&mut self, issue: Issue) {
        tracing::trace!(?issue, "manifest issue found");
        self.issues.push(issue);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

impl std::error::Error for ManifestIssues {}

impl std::fmt::Display for ManifestIssues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid build manifest")?;
        for issue in &self.issues {
            write!(f, "\n  - {issue}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    Missing(String),
    Invalid { path: String, expected: &'static str },
    NoCategories,
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Issue::Missing(path) => write!(f, "missing required value `{path}`"),
            Issue::Invalid { path, expected } => write!(f, "`{path}` must be {expected}"),
            Issue::NoCategories => write!(f, "no delegate category defined"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn issues(text: &str) -> Vec<Issue> {
        match BuildManifest::parse(text) {
            Err(ManifestError::Invalid(issues)) => issues.issues().to_vec(),
            other => panic!("expected validation issues, got {other:?}"),
        }
    }

    #[test]
    fn yaml_manifest() {
        let manifest = BuildManifest::parse(
            r#"
project: shop
author: { name: Jane Doe, email: jane@example.com }
naming: { prefix_environment: false }
infrastructure:
  region: ap-southeast-2
  template_path: templates
  template: { description: Shop infrastructure, owner: platform }
  environments:
    dev:
      aws_account_id: 123456789012
      templates: [network.yml]
      stacks:
        - stack_name: storage
          templates: [s3.yml, s3-policies.yml]
    prod:
      aws_account_id: "000000000001"
      region: us-east-1
      templates: [network.yml]
      webhook: { account_id: a, application_id: b, trigger_id: c }
application:
  region: ap-southeast-2
  environments:
    dev: { aws_account_id: 1, templates: [api.yml] }
"#,
        )
        .unwrap();

        assert_eq!(manifest.project, "shop");
        assert_eq!(manifest.author.as_ref().map(|a| a.name.as_str()), Some("Jane Doe"));
        assert!(manifest.naming.prefix_project);
        assert!(!manifest.naming.prefix_environment);
        assert_eq!(
            manifest.categories.keys().collect::<Vec<_>>(),
            vec!["infrastructure", "application"]
        );
        assert_eq!(manifest.stack_count(), 4);

        let infrastructure = &manifest.categories["infrastructure"];
        assert_eq!(infrastructure.template.get("owner"), Some(&Value::from("platform")));

        let dev = &infrastructure.environments["dev"];
        assert_eq!(dev.aws_account_id, "123456789012");
        assert_eq!(dev.region, "ap-southeast-2");
        assert_eq!(
            dev.stacks,
            vec![
                StackSpec {
                    stack_name: None,
                    description: None,
                    templates: vec![PathBuf::from("network.yml")],
                },
                StackSpec {
                    stack_name: Some("storage".to_string()),
                    description: None,
                    templates: vec![PathBuf::from("s3.yml"), PathBuf::from("s3-policies.yml")],
                },
            ]
        );

        let prod = &infrastructure.environments["prod"];
        assert_eq!(prod.region, "us-east-1");
        assert_eq!(
            prod.webhook,
            Some(Webhook {
                account_id: "a".to_string(),
                application_id: "b".to_string(),
                trigger_id: "c".to_string(),
            })
        );
    }

    #[test]
    fn json_manifest() {
        let manifest = BuildManifest::parse(
            r#"{
  "project": "shop",
  "app": {
    "region": "eu-west-1",
    "environments": { "test": { "aws_account_id": "42", "templates": ["a.yml"] } }
  }
}"#,
        )
        .unwrap();

        assert_eq!(manifest.categories["app"].environments["test"].aws_account_id, "42");
        assert_eq!(manifest.naming, NamingConvention::default());
    }

    #[test]
    fn unparsable_text_reports_both_formats() {
        let err = BuildManifest::parse("project: [unclosed").unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
        assert!(err.to_string().starts_with("build manifest is neither valid JSON"));
    }

    #[test]
    fn missing_values_are_all_reported() {
        assert_eq!(
            issues("author: { name: a, email: b }"),
            vec![Issue::Missing("project".to_string()), Issue::NoCategories]
        );

        assert_eq!(
            issues(
                r#"
project: shop
infra:
  template: { nested: [1] }
  environments:
    dev: { templates: [a.yml], webhook: { account_id: x } }
    prod: { aws_account_id: 1, stacks: [{ stack_name: s }] }
"#
            ),
            vec![
                Issue::Missing("infra.region".to_string()),
                Issue::Invalid {
                    path: "infra.template.nested".to_string(),
                    expected: "a scalar",
                },
                Issue::Missing("infra.environments.dev.aws_account_id".to_string()),
                Issue::Missing("infra.environments.dev.webhook.application_id".to_string()),
                Issue::Missing("infra.environments.dev.webhook.trigger_id".to_string()),
                Issue::Missing("infra.environments.prod.stacks[0].templates".to_string()),
            ]
        );
    }

    #[test]
    fn environment_without_stacks() {
        let text = "project: shop\ninfra: { region: r, environments: { dev: { aws_account_id: 1 } } }";
        assert_eq!(
            issues(text),
            vec![Issue::Missing("infra.environments.dev.templates".to_string())]
        );

        let err = BuildManifest::parse(text).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid build manifest\n  - missing required value `infra.environments.dev.templates`"
        );
    }

    #[test]
    fn category_must_be_a_mapping() {
        let err = BuildManifest::parse("project: shop\ninfra: 3").unwrap_err();
        assert!(matches!(err, ManifestError::Shape(_)));
    }
}
