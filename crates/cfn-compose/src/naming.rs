//! identifier and case conversion
//!
//! Every logical id in a rendered template is built from up to three parts: the project,
//! the environment and the declaration name. Each part is normalised on its own (`-` and `_`
//! act as word separators, words are title-cased and joined) and the results are concatenated.
//!
//! | project | environment | name        | result                 |
//! |---------|-------------|-------------|------------------------|
//! | `shop`  | `dev`       | `bucket`    | `ShopDevBucket`        |
//! | `my-shop` | `prod`    | `log_group` | `MyShopProdLogGroup`   |
//! | -       | -           | `properties`| `Properties`           |
//!
//! [NamingConvention] decides whether that normalisation and prefixing happens at all.
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Title-case `value` word by word
///
/// A letter starts a new word when the character before it is not a letter. The first letter
/// of a word is upper-cased and all following letters are lower-cased, so `myBucket` becomes
/// `Mybucket` and `web2app` becomes `Web2App`.
pub fn title_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut previous_is_letter = false;

    for c in value.chars() {
        if previous_is_letter {
            result.extend(c.to_lowercase());
        } else {
            result.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }

    result
}

/// Insert `separator` at every case transition and lower-case the result
///
/// Handles single capitals (`simpleName` -> `simple-name`) as well as runs of capitals
/// followed by a capitalised word (`HTTPServer` -> `http-server`).
pub fn to_snake_case(value: &str, separator: &str) -> String {
    static WORD_START: OnceLock<regex::Regex> = OnceLock::new();
    static LOWER_UPPER: OnceLock<regex::Regex> = OnceLock::new();

    let word_start = WORD_START
        .get_or_init(|| regex::Regex::new(r"(.)([A-Z][a-z]+)").expect("static regex is valid"));
    let lower_upper = LOWER_UPPER
        .get_or_init(|| regex::Regex::new(r"([a-z0-9])([A-Z])").expect("static regex is valid"));

    let replacement = format!("${{1}}{separator}${{2}}");
    let split = word_start.replace_all(value, replacement.as_str());
    let split = lower_upper.replace_all(&split, replacement.as_str());

    split.to_lowercase()
}

/// Split on `separator` and join the title-cased components
///
/// With `include_first` unset the first component is kept exactly as it is.
pub fn to_camel_case(value: &str, separator: &str, include_first: bool) -> String {
    let mut components = value.split(separator);
    let mut result = String::with_capacity(value.len());

    if !include_first {
        if let Some(first) = components.next() {
            result.push_str(first);
        }
    }

    for component in components {
        result.push_str(&title_case(component));
    }

    result
}

/// Normalise a single identifier part: `my-log_group` -> `MyLogGroup`
fn normalize(part: &str) -> String {
    let spaced = part.replace(['-', '_'], " ");
    title_case(&spaced).replace(' ', "")
}

/// Compose `{project}{environment}{name}` from normalised parts
///
/// Missing parts are left out. This ignores [NamingConvention]; see [NamingConvention::aws_ref].
pub fn to_aws_ref(name: &str, project: Option<&str>, environment: Option<&str>) -> String {
    let mut result = String::new();
    if let Some(project) = project {
        result.push_str(&normalize(project));
    }
    if let Some(environment) = environment {
        result.push_str(&normalize(environment));
    }
    result.push_str(&normalize(name));
    result
}

/// Naming flags of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConvention {
    /// Normalise identifiers and keys to `CamelCase`
    pub camel_case: bool,
    /// Prefix resolved identifiers with the project
    pub prefix_project: bool,
    /// Prefix resolved identifiers with the environment
    pub prefix_environment: bool,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            camel_case: true,
            prefix_project: true,
            prefix_environment: true,
        }
    }
}

impl NamingConvention {
    /// Resolve a declaration name to its logical id
    ///
    /// `name` passes through unchanged when camel casing is off or when neither prefix is
    /// enabled.
    pub fn aws_ref(&self, name: &str, project: &str, environment: &str) -> String {
        if !self.camel_case || !(self.prefix_project || self.prefix_environment) {
            return name.to_string();
        }

        to_aws_ref(
            name,
            self.prefix_project.then_some(project),
            self.prefix_environment.then_some(environment),
        )
    }

    /// Resolve a mapping key (`bucket_name` -> `BucketName`)
    ///
    /// Keys starting with `~` are taken literally, without the `~`.
    pub fn key(&self, key: &str) -> String {
        if let Some(literal) = key.strip_prefix('~') {
            return literal.to_string();
        }

        if !self.camel_case {
            return key.to_string();
        }

        normalize(key)
    }
}

/// Case transform applied by the `environment` / `project` directives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Case {
    /// leave the value as it is
    #[default]
    Unchanged,
    Lower,
    Upper,
    Title,
    /// `snake_case` with `_`
    Snake,
    /// `snake-case` with `-`
    SnakeHyphen,
}

impl Case {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Case::Unchanged => value.to_string(),
            Case::Lower => value.to_lowercase(),
            Case::Upper => value.to_uppercase(),
            Case::Title => title_case(value),
            Case::Snake => to_snake_case(value, "_"),
            Case::SnakeHyphen => to_snake_case(value, "-"),
        }
    }
}

impl std::str::FromStr for Case {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" | "unchanged" => Ok(Case::Unchanged),
            "lower" => Ok(Case::Lower),
            "upper" => Ok(Case::Upper),
            "title" => Ok(Case::Title),
            "snake" => Ok(Case::Snake),
            "snake-hyphen" => Ok(Case::SnakeHyphen),
            other => Err(format!(
                "unknown case `{other}`, expected one of lower, upper, title, snake, snake-hyphen"
            )),
        }
    }
}
