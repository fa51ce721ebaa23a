//! # cfn-compose - compose CloudFormation templates
//!
//! For CLI usage see the README.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `cfn-compose` works internally.
//!
//! ### Terms
//!
//! - a *build manifest* names a project and its *delegate categories* (e.g. `application`,
//!   `infrastructure`)
//! - ...each category has *environments*
//! - ...each environment has a list of *stacks*
//! - ...and each stack is made of one or more input files holding *declarations*
//!   (parameters and resources)
//!
//! Inside a declaration, a mapping with a `_type` key is a *directive*:
//!
//! ```yaml
//! bucket:
//!   type: resource
//!   config:
//!     type: AWS::S3::Bucket
//!     properties:
//!       bucket_name: { _type: snake-prefixed, _value: artifacts }
//!   outputs:
//!     - { _type: getatt, _id: bucket, _attribute: Arn, _name: bucket-arn }
//! ```
//!
//! ### Loading files
//!
//! Input files are parsed with [serde_yaml] and converted into [value::Value]s, which keep
//! key order and YAML tags. [declarations::StackDeclarations] collects the declarations of all
//! files of one stack and remembers where each came from, so errors can point at the file.
//!
//! Loading is followed by [declarations::StackDeclarations::validate]: every directive is
//! parsed into a [directive::Directive] and every same-stack reference (`ref`, `getatt`, ...)
//! is checked. Nothing is rendered before the whole stack is known to be consistent.
//!
//! ### Naming
//!
//! Logical ids are composed from project, environment and declaration name, each part
//! normalised on its own: project `shop`, environment `dev` and declaration `log_group` give
//! `ShopDevLogGroup`. See [naming] and [naming::NamingConvention] for the switches.
//!
//! ### Evaluation
//!
//! [evaluate::evaluate] turns a body [value::Value] into an [emit::Node] tree. Directives
//! become intrinsic function calls (`!Ref`, `!GetAtt`, `!Join`, ...), names or literals.
//! Everything evaluation depends on (project, environment, naming switches, the declaration
//! being rendered, the file it came from) is carried by an explicit [context::RenderContext],
//! there is no shared state between stacks.
//!
//! ### Output
//!
//! [document::render_document] assembles all entries of a stack into a [document::Document].
//! Only [document::Document::to_yaml] produces text; indentation follows from the tree, and
//! no blank lines are written.
//!
//! [build] drives all of the above from a manifest and writes one template and one tag file
//! per stack.
pub mod build;
pub mod context;
pub mod declarations;
pub mod directive;
pub mod document;
pub mod emit;
pub mod evaluate;
pub mod manifest;
pub mod naming;
pub mod value;
mod visit;
