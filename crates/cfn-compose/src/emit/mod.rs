//! intermediate representation of rendered template content
//!
//! Evaluation produces [Node] trees; nothing is turned into text until [writer] serializes a
//! whole document. Keeping the tree around lets tests assert on structure and lets the writer
//! derive all indentation from nesting.
pub(crate) mod writer;

/// A rendered value
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Emitted verbatim
    Scalar(String),
    Sequence(Vec<Node>),
    /// Keys are final (already normalised) and emitted verbatim
    Mapping(Vec<(String, Node)>),
    /// Intrinsic function call such as `!Ref Bucket`
    Call {
        function: Function,
        argument: Box<Node>,
    },
}

impl Node {
    pub fn scalar(value: impl Into<String>) -> Self {
        Node::Scalar(value.into())
    }

    /// A double quoted scalar
    pub fn quoted(value: &str) -> Self {
        Node::Scalar(quote(value))
    }

    /// A string from the input, quoted when it would not read back as the same string
    ///
    /// Multi-line text is left to the writer, which emits it as a literal block where it can.
    pub fn text(value: &str) -> Self {
        if value.contains('\n') {
            return Node::scalar(value);
        }

        match serde_yaml::from_str::<serde_yaml::Value>(value) {
            Ok(serde_yaml::Value::String(read)) if read == value => Node::scalar(value),
            _ => Node::quoted(value),
        }
    }

    pub fn call(function: Function, argument: Node) -> Self {
        Node::Call {
            function,
            argument: Box::new(argument),
        }
    }

    /// `!Join [separator, [items...]]`
    pub fn join(separator: &str, items: Vec<Node>) -> Self {
        Node::call(
            Function::Join,
            Node::Sequence(vec![Node::quoted(separator), Node::Sequence(items)]),
        )
    }
}

/// `value` as a double quoted YAML scalar
pub(crate) fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// CloudFormation intrinsic functions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Function {
    Ref,
    GetAtt,
    Join,
    Base64,
    ImportValue,
    /// any other tag found in the input, e.g. `Sub` or `Condition`
    Tag(String),
}

impl Function {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Ref" => Function::Ref,
            "GetAtt" => Function::GetAtt,
            "Join" => Function::Join,
            "Base64" => Function::Base64,
            "ImportValue" => Function::ImportValue,
            other => Function::Tag(other.to_string()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Function::Ref => "Ref",
            Function::GetAtt => "GetAtt",
            Function::Join => "Join",
            Function::Base64 => "Base64",
            Function::ImportValue => "ImportValue",
            Function::Tag(tag) => tag,
        }
    }

    /// `!Join`
    pub fn short_form(&self) -> String {
        format!("!{}", self.name())
    }

    /// `Fn::Join`
    ///
    /// `Ref` and `Condition` have no `Fn::` prefix.
    pub fn long_form(&self) -> String {
        match self.name() {
            name @ ("Ref" | "Condition") => name.to_string(),
            name => format!("Fn::{name}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn function_forms() {
        assert_eq!(Function::Ref.short_form(), "!Ref");
        assert_eq!(Function::Ref.long_form(), "Ref");
        assert_eq!(Function::Base64.long_form(), "Fn::Base64");
        assert_eq!(Function::from_tag("Sub").long_form(), "Fn::Sub");
        assert_eq!(Function::from_tag("Condition").long_form(), "Condition");
        assert_eq!(Function::from_tag("GetAtt"), Function::GetAtt);
    }

    #[test]
    fn quoting() {
        assert_eq!(Node::quoted("-"), Node::scalar("\"-\""));
        assert_eq!(Node::quoted(r#"a"b\c"#), Node::scalar(r#""a\"b\\c""#));
        assert_eq!(Node::quoted("\n"), Node::scalar(r#""\n""#));
    }

    #[test]
    fn text_is_quoted_when_ambiguous() {
        for plain in ["AES256", "arn:aws:s3:::bucket/*", "${AWS::StackName}-queue", "a b"] {
            assert_eq!(Node::text(plain), Node::scalar(plain), "{plain}");
        }
        for ambiguous in ["*", "#!/bin/bash", "true", "10", "a: b", "- x", "", " padded"] {
            assert_eq!(Node::text(ambiguous), Node::quoted(ambiguous), "{ambiguous}");
        }
        assert_eq!(Node::text("one\ntwo"), Node::scalar("one\ntwo"));
    }
}
