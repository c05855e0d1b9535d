//! URI Template Matcher
//!
//! Simplified RFC-6570 level-1 templates: `{name}` placeholders where each
//! variable matches exactly one path segment (`[^/]+`). The template is
//! compiled to an anchored regular expression with one capture group per
//! variable.
//!
//! Matching is case-sensitive and does not decode percent-encoding; the
//! handler sees raw captured bytes. When several templates match a URI,
//! the registry's insertion order decides.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::fmt;

// Layer 2: Third-party crate imports
use regex::Regex;

// Layer 3: Internal module imports
use crate::protocol::errors::{ProtocolError, ProtocolResult};

/// A compiled URI template
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::registry::UriTemplate;
///
/// let template = UriTemplate::parse("users://{userId}/profile").unwrap();
/// let bindings = template.matches("users://42/profile").unwrap();
/// assert_eq!(bindings["userId"], "42");
/// assert!(template.matches("users://42/settings").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct UriTemplate {
    template: String,
    pattern: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    /// Compile a template string
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidUriTemplate` for unbalanced braces,
    /// empty variable names, or names outside `[A-Za-z0-9_]`.
    pub fn parse(template: &str) -> ProtocolResult<Self> {
        let invalid = |reason: &str| {
            ProtocolError::InvalidUriTemplate(format!("{template}: {reason}"))
        };

        let mut pattern = String::with_capacity(template.len() + 8);
        let mut variables = Vec::new();
        pattern.push('^');

        let mut rest = template;
        while let Some(open) = rest.find('{') {
            let (literal, tail) = rest.split_at(open);
            if literal.contains('}') {
                return Err(invalid("unbalanced '}'"));
            }
            pattern.push_str(&regex::escape(literal));

            let Some(close) = tail.find('}') else {
                return Err(invalid("unbalanced '{'"));
            };
            let name = &tail[1..close];
            if name.is_empty() {
                return Err(invalid("empty variable name"));
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(invalid("variable names must be [A-Za-z0-9_]"));
            }
            if variables.iter().any(|v| v == name) {
                return Err(invalid("duplicate variable name"));
            }
            variables.push(name.to_string());
            pattern.push_str("([^/]+)");
            rest = &tail[close + 1..];
        }
        if rest.contains('}') {
            return Err(invalid("unbalanced '}'"));
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        let pattern = Regex::new(&pattern)
            .map_err(|e| ProtocolError::InvalidUriTemplate(format!("{template}: {e}")))?;
        Ok(Self {
            template: template.to_string(),
            pattern,
            variables,
        })
    }

    /// Test a candidate URI, returning variable bindings on match
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(uri)?;
        let mut bindings = HashMap::with_capacity(self.variables.len());
        for (index, name) in self.variables.iter().enumerate() {
            // Group 0 is the whole match; variables start at 1.
            let value = captures.get(index + 1)?.as_str().to_string();
            bindings.insert(name.clone(), value);
        }
        Some(bindings)
    }

    /// The original template string
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// The variable names, in template order
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_variable() {
        let template = UriTemplate::parse("users://{userId}/profile").unwrap();
        let bindings = template.matches("users://42/profile").unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings["userId"], "42");
    }

    #[test]
    fn extracts_multiple_variables() {
        let template = UriTemplate::parse("repo://{owner}/{name}/file/{path}").unwrap();
        let bindings = template.matches("repo://acme/widgets/file/README").unwrap();
        assert_eq!(bindings["owner"], "acme");
        assert_eq!(bindings["name"], "widgets");
        assert_eq!(bindings["path"], "README");
    }

    #[test]
    fn variable_stops_at_segment_boundary() {
        let template = UriTemplate::parse("users://{userId}/profile").unwrap();
        assert!(template.matches("users://42/extra/profile").is_none());
        assert!(template.matches("users:///profile").is_none());
    }

    #[test]
    fn matching_is_case_sensitive() {
        let template = UriTemplate::parse("users://{userId}/Profile").unwrap();
        assert!(template.matches("users://42/profile").is_none());
        assert!(template.matches("users://42/Profile").is_some());
    }

    #[test]
    fn percent_encoding_is_not_decoded() {
        let template = UriTemplate::parse("files://{name}").unwrap();
        let bindings = template.matches("files://a%20b").unwrap();
        assert_eq!(bindings["name"], "a%20b");
    }

    #[test]
    fn literal_regex_characters_are_escaped() {
        let template = UriTemplate::parse("data://v1.0/{id}").unwrap();
        assert!(template.matches("data://v1.0/x").is_some());
        assert!(template.matches("data://v1x0/x").is_none());
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(UriTemplate::parse("users://{}/profile").is_err());
        assert!(UriTemplate::parse("users://{user").is_err());
        assert!(UriTemplate::parse("users://user}/x").is_err());
        assert!(UriTemplate::parse("users://{a b}").is_err());
        assert!(UriTemplate::parse("users://{id}/{id}").is_err());
    }
}
