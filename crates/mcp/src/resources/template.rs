//! Level-1 URI templates (`users://{userId}/profile`) and matching against concrete URIs.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed '{{' in URI template {0}")]
    Unclosed(String),

    #[error("unexpected '}}' in URI template {0}")]
    UnexpectedClose(String),

    #[error("empty variable name in URI template {0}")]
    EmptyVariable(String),

    #[error("variables must be separated by literal text in URI template {0}")]
    AdjacentVariables(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Variable(String),
}

/// A parsed URI template made of literal text and `{name}` expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    parts: Vec<Part>,
}

impl UriTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut rest = template;

        while !rest.is_empty() {
            match rest.find(['{', '}']) {
                Some(pos) if rest[pos..].starts_with('}') => {
                    return Err(TemplateError::UnexpectedClose(template.to_string()));
                }
                Some(pos) => {
                    if pos > 0 {
                        parts.push(Part::Literal(rest[..pos].to_string()));
                    }
                    let after = &rest[pos + 1..];
                    let end = after
                        .find('}')
                        .ok_or_else(|| TemplateError::Unclosed(template.to_string()))?;
                    let name = after[..end].trim();
                    if name.is_empty() || name.contains('{') {
                        return Err(TemplateError::EmptyVariable(template.to_string()));
                    }
                    if matches!(parts.last(), Some(Part::Variable(_))) {
                        return Err(TemplateError::AdjacentVariables(template.to_string()));
                    }
                    parts.push(Part::Variable(name.to_string()));
                    rest = &after[end + 1..];
                }
                None => {
                    parts.push(Part::Literal(rest.to_string()));
                    rest = "";
                }
            }
        }

        Ok(Self {
            raw: template.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the template variables in order of appearance
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Variable(name) => Some(name.as_str()),
            Part::Literal(_) => None,
        })
    }

    /// Match a full URI, returning the value of every variable
    ///
    /// A variable captures one or more characters up to the next literal and
    /// never spans a `/`.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut values = HashMap::new();
        let mut rest = uri;
        let mut parts = self.parts.iter().peekable();

        while let Some(part) = parts.next() {
            match part {
                Part::Literal(literal) => {
                    rest = rest.strip_prefix(literal.as_str())?;
                }
                Part::Variable(name) => {
                    let end = match parts.peek() {
                        Some(Part::Literal(next)) => rest.find(next.as_str())?,
                        _ => rest.len(),
                    };
                    let value = &rest[..end];
                    if value.is_empty() || value.contains('/') {
                        return None;
                    }
                    values.insert(name.clone(), value.to_string());
                    rest = &rest[end..];
                }
            }
        }

        rest.is_empty().then_some(values)
    }
}

impl std::fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
