//! URI templates such as `file://todos/{date}`
//!
//! Everything outside `{param}` placeholders is matched literally. Each placeholder
//! matches one or more characters other than `/`, and the whole URI must be
//! consumed.

use std::collections::HashMap;
use std::fmt;

use crate::errors::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Segment of a URI template
enum UriTemplateSegment {
    /// Literal text
    Literal(String),
    /// Parameter placeholder
    Parameter(String),
}

/// A parsed URI template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    template: String,
    segments: Vec<UriTemplateSegment>,
}

impl UriTemplate {
    /// Parse a template string, rejecting templates without placeholders
    pub fn parse(template: &str) -> Result<Self, Error> {
        let segments = Self::parse_segments(template)?;
        if !segments.iter().any(|s| matches!(s, UriTemplateSegment::Parameter(_))) {
            return Err(
                Error::Registration(
                    format!("URI template '{}' has no {{param}} placeholder", template)
                )
            );
        }
        Ok(Self { template: template.to_string(), segments })
    }

    /// Does this URI look like a template rather than a concrete resource?
    pub fn is_template(uri: &str) -> bool {
        uri.contains('{') && uri.contains('}')
    }

    fn parse_segments(template: &str) -> Result<Vec<UriTemplateSegment>, Error> {
        let mut segments = Vec::new();
        let mut rest = template;

        while !rest.is_empty() {
            match rest.find(['{', '}']) {
                Some(pos) if rest[pos..].starts_with('}') => {
                    return Err(Error::Registration(format!("Unbalanced '}}' in '{}'", template)));
                }
                Some(pos) => {
                    if pos > 0 {
                        segments.push(UriTemplateSegment::Literal(rest[..pos].to_string()));
                    }
                    let after = &rest[pos + 1..];
                    let end = after
                        .find('}')
                        .ok_or_else(|| {
                            Error::Registration(format!("Unclosed '{{' in '{}'", template))
                        })?;
                    let name = &after[..end];
                    let valid = !name.is_empty() &&
                        name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                    if !valid {
                        return Err(
                            Error::Registration(
                                format!("Invalid parameter name '{}' in '{}'", name, template)
                            )
                        );
                    }
                    segments.push(UriTemplateSegment::Parameter(name.to_string()));
                    rest = &after[end + 1..];
                }
                None => {
                    segments.push(UriTemplateSegment::Literal(rest.to_string()));
                    rest = "";
                }
            }
        }

        Ok(segments)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names in order of appearance
    pub fn parameters(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| {
                match segment {
                    UriTemplateSegment::Parameter(name) => Some(name.as_str()),
                    UriTemplateSegment::Literal(_) => None,
                }
            })
            .collect()
    }

    pub fn matches(&self, uri: &str) -> bool {
        self.match_uri(uri).is_some()
    }

    /// Match a URI against this template and extract the raw parameter values
    pub fn match_uri(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        if self.match_from(0, uri, &mut params) { Some(params) } else { None }
    }

    /// Like [`match_uri`](Self::match_uri) but with percent-decoded values
    pub fn extract(&self, uri: &str) -> Option<HashMap<String, String>> {
        let raw = self.match_uri(uri)?;
        Some(
            raw
                .into_iter()
                .map(|(name, value)| {
                    let decoded = urlencoding
                        ::decode(&value)
                        .map(|v| v.into_owned())
                        .unwrap_or(value);
                    (name, decoded)
                })
                .collect()
        )
    }

    fn match_from(&self, index: usize, rest: &str, params: &mut HashMap<String, String>) -> bool {
        let Some(segment) = self.segments.get(index) else {
            return rest.is_empty();
        };

        match segment {
            UriTemplateSegment::Literal(literal) => {
                rest.strip_prefix(literal.as_str()).is_some_and(|tail| {
                    self.match_from(index + 1, tail, params)
                })
            }
            UriTemplateSegment::Parameter(name) => {
                let run = rest.find('/').unwrap_or(rest.len());
                // Greedy, then back off one character at a time
                for end in (1..=run).rev() {
                    if !rest.is_char_boundary(end) {
                        continue;
                    }
                    if self.match_from(index + 1, &rest[end..], params) {
                        params.insert(name.clone(), rest[..end].to_string());
                        return true;
                    }
                }
                false
            }
        }
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
    fn test_todos_template() {
        let template = UriTemplate::parse("file://todos/{date}").unwrap();
        assert!(template.matches("file://todos/2025-05-03"));
        assert!(!template.matches("file://todos/2025-05-03/extra"));
        assert!(!template.matches("http://todos/2025-05-03"));
        assert!(!template.matches("file://todos/"));

        let params = template.match_uri("file://todos/2025-05-03").unwrap();
        assert_eq!(params.get("date").map(String::as_str), Some("2025-05-03"));
    }

    #[test]
    fn test_multiple_parameters() {
        let template = UriTemplate::parse("weather://{city}/{day}.json").unwrap();
        assert_eq!(template.parameters(), vec!["city", "day"]);

        let params = template.match_uri("weather://paris/monday.json").unwrap();
        assert_eq!(params["city"], "paris");
        assert_eq!(params["day"], "monday");
        assert!(!template.matches("weather://paris/monday.xml"));
    }

    #[test]
    fn test_backtracking_into_literal_suffix() {
        let template = UriTemplate::parse("notes://{name}.md").unwrap();
        let params = template.match_uri("notes://v1.2.md").unwrap();
        assert_eq!(params["name"], "v1.2");
    }

    #[test]
    fn test_literal_regex_characters_are_not_special() {
        let template = UriTemplate::parse("calc://1+1/{x}").unwrap();
        assert!(template.matches("calc://1+1/two"));
        assert!(!template.matches("calc://11/two"));
    }

    #[test]
    fn test_percent_decoding() {
        let template = UriTemplate::parse("notes://{title}").unwrap();
        let params = template.extract("notes://Summary%20of%20my%20Job").unwrap();
        assert_eq!(params["title"], "Summary of my Job");
    }

    #[test]
    fn test_invalid_templates() {
        assert!(matches!(UriTemplate::parse("names://sheepadoodle"), Err(Error::Registration(_))));
        assert!(UriTemplate::parse("file://todos/{date").is_err());
        assert!(UriTemplate::parse("file://todos/{}").is_err());
        assert!(UriTemplate::parse("file://todos/date}").is_err());
    }
}
