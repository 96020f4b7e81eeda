//! URL pattern compilation and matching.
//!
//! # Syntax
//! ```text
//! public/<name>/[rest]     literal, required capture, optional trailing capture
//! [page=index]             optional capture with a default value
//! <file>[ext]              required stem plus optional extension (also `<file>.[ext]`)
//! <file>.<ext>             required stem plus required extension
//! favicon.[ext]            literal stem plus extension
//! ```
//!
//! # Design Decisions
//! - At most one variable segment (optional or extension) and it must be last,
//!   so matching is a single left-to-right pass with no backtracking
//! - Literals compare case-sensitively
//! - A trailing optional capture never takes a `.`; dotted names need an
//!   extension segment. Required captures take any non-empty component
//! - Leading and trailing slashes are ignored on both pattern and path

use std::fmt;

use thiserror::Error;

use super::params::Params;

/// Errors raised while compiling a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternSyntaxError {
    #[error("unterminated capture `{token}` in pattern `{pattern}`")]
    Unterminated { pattern: String, token: String },

    #[error("capture `{name}` is declared more than once in pattern `{pattern}`")]
    DuplicateName { pattern: String, name: String },

    #[error("variable segment `{name}` must be the last segment of pattern `{pattern}`")]
    VariableNotLast { pattern: String, name: String },

    #[error("invalid capture name `{name}` in pattern `{pattern}`")]
    InvalidName { pattern: String, name: String },

    #[error("malformed component `{component}` in pattern `{pattern}`")]
    Malformed { pattern: String, component: String },
}

/// One typed piece of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches one path component exactly.
    Literal(String),
    /// Binds exactly one non-empty component.
    Required(String),
    /// Binds zero or one trailing component.
    Optional { name: String, default: Option<String> },
    /// Binds the suffix after the final `.` of the last component. The stem is
    /// matched by the segment right before it.
    Extension {
        name: String,
        required: bool,
        default: Option<String>,
    },
}

impl Segment {
    fn is_variable(&self) -> bool {
        matches!(self, Segment::Optional { .. } | Segment::Extension { .. })
    }

    fn capture_name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Required(name)
            | Segment::Optional { name, .. }
            | Segment::Extension { name, .. } => Some(name),
        }
    }

    /// Match a single fixed-position component.
    fn accept(&self, component: &str, params: &mut Params) -> bool {
        match self {
            Segment::Literal(text) => text == component,
            Segment::Required(name) => {
                if component.is_empty() {
                    return false;
                }
                params.push(name, component);
                true
            }
            // Variable segments are handled by `Pattern::matches` directly.
            Segment::Optional { .. } | Segment::Extension { .. } => false,
        }
    }
}

/// A compiled, immutable URL pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
    capture_count: usize,
}

impl Pattern {
    /// Compile a pattern string.
    pub fn compile(text: &str) -> Result<Self, PatternSyntaxError> {
        let trimmed = trim_slashes(text);
        let mut segments = Vec::new();

        if !trimmed.is_empty() {
            for component in trimmed.split('/') {
                segments.extend(parse_component(text, component)?);
            }
        }

        let last = segments.len().saturating_sub(1);
        let mut names: Vec<&str> = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            if segment.is_variable() && index != last {
                return Err(PatternSyntaxError::VariableNotLast {
                    pattern: text.to_string(),
                    name: segment.capture_name().unwrap_or_default().to_string(),
                });
            }
            if let Some(name) = segment.capture_name() {
                if names.contains(&name) {
                    return Err(PatternSyntaxError::DuplicateName {
                        pattern: text.to_string(),
                        name: name.to_string(),
                    });
                }
                names.push(name);
            }
        }

        let capture_count = names.len();
        Ok(Self {
            source: text.to_string(),
            segments,
            capture_count,
        })
    }

    /// The text this pattern was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a request path. Returns the captured parameters on success; a
    /// failed match never leaks partial bindings.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let trimmed = trim_slashes(path);
        let components: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        let mut params = Params::with_capacity(self.capture_count);

        let (body, tail) = match self.segments.split_last() {
            Some((last, body)) if last.is_variable() => (body, Some(last)),
            _ => (self.segments.as_slice(), None),
        };

        match tail {
            None => {
                if components.len() != body.len() {
                    return None;
                }
                accept_all(body, &components, &mut params)?;
            }
            Some(Segment::Optional { name, default }) => {
                if components.len() == body.len() {
                    accept_all(body, &components, &mut params)?;
                    if let Some(default) = default {
                        params.push(name, default);
                    }
                } else if components.len() == body.len() + 1 {
                    let (last, head) = components.split_last()?;
                    accept_all(body, head, &mut params)?;
                    if !is_plain_name(last) {
                        return None;
                    }
                    params.push(name, last);
                } else {
                    return None;
                }
            }
            Some(Segment::Extension {
                name,
                required,
                default,
            }) => {
                if components.len() != body.len() {
                    return None;
                }
                let (stem_segment, head_segments) = body.split_last()?;
                let (last, head) = components.split_last()?;
                accept_all(head_segments, head, &mut params)?;

                let (stem, extension) = split_extension(last);
                if extension.is_none() && *required {
                    return None;
                }
                if !stem_segment.accept(stem, &mut params) {
                    return None;
                }
                if let Some(value) = extension.or(default.as_deref()) {
                    params.push(name, value);
                }
            }
            Some(_) => return None,
        }

        Some(params)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Pattern {
    type Err = PatternSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::compile(s)
    }
}

fn accept_all(segments: &[Segment], components: &[&str], params: &mut Params) -> Option<()> {
    for (segment, component) in segments.iter().zip(components) {
        if !segment.accept(component, params) {
            return None;
        }
    }
    Some(())
}

fn trim_slashes(input: &str) -> &str {
    let input = input.strip_prefix('/').unwrap_or(input);
    input.strip_suffix('/').unwrap_or(input)
}

/// A trailing optional capture refuses dotted names so `name.ext` falls
/// through to an extension binding.
fn is_plain_name(component: &str) -> bool {
    !component.is_empty() && !component.contains('.')
}

/// Split `name.ext` on the final dot. Hidden-file style names (`.env`) and
/// trailing dots have no extension.
fn split_extension(component: &str) -> (&str, Option<&str>) {
    match component.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (component, None),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Text(String),
    Required(String),
    Optional(String, Option<String>),
}

fn tokenize(pattern: &str, component: &str) -> Result<Vec<Token>, PatternSyntaxError> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut chars = component.char_indices();

    while let Some((start, c)) = chars.next() {
        let close = match c {
            '<' => '>',
            '[' => ']',
            '>' | ']' => {
                return Err(PatternSyntaxError::Malformed {
                    pattern: pattern.to_string(),
                    component: component.to_string(),
                })
            }
            _ => {
                text.push(c);
                continue;
            }
        };

        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(&mut text)));
        }

        let end = chars.by_ref().find(|(_, ch)| *ch == close).map(|(i, _)| i);
        let Some(end) = end else {
            return Err(PatternSyntaxError::Unterminated {
                pattern: pattern.to_string(),
                token: component[start..].to_string(),
            });
        };
        let inner = &component[start + 1..end];

        let token = if c == '<' {
            Token::Required(validate_name(pattern, inner)?.to_string())
        } else {
            match inner.split_once('=') {
                Some((name, default)) => Token::Optional(
                    validate_name(pattern, name)?.to_string(),
                    Some(default.to_string()),
                ),
                None => Token::Optional(validate_name(pattern, inner)?.to_string(), None),
            }
        };
        tokens.push(token);
    }

    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    Ok(tokens)
}

fn validate_name<'a>(pattern: &str, name: &'a str) -> Result<&'a str, PatternSyntaxError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(name)
    } else {
        Err(PatternSyntaxError::InvalidName {
            pattern: pattern.to_string(),
            name: name.to_string(),
        })
    }
}

fn parse_component(pattern: &str, component: &str) -> Result<Vec<Segment>, PatternSyntaxError> {
    let malformed = || PatternSyntaxError::Malformed {
        pattern: pattern.to_string(),
        component: component.to_string(),
    };

    if component.is_empty() {
        return Err(malformed());
    }

    let mut tokens = tokenize(pattern, component)?;
    // `<file>.[ext]` and `<file>[ext]` are the same thing.
    if let [Token::Required(_), Token::Text(dot), Token::Optional(..)] = tokens.as_slice() {
        if dot == "." {
            tokens.remove(1);
        }
    }

    let segments = match tokens.as_slice() {
        [Token::Required(stem), Token::Text(dot), Token::Required(ext)] if dot == "." => vec![
            Segment::Required(stem.clone()),
            Segment::Extension {
                name: ext.clone(),
                required: true,
                default: None,
            },
        ],
        [Token::Text(text)] => vec![Segment::Literal(text.clone())],
        [Token::Required(name)] => vec![Segment::Required(name.clone())],
        [Token::Optional(name, default)] => vec![Segment::Optional {
            name: name.clone(),
            default: default.clone(),
        }],
        [Token::Required(stem), Token::Optional(ext, default)] => vec![
            Segment::Required(stem.clone()),
            Segment::Extension {
                name: ext.clone(),
                required: false,
                default: default.clone(),
            },
        ],
        [Token::Text(stem), Token::Optional(ext, default)] => vec![
            Segment::Literal(literal_stem(stem, false).ok_or_else(malformed)?),
            Segment::Extension {
                name: ext.clone(),
                required: false,
                default: default.clone(),
            },
        ],
        [Token::Text(stem), Token::Required(ext)] => vec![
            Segment::Literal(literal_stem(stem, true).ok_or_else(malformed)?),
            Segment::Extension {
                name: ext.clone(),
                required: true,
                default: None,
            },
        ],
        [Token::Optional(name, _), _, ..] => {
            return Err(PatternSyntaxError::VariableNotLast {
                pattern: pattern.to_string(),
                name: name.clone(),
            })
        }
        _ => return Err(malformed()),
    };

    Ok(segments)
}

/// `index.` → `index`. A required extension needs the explicit dot.
fn literal_stem(text: &str, dot_required: bool) -> Option<String> {
    let stem = match text.strip_suffix('.') {
        Some(stem) => stem,
        None if dot_required => return None,
        None => text,
    };
    (!stem.is_empty()).then(|| stem.to_string())
}
