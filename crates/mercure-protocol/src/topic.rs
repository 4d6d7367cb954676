use std::sync::OnceLock;

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;

/// A char class a template variable's expansion is allowed to match.
/// Simple/label/path/path-style/query variables exclude the generic
/// delimiters; reserved (`+`, `#`) variables are allowed to contain them.
const UNRESERVED_CLASS: &str = "[^/?#]";
const RESERVED_CLASS: &str = "[^\\s]";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateCompileError {
    #[error("unterminated template expression")]
    UnterminatedExpression,
    #[error("empty template expression")]
    EmptyExpression,
    #[error("invalid template operator '{0}'")]
    InvalidOperator(char),
    #[error("invalid template regex")]
    InvalidRegex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Simple,
    Reserved,
    Fragment,
    Label,
    Path,
    PathStyle,
    Query,
    QueryContinuation,
}

impl Operator {
    fn from_prefix(c: char) -> Result<Self, TemplateCompileError> {
        match c {
            '+' => Ok(Self::Reserved),
            '#' => Ok(Self::Fragment),
            '.' => Ok(Self::Label),
            '/' => Ok(Self::Path),
            ';' => Ok(Self::PathStyle),
            '?' => Ok(Self::Query),
            '&' => Ok(Self::QueryContinuation),
            other => Err(TemplateCompileError::InvalidOperator(other)),
        }
    }

    fn first_prefix(self) -> &'static str {
        match self {
            Self::Simple | Self::Reserved => "",
            Self::Fragment => "#",
            Self::Label => ".",
            Self::Path => "/",
            Self::PathStyle => ";",
            Self::Query => "?",
            Self::QueryContinuation => "&",
        }
    }

    fn separator(self) -> &'static str {
        match self {
            Self::Simple | Self::Reserved | Self::Fragment => ",",
            Self::Label => ".",
            Self::Path => "/",
            Self::PathStyle => ";",
            Self::Query | Self::QueryContinuation => "&",
        }
    }

    fn named(self) -> bool {
        matches!(self, Self::PathStyle | Self::Query | Self::QueryContinuation)
    }

    fn value_class(self) -> &'static str {
        match self {
            Self::Reserved | Self::Fragment => RESERVED_CLASS,
            _ => UNRESERVED_CLASS,
        }
    }
}

struct VarSpec {
    name: String,
    explode: bool,
    max_length: Option<u32>,
}

fn parse_varspec(raw: &str) -> Result<VarSpec, TemplateCompileError> {
    if raw.is_empty() {
        return Err(TemplateCompileError::EmptyExpression);
    }
    if let Some(name) = raw.strip_suffix('*') {
        return Ok(VarSpec {
            name: name.to_owned(),
            explode: true,
            max_length: None,
        });
    }
    if let Some((name, len)) = raw.split_once(':') {
        let max_length = len.parse::<u32>().ok();
        return Ok(VarSpec {
            name: name.to_owned(),
            explode: false,
            max_length,
        });
    }
    Ok(VarSpec {
        name: raw.to_owned(),
        explode: false,
        max_length: None,
    })
}

fn var_pattern(spec: &VarSpec, operator: Operator) -> String {
    let class = operator.value_class();
    let atom = match spec.max_length {
        Some(n) if n > 0 => format!("{class}{{1,{n}}}"),
        _ => format!("{class}+"),
    };
    let value = if spec.explode {
        format!("(?:{atom}(?:{}{atom})*)", regex::escape(operator.separator()))
    } else {
        atom
    };
    if operator.named() {
        format!("{}=?{}", regex::escape(&spec.name), value)
    } else {
        value
    }
}

fn compile_expression(expr: &str) -> Result<String, TemplateCompileError> {
    if expr.is_empty() {
        return Err(TemplateCompileError::EmptyExpression);
    }
    let mut chars = expr.chars();
    let first = chars.next().expect("checked non-empty above");
    let (operator, rest) = if "+#./;?&".contains(first) {
        (Operator::from_prefix(first)?, chars.as_str())
    } else {
        (Operator::Simple, expr)
    };

    let varspecs: Vec<VarSpec> = rest
        .split(',')
        .map(parse_varspec)
        .collect::<Result<_, _>>()?;

    let parts: Vec<String> = varspecs.iter().map(|spec| var_pattern(spec, operator)).collect();
    let joined = parts.join(operator.separator());
    Ok(format!("{}{joined}", regex::escape(operator.first_prefix())))
}

/// Converts an RFC 6570 (levels 1-4) URI template into an anchored regex
/// source string matching the set of URIs the template can expand to.
///
/// This builds a *matcher*, not an *expander*: prefix (`:n`) and explode
/// (`*`) modifiers are translated into regex quantifiers rather than used to
/// truncate or join concrete values.
fn template_to_regex_source(template: &str) -> Result<String, TemplateCompileError> {
    let mut out = String::from("^");
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let rest = &template[i + 1..];
            let end = rest
                .find('}')
                .ok_or(TemplateCompileError::UnterminatedExpression)?;
            out.push_str(&compile_expression(&rest[..end])?);
            i += end + 2;
        } else {
            let next_brace = template[i..].find('{').map(|p| i + p).unwrap_or(template.len());
            out.push_str(&regex::escape(&template[i..next_brace]));
            i = next_brace;
        }
    }
    out.push('$');
    Ok(out)
}

/// Joins a possibly-relative template against a base URL the way the hub's
/// configured base URL resolves relative topic templates: templates
/// beginning with `/` are rooted at the base's origin, templates that
/// already contain a scheme are left untouched.
fn resolve_against_base(template: &str, base: &url::Url) -> String {
    if template.contains("://") {
        return template.to_owned();
    }
    if let Some(stripped) = template.strip_prefix('/') {
        format!("{}/{stripped}", base.origin().ascii_serialization())
    } else {
        let mut base_str = base.as_str().to_owned();
        if !base_str.ends_with('/') {
            base_str.push('/');
        }
        format!("{base_str}{template}")
    }
}

/// Lowercases the host component of an IRI for comparison, leaving
/// everything else (including the path, which is case sensitive) alone.
/// Strings that don't parse as absolute URLs are returned unchanged.
fn normalize_for_compare(s: &str) -> String {
    match url::Url::parse(s) {
        Ok(mut url) => {
            let host = url.host_str().map(str::to_lowercase);
            if let Some(host) = host {
                let _ = url.set_host(Some(&host));
            }
            url.to_string()
        }
        Err(_) => s.to_owned(),
    }
}

#[derive(Clone)]
pub struct CompiledTemplate {
    raw: String,
    regex: Regex,
}

impl std::fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTemplate").field("raw", &self.raw).finish()
    }
}

fn template_cache() -> &'static Mutex<LruCache<String, Regex>> {
    static CACHE: OnceLock<Mutex<LruCache<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            std::num::NonZeroUsize::new(4096).expect("4096 is nonzero"),
        ))
    })
}

fn compile_cached(absolute_template: &str) -> Result<Regex, TemplateCompileError> {
    if let Some(regex) = template_cache().lock().get(absolute_template) {
        return Ok(regex.clone());
    }
    let source = template_to_regex_source(absolute_template)?;
    let regex = Regex::new(&source).map_err(|_| TemplateCompileError::InvalidRegex)?;
    template_cache()
        .lock()
        .put(absolute_template.to_owned(), regex.clone());
    Ok(regex)
}

/// A compiled subscriber selector: the `*` wildcard (matches every topic), a
/// literal IRI (exact, host-case-insensitive match), or an RFC 6570 URI
/// template (matches every IRI the template could expand to).
#[derive(Debug, Clone)]
pub enum TopicSelector {
    Wildcard,
    Literal(String),
    Template(CompiledTemplate),
}

impl TopicSelector {
    /// Compiles a raw selector string. `base` is the hub's configured base
    /// URL, used to resolve root-relative templates like `/books/{id}`.
    pub fn compile(raw: &str, base: Option<&url::Url>) -> Result<Self, TemplateCompileError> {
        if raw == "*" {
            return Ok(Self::Wildcard);
        }
        if !raw.contains('{') {
            return Ok(Self::Literal(normalize_for_compare(raw)));
        }
        let absolute = match base {
            Some(base) => resolve_against_base(raw, base),
            None => raw.to_owned(),
        };
        let regex = compile_cached(&absolute)?;
        Ok(Self::Template(CompiledTemplate {
            raw: raw.to_owned(),
            regex,
        }))
    }

    /// Whether this selector covers the given topic IRI.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Literal(expected) => *expected == normalize_for_compare(topic),
            Self::Template(compiled) => compiled.regex.is_match(topic),
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Self::Wildcard => "*",
            Self::Literal(raw) => raw,
            Self::Template(compiled) => &compiled.raw,
        }
    }
}

/// Whether any selector in `selectors` covers `topic`. Used both for
/// subscriber topic matching and for the publisher's covering-selector
/// authorization check.
pub fn any_selector_matches(selectors: &[TopicSelector], topic: &str) -> bool {
    selectors.iter().any(|selector| selector.matches(topic))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_anything() {
        let selector = TopicSelector::compile("*", None).unwrap();
        assert!(selector.matches("https://example.com/books/1"));
        assert!(selector.matches("urn:isbn:0451450523"));
    }

    #[test]
    fn literal_matches_exact_iri_only() {
        let selector = TopicSelector::compile("https://example.com/books/1", None).unwrap();
        assert!(selector.matches("https://example.com/books/1"));
        assert!(!selector.matches("https://example.com/books/2"));
    }

    #[test]
    fn literal_host_compare_is_case_insensitive() {
        let selector = TopicSelector::compile("https://Example.com/books/1", None).unwrap();
        assert!(selector.matches("https://example.com/books/1"));
    }

    #[test]
    fn level1_simple_template_matches_single_segment() {
        // RFC 6570 level 1 example.
        let selector =
            TopicSelector::compile("https://example.com/books/{id}", None).unwrap();
        assert!(selector.matches("https://example.com/books/1"));
        assert!(!selector.matches("https://example.com/books/1/chapters/2"));
    }

    #[test]
    fn level3_path_template_matches_multiple_segments() {
        // RFC 6570 level 3 path operator example: {/list*}
        let selector = TopicSelector::compile("https://example.com{/segments*}", None).unwrap();
        assert!(selector.matches("https://example.com/a/b/c"));
        assert!(selector.matches("https://example.com/a"));
    }

    #[test]
    fn level3_query_template_matches_query_pair() {
        let selector = TopicSelector::compile("https://example.com/books{?id}", None).unwrap();
        assert!(selector.matches("https://example.com/books?id=42"));
        assert!(!selector.matches("https://example.com/books"));
    }

    #[test]
    fn root_relative_template_resolves_against_base() {
        let base = url::Url::parse("https://hub.example.com/.well-known/mercure").unwrap();
        let selector = TopicSelector::compile("/books/{id}", Some(&base)).unwrap();
        assert!(selector.matches("https://hub.example.com/books/1"));
        assert!(!selector.matches("https://other.example.com/books/1"));
    }

    #[test]
    fn any_selector_matches_checks_all_selectors() {
        let selectors = vec![
            TopicSelector::compile("https://example.com/authors/1", None).unwrap(),
            TopicSelector::compile("https://example.com/books/{id}", None).unwrap(),
        ];
        assert!(any_selector_matches(&selectors, "https://example.com/books/9"));
        assert!(!any_selector_matches(&selectors, "https://example.com/films/9"));
    }
}
