//! Content Security Policy model.
//!
//! Only what response rewriting needs: building the script-blocking policy
//! and reading policies back to check whether scripts can run at all.

use std::fmt;

/// Header carrying an enforced policy.
pub const CSP_HEADER: &str = "Content-Security-Policy";

/// Content Security Policy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    /// Directives in declaration order.
    directives: Vec<CspDirective>,
}

impl ContentSecurityPolicy {
    /// Create a new empty CSP.
    pub fn new() -> Self {
        Self::default()
    }

    /// The policy that forbids every script on the page.
    pub fn script_blocking() -> Self {
        let mut csp = Self::new();
        csp.push(CspDirective::new("script-src", vec!["'none'".to_string()]));
        csp
    }

    /// Parse a CSP header value.
    pub fn parse(header: &str) -> Self {
        let mut csp = ContentSecurityPolicy::new();

        for directive_str in header.split(';') {
            let directive_str = directive_str.trim();
            if directive_str.is_empty() {
                continue;
            }

            let mut parts = directive_str.split_whitespace();
            if let Some(name) = parts.next() {
                let values: Vec<String> = parts.map(|s| s.to_string()).collect();
                csp.push(CspDirective::new(name, values));
            }
        }

        csp
    }

    /// Add a directive. The first occurrence of a name wins, as in browsers.
    pub fn push(&mut self, directive: CspDirective) {
        if self.directive(&directive.name).is_none() {
            self.directives.push(directive);
        }
    }

    /// Look up a directive by name.
    pub fn directive(&self, name: &str) -> Option<&CspDirective> {
        let name = name.to_lowercase();
        self.directives.iter().find(|d| d.name == name)
    }

    /// Check if this policy forbids every script, inline or external.
    pub fn blocks_all_scripts(&self) -> bool {
        self.directive("script-src")
            .or_else(|| self.directive("default-src"))
            .map_or(false, |d| d.is_none())
    }

    /// Number of directives.
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

impl fmt::Display for ContentSecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for directive in &self.directives {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{};", directive)?;
        }
        Ok(())
    }
}

/// CSP directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CspDirective {
    /// Directive name.
    name: String,
    /// Parsed sources.
    sources: Vec<CspSource>,
}

impl CspDirective {
    /// Create a new directive.
    pub fn new(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_lowercase(),
            sources: values.iter().map(|v| CspSource::parse(v)).collect(),
        }
    }

    /// Directive name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `'none'` alone, or an empty source list, allows nothing.
    pub fn is_none(&self) -> bool {
        self.sources.iter().all(|s| *s == CspSource::None)
    }
}

impl fmt::Display for CspDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for source in &self.sources {
            write!(f, " {}", source)?;
        }
        Ok(())
    }
}

/// CSP source expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CspSource {
    /// 'none' - nothing allowed
    None,
    /// 'self' - same origin
    Self_,
    /// 'unsafe-inline'
    UnsafeInline,
    /// 'unsafe-eval'
    UnsafeEval,
    /// Scheme source (e.g., "https:")
    Scheme(String),
    /// Host, nonce, hash or any other expression, kept verbatim.
    Other(String),
}

impl CspSource {
    /// Parse a source expression.
    pub fn parse(source: &str) -> Self {
        match source.to_lowercase().as_str() {
            "'none'" => CspSource::None,
            "'self'" => CspSource::Self_,
            "'unsafe-inline'" => CspSource::UnsafeInline,
            "'unsafe-eval'" => CspSource::UnsafeEval,
            s if s.ends_with(':') => CspSource::Scheme(s[..s.len() - 1].to_string()),
            _ => CspSource::Other(source.to_string()),
        }
    }
}

impl fmt::Display for CspSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CspSource::None => write!(f, "'none'"),
            CspSource::Self_ => write!(f, "'self'"),
            CspSource::UnsafeInline => write!(f, "'unsafe-inline'"),
            CspSource::UnsafeEval => write!(f, "'unsafe-eval'"),
            CspSource::Scheme(scheme) => write!(f, "{}:", scheme),
            CspSource::Other(raw) => write!(f, "{}", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_blocking_header_value() {
        let csp = ContentSecurityPolicy::script_blocking();
        assert_eq!(csp.to_string(), "script-src 'none';");
        assert!(csp.blocks_all_scripts());
    }

    #[test]
    fn test_csp_parse() {
        let csp = ContentSecurityPolicy::parse(
            "default-src 'self'; script-src 'self' https://cdn.example.com; style-src 'unsafe-inline'",
        );

        assert_eq!(csp.len(), 3);
        assert!(csp.directive("script-src").is_some());
        assert!(csp.directive("STYLE-SRC").is_some());
        assert!(!csp.blocks_all_scripts());
    }

    #[test]
    fn test_default_src_none_blocks_scripts() {
        let csp = ContentSecurityPolicy::parse("default-src 'none'; img-src https:");
        assert!(csp.blocks_all_scripts());

        let csp = ContentSecurityPolicy::parse("default-src 'none'; script-src 'self'");
        assert!(!csp.blocks_all_scripts());
    }

    #[test]
    fn test_first_directive_wins() {
        let csp = ContentSecurityPolicy::parse("script-src 'none'; script-src 'unsafe-inline'");
        assert_eq!(csp.len(), 1);
        assert!(csp.blocks_all_scripts());
    }

    #[test]
    fn test_round_trip_display() {
        let csp = ContentSecurityPolicy::parse("default-src 'self'; img-src https: data:");
        assert_eq!(csp.to_string(), "default-src 'self'; img-src https: data:;");
    }
}
