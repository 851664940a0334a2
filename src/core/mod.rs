//! Core data structures shared across the overlay engine.

use serde::{Deserialize, Serialize};

/// An RDF triple with opaque string terms.
///
/// Equality is exact string equality on all three fields; any literal
/// encoding has already been applied upstream, so the engine never
/// inspects term structure beyond serialization.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(subject: &str, predicate: &str, object: &str) -> Self {
        Self {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
        }
    }

    /// Canonical identity of a triple.
    ///
    /// This is the lookup key of the removed overlay store and the key
    /// fed to the removal membership filter; the two must always agree.
    pub fn id(&self) -> String {
        format!("{} {} {}", self.subject, self.predicate, self.object)
    }

    /// Serialize back to a single N-Triples style line.
    pub fn to_line(&self) -> String {
        format!(
            "<{}> <{}> {} .",
            self.subject,
            self.predicate,
            format_object(&self.object)
        )
    }
}

fn format_object(object: &str) -> String {
    // IRIs and blank node labels go back in angle brackets or as-is,
    // everything else is written as a quoted literal.
    if object.starts_with("_:") {
        object.to_string()
    } else if object.contains("://") || object.starts_with("genid:") {
        format!("<{}>", object)
    } else {
        format!("\"{}\"", object)
    }
}

/// A triple pattern; `None` fields match any term.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub object: Option<String>,
}

impl TriplePattern {
    /// The pattern matching every triple.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn new(subject: Option<&str>, predicate: Option<&str>, object: Option<&str>) -> Self {
        Self {
            subject: subject.map(|s| s.to_string()),
            predicate: predicate.map(|p| p.to_string()),
            object: object.map(|o| o.to_string()),
        }
    }

    /// The pattern matching exactly one triple.
    pub fn exact(triple: &Triple) -> Self {
        Self {
            subject: Some(triple.subject.clone()),
            predicate: Some(triple.predicate.clone()),
            object: Some(triple.object.clone()),
        }
    }

    pub fn matches(&self, triple: &Triple) -> bool {
        self.subject.as_deref().map_or(true, |s| s == triple.subject)
            && self.predicate.as_deref().map_or(true, |p| p == triple.predicate)
            && self.object.as_deref().map_or(true, |o| o == triple.object)
    }

    /// Key under which offset translations for this pattern are cached.
    pub fn cache_key(&self) -> String {
        format!(
            "{} {} {}",
            self.subject.as_deref().unwrap_or(""),
            self.object.as_deref().unwrap_or(""),
            self.predicate.as_deref().unwrap_or("")
        )
    }
}

/// A paginated query against the logical dataset.
///
/// `limit: None` means unbounded; a limit of zero passed in from the
/// outside is normalized to unbounded at the API boundary.
#[derive(Clone, Debug, Default)]
pub struct Query {
    pub pattern: TriplePattern,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(pattern: TriplePattern) -> Self {
        Self { pattern, offset: 0, limit: None }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_id_matches_store_key() {
        let t = Triple::new("s", "p", "o");
        assert_eq!(t.id(), "s p o");
    }

    #[test]
    fn test_pattern_matches() {
        let t = Triple::new("http://example.org/s1", "http://example.org/p1", "o");
        assert!(TriplePattern::any().matches(&t));
        assert!(TriplePattern::new(Some("http://example.org/s1"), None, None).matches(&t));
        assert!(!TriplePattern::new(Some("http://example.org/s2"), None, None).matches(&t));
        assert!(TriplePattern::exact(&t).matches(&t));
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let q = Query::new(TriplePattern::any()).with_limit(0);
        assert_eq!(q.limit, None);
    }
}
