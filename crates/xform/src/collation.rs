use crate::error::{Error, ErrorCode};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

pub use crate::consts::CODEPOINT_URI;
pub use crate::consts::PARAMETERIZED_COLLATION_URI;
pub use crate::consts::SIMPLE_ACCENT_URI;
pub use crate::consts::SIMPLE_CASE_ACCENT_URI;
pub use crate::consts::SIMPLE_CASE_URI;

/// A string ordering identified by URI.
///
/// `key` must agree with `compare`: two strings compare equal exactly when
/// their keys are equal.
pub trait Collation: Send + Sync {
    fn uri(&self) -> &str;
    fn compare(&self, a: &str, b: &str) -> core::cmp::Ordering;
    fn key(&self, s: &str) -> String {
        s.to_string()
    }
}

impl core::fmt::Debug for dyn Collation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Collation({})", self.uri())
    }
}

#[derive(Clone)]
pub enum CollationKind {
    Codepoint(Arc<dyn Collation>),
    Other(Arc<dyn Collation>),
}

impl CollationKind {
    pub fn classify(collation: Arc<dyn Collation>) -> Self {
        if collation.uri() == CODEPOINT_URI { CollationKind::Codepoint(collation) } else { CollationKind::Other(collation) }
    }

    pub fn as_trait(&self) -> &dyn Collation {
        match self {
            CollationKind::Codepoint(c) | CollationKind::Other(c) => c.as_ref(),
        }
    }
}

pub struct CodepointCollation;

impl Collation for CodepointCollation {
    fn uri(&self) -> &str {
        CODEPOINT_URI
    }
    fn compare(&self, a: &str, b: &str) -> core::cmp::Ordering {
        a.cmp(b)
    }
}

/// Simple case-insensitive collation
pub struct SimpleCaseCollation;

impl Collation for SimpleCaseCollation {
    fn uri(&self) -> &str {
        SIMPLE_CASE_URI
    }
    fn compare(&self, a: &str, b: &str) -> core::cmp::Ordering {
        self.key(a).cmp(&self.key(b))
    }
    fn key(&self, s: &str) -> String {
        s.to_lowercase()
    }
}

/// Simple accent-insensitive collation (NFD + remove combining marks)
pub struct SimpleAccentCollation;

impl Collation for SimpleAccentCollation {
    fn uri(&self) -> &str {
        SIMPLE_ACCENT_URI
    }
    fn compare(&self, a: &str, b: &str) -> core::cmp::Ordering {
        self.key(a).cmp(&self.key(b))
    }
    fn key(&self, s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        use unicode_normalization::char::canonical_combining_class as ccc;
        s.nfd().filter(|&ch| ccc(ch) == 0).collect()
    }
}

/// Simple case+accent-insensitive collation
pub struct SimpleCaseAccentCollation;

impl Collation for SimpleCaseAccentCollation {
    fn uri(&self) -> &str {
        SIMPLE_CASE_ACCENT_URI
    }
    fn compare(&self, a: &str, b: &str) -> core::cmp::Ordering {
        self.key(a).cmp(&self.key(b))
    }
    fn key(&self, s: &str) -> String {
        SimpleAccentCollation.key(s).to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CaseFirst {
    Upper,
    Lower,
}

/// Breaks ties of a base collation by letter case.
///
/// The tie-break walks both strings character by character, skipping
/// characters that are equal and non-letters, and stops at the first pair of
/// letters that differ in case. Running off the end of either string is a
/// tie. Multi-character collation units are not recognised.
struct CaseOrderCollation {
    base: Arc<dyn Collation>,
    first: CaseFirst,
    uri: String,
}

impl CaseOrderCollation {
    fn tie_break(&self, a: &str, b: &str) -> core::cmp::Ordering {
        use core::cmp::Ordering;
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let (mut i, mut j) = (0, 0);
        loop {
            while i < a.len() && j < b.len() && a[i] == b[j] {
                i += 1;
                j += 1;
            }
            while i < a.len() && !a[i].is_alphabetic() {
                i += 1;
            }
            while j < b.len() && !b[j].is_alphabetic() {
                j += 1;
            }
            if i >= a.len() || j >= b.len() {
                return Ordering::Equal;
            }
            let (upper_a, upper_b) = (a[i].is_uppercase(), b[j].is_uppercase());
            if upper_a != upper_b {
                let upper_wins = if upper_a { Ordering::Less } else { Ordering::Greater };
                return match self.first {
                    CaseFirst::Upper => upper_wins,
                    CaseFirst::Lower => upper_wins.reverse(),
                };
            }
            i += 1;
            j += 1;
        }
    }
}

impl Collation for CaseOrderCollation {
    fn uri(&self) -> &str {
        &self.uri
    }
    fn compare(&self, a: &str, b: &str) -> core::cmp::Ordering {
        match self.base.compare(a, b) {
            core::cmp::Ordering::Equal => self.tie_break(a, b),
            other => other,
        }
    }
    fn key(&self, s: &str) -> String {
        let mut key = self.base.key(s);
        key.push('\u{0}');
        key.extend(s.chars().filter(|c| c.is_alphabetic()).map(|c| if c.is_uppercase() { 'U' } else { 'l' }));
        key
    }
}

/// Collation decorator sorting uppercase before lowercase on ties.
pub struct UppercaseFirstCollation;

impl UppercaseFirstCollation {
    pub fn wrap(base: Arc<dyn Collation>) -> Arc<dyn Collation> {
        let uri = format!("{}#upper-first", base.uri());
        Arc::new(CaseOrderCollation { base, first: CaseFirst::Upper, uri })
    }
}

/// Collation decorator sorting lowercase before uppercase on ties.
pub struct LowercaseFirstCollation;

impl LowercaseFirstCollation {
    pub fn wrap(base: Arc<dyn Collation>) -> Arc<dyn Collation> {
        let uri = format!("{}#lower-first", base.uri());
        Arc::new(CaseOrderCollation { base, first: CaseFirst::Lower, uri })
    }
}

/// Options of a parameterized collation URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CollationParams {
    pub lang: Option<String>,
    pub case_order: Option<String>,
    pub strength: Option<String>,
}

impl CollationParams {
    /// Parse the query part of `http://xform.dev/collation?lang=de;case-order=upper-first`.
    pub fn parse(query: &str) -> Option<Self> {
        let mut params = CollationParams::default();
        for pair in query.split([';', '&']).filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=')?;
            match k {
                "lang" => params.lang = Some(v.to_string()),
                "case-order" => params.case_order = Some(v.to_string()),
                "strength" => params.strength = Some(v.to_string()),
                _ => return None,
            }
        }
        Some(params)
    }

    pub fn to_uri(&self) -> String {
        let mut uri = PARAMETERIZED_COLLATION_URI.to_string();
        let mut sep = '?';
        for (k, v) in [("lang", &self.lang), ("case-order", &self.case_order), ("strength", &self.strength)] {
            if let Some(v) = v {
                uri.push(sep);
                uri.push_str(k);
                uri.push('=');
                uri.push_str(v);
                sep = ';';
            }
        }
        uri
    }

    fn build(&self) -> Option<Arc<dyn Collation>> {
        let base: Arc<dyn Collation> = match self.strength.as_deref() {
            Some("primary") => Arc::new(SimpleCaseAccentCollation),
            Some("secondary") => Arc::new(SimpleCaseCollation),
            Some("tertiary" | "identical") => Arc::new(CodepointCollation),
            // a case order only makes sense on top of a case-blind ordering
            None if self.case_order.is_some() => Arc::new(SimpleCaseCollation),
            None => Arc::new(CodepointCollation),
            Some(_) => return None,
        };
        let collation = match self.case_order.as_deref() {
            Some("upper-first") => UppercaseFirstCollation::wrap(base),
            Some("lower-first") => LowercaseFirstCollation::wrap(base),
            Some("#default") | None => base,
            Some(_) => return None,
        };
        Some(collation)
    }
}

const PARAMETERIZED_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(32) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Registry of available collations, keyed by their URI.
///
/// Parameterized collation URIs are built on demand and kept in a small LRU
/// cache; a cached collation is immutable once handed out.
pub struct CollationRegistry {
    by_uri: HashMap<String, Arc<dyn Collation>>,
    parameterized: Mutex<LruCache<CollationParams, Arc<dyn Collation>>>,
}

impl Default for CollationRegistry {
    fn default() -> Self {
        let mut reg = Self { by_uri: HashMap::new(), parameterized: Mutex::new(LruCache::new(PARAMETERIZED_CACHE_SIZE)) };
        let def: Arc<dyn Collation> = Arc::new(CodepointCollation);
        reg.by_uri.insert(def.uri().to_string(), def);
        // Built-in simple collations
        reg.by_uri.insert(SIMPLE_CASE_URI.to_string(), Arc::new(SimpleCaseCollation));
        reg.by_uri.insert(SIMPLE_ACCENT_URI.to_string(), Arc::new(SimpleAccentCollation));
        reg.by_uri.insert(SIMPLE_CASE_ACCENT_URI.to_string(), Arc::new(SimpleCaseAccentCollation));
        reg
    }
}

impl CollationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn codepoint(&self) -> Arc<dyn Collation> {
        self.by_uri.get(CODEPOINT_URI).cloned().unwrap_or_else(|| Arc::new(CodepointCollation))
    }

    /// Look up a collation by absolute URI, building parameterized ones on demand.
    pub fn get(&self, uri: &str) -> Option<Arc<dyn Collation>> {
        if let Some(c) = self.by_uri.get(uri) {
            return Some(c.clone());
        }
        let query = uri.strip_prefix(PARAMETERIZED_COLLATION_URI)?;
        let query = match query.strip_prefix('?') {
            Some(q) => q,
            None if query.is_empty() => "",
            None => return None,
        };
        self.parameterized(&CollationParams::parse(query)?)
    }

    /// Collation for a set of parameters (cached).
    pub fn parameterized(&self, params: &CollationParams) -> Option<Arc<dyn Collation>> {
        let mut cache = self.parameterized.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(c) = cache.get(params) {
            return Some(c.clone());
        }
        let built = params.build()?;
        tracing::debug!(uri = %params.to_uri(), "parameterized collation created");
        cache.put(params.clone(), built.clone());
        Some(built)
    }

    /// Like [`CollationRegistry::get`] but reports an unknown URI as `FOCH0002`.
    pub fn resolve(&self, uri: &str) -> Result<Arc<dyn Collation>, Error> {
        self.get(uri).ok_or_else(|| Error::from_code(ErrorCode::FOCH0002, format!("unknown collation URI: {uri}")))
    }

    pub fn insert(&mut self, collation: Arc<dyn Collation>) {
        self.by_uri.insert(collation.uri().to_string(), collation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cmp::Ordering;
    use rstest::rstest;

    #[rstest]
    fn uppercase_first_breaks_ties() {
        let c = UppercaseFirstCollation::wrap(Arc::new(SimpleCaseCollation));
        assert_eq!(c.compare("ABC", "abc"), Ordering::Less);
        assert_eq!(c.compare("abc", "ABC"), Ordering::Greater);
        assert_eq!(c.compare("abc", "abd"), SimpleCaseCollation.compare("abc", "abd"));
    }

    #[rstest]
    fn lowercase_first_reverses_the_tie_break() {
        let c = LowercaseFirstCollation::wrap(Arc::new(SimpleCaseCollation));
        assert_eq!(c.compare("ABC", "abc"), Ordering::Greater);
    }

    fn upper_first() -> CaseOrderCollation {
        CaseOrderCollation { base: Arc::new(CodepointCollation), first: CaseFirst::Upper, uri: String::new() }
    }

    #[rstest]
    #[case("a-B", "a b", Ordering::Less)]
    #[case("a-b", "a B", Ordering::Greater)]
    #[case("a-B", "a B", Ordering::Equal)]
    #[case("ab", "aB", Ordering::Greater)]
    #[case("x1", "X", Ordering::Greater)]
    fn tie_break_skips_non_letters(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(upper_first().tie_break(a, b), expected);
    }

    #[rstest]
    fn exhaustion_is_a_tie() {
        assert_eq!(upper_first().tie_break("a", "a-"), Ordering::Equal);
        assert_eq!(upper_first().tie_break("", "A"), Ordering::Equal);
    }

    #[rstest]
    fn tie_break_only_runs_on_base_ties() {
        let c = UppercaseFirstCollation::wrap(Arc::new(SimpleCaseAccentCollation));
        assert_eq!(c.compare("a-b", "a-B"), Ordering::Greater);
        assert_eq!(c.compare("a", "a-"), SimpleCaseAccentCollation.compare("a", "a-"));
    }

    #[rstest]
    fn parameterized_uri_is_cached() {
        let reg = CollationRegistry::new();
        let uri = format!("{PARAMETERIZED_COLLATION_URI}?lang=en;case-order=upper-first");
        let a = reg.get(&uri).unwrap();
        let b = reg.get(&uri).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.compare("Apple", "apple"), Ordering::Less);
    }

    #[rstest]
    #[case("?case-order=sideways")]
    #[case("?colour=blue")]
    #[case("garbage")]
    fn invalid_parameterized_uris(#[case] suffix: &str) {
        let reg = CollationRegistry::new();
        let err = reg.resolve(&format!("{PARAMETERIZED_COLLATION_URI}{suffix}")).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FOCH0002);
    }
}
