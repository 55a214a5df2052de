//! Well-known namespace and collation URIs.

/// Namespace of W3C-defined error codes (xqt-errors).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";
/// XSLT instruction namespace.
pub const XSLT_NS: &str = "http://www.w3.org/1999/XSL/Transform";
/// The reserved `xml` prefix namespace.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
/// XML Schema namespace used for type annotations.
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Unicode codepoint collation (identity comparison).
pub const CODEPOINT_URI: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";
/// Case-blind collation.
pub const SIMPLE_CASE_URI: &str = "urn:xform:collation:simple-case";
/// Accent-blind collation.
pub const SIMPLE_ACCENT_URI: &str = "urn:xform:collation:simple-accent";
/// Case- and accent-blind collation.
pub const SIMPLE_CASE_ACCENT_URI: &str = "urn:xform:collation:simple-case-accent";
/// Base of parameterized collation URIs, e.g. `?lang=de;case-order=upper-first`.
pub const PARAMETERIZED_COLLATION_URI: &str = "http://xform.dev/collation";
