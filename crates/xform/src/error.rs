use crate::consts::ERR_NS;
use crate::location::Location;
use crate::xdm::ExpandedName;
use core::fmt;
use std::sync::Arc;

/// Canonicalized set of error codes emitted by the pipeline and sort engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FORG0001, // invalid lexical form / casting failure
    FOCH0002, // collation does not exist
    XPTY0004, // type error (values not comparable)
    XTDE0030, // invalid xsl:sort attribute value
    XTDE0410, // attribute/namespace after children (XSLT)
    XTDE0420, // attribute/namespace with a document parent (XSLT)
    XQTY0024, // attribute/namespace after children (XQuery)
    XTDE1035, // unknown collation at run time
    XTSE1210, // unknown collation detected statically
    XTSE0020, // invalid attribute value in a stylesheet (use-when, xml:base)
    XTSE0010, // static variable without a select attribute
    XTSE0110, // invalid version attribute
    XTSE0280, // undeclared prefix in a static variable name
    XTSE0350, // unmatched brace in an attribute value template
    XTSE3450, // static variable declared twice
    XTDE0050, // required static parameter not supplied
    XPDY0002, // context item absent
    XPST0008, // undeclared variable
    XQDY0025, // duplicate attribute name on one element
    PIPE0001, // project specific: unbalanced or closed event stream
    // Fallback / unknown (kept last)
    Unknown,
}

impl ErrorCode {
    pub fn local_name(&self) -> &'static str {
        match self {
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FOCH0002 => "FOCH0002",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XTDE0030 => "XTDE0030",
            ErrorCode::XTDE0410 => "XTDE0410",
            ErrorCode::XTDE0420 => "XTDE0420",
            ErrorCode::XQTY0024 => "XQTY0024",
            ErrorCode::XTDE1035 => "XTDE1035",
            ErrorCode::XTSE1210 => "XTSE1210",
            ErrorCode::XTSE0020 => "XTSE0020",
            ErrorCode::XTSE0010 => "XTSE0010",
            ErrorCode::XTSE0110 => "XTSE0110",
            ErrorCode::XTSE0280 => "XTSE0280",
            ErrorCode::XTSE0350 => "XTSE0350",
            ErrorCode::XTSE3450 => "XTSE3450",
            ErrorCode::XTDE0050 => "XTDE0050",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XQDY0025 => "XQDY0025",
            ErrorCode::PIPE0001 => "PIPE0001",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// Returns the QName of this code in the xqt-errors namespace.
    pub fn qname(&self) -> ExpandedName {
        ExpandedName { ns_uri: Some(ERR_NS.to_string()), local: self.local_name().to_string() }
    }

    pub fn from_code(s: &str) -> Self {
        use ErrorCode::*;
        match s {
            "err:FORG0001" => FORG0001,
            "err:FOCH0002" => FOCH0002,
            "err:XPTY0004" => XPTY0004,
            "err:XTDE0030" => XTDE0030,
            "err:XTDE0410" => XTDE0410,
            "err:XTDE0420" => XTDE0420,
            "err:XQTY0024" => XQTY0024,
            "err:XTDE1035" => XTDE1035,
            "err:XTSE1210" => XTSE1210,
            "err:XTSE0020" => XTSE0020,
            "err:XTSE0010" => XTSE0010,
            "err:XTSE0110" => XTSE0110,
            "err:XTSE0280" => XTSE0280,
            "err:XTSE0350" => XTSE0350,
            "err:XTSE3450" => XTSE3450,
            "err:XTDE0050" => XTDE0050,
            "err:XPDY0002" => XPDY0002,
            "err:XPST0008" => XPST0008,
            "err:XQDY0025" => XQDY0025,
            "err:PIPE0001" => PIPE0001,
            _ => Unknown,
        }
    }

    fn default_category(self) -> ErrorCategory {
        match self {
            ErrorCode::XTDE0410
            | ErrorCode::XTDE0420
            | ErrorCode::XQTY0024
            | ErrorCode::XQDY0025
            | ErrorCode::PIPE0001 => {
                ErrorCategory::StructuralPipeline
            }
            ErrorCode::XPTY0004 => ErrorCategory::NotComparable,
            ErrorCode::XTDE1035 | ErrorCode::XTSE1210 | ErrorCode::FOCH0002 => ErrorCategory::CollationResolution,
            ErrorCode::XTDE0030 => ErrorCategory::SortKeyConfiguration,
            _ => ErrorCategory::Other,
        }
    }
}

/// Coarse taxonomy used by callers deciding how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Event stream violated the nesting or start-tag rules.
    StructuralPipeline,
    /// Two atomic values cannot be ordered under the active rules.
    NotComparable,
    /// A collation URI was malformed or unknown.
    CollationResolution,
    /// An `xsl:sort` / `order by` attribute had an invalid value.
    SortKeyConfiguration,
    Other,
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ExpandedName,
    pub message: String,
    pub category: ErrorCategory,
    pub location: Option<Location>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>, // optional chained cause
}

impl Error {
    pub fn new_qname(code: ExpandedName, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), category: ErrorCategory::Other, location: None, source: None }
    }

    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        let mut err = Self::new_qname(code.qname(), msg);
        err.category = code.default_category();
        err
    }

    pub fn code_enum(&self) -> ErrorCode {
        // Only ERR_NS codes map to the enum; others are Unknown.
        if self.code.ns_uri.as_deref() == Some(ERR_NS) {
            ErrorCode::from_code(&format!("err:{}", self.code.local))
        } else {
            ErrorCode::Unknown
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Format the code as a human-readable string (err:LOCAL or Q{ns}local).
    pub fn format_code(&self) -> String {
        if self.code.ns_uri.as_deref() == Some(ERR_NS) {
            format!("err:{}", self.code.local)
        } else if let Some(ns) = &self.code.ns_uri {
            format!("Q{{{}}}{}", ns, self.code.local)
        } else {
            self.code.local.clone()
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        if !location.is_unknown() {
            self.location = Some(location);
        }
        self
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    /// Shorthand for a `XPTY0004` comparability failure naming both operand types.
    pub fn not_comparable(left: &str, right: &str) -> Self {
        Self::from_code(ErrorCode::XPTY0004, format!("Cannot compare {left} with {right}"))
    }

    /// Shorthand for an unbalanced or closed event stream.
    pub fn unbalanced(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::PIPE0001, msg)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::from_code(ErrorCode::XTSE0020, format!("invalid URI: {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())?;
        if let Some(loc) = &self.location {
            write!(f, " at {loc}")?;
        }
        Ok(())
    }
}
