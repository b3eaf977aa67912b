use std::borrow::Cow;

use crate::error::Result;

pub const MESSAGE: &str = "message";
pub const AURA_CONTEXT: &str = "aura.context";
pub const AURA_PAGE_URI: &str = "aura.pageURI";
pub const AURA_TOKEN: &str = "aura.token";

/// Extraction pattern for one form parameter: the literal name (dots and any
/// other metacharacters escaped) followed by `=` and everything up to the
/// next `&`.
pub(crate) fn param_pattern(name: &str) -> String {
    format!("{}=[^&]*", regex_syntax::escape(name))
}

/// Precompiled extractor for a single form-encoded parameter.
pub struct ParamPattern {
    regex: fancy_regex::Regex,
}

impl ParamPattern {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            regex: fancy_regex::Regex::new(&param_pattern(name))?,
        })
    }

    /// First `name=value` occurrence in `body`, still percent-encoded.
    pub fn find<'a>(&self, body: &'a str) -> Option<&'a str> {
        self.regex.find(body).ok().flatten().map(|m| m.as_str())
    }
}

/// Find the raw `name=value` pair in a form-encoded body without decoding it.
///
/// Matching is case-sensitive and returns the first occurrence. The match is
/// not anchored to a `&` boundary, so a longer name ending in `name` also
/// matches; callers that care should use names that are not suffixes of
/// other parameters.
pub fn extract_raw_parameter<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    ParamPattern::new(name).ok()?.find(body)
}

/// Percent-decode the value half of a `name=value` pair, treating `+` as a
/// space. Malformed input comes back unchanged. An absent pair stays absent
/// through `Option::map`.
pub fn decode_parameter(raw_pair: &str) -> String {
    let Some((key, value)) = raw_pair.split_once('=') else {
        return raw_pair.to_string();
    };
    match decode_component(value) {
        Some(decoded) => format!("{key}={decoded}"),
        None => raw_pair.to_string(),
    }
}

/// Form-decode a single value. `None` when an escape is truncated, not hex,
/// or the decoded bytes are not UTF-8.
pub(crate) fn decode_component(encoded: &str) -> Option<String> {
    let spaced = encoded.replace('+', " ");
    if !has_well_formed_escapes(&spaced) {
        return None;
    }
    urlencoding::decode(&spaced).ok().map(Cow::into_owned)
}

fn has_well_formed_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        match (bytes.get(i + 1), bytes.get(i + 2)) {
            (Some(hi), Some(lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => i += 3,
            _ => return false,
        }
    }
    true
}

/// The four standard Aura form parameters, extracted raw from one body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawAuraParams<'a> {
    pub message: Option<&'a str>,
    pub context: Option<&'a str>,
    pub page_uri: Option<&'a str>,
    pub token: Option<&'a str>,
}

/// Extractors for the standard Aura parameters, compiled once.
pub struct AuraParams {
    message: ParamPattern,
    context: ParamPattern,
    page_uri: ParamPattern,
    token: ParamPattern,
}

impl AuraParams {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            message: ParamPattern::new(MESSAGE)?,
            context: ParamPattern::new(AURA_CONTEXT)?,
            page_uri: ParamPattern::new(AURA_PAGE_URI)?,
            token: ParamPattern::new(AURA_TOKEN)?,
        })
    }

    pub fn message<'a>(&self, body: &'a str) -> Option<&'a str> {
        self.message.find(body)
    }

    pub fn extract<'a>(&self, body: &'a str) -> RawAuraParams<'a> {
        RawAuraParams {
            message: self.message.find(body),
            context: self.context.find(body),
            page_uri: self.page_uri.find(body),
            token: self.token.find(body),
        }
    }
}
