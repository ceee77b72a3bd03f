//! Head building blocks: meta/link/base tags, stylesheets, and script specs.
//!
//! Validation happens at emission time and is deliberately unforgiving: a
//! malformed tag is a bug in page-authoring code, and surfacing it beats
//! silently degrading the document.

use thiserror::Error;

use crate::util::escape::attr;

use super::markers::{PAGE_CSS_NODE_ATTR, PAGE_LINK_NODE_ATTR};

/// The implicit script MIME type; scripts of any other type cannot ride the
/// async ordering chain.
pub const DEFAULT_SCRIPT_TYPE: &str = "text/javascript";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("meta tag cannot combine more than one of name, http-equiv, and charset")]
    MetaConflict,
    #[error("meta tag with name or http-equiv requires content")]
    MetaMissingContent,
    #[error("link tag requires a `rel` attribute")]
    LinkMissingRel,
    #[error("base tag needs at least one of `href` or `target`")]
    BaseEmpty,
    #[error("script needs either an `href` or a `text` payload")]
    ScriptMissingPayload,
    #[error("script using `text` cannot be loaded conditionally")]
    InlineScriptCondition,
    #[error("stylesheet needs either an `href` or a `text` payload")]
    StylesheetMissingPayload,
}

/// A page-authored value that may be a single tag or a batch of tags.
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(tag) => vec![tag],
            OneOrMany::Many(tags) => tags,
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(tag: T) -> Self {
        OneOrMany::One(tag)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(tags: Vec<T>) -> Self {
        OneOrMany::Many(tags)
    }
}

/// An HTML comment emitted near the top of the document for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DebugComment {
    pub label: String,
    pub value: String,
}

impl DebugComment {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A `<meta>` tag. At most one of `name`, `http_equiv`, and `charset` may be
/// set; `name` and `http_equiv` require `content`.
#[derive(Debug, Clone, Default)]
pub struct MetaTag {
    pub name: Option<String>,
    pub http_equiv: Option<String>,
    pub charset: Option<String>,
    pub property: Option<String>,
    pub content: Option<String>,
    /// Wrap the tag in `<noscript>`.
    pub noscript: bool,
}

impl MetaTag {
    pub fn render(&self) -> Result<String, TagError> {
        let exclusive = [&self.name, &self.http_equiv, &self.charset]
            .iter()
            .filter(|slot| slot.is_some())
            .count();
        if exclusive > 1 {
            return Err(TagError::MetaConflict);
        }
        if (self.name.is_some() || self.http_equiv.is_some()) && self.content.is_none() {
            return Err(TagError::MetaMissingContent);
        }

        let mut out = String::new();
        if self.noscript {
            out.push_str("<noscript>");
        }
        out.push_str("<meta");
        if let Some(name) = &self.name {
            out.push_str(&format!(" name=\"{}\"", attr(name)));
        }
        if let Some(http_equiv) = &self.http_equiv {
            out.push_str(&format!(" http-equiv=\"{}\"", attr(http_equiv)));
        }
        if let Some(charset) = &self.charset {
            out.push_str(&format!(" charset=\"{}\"", attr(charset)));
        }
        if let Some(property) = &self.property {
            out.push_str(&format!(" property=\"{}\"", attr(property)));
        }
        if let Some(content) = &self.content {
            out.push_str(&format!(" content=\"{}\"", attr(content)));
        }
        out.push('>');
        if self.noscript {
            out.push_str("</noscript>");
        }
        Ok(out)
    }
}

/// A `<link>` tag carrying arbitrary attributes; `rel` is mandatory.
#[derive(Debug, Clone, Default)]
pub struct LinkTag {
    pub attrs: Vec<(String, String)>,
}

impl LinkTag {
    pub fn new(attrs: Vec<(String, String)>) -> Self {
        Self { attrs }
    }

    pub fn render(&self) -> Result<String, TagError> {
        if !self.attrs.iter().any(|(key, _)| key == "rel") {
            return Err(TagError::LinkMissingRel);
        }
        let rendered: Vec<String> = self
            .attrs
            .iter()
            .map(|(key, value)| format!("{key}=\"{}\"", attr(value)))
            .collect();
        Ok(format!(
            "<link {PAGE_LINK_NODE_ATTR} {}>",
            rendered.join(" ")
        ))
    }
}

/// A `<base>` tag; at least one of `href` and `target` is required.
#[derive(Debug, Clone, Default)]
pub struct BaseTag {
    pub href: Option<String>,
    pub target: Option<String>,
}

impl BaseTag {
    pub fn render(&self) -> Result<String, TagError> {
        if self.href.is_none() && self.target.is_none() {
            return Err(TagError::BaseEmpty);
        }
        let mut out = String::from("<base");
        if let Some(href) = &self.href {
            out.push_str(&format!(" href=\"{}\"", attr(href)));
        }
        if let Some(target) = &self.target {
            out.push_str(&format!(" target=\"{}\"", attr(target)));
        }
        out.push('>');
        Ok(out)
    }
}

/// A head stylesheet: external `href` or inline `text`.
#[derive(Debug, Clone)]
pub struct StylesheetSpec {
    pub href: Option<String>,
    pub text: Option<String>,
    pub css_type: String,
    pub media: String,
}

impl Default for StylesheetSpec {
    fn default() -> Self {
        Self {
            href: None,
            text: None,
            css_type: "text/css".to_string(),
            media: "all".to_string(),
        }
    }
}

impl StylesheetSpec {
    pub fn external(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            ..Self::default()
        }
    }

    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn render(&self) -> Result<String, TagError> {
        if let Some(href) = &self.href {
            Ok(format!(
                "<link rel=\"stylesheet\" type=\"{}\" media=\"{}\" href=\"{}\" {PAGE_CSS_NODE_ATTR}>",
                attr(&self.css_type),
                attr(&self.media),
                attr(href),
            ))
        } else if let Some(text) = &self.text {
            Ok(format!(
                "<style type=\"{}\" media=\"{}\" {PAGE_CSS_NODE_ATTR}>{text}</style>",
                attr(&self.css_type),
                attr(&self.media),
            ))
        } else {
            Err(TagError::StylesheetMissingPayload)
        }
    }
}

/// A script emission: external `href` (optionally conditional) or inline
/// `text` (optionally strict). Exactly one payload kind must be set.
#[derive(Debug, Clone, Default)]
pub struct ScriptSpec {
    pub href: Option<String>,
    pub text: Option<String>,
    /// Explicit MIME type; `None` means the implicit script type. Any other
    /// value forces the whole response onto synchronous emission.
    pub script_type: Option<String>,
    pub cross_origin: Option<String>,
    /// JavaScript expression evaluated when the chain reaches this script;
    /// falsy skips the load. Only valid on `href` scripts.
    pub condition: Option<String>,
    /// Prefix the inline body with `"use strict";`.
    pub strict: bool,
}

impl ScriptSpec {
    pub fn external(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            ..Self::default()
        }
    }

    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Check the payload invariants without rendering.
    pub fn validate(&self) -> Result<(), TagError> {
        if self.href.is_none() && self.text.is_none() {
            return Err(TagError::ScriptMissingPayload);
        }
        if self.text.is_some() && self.condition.is_some() {
            return Err(TagError::InlineScriptCondition);
        }
        Ok(())
    }

    /// Whether the script carries the implicit (executable) script type.
    pub fn is_default_type(&self) -> bool {
        match &self.script_type {
            None => true,
            Some(script_type) => script_type == DEFAULT_SCRIPT_TYPE,
        }
    }
}
