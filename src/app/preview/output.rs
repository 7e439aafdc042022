//! Output region owned by the preview sandbox
//!
//! The region shows exactly one of: the placeholder, the mounted component's
//! view, or an error. Views arrive from the isolate as a serialized tree of
//! host elements ([`VNode`]) and are rendered to static HTML here; nothing
//! from the isolate is interpreted as markup.

#![warn(clippy::all, rust_2018_idioms)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

use super::outcome::PreviewError;

/// Attribute value of a host element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Style(BTreeMap<String, StyleValue>),
}

/// A single CSS declaration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleValue {
    Number(f64),
    Text(String),
}

/// Node of a mounted view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum VNode {
    #[serde(rename = "el")]
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, AttrValue>,
        /// Event name to handler id
        #[serde(default)]
        on: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<VNode>,
    },
    #[serde(rename = "text")]
    Text { v: String },
}

impl VNode {
    /// Concatenated text content
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            VNode::Text { v } => out.push_str(v),
            VNode::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Every (event, handler id) pair in document order
    pub fn handlers(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.collect_handlers(&mut out);
        out
    }

    fn collect_handlers(&self, out: &mut Vec<(String, String)>) {
        if let VNode::Element { on, children, .. } = self {
            for (event, id) in on {
                out.push((event.clone(), id.clone()));
            }
            for child in children {
                child.collect_handlers(out);
            }
        }
    }
}

/// Wire form of a view node: pre-order, elements count their direct children
#[derive(Debug, Deserialize)]
#[serde(tag = "t")]
pub enum FlatNode {
    #[serde(rename = "el")]
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, AttrValue>,
        #[serde(default)]
        on: BTreeMap<String, String>,
        #[serde(default)]
        n: usize,
    },
    #[serde(rename = "text")]
    Text { v: String },
}

/// A view decoded from the runtime's flat node list
///
/// The list stays one JSON level deep however deeply the view nests; the
/// tree is rebuilt here without recursion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<FlatNode>")]
pub struct FlatView(pub Vec<VNode>);

impl TryFrom<Vec<FlatNode>> for FlatView {
    type Error = String;

    fn try_from(nodes: Vec<FlatNode>) -> Result<Self, Self::Error> {
        let mut roots = Vec::new();
        // Open elements with the number of children still to come
        let mut open: Vec<(VNode, usize)> = Vec::new();

        for flat in nodes {
            let (node, expected) = match flat {
                FlatNode::Element { tag, attrs, on, n } => (
                    VNode::Element {
                        tag,
                        attrs,
                        on,
                        children: Vec::with_capacity(n.min(1024)),
                    },
                    n,
                ),
                FlatNode::Text { v } => (VNode::Text { v }, 0),
            };
            if expected > 0 {
                open.push((node, expected));
                continue;
            }

            let mut done = node;
            loop {
                let Some((parent, remaining)) = open.last_mut() else {
                    roots.push(done);
                    break;
                };
                if let VNode::Element { children, .. } = parent {
                    children.push(done);
                }
                *remaining -= 1;
                if *remaining > 0 {
                    break;
                }
                match open.pop() {
                    Some((finished, _)) => done = finished,
                    None => break,
                }
            }
        }

        if !open.is_empty() {
            return Err(format!("view ended with {} unfinished elements", open.len()));
        }
        Ok(FlatView(roots))
    }
}

/// What the region currently shows
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RegionContent {
    #[default]
    Placeholder,
    View(Vec<VNode>),
    Error(PreviewError),
}

/// Page settings for [`OutputRegion::document`]
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentStyle {
    pub title: String,
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
}

impl Default for DocumentStyle {
    fn default() -> Self {
        Self {
            title: "Live Preview".to_string(),
            stylesheets: Vec::new(),
            scripts: vec!["https://cdn.tailwindcss.com".to_string()],
        }
    }
}

const PLACEHOLDER_HTML: &str = "<div class=\"preview-placeholder\" \
style=\"display: flex; flex-direction: column; align-items: center; justify-content: center; \
min-height: 12rem; color: #6b7280; font-family: sans-serif;\">\
<h3 style=\"margin: 0 0 0.5rem 0;\">Live Preview</h3>\
<p style=\"margin: 0;\">Your generated component will appear here.</p></div>";

const ERROR_STYLE: &str = "font-family: ui-monospace, SFMono-Regular, Menlo, monospace; \
font-size: 0.875rem; color: #ef4444; background: #fef2f2; border: 1px solid #fecaca; \
border-radius: 0.5rem; padding: 1rem; white-space: pre-wrap;";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// CSS properties that take plain numbers
const UNITLESS_PROPERTIES: &[&str] = &[
    "animationIterationCount",
    "aspectRatio",
    "borderImageOutset",
    "borderImageSlice",
    "borderImageWidth",
    "boxFlex",
    "boxFlexGroup",
    "boxOrdinalGroup",
    "columnCount",
    "columns",
    "flex",
    "flexGrow",
    "flexPositive",
    "flexShrink",
    "flexNegative",
    "flexOrder",
    "gridArea",
    "gridRow",
    "gridRowEnd",
    "gridRowSpan",
    "gridRowStart",
    "gridColumn",
    "gridColumnEnd",
    "gridColumnSpan",
    "gridColumnStart",
    "fontWeight",
    "lineClamp",
    "lineHeight",
    "opacity",
    "order",
    "orphans",
    "scale",
    "tabSize",
    "widows",
    "zIndex",
    "zoom",
    "fillOpacity",
    "floodOpacity",
    "stopOpacity",
    "strokeDasharray",
    "strokeDashoffset",
    "strokeMiterlimit",
    "strokeOpacity",
    "strokeWidth",
];

/// Region the sandbox mounts into
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRegion {
    content: RegionContent,
}

impl OutputRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the placeholder; previous content is gone
    pub fn clear(&mut self) {
        self.content = RegionContent::Placeholder;
    }

    pub fn show_view(&mut self, tree: Vec<VNode>) {
        self.content = RegionContent::View(tree);
    }

    pub fn show_error(&mut self, error: PreviewError) {
        self.content = RegionContent::Error(error);
    }

    pub fn content(&self) -> &RegionContent {
        &self.content
    }

    /// Mounted view nodes, if a view is shown
    pub fn view(&self) -> Option<&[VNode]> {
        match &self.content {
            RegionContent::View(tree) => Some(tree),
            _ => None,
        }
    }

    /// Visible text of the region
    pub fn text_content(&self) -> String {
        match &self.content {
            RegionContent::Placeholder => {
                "Live Preview\nYour generated component will appear here.".to_string()
            }
            RegionContent::View(tree) => tree.iter().map(VNode::text_content).collect(),
            RegionContent::Error(err) => format!("Preview Error: {}", err),
        }
    }

    /// HTML fragment for the region
    pub fn to_html(&self) -> String {
        match &self.content {
            RegionContent::Placeholder => PLACEHOLDER_HTML.to_string(),
            RegionContent::View(tree) => {
                let mut html = String::from("<div class=\"preview-root\">");
                for node in tree {
                    render_node(node, false, &mut html);
                }
                html.push_str("</div>");
                html
            }
            RegionContent::Error(err) => format!(
                "<div class=\"preview-error\" role=\"alert\" style=\"{}\">\
                 <strong>Preview Error:</strong> {}</div>",
                ERROR_STYLE,
                escape_text(&err.message())
            ),
        }
    }

    /// Standalone HTML page around the region
    pub fn document(&self, style: &DocumentStyle) -> String {
        let mut page = String::from("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        page.push_str("<meta charset=\"utf-8\">\n");
        page.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
        let _ = writeln!(page, "<title>{}</title>", escape_text(&style.title));
        for href in &style.stylesheets {
            let _ = writeln!(page, "<link rel=\"stylesheet\" href=\"{}\">", escape_attr(href));
        }
        for src in &style.scripts {
            let _ = writeln!(page, "<script src=\"{}\"></script>", escape_attr(src));
        }
        page.push_str("</head>\n<body>\n");
        page.push_str(&self.to_html());
        page.push_str("\n</body>\n</html>\n");
        page
    }
}

fn render_node(node: &VNode, in_svg: bool, out: &mut String) {
    match node {
        VNode::Text { v } => out.push_str(&escape_text(v)),
        VNode::Element {
            tag,
            attrs,
            on,
            children,
        } => {
            let tag = sanitize_tag(tag);
            let in_svg = in_svg || tag == "svg";
            out.push('<');
            out.push_str(&tag);

            let mut text_value = None;
            for (name, value) in attrs {
                if tag == "textarea" && (name == "value" || name == "defaultValue") {
                    text_value = Some(attr_text(value));
                    continue;
                }
                render_attr(name, value, in_svg, out);
            }
            for (event, id) in on {
                let _ = write!(
                    out,
                    " data-preview-on-{}=\"{}\"",
                    sanitize_name(event),
                    escape_attr(id)
                );
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            if let Some(text) = text_value {
                out.push_str(&escape_text(&text));
            } else {
                let child_svg = in_svg && tag != "foreignObject";
                for child in children {
                    render_node(child, child_svg, out);
                }
            }
            let _ = write!(out, "</{}>", tag);
        }
    }
}

fn render_attr(name: &str, value: &AttrValue, in_svg: bool, out: &mut String) {
    let html_name = attribute_name(name, in_svg);
    if html_name.is_empty() {
        return;
    }
    let keeps_literal_bool = html_name.starts_with("aria-") || html_name.starts_with("data-");

    match value {
        AttrValue::Bool(true) if keeps_literal_bool => {
            let _ = write!(out, " {}=\"true\"", html_name);
        }
        AttrValue::Bool(false) if keeps_literal_bool => {
            let _ = write!(out, " {}=\"false\"", html_name);
        }
        AttrValue::Bool(true) => {
            let _ = write!(out, " {}", html_name);
        }
        AttrValue::Bool(false) => {}
        AttrValue::Style(declarations) => {
            let css = style_to_css(declarations);
            if !css.is_empty() {
                let _ = write!(out, " style=\"{}\"", escape_attr(&css));
            }
        }
        other => {
            let _ = write!(out, " {}=\"{}\"", html_name, escape_attr(&attr_text(other)));
        }
    }
}

fn attr_text(value: &AttrValue) -> String {
    match value {
        AttrValue::Bool(b) => b.to_string(),
        AttrValue::Number(n) => format_number(*n),
        AttrValue::Text(s) => s.clone(),
        AttrValue::Style(declarations) => style_to_css(declarations),
    }
}

/// Map a prop name to the attribute written in HTML
fn attribute_name(prop: &str, in_svg: bool) -> String {
    let mapped = match prop {
        "className" => "class",
        "htmlFor" => "for",
        "httpEquiv" => "http-equiv",
        "acceptCharset" => "accept-charset",
        "defaultValue" => "value",
        "defaultChecked" => "checked",
        "defaultSelected" => "selected",
        "xlinkHref" => "xlink:href",
        "xmlLang" => "xml:lang",
        "xmlSpace" => "xml:space",
        _ => "",
    };
    if !mapped.is_empty() {
        return mapped.to_string();
    }
    let name = sanitize_name(prop);
    if name.starts_with("aria-") || name.starts_with("data-") {
        return name;
    }
    if in_svg {
        if SVG_HYPHENATED.contains(&prop) {
            return kebab_case(prop);
        }
        return name;
    }
    name.to_ascii_lowercase()
}

/// SVG presentation attributes React writes hyphenated
const SVG_HYPHENATED: &[&str] = &[
    "alignmentBaseline",
    "baselineShift",
    "clipPath",
    "clipRule",
    "colorInterpolation",
    "colorInterpolationFilters",
    "dominantBaseline",
    "enableBackground",
    "fillOpacity",
    "fillRule",
    "floodColor",
    "floodOpacity",
    "fontFamily",
    "fontSize",
    "fontSizeAdjust",
    "fontStretch",
    "fontStyle",
    "fontVariant",
    "fontWeight",
    "imageRendering",
    "letterSpacing",
    "lightingColor",
    "markerEnd",
    "markerMid",
    "markerStart",
    "paintOrder",
    "pointerEvents",
    "shapeRendering",
    "stopColor",
    "stopOpacity",
    "strokeDasharray",
    "strokeDashoffset",
    "strokeLinecap",
    "strokeLinejoin",
    "strokeMiterlimit",
    "strokeOpacity",
    "strokeWidth",
    "textAnchor",
    "textDecoration",
    "textRendering",
    "transformOrigin",
    "vectorEffect",
    "wordSpacing",
    "writingMode",
];

fn style_to_css(declarations: &BTreeMap<String, StyleValue>) -> String {
    let mut css = Vec::with_capacity(declarations.len());
    for (property, value) in declarations {
        let name = if property.starts_with("--") {
            property.clone()
        } else {
            css_property_name(property)
        };
        let value = match value {
            StyleValue::Number(n) if *n != 0.0 && !UNITLESS_PROPERTIES.contains(&property.as_str()) => {
                format!("{}px", format_number(*n))
            }
            StyleValue::Number(n) => format_number(*n),
            StyleValue::Text(s) => s.trim().to_string(),
        };
        css.push(format!("{}: {}", name, value));
    }
    css.join("; ")
}

/// `backgroundColor` to `background-color`, `WebkitTransform` to `-webkit-transform`
fn css_property_name(property: &str) -> String {
    let name = kebab_case(property);
    if name.starts_with("webkit-") || name.starts_with("moz-") || name.starts_with("o-") {
        return format!("-{}", name);
    }
    if let Some(rest) = property.strip_prefix("ms") {
        if rest.starts_with(|c: char| c.is_ascii_uppercase()) {
            return format!("-{}", name);
        }
    }
    name
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Tag names come from untrusted code; keep only characters valid in a name
fn sanitize_tag(tag: &str) -> String {
    let cleaned = sanitize_name(tag);
    if cleaned.is_empty() {
        "div".to_string()
    } else {
        cleaned
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect()
}

pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}
