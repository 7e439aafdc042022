//! TSX to CommonJS transform built on tree-sitter
//!
//! The emitter walks the syntax tree and copies source text through, except
//! for node kinds it rewrites:
//!
//! - TypeScript-only syntax is removed (annotations, type parameters and
//!   arguments, interfaces, type aliases, overloads, modifiers, assertions)
//! - `enum` declarations become objects built by an IIFE
//! - ES module syntax becomes `require`/`exports` assignments; imports are
//!   `var` bindings so they may shadow capability parameters
//! - JSX becomes `React.createElement` calls
//!
//! Anything tree-sitter could not parse is reported as the first syntax error
//! with its position.

#![warn(clippy::all, rust_2018_idioms)]

use tree_sitter::{Language, Node, Parser};

use super::jsx::{clean_text, decode_entities, string_literal};
use super::{SourceLocation, SourceTransform, TransformError, TransformedModule};

/// Nodes that only exist for the type checker
const TYPE_ONLY_KINDS: &[&str] = &[
    "type_annotation",
    "omitting_type_annotation",
    "adding_type_annotation",
    "opting_type_annotation",
    "asserts_annotation",
    "type_predicate_annotation",
    "type_parameters",
    "type_arguments",
    "interface_declaration",
    "type_alias_declaration",
    "ambient_declaration",
    "function_signature",
    "abstract_method_signature",
    "index_signature",
    "method_signature",
    "implements_clause",
    "accessibility_modifier",
    "override_modifier",
    "hash_bang_line",
];

/// Modifier keywords with no runtime meaning
const DROPPED_KEYWORDS: &[&str] = &["abstract", "declare", "override", "readonly"];

/// Parents whose `?`/`!` tokens are optionality or definite-assignment markers
const MARKER_PARENTS: &[&str] = &[
    "optional_parameter",
    "public_field_definition",
    "method_definition",
    "variable_declarator",
];

const JSX_CHILD_KINDS: &[&str] = &[
    "jsx_expression",
    "jsx_element",
    "jsx_self_closing_element",
];

/// TSX transform using the tree-sitter TypeScript grammar
#[derive(Clone)]
pub struct TsxTransform {
    language: Language,
}

impl TsxTransform {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

impl Default for TsxTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TsxTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsxTransform").finish()
    }
}

impl SourceTransform for TsxTransform {
    fn name(&self) -> &str {
        "tsx"
    }

    fn transform(&self, source: &str) -> Result<TransformedModule, TransformError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| TransformError::new(format!("TSX grammar unavailable: {}", e), None))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| TransformError::new("Parser gave up on the source", None))?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(first_syntax_error(root, source));
        }

        let mut emitter = Emitter::new(source);
        let code = emitter.emit_program(root)?;
        trace_trace!(
            "Transformed {} bytes of TSX into {} bytes ({} imports, {} exports)",
            source.len(),
            code.len(),
            emitter.imports.len(),
            emitter.exports.len()
        );

        Ok(TransformedModule {
            code,
            imports: emitter.imports,
            exports: emitter.exports,
        })
    }
}

fn children_of<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn named_children_of<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    children_of(node)
        .iter()
        .any(|child| !child.is_named() && child.kind() == token)
}

fn location(node: Node<'_>) -> SourceLocation {
    let point = node.start_position();
    SourceLocation {
        line: point.row + 1,
        column: point.column + 1,
    }
}

fn unsupported(node: Node<'_>, what: &str) -> TransformError {
    TransformError::new(
        format!("{} are not supported in the preview", what),
        Some(location(node)),
    )
}

/// Locate the first ERROR or MISSING node in document order
fn first_syntax_error(root: Node<'_>, source: &str) -> TransformError {
    let mut node = root;
    'descend: loop {
        for child in children_of(node) {
            if child.is_missing() {
                let expected = if child.is_named() {
                    child.kind().replace('_', " ")
                } else {
                    format!("\"{}\"", child.kind())
                };
                return TransformError::new(format!("Expected {}", expected), Some(location(child)));
            }
            if child.is_error() {
                return describe_error_node(child, source);
            }
            if child.has_error() {
                node = child;
                continue 'descend;
            }
        }
        break;
    }
    TransformError::new("Invalid syntax", Some(location(node)))
}

fn describe_error_node(node: Node<'_>, source: &str) -> TransformError {
    let content_end = source.trim_end().len();
    if node.end_byte() >= content_end {
        let end = node.end_position();
        return TransformError::new(
            "Unexpected end of input",
            Some(SourceLocation {
                line: end.row + 1,
                column: end.column + 1,
            }),
        );
    }

    let mut leaf = node;
    while let Some(first) = children_of(leaf).into_iter().next() {
        leaf = first;
    }
    let token: String = source[leaf.byte_range()].chars().take(24).collect();
    if token.trim().is_empty() {
        TransformError::new("Unexpected token", Some(location(node)))
    } else {
        TransformError::new(format!("Unexpected token '{}'", token), Some(location(leaf)))
    }
}

/// Names bound by a binding pattern
fn pattern_names(node: Node<'_>, source: &str, out: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            out.push(source[node.byte_range()].to_string());
        }
        "pair_pattern" => {
            if let Some(value) = node.child_by_field_name("value") {
                pattern_names(value, source, out);
            }
        }
        "object_assignment_pattern" | "assignment_pattern" => {
            if let Some(left) = node.child_by_field_name("left") {
                pattern_names(left, source, out);
            }
        }
        "object_pattern" | "array_pattern" | "rest_pattern" => {
            for child in named_children_of(node) {
                pattern_names(child, source, out);
            }
        }
        _ => {}
    }
}

/// Names a declaration introduces at module scope
fn declared_names(decl: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    match decl.kind() {
        "lexical_declaration" | "variable_declaration" => {
            for declarator in named_children_of(decl) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                if let Some(name) = declarator.child_by_field_name("name") {
                    pattern_names(name, source, &mut names);
                }
            }
        }
        _ => {
            if let Some(name) = decl.child_by_field_name("name") {
                names.push(source[name.byte_range()].to_string());
            }
        }
    }
    names
}

fn is_identifier_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// `object.key` or `object["key"]`
fn member(object: &str, key: &str) -> String {
    if is_identifier_name(key) {
        format!("{}.{}", object, key)
    } else {
        format!("{}[{}]", object, string_literal(key))
    }
}

fn format_enum_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

struct Emitter<'s> {
    src: &'s str,
    imports: Vec<String>,
    exports: Vec<String>,
    deferred_exports: Vec<String>,
    temp_seq: usize,
    module_syntax: bool,
}

type EmitResult = Result<(), TransformError>;

impl<'s> Emitter<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            imports: Vec::new(),
            exports: Vec::new(),
            deferred_exports: Vec::new(),
            temp_seq: 0,
            module_syntax: false,
        }
    }

    fn text(&self, node: Node<'_>) -> &'s str {
        &self.src[node.byte_range()]
    }

    /// Text of a string literal node without its quotes
    fn string_value(&self, node: Node<'_>) -> String {
        let raw = self.text(node);
        if raw.len() >= 2 {
            raw[1..raw.len() - 1].to_string()
        } else {
            raw.to_string()
        }
    }

    fn temp(&mut self, prefix: &str) -> String {
        let name = format!("__{}{}", prefix, self.temp_seq);
        self.temp_seq += 1;
        name
    }

    fn emit_program(&mut self, root: Node<'_>) -> Result<String, TransformError> {
        let mut body = String::new();
        self.emit_children(root, &mut body)?;
        for assignment in std::mem::take(&mut self.deferred_exports) {
            body.push('\n');
            body.push_str(&assignment);
        }

        let mut code = String::from("\"use strict\";");
        if self.module_syntax {
            code.push_str(" Object.defineProperty(exports, \"__esModule\", { value: true });");
        }
        // Block scope lets top-level declarations shadow capability parameters.
        code.push_str("\n{\n");
        code.push_str(&body);
        code.push_str("\n}\n");
        Ok(code)
    }

    fn emit_to_string(&mut self, node: Node<'_>) -> Result<String, TransformError> {
        let mut out = String::new();
        self.emit(node, &mut out)?;
        Ok(out)
    }

    fn emit(&mut self, node: Node<'_>, out: &mut String) -> EmitResult {
        let kind = node.kind();
        if TYPE_ONLY_KINDS.contains(&kind) {
            return Ok(());
        }
        match kind {
            "import_statement" => self.emit_import(node, out),
            "export_statement" => self.emit_export(node, out),
            "enum_declaration" => self.emit_enum(node, out),
            "module" | "internal_module" => Err(unsupported(node, "TypeScript namespaces")),
            "import_alias" => Err(unsupported(node, "Import aliases")),
            "decorator" => Err(unsupported(node, "Decorators")),
            "as_expression" | "satisfies_expression" | "non_null_expression"
            | "instantiation_expression" => match named_children_of(node).first() {
                Some(expression) => self.emit(*expression, out),
                None => Ok(()),
            },
            "public_field_definition" if has_token(node, "declare") || has_token(node, "abstract") => {
                Ok(())
            }
            "required_parameter" | "optional_parameter"
                if has_token(node, "readonly")
                    || children_of(node)
                        .iter()
                        .any(|child| child.kind() == "accessibility_modifier") =>
            {
                Err(unsupported(node, "Constructor parameter properties"))
            }
            "jsx_element" | "jsx_self_closing_element" => self.emit_jsx(node, out),
            _ => self.emit_children(node, out),
        }
    }

    /// Copy the node's text, emitting each child through [`Emitter::emit`]
    fn emit_children(&mut self, node: Node<'_>, out: &mut String) -> EmitResult {
        let parent_kind = node.kind();
        let mut pos = node.start_byte();
        for child in children_of(node) {
            out.push_str(&self.src[pos..child.start_byte()]);
            pos = child.end_byte();
            if !child.is_named() {
                let token = child.kind();
                if DROPPED_KEYWORDS.contains(&token) {
                    continue;
                }
                if (token == "?" || token == "!") && MARKER_PARENTS.contains(&parent_kind) {
                    continue;
                }
            }
            self.emit(child, out)?;
        }
        out.push_str(&self.src[pos..node.end_byte()]);
        Ok(())
    }

    // ------------------------------------------------------------- modules

    fn emit_import(&mut self, node: Node<'_>, out: &mut String) -> EmitResult {
        self.module_syntax = true;
        let children = children_of(node);
        if children.iter().any(|c| c.kind() == "import_require_clause") {
            return Err(unsupported(node, "`import x = require()` declarations"));
        }
        // import type { ... } from '...'
        if children.iter().any(|c| !c.is_named() && c.kind() == "type") {
            return Ok(());
        }

        let Some(source) = node.child_by_field_name("source") else {
            return Err(TransformError::new("Import without a module specifier", Some(location(node))));
        };
        let specifier = self.string_value(source);
        let require = format!("require({})", self.text(source));

        let Some(clause) = children.iter().find(|c| c.kind() == "import_clause") else {
            // Side-effect import
            self.imports.push(specifier);
            out.push_str(&require);
            out.push(';');
            return Ok(());
        };

        let mut default_binding = None;
        let mut namespace_binding = None;
        let mut named = Vec::new();
        for part in named_children_of(*clause) {
            match part.kind() {
                "identifier" => default_binding = Some(self.text(part).to_string()),
                "namespace_import" => {
                    if let Some(id) = named_children_of(part).into_iter().find(|n| n.kind() == "identifier") {
                        namespace_binding = Some(self.text(id).to_string());
                    }
                }
                "named_imports" => {
                    for spec in named_children_of(part) {
                        if spec.kind() != "import_specifier" || has_token(spec, "type") {
                            continue;
                        }
                        let Some(name) = spec.child_by_field_name("name") else { continue };
                        let imported = if name.kind() == "string" {
                            self.string_value(name)
                        } else {
                            self.text(name).to_string()
                        };
                        let local = match spec.child_by_field_name("alias") {
                            Some(alias) => self.text(alias).to_string(),
                            None => imported.clone(),
                        };
                        named.push((imported, local));
                    }
                }
                _ => {}
            }
        }

        if default_binding.is_none() && namespace_binding.is_none() && named.is_empty() {
            // Only type specifiers
            return Ok(());
        }
        self.imports.push(specifier);

        let module = self.temp("import");
        let mut statements = vec![format!("var {} = {};", module, require)];
        if let Some(namespace) = namespace_binding {
            statements.push(format!("var {} = {};", namespace, module));
        }
        if let Some(default) = default_binding {
            statements.push(format!(
                "var {} = {m} && {m}.__esModule ? {m}.default : {m};",
                default,
                m = module
            ));
        }
        for (imported, local) in named {
            statements.push(format!("var {} = {};", local, member(&module, &imported)));
        }
        out.push_str(&statements.join(" "));
        Ok(())
    }

    fn emit_export(&mut self, node: Node<'_>, out: &mut String) -> EmitResult {
        self.module_syntax = true;
        let children = children_of(node);
        if children.iter().any(|c| c.kind() == "decorator") {
            return Err(unsupported(node, "Decorators"));
        }
        let token = |name: &str| children.iter().any(|c| !c.is_named() && c.kind() == name);
        let is_default = token("default");

        if let Some(decl) = node.child_by_field_name("declaration") {
            match decl.kind() {
                "interface_declaration" | "type_alias_declaration" | "ambient_declaration"
                | "function_signature" => return Ok(()),
                "module" | "internal_module" => return Err(unsupported(decl, "TypeScript namespaces")),
                _ => {}
            }
            self.emit(decl, out)?;
            let names = declared_names(decl, self.src);
            if is_default {
                if let Some(name) = names.first() {
                    out.push_str(&format!(" exports.default = {};", name));
                    self.exports.push("default".to_string());
                }
            } else {
                for name in names {
                    out.push_str(&format!(" {} = {};", member("exports", &name), name));
                    self.exports.push(name);
                }
            }
            return Ok(());
        }

        // export = value
        if token("=") {
            if let Some(value) = named_children_of(node).into_iter().next() {
                let value = self.emit_to_string(value)?;
                out.push_str(&format!("module.exports = {};", value));
            }
            return Ok(());
        }

        if let Some(value) = node.child_by_field_name("value") {
            let value = self.emit_to_string(value)?;
            out.push_str(&format!("exports.default = {};", value));
            self.exports.push("default".to_string());
            return Ok(());
        }

        // export type { ... } and `export as namespace X`
        if token("type") || token("namespace") {
            return Ok(());
        }

        let source = node.child_by_field_name("source");
        if let Some(clause) = children.iter().find(|c| c.kind() == "export_clause") {
            let mut pairs = Vec::new();
            for spec in named_children_of(*clause) {
                if spec.kind() != "export_specifier" || has_token(spec, "type") {
                    continue;
                }
                let Some(name) = spec.child_by_field_name("name") else { continue };
                let local = if name.kind() == "string" {
                    self.string_value(name)
                } else {
                    self.text(name).to_string()
                };
                let exported = match spec.child_by_field_name("alias") {
                    Some(alias) if alias.kind() == "string" => self.string_value(alias),
                    Some(alias) => self.text(alias).to_string(),
                    None => local.clone(),
                };
                pairs.push((local, exported));
            }

            match source {
                Some(source) => {
                    let specifier = self.string_value(source);
                    self.imports.push(specifier);
                    let module = self.temp("reexport");
                    let mut statements = vec![format!("var {} = require({});", module, self.text(source))];
                    for (local, exported) in pairs {
                        statements.push(format!(
                            "{} = {};",
                            member("exports", &exported),
                            member(&module, &local)
                        ));
                        self.exports.push(exported);
                    }
                    out.push_str(&statements.join(" "));
                }
                None => {
                    // Assigned at the end so later declarations are initialized
                    for (local, exported) in pairs {
                        self.deferred_exports
                            .push(format!("{} = {};", member("exports", &exported), local));
                        self.exports.push(exported);
                    }
                }
            }
            return Ok(());
        }

        let Some(source) = source else {
            return Ok(());
        };
        let specifier = self.string_value(source);
        self.imports.push(specifier);

        // export * as ns from '...'
        if let Some(namespace) = children.iter().find(|c| c.kind() == "namespace_export") {
            if let Some(name) = named_children_of(*namespace).into_iter().next() {
                let exported = if name.kind() == "string" {
                    self.string_value(name)
                } else {
                    self.text(name).to_string()
                };
                out.push_str(&format!(
                    "{} = require({});",
                    member("exports", &exported),
                    self.text(source)
                ));
                self.exports.push(exported);
            }
            return Ok(());
        }

        // export * from '...'
        out.push_str(&format!(
            "(function (m) {{ for (var k in m) if (k !== \"default\" && !(k in exports)) exports[k] = m[k]; }})(require({}));",
            self.text(source)
        ));
        Ok(())
    }

    // --------------------------------------------------------------- enums

    fn emit_enum(&mut self, node: Node<'_>, out: &mut String) -> EmitResult {
        let Some(name_node) = node.child_by_field_name("name") else {
            return Err(TransformError::new("Enum without a name", Some(location(node))));
        };
        let name = self.text(name_node).to_string();
        let body = node.child_by_field_name("body");

        let mut members = Vec::new();
        // Previous member key and its value when it was a plain number
        let mut previous: Option<(String, Option<f64>)> = None;
        for member_node in body.map(named_children_of).unwrap_or_default() {
            let (key_node, value_node) = match member_node.kind() {
                "enum_assignment" => (
                    member_node.child_by_field_name("name"),
                    member_node.child_by_field_name("value"),
                ),
                "property_identifier" | "string" | "number" => (Some(member_node), None),
                _ => continue,
            };
            let Some(key_node) = key_node else { continue };
            let key = if key_node.kind() == "string" {
                string_literal(&self.string_value(key_node))
            } else {
                string_literal(self.text(key_node))
            };

            let (value, numeric, is_string) = match value_node {
                Some(value) => {
                    let is_string = matches!(value.kind(), "string" | "template_string");
                    let numeric = if value.kind() == "number" {
                        self.text(value).parse::<f64>().ok()
                    } else {
                        None
                    };
                    (self.emit_to_string(value)?, numeric, is_string)
                }
                None => match &previous {
                    None => ("0".to_string(), Some(0.0), false),
                    Some((_, Some(n))) => (format_enum_number(n + 1.0), Some(n + 1.0), false),
                    Some((prev_key, None)) => (format!("{}[{}] + 1", name, prev_key), None, false),
                },
            };

            if is_string {
                members.push(format!("{}[{}] = {};", name, key, value));
            } else {
                members.push(format!("{n}[{n}[{k}] = {v}] = {k};", n = name, k = key, v = value));
            }
            previous = Some((key, numeric));
        }

        out.push_str(&format!(
            "var {n}; (function ({n}) {{ {body} }})({n} || ({n} = {{}}));",
            n = name,
            body = members.join(" ")
        ));
        Ok(())
    }

    // ----------------------------------------------------------------- jsx

    fn emit_jsx(&mut self, node: Node<'_>, out: &mut String) -> EmitResult {
        let (opening, children) = match node.kind() {
            "jsx_self_closing_element" => (node, Vec::new()),
            _ => {
                let Some(opening) = node.child_by_field_name("open_tag") else {
                    return Err(TransformError::new("Malformed JSX element", Some(location(node))));
                };
                let closing_start = node
                    .child_by_field_name("close_tag")
                    .map(|c| c.start_byte())
                    .unwrap_or_else(|| node.end_byte());
                (opening, self.jsx_children(node, opening.end_byte(), closing_start)?)
            }
        };

        out.push_str("React.createElement(");
        match opening.child_by_field_name("name") {
            None => out.push_str("React.Fragment"),
            Some(name) => self.emit_jsx_name(name, out)?,
        }
        out.push_str(", ");
        self.emit_jsx_props(opening, out)?;
        for child in children {
            out.push_str(", ");
            out.push_str(&child);
        }
        out.push(')');
        Ok(())
    }

    fn emit_jsx_name(&mut self, name: Node<'_>, out: &mut String) -> EmitResult {
        let text = self.text(name);
        match name.kind() {
            "identifier" => {
                let intrinsic = text.starts_with(|c: char| c.is_ascii_lowercase()) || text.contains('-');
                if intrinsic {
                    out.push_str(&string_literal(text));
                } else {
                    out.push_str(text);
                }
            }
            "jsx_namespace_name" => out.push_str(&string_literal(text)),
            _ => self.emit(name, out)?,
        }
        Ok(())
    }

    fn emit_jsx_props(&mut self, opening: Node<'_>, out: &mut String) -> EmitResult {
        let attributes: Vec<Node<'_>> = {
            let mut cursor = opening.walk();
            opening
                .children_by_field_name("attribute", &mut cursor)
                .collect()
        };
        if attributes.is_empty() {
            out.push_str("null");
            return Ok(());
        }

        let mut props = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            match attribute.kind() {
                "jsx_attribute" => {
                    let parts = named_children_of(attribute);
                    let Some(name) = parts.first() else { continue };
                    let key = string_literal(self.text(*name));
                    let value = match parts.get(1) {
                        None => "true".to_string(),
                        Some(value) => self.jsx_attribute_value(*value)?,
                    };
                    props.push(format!("{}: {}", key, value));
                }
                "jsx_expression" => {
                    // {...props}
                    let Some(spread) = named_children_of(attribute).into_iter().next() else {
                        continue;
                    };
                    let argument = match spread.kind() {
                        "spread_element" => named_children_of(spread).into_iter().next(),
                        _ => Some(spread),
                    };
                    if let Some(argument) = argument {
                        props.push(format!("...{}", self.emit_to_string(argument)?));
                    }
                }
                _ => {}
            }
        }
        out.push('{');
        out.push_str(&props.join(", "));
        out.push('}');
        Ok(())
    }

    fn jsx_attribute_value(&mut self, value: Node<'_>) -> Result<String, TransformError> {
        match value.kind() {
            "string" => Ok(string_literal(&decode_entities(&self.string_value(value)))),
            "jsx_expression" => match named_children_of(value).into_iter().next() {
                Some(expression) => self.emit_to_string(expression),
                None => Err(TransformError::new(
                    "JSX attributes must only be assigned a non-empty expression",
                    Some(location(value)),
                )),
            },
            _ => self.emit_to_string(value),
        }
    }

    /// Child expressions of an element, text runs included
    fn jsx_children(
        &mut self,
        element: Node<'_>,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, TransformError> {
        let mut children = Vec::new();
        let mut pos = start;
        for child in children_of(element) {
            if child.start_byte() < start || child.end_byte() > end {
                continue;
            }
            if !JSX_CHILD_KINDS.contains(&child.kind()) {
                continue;
            }
            if let Some(text) = clean_text(&self.src[pos..child.start_byte()]) {
                children.push(string_literal(&text));
            }
            pos = child.end_byte();

            if child.kind() == "jsx_expression" {
                let Some(expression) = named_children_of(child).into_iter().next() else {
                    continue;
                };
                if expression.kind() == "spread_element" {
                    if let Some(argument) = named_children_of(expression).into_iter().next() {
                        children.push(format!("...{}", self.emit_to_string(argument)?));
                    }
                } else {
                    children.push(self.emit_to_string(expression)?);
                }
            } else {
                children.push(self.emit_to_string(child)?);
            }
        }
        if pos < end {
            if let Some(text) = clean_text(&self.src[pos..end]) {
                children.push(string_literal(&text));
            }
        }
        Ok(children)
    }
}
