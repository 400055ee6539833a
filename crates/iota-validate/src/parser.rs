//! Tree-sitter based Go parser for locating the endpoint function.
//!
//! Walks the concrete syntax tree to extract:
//! - The package clause
//! - Top-level function declarations (methods are ignored)
//! - Parameter and result types of each candidate
//!
//! The first exported function of shape `func Name(p string) (string, error)`
//! is the endpoint.

use tree_sitter::{Node, Parser, Tree};

use crate::error::{Rejection, Result, ValidateError};
use crate::types::ValidatedEndpoint;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse Go source and find the endpoint function.
pub fn parse_endpoint(source: &str) -> Result<ValidatedEndpoint> {
    let tree = parse_go(source)?;
    let root = tree.root_node();
    let src = source.as_bytes();

    if root.has_error() {
        return Err(ValidateError::ParseError(describe_first_error(root)));
    }

    let package = find_package(root, src).ok_or(ValidateError::MissingPackage)?;

    let mut rejected = Vec::new();
    let mut cursor = root.walk();
    for decl in root.named_children(&mut cursor) {
        if decl.kind() != "function_declaration" {
            continue;
        }
        let Some(name_node) = decl.child_by_field_name("name") else {
            continue;
        };
        let function = node_text(&name_node, src).to_string();

        match check_signature(&decl, &function, src) {
            Ok(parameter) => {
                return Ok(ValidatedEndpoint {
                    package,
                    function,
                    parameter,
                });
            }
            Err(reason) => rejected.push(Rejection { function, reason }),
        }
    }

    Err(ValidateError::SignatureError { rejected })
}

fn parse_go(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| ValidateError::ParseError(format!("failed to set language: {e}")))?;
    parser
        .parse(source, None)
        .ok_or_else(|| ValidateError::ParseError("tree-sitter parse returned None".into()))
}

fn node_text<'a>(node: &Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

fn describe_first_error(root: Node) -> String {
    match first_error_node(root) {
        Some(node) => {
            let pos = node.start_position();
            if node.is_missing() {
                format!("{}:{}: missing {}", pos.row + 1, pos.column + 1, node.kind())
            } else {
                format!("{}:{}: syntax error", pos.row + 1, pos.column + 1)
            }
        }
        None => "syntax error".to_string(),
    }
}

fn first_error_node(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error_node)
}

fn find_package(root: Node, src: &[u8]) -> Option<String> {
    let mut cursor = root.walk();
    let clause = root
        .named_children(&mut cursor)
        .find(|n| n.kind() == "package_clause")?;
    let mut clause_cursor = clause.walk();
    let ident = clause
        .named_children(&mut clause_cursor)
        .find(|n| n.kind() == "package_identifier")?;
    Some(node_text(&ident, src).to_string())
}

// ---------------------------------------------------------------------------
// Signature checks
// ---------------------------------------------------------------------------

/// A flattened parameter: `a, b string` yields two entries.
#[derive(Debug)]
struct Param {
    name: Option<String>,
    ty: String,
}

/// Returns the parameter name on success, or the rejection reason.
fn check_signature(
    decl: &Node,
    function: &str,
    src: &[u8],
) -> std::result::Result<String, String> {
    if !is_exported(function) {
        return Err("not exported".to_string());
    }
    if !function.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("function name must be ASCII".to_string());
    }
    if decl.child_by_field_name("type_parameters").is_some() {
        return Err("generic functions are not supported".to_string());
    }

    let params_node = decl
        .child_by_field_name("parameters")
        .ok_or_else(|| "no parameter list".to_string())?;
    let params = flatten_params(&params_node, src)?;
    let [param] = params.as_slice() else {
        return Err(format!("expected 1 parameter, found {}", params.len()));
    };
    if param.ty != "string" {
        return Err(format!("parameter is {}, not string", param.ty));
    }
    let parameter = match &param.name {
        Some(name) if name != "_" => name.clone(),
        _ => return Err("parameter must be named".to_string()),
    };

    let result_node = decl
        .child_by_field_name("result")
        .ok_or_else(|| "no return values".to_string())?;
    if result_node.kind() != "parameter_list" {
        return Err("expected 2 return values, found 1".to_string());
    }
    let results = flatten_params(&result_node, src)?;
    let [first, second] = results.as_slice() else {
        return Err(format!("expected 2 return values, found {}", results.len()));
    };
    if first.ty != "string" {
        return Err(format!("first return value is {}, not string", first.ty));
    }
    if second.ty != "error" {
        return Err(format!("second return value is {}, not error", second.ty));
    }

    Ok(parameter)
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

fn flatten_params(list: &Node, src: &[u8]) -> std::result::Result<Vec<Param>, String> {
    let mut out = Vec::new();
    let mut cursor = list.walk();
    for child in list.named_children(&mut cursor) {
        match child.kind() {
            "parameter_declaration" => {
                let ty = child
                    .child_by_field_name("type")
                    .map(|t| node_text(&t, src).to_string())
                    .ok_or_else(|| "parameter without a type".to_string())?;
                let mut name_cursor = child.walk();
                let names: Vec<String> = child
                    .children_by_field_name("name", &mut name_cursor)
                    .map(|n| node_text(&n, src).to_string())
                    .collect();
                if names.is_empty() {
                    out.push(Param { name: None, ty });
                } else {
                    for name in names {
                        out.push(Param {
                            name: Some(name),
                            ty: ty.clone(),
                        });
                    }
                }
            }
            "variadic_parameter_declaration" => {
                return Err("variadic parameters are not supported".to_string());
            }
            // comments
            _ => {}
        }
    }
    Ok(out)
}
