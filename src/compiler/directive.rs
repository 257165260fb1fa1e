//! Parser for `//#` node directives.
//!
//! WGSL has no attribute for graph metadata, so node declarations live in line
//! comments that start with `//#`. Directives accumulate until the next line that
//! declares a function and are attached to that function:
//!
//! ```wgsl
//! //# node(launch = thread, max_recursion = MAX_DEPTH, input = edges_in, launch_info = launch)
//! //# output(SnowflakeNode, max_records = 4, queue = edges_out)
//! @compute @workgroup_size(1)
//! fn SnowflakeNode(@builtin(global_invocation_id) id: vec3u) { ... }
//! ```

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::node::{NodeId, NodeLaunch};

/// Maximum recursion depth, either written inline or naming a `const` in the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecursionBound {
    Literal(u32),
    Constant(String),
}

/// Parsed `node(...)` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDirective {
    pub launch: NodeLaunch,
    /// Marked as a program entry even if some node targets it.
    pub entry: bool,
    /// Explicit identity; `None` leaves the node implicitly named after its function.
    pub id: Option<NodeId>,
    pub max_recursion: Option<RecursionBound>,
    /// Storage global holding this node's input queue.
    pub input: Option<String>,
    /// Uniform global receiving per-level launch constants.
    pub launch_info: Option<String>,
    /// Vertices emitted per input record (mesh nodes only).
    pub vertices: Option<u32>,
    pub line: usize,
}

/// Parsed `output(...)` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirective {
    /// Target node name; outputs address slot 0 of that name.
    pub target: String,
    pub max_records: u32,
    /// Storage global the producer appends records to.
    pub queue: String,
    pub line: usize,
}

/// All directives attached to one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDirectives {
    pub node: Option<NodeDirective>,
    pub outputs: Vec<OutputDirective>,
}

/// Parses every directive in `source`, keyed by the function each one annotates.
pub fn parse(source: &str) -> Result<HashMap<String, FunctionDirectives>> {
    let mut functions: HashMap<String, FunctionDirectives> = HashMap::new();
    let mut pending = FunctionDirectives::default();
    let mut pending_since: Option<usize> = None;

    for (i, text) in source.lines().enumerate() {
        let line = i + 1;
        let trimmed = text.trim();

        if let Some(body) = trimmed.strip_prefix("//#") {
            let (kind, args) = split_call(body.trim(), line)?;
            match kind {
                "node" => {
                    if pending.node.is_some() {
                        return Err(directive_error(line, "more than one node directive"));
                    }
                    pending.node = Some(parse_node(&args, line)?);
                }
                "output" => pending.outputs.push(parse_output(&args, line)?),
                other => {
                    return Err(directive_error(line, format!("unknown directive `{other}`")));
                }
            }
            pending_since.get_or_insert(line);
            continue;
        }

        if pending_since.is_none() {
            continue;
        }

        if let Some(name) = function_name(trimmed) {
            if pending.node.is_none() {
                return Err(directive_error(
                    pending_since.unwrap_or(line),
                    format!("outputs on `{name}` without a node directive"),
                ));
            }
            if functions.contains_key(name) {
                return Err(directive_error(line, format!("`{name}` annotated twice")));
            }
            functions.insert(name.to_string(), std::mem::take(&mut pending));
            pending_since = None;
        }
    }

    if let Some(line) = pending_since {
        return Err(directive_error(line, "directive is not followed by a function"));
    }

    Ok(functions)
}

fn directive_error(line: usize, message: impl Into<String>) -> Error {
    Error::Directive {
        line,
        message: message.into(),
    }
}

/// Returns the function name declared on this line, if any.
fn function_name(line: &str) -> Option<&str> {
    let start = if line.starts_with("fn ") {
        3
    } else {
        line.find(" fn ")? + 4
    };
    let rest = line[start..].trim_start();
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

/// Splits `kind(a, b = c)` into the kind and its arguments.
fn split_call(body: &str, line: usize) -> Result<(&str, Vec<Argument>)> {
    let open = body
        .find('(')
        .ok_or_else(|| directive_error(line, "expected `(`"))?;
    let close = body
        .rfind(')')
        .filter(|&close| close > open)
        .ok_or_else(|| directive_error(line, "expected `)`"))?;
    if !body[close + 1..].trim().is_empty() {
        return Err(directive_error(line, "unexpected text after `)`"));
    }

    let kind = body[..open].trim();
    let inner = body[open + 1..close].trim();
    let mut args = Vec::new();
    if !inner.is_empty() {
        for part in inner.split(',') {
            args.push(Argument::parse(part.trim(), line)?);
        }
    }
    Ok((kind, args))
}

#[derive(Debug)]
enum Argument {
    Flag(String),
    Pair(String, String),
}

impl Argument {
    fn parse(text: &str, line: usize) -> Result<Self> {
        if text.is_empty() {
            return Err(directive_error(line, "empty argument"));
        }
        match text.split_once('=') {
            Some((key, value)) => {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                Ok(Argument::Pair(key.trim().to_string(), value.to_string()))
            }
            None => Ok(Argument::Flag(text.to_string())),
        }
    }
}

fn parse_u32(key: &str, value: &str, line: usize) -> Result<u32> {
    value
        .parse()
        .map_err(|_| directive_error(line, format!("`{key}` expects an unsigned integer, got `{value}`")))
}

fn parse_node(args: &[Argument], line: usize) -> Result<NodeDirective> {
    let mut launch = None;
    let mut entry = false;
    let mut id_name = None;
    let mut id_index = None;
    let mut max_recursion = None;
    let mut input = None;
    let mut launch_info = None;
    let mut vertices = None;

    for arg in args {
        match arg {
            Argument::Flag(flag) if flag == "entry" => entry = true,
            Argument::Flag(flag) => {
                return Err(directive_error(line, format!("unknown flag `{flag}`")));
            }
            Argument::Pair(key, value) => match key.as_str() {
                "launch" => {
                    launch = Some(NodeLaunch::from_keyword(value.as_str()).ok_or_else(|| {
                        directive_error(line, format!("unknown launch `{value}`"))
                    })?)
                }
                "id" => id_name = Some(value.clone()),
                "index" => id_index = Some(parse_u32(key, value, line)?),
                "max_recursion" => {
                    max_recursion = Some(match value.parse::<u32>() {
                        Ok(depth) => RecursionBound::Literal(depth),
                        Err(_) => RecursionBound::Constant(value.clone()),
                    })
                }
                "input" => input = Some(value.clone()),
                "launch_info" => launch_info = Some(value.clone()),
                "vertices" => vertices = Some(parse_u32(key, value, line)?),
                other => return Err(directive_error(line, format!("unknown key `{other}`"))),
            },
        }
    }

    let launch = launch.ok_or_else(|| directive_error(line, "node directive needs `launch`"))?;
    let id = match (id_name, id_index) {
        (Some(name), index) => Some(NodeId::new(name, index.unwrap_or(0))),
        (None, Some(_)) => return Err(directive_error(line, "`index` needs an `id`")),
        (None, None) => None,
    };

    match launch {
        NodeLaunch::Mesh => {
            if vertices.is_none() {
                return Err(directive_error(line, "mesh nodes need `vertices`"));
            }
            if input.is_none() {
                return Err(directive_error(line, "mesh nodes need an `input` queue"));
            }
            if max_recursion.is_some() {
                return Err(directive_error(line, "mesh nodes cannot recurse"));
            }
        }
        NodeLaunch::Thread => {
            if vertices.is_some() {
                return Err(directive_error(line, "`vertices` only applies to mesh nodes"));
            }
        }
    }

    Ok(NodeDirective {
        launch,
        entry,
        id,
        max_recursion,
        input,
        launch_info,
        vertices,
        line,
    })
}

fn parse_output(args: &[Argument], line: usize) -> Result<OutputDirective> {
    let mut target = None;
    let mut max_records = None;
    let mut queue = None;

    for arg in args {
        match arg {
            Argument::Flag(name) if target.is_none() => target = Some(name.clone()),
            Argument::Flag(name) => {
                return Err(directive_error(line, format!("unexpected `{name}`")));
            }
            Argument::Pair(key, value) => match key.as_str() {
                "max_records" => max_records = Some(parse_u32(key, value, line)?),
                "queue" => queue = Some(value.clone()),
                other => return Err(directive_error(line, format!("unknown key `{other}`"))),
            },
        }
    }

    Ok(OutputDirective {
        target: target.ok_or_else(|| directive_error(line, "output needs a target node"))?,
        max_records: max_records
            .ok_or_else(|| directive_error(line, "output needs `max_records`"))?,
        queue: queue.ok_or_else(|| directive_error(line, "output needs a `queue`"))?,
        line,
    })
}
