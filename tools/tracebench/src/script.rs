//! Executing captured source text against a replay session.
//!
//! The recorder captures the benchmark's own code as text. Replaying it means
//! handing that text to something that can run it in a given scope object;
//! `ScriptExecutor` is that seam. `CallScriptExecutor` understands a small
//! statement language that is enough to drive stubs, accessors and the
//! verification hooks from a trace.

use crate::errors::ReplayError;
use crate::session::ReplaySession;
use crate::value::{ObjectId, Value};

/// The scope a source runs in: its `this`/variable object, plus the session.
pub struct ScriptScope<'a> {
    pub session: &'a mut ReplaySession,
    pub object: ObjectId,
}

pub trait ScriptExecutor {
    fn execute(&mut self, source: &str, scope: ScriptScope<'_>) -> Result<(), ReplayError>;
}

/// Runs call scripts. One statement per line, or several separated by `;`:
///
/// ```text
/// # comment
/// call document.getElementById("main")
/// new JSBNG__Image()
/// get document.cookie
/// set document.title = "x"
/// expect document.title == "x"
/// path 17
/// ```
#[derive(Debug, Default)]
pub struct CallScriptExecutor;

impl ScriptExecutor for CallScriptExecutor {
    fn execute(&mut self, source: &str, scope: ScriptScope<'_>) -> Result<(), ReplayError> {
        let ScriptScope { session, object } = scope;
        for (line_no, statement) in statements(source) {
            run_statement(session, object, statement)
                .map_err(|e| match e {
                    ReplayError::Script(msg) => ReplayError::Script(format!("line {line_no}: {msg}")),
                    other => other,
                })?;
        }
        Ok(())
    }
}

fn run_statement(
    session: &mut ReplaySession,
    scope: ObjectId,
    statement: &str,
) -> Result<(), ReplayError> {
    let (keyword, rest) = statement
        .split_once(char::is_whitespace)
        .map(|(keyword, rest)| (keyword, rest.trim()))
        .unwrap_or((statement, ""));
    match keyword {
        "call" => invoke(session, scope, rest, true).map(|_| ()),
        "new" => invoke(session, scope, rest, false).map(|_| ()),
        "get" => session.get_path(scope, require_path(rest)?).map(|_| ()),
        "set" => {
            let (path, json) = rest
                .split_once('=')
                .ok_or_else(|| ReplayError::Script(format!("expected `set <path> = <json>`, found `{statement}`")))?;
            let value = parse_value(session, json.trim())?;
            session.set_path(scope, require_path(path.trim())?, value)
        }
        "expect" => {
            let (path, json) = rest.split_once("==").ok_or_else(|| {
                ReplayError::Script(format!("expected `expect <path> == <json>`, found `{statement}`"))
            })?;
            let path = require_path(path.trim())?;
            let json = json.trim();
            let expected = parse_value(session, json)?;
            let (owner, prop) = session.resolve_owner(scope, path)?;
            let obj_name = path.rsplit_once('.').map(|(head, _)| head).unwrap_or("this");
            session.verify_set(obj_name, owner, prop, json, &expected)
        }
        "path" => session.verify_path(require_path(rest)?),
        _ => Err(ReplayError::Script(format!("unknown statement `{statement}`"))),
    }
}

fn invoke(
    session: &mut ReplaySession,
    scope: ObjectId,
    expr: &str,
    is_call: bool,
) -> Result<Value, ReplayError> {
    let (path, args) = expr
        .split_once('(')
        .ok_or_else(|| ReplayError::Script(format!("expected `<path>(<args>)`, found `{expr}`")))?;
    let inner = args
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| ReplayError::Script(format!("unclosed argument list in `{expr}`")))?;
    let path = require_path(path.trim())?;

    let raw: Vec<serde_json::Value> = serde_json::from_str(&format!("[{inner}]"))
        .map_err(|e| ReplayError::Script(format!("bad arguments for {path}: {e}")))?;
    let mut args = Vec::with_capacity(raw.len());
    for arg in &raw {
        args.push(session.materialize(arg)?);
    }

    let (owner, prop) = session.resolve_owner(scope, path)?;
    let callee = session.get_property(owner, prop)?;
    let Value::Function(stub) = callee else {
        return Err(ReplayError::NotCallable(path.to_string()));
    };
    let this = if is_call {
        Value::Object(owner)
    } else {
        Value::Undefined
    };
    session.invoke_stub(stub, this, args, is_call)
}

fn parse_value(session: &mut ReplaySession, json: &str) -> Result<Value, ReplayError> {
    let raw: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ReplayError::Script(format!("bad value `{json}`: {e}")))?;
    session.materialize(&raw)
}

fn require_path(path: &str) -> Result<&str, ReplayError> {
    if path.is_empty() || path.contains(char::is_whitespace) {
        return Err(ReplayError::Script(format!("expected a path, found `{path}`")));
    }
    Ok(path)
}

/// Splits a script into `(line number, statement)` pairs. `;` inside JSON
/// strings does not end a statement.
fn statements(source: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let mut start = 0;
        let mut in_string = false;
        let mut escaped = false;
        for (pos, ch) in line.char_indices() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                ';' => {
                    out.push((idx + 1, &line[start..pos]));
                    start = pos + 1;
                }
                _ => {}
            }
        }
        out.push((idx + 1, &line[start..]));
    }
    out.into_iter()
        .map(|(line_no, statement)| (line_no, statement.trim()))
        .filter(|(_, statement)| !statement.is_empty() && !statement.starts_with('#'))
        .collect()
}

/// Keeps every source it is handed without running it.
#[derive(Debug, Default)]
pub struct SourceLog {
    sources: Vec<(String, ObjectId)>,
}

impl SourceLog {
    pub fn sources(&self) -> &[(String, ObjectId)] {
        &self.sources
    }
}

impl ScriptExecutor for SourceLog {
    fn execute(&mut self, source: &str, scope: ScriptScope<'_>) -> Result<(), ReplayError> {
        self.sources.push((source.to_string(), scope.object));
        Ok(())
    }
}
