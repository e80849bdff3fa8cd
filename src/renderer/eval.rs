//! Program execution
//!
//! Walks a compiled [`Program`] and writes into an explicit output buffer. Nested
//! partials and includes go through the [`ViewApi`] bound for this execution.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::{json, Value};

use super::bridge::ViewApi;
use super::renderable::Data;
use crate::compiler::{BinaryOp, Expr, Node, Program};
use crate::RenderError;

/// Execute a program against `data`, returning its complete output
pub fn execute(program: &Program, data: &Data, api: &ViewApi<'_>) -> Result<String, RenderError> {
    let mut out = String::new();
    let mut scope = Scope::new(data);
    run(&program.nodes, &mut scope, api, &mut out)?;
    Ok(out)
}

/// Variable lookup: loop bindings shadow the template's data
struct Scope<'a> {
    globals: &'a Data,
    locals: Vec<(String, Value)>,
}

impl<'a> Scope<'a> {
    fn new(globals: &'a Data) -> Self {
        Self {
            globals,
            locals: Vec::new(),
        }
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .or_else(|| self.globals.get(name))
    }
}

fn run(
    nodes: &[Node],
    scope: &mut Scope<'_>,
    api: &ViewApi<'_>,
    out: &mut String,
) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            Node::Text { text } => out.push_str(text),
            Node::Echo { expr, escape } => {
                let value = evaluate(expr, scope);
                let text = display(&value);
                if *escape {
                    out.push_str(&html_escape(&text));
                } else {
                    out.push_str(&text);
                }
            }
            Node::If {
                branches,
                otherwise,
            } => {
                let taken = branches
                    .iter()
                    .find(|b| truthy(&evaluate(&b.condition, scope)));
                match (taken, otherwise) {
                    (Some(branch), _) => run(&branch.body, scope, api, out)?,
                    (None, Some(body)) => run(body, scope, api, out)?,
                    (None, None) => {}
                }
            }
            Node::Foreach {
                iterable,
                key,
                value,
                body,
            } => {
                let entries = iterate(evaluate(iterable, scope));
                let count = entries.len();
                for (index, (entry_key, entry_value)) in entries.into_iter().enumerate() {
                    let mark = scope.locals.len();
                    scope.locals.push((
                        "loop".to_string(),
                        json!({
                            "index": index,
                            "iteration": index + 1,
                            "first": index == 0,
                            "last": index + 1 == count,
                            "count": count,
                        }),
                    ));
                    if let Some(key) = key {
                        scope.locals.push((key.clone(), entry_key));
                    }
                    scope.locals.push((value.clone(), entry_value));

                    let result = run(body, scope, api, out);
                    scope.locals.truncate(mark);
                    result?;
                }
            }
            Node::Partial { name } => out.push_str(&api.render_partial(name)?),
            Node::Include { path, data } => {
                let data = match data.as_ref().map(|d| evaluate(d, scope)) {
                    Some(Value::Object(map)) => map,
                    _ => Data::new(),
                };
                out.push_str(&api.include(path, &data)?);
            }
        }
    }
    Ok(())
}

/// Entries of an iterable value; anything else iterates zero times
fn iterate(value: Value) -> Vec<(Value, Value)> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::from(i), v))
            .collect(),
        Value::Object(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
        _ => Vec::new(),
    }
}

fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Path(segments) => lookup(segments, scope),
        Expr::List(items) => Value::Array(items.iter().map(|e| evaluate(e, scope)).collect()),
        Expr::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, e)| (k.clone(), evaluate(e, scope)))
                .collect(),
        ),
        Expr::Not(inner) => Value::Bool(!truthy(&evaluate(inner, scope))),
        Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::And => {
                Value::Bool(truthy(&evaluate(lhs, scope)) && truthy(&evaluate(rhs, scope)))
            }
            BinaryOp::Or => {
                Value::Bool(truthy(&evaluate(lhs, scope)) || truthy(&evaluate(rhs, scope)))
            }
            op => {
                let (lhs, rhs) = (evaluate(lhs, scope), evaluate(rhs, scope));
                Value::Bool(compare(*op, &lhs, &rhs))
            }
        },
    }
}

/// Resolve a dotted path; missing segments yield `null`
fn lookup(segments: &[String], scope: &Scope<'_>) -> Value {
    let Some((first, rest)) = segments.split_first() else {
        return Value::Null;
    };
    let mut current = match scope.get(first) {
        Some(value) => value,
        None => return Value::Null,
    };
    for segment in rest {
        let next = match current {
            Value::Object(map) => map.get(segment.as_str()),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        BinaryOp::Eq => loosely_equal(lhs, rhs),
        BinaryOp::Ne => !loosely_equal(lhs, rhs),
        BinaryOp::Lt => ordering(lhs, rhs) == Some(Ordering::Less),
        BinaryOp::Le => matches!(ordering(lhs, rhs), Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Gt => ordering(lhs, rhs) == Some(Ordering::Greater),
        BinaryOp::Ge => matches!(
            ordering(lhs, rhs),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        BinaryOp::And | BinaryOp::Or => false,
    }
}

/// Equality that treats `1` and `1.0` alike
fn loosely_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

/// Numbers compare numerically, strings lexically; other pairs are unordered
fn ordering(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text form of a value in output position
pub(crate) fn display(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s),
        Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        Value::Number(n) => Cow::Owned(n.to_string()),
        other => Cow::Owned(other.to_string()),
    }
}

/// Escape HTML special characters
pub(crate) fn html_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::renderer::{Dispatcher, RendererRegistry};
    use crate::template::{TemplateCache, TemplateDirectory, TemplateProcessingService};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn compile(source: &str) -> Program {
        Compiler::new(HashMap::<String, String>::new())
            .compile(source)
            .unwrap()
    }

    /// Execute with a bridge that has no partials and an empty template root
    fn render(source: &str, data: serde_json::Value) -> String {
        let dir = tempfile::tempdir().unwrap();
        let service = TemplateProcessingService::new(
            TemplateDirectory::new(dir.path()).unwrap(),
            TemplateCache::new(dir.path().join(".cache")),
        );
        let dispatcher = Dispatcher::new(service, RendererRegistry::standard());
        let api = ViewApi::new(&dispatcher, None, 0);
        let data = match data {
            Value::Object(map) => map,
            _ => Data::new(),
        };
        execute(&compile(source), &data, &api).unwrap()
    }

    #[test]
    fn test_echo_escapes_and_raw_does_not() {
        assert_eq!(
            render("{{ x }}|{!! x !!}", json!({"x": "<b>\"A&B\"</b>"})),
            "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;|<b>\"A&B\"</b>"
        );
    }

    #[test]
    fn test_echo_formats_values() {
        assert_eq!(
            render(
                "{{ s }} {{ i }} {{ f }} {{ t }} [{{ n }}] {!! l !!} {{ missing }}",
                json!({"s": "x", "i": 3, "f": 1.5, "t": true, "n": null, "l": [1, "a"]})
            ),
            "x 3 1.5 true [] [1,\"a\"] "
        );
    }

    #[test]
    fn test_dotted_paths() {
        assert_eq!(
            render(
                "{{ user.name }} {{ items.1 }} {{ user.missing.deep }}",
                json!({"user": {"name": "Ada"}, "items": ["a", "b"]})
            ),
            "Ada b "
        );
    }

    #[test]
    fn test_nested_indices_and_nested_maps() {
        assert_eq!(
            render(
                "{{ m.0.1 }}|{{ m.1.0 }}|{!! {a: {b: 1}} !!}",
                json!({"m": [["a", "b"], ["c"]]})
            ),
            "b|c|{\"a\":{\"b\":1}}"
        );
    }

    #[test]
    fn test_conditionals() {
        let source = "@if(n > 10)big @elseif(n > 1)mid @else small @endif";
        assert_eq!(render(source, json!({"n": 20})), "big ");
        assert_eq!(render(source, json!({"n": 5})), "mid ");
        assert_eq!(render(source, json!({"n": 0})), " small ");
    }

    #[test]
    fn test_logic_and_comparison() {
        let source = "@if(a && !b || c == 'x')[yes]@else[no]@endif";
        assert_eq!(render(source, json!({"a": 1, "b": false})), "[yes]");
        assert_eq!(render(source, json!({"a": 0, "c": "x"})), "[yes]");
        assert_eq!(render(source, json!({"a": 0, "c": "y"})), "[no]");
        assert_eq!(render("@if(1 == 1.0)eq @endif", json!({})), "eq ");
        assert_eq!(render("@if('a' < 'b')<lt>@endif", json!({})), "<lt>");
        assert_eq!(render("@if('a' < 1)lt @else none @endif", json!({})), " none ");
    }

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            assert!(!truthy(&falsy), "{} should be falsy", falsy);
        }
        for truthy_value in [json!(true), json!(0.5), json!("0"), json!([0]), json!({"a": 0})] {
            assert!(truthy(&truthy_value), "{} should be truthy", truthy_value);
        }
    }

    #[test]
    fn test_foreach_with_loop_binding() {
        assert_eq!(
            render(
                "@foreach(items as item){{ loop.iteration }}/{{ loop.count }}:{{ item }}@if(!loop.last),@endif\n@endforeach",
                json!({"items": ["a", "b", "c"]})
            ),
            "1/3:a,\n2/3:b,\n3/3:c\n"
        );
    }

    #[test]
    fn test_foreach_over_map_with_key() {
        assert_eq!(
            render(
                "@foreach(prices as name => price){{ name }}={{ price }};@endforeach",
                json!({"prices": {"apple": 1, "pear": 2}})
            ),
            "apple=1;pear=2;"
        );
    }

    #[test]
    fn test_loop_variables_do_not_leak() {
        assert_eq!(
            render(
                "@foreach(items as item){{ item }}@endforeach|{{ item }}",
                json!({"items": [1, 2], "item": "outer"})
            ),
            "12|outer"
        );
    }

    #[test]
    fn test_foreach_over_non_iterable_is_empty() {
        assert_eq!(
            render("@foreach(x as i){{ i }}@endforeach.", json!({"x": "str"})),
            "."
        );
    }

    #[test]
    fn test_missing_partial_renders_nothing() {
        assert_eq!(render("[@partial('nav')]", json!({})), "[]");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("a < b & 'c'"), "a &lt; b &amp; &#039;c&#039;");
        assert_eq!(html_escape("plain"), "plain");
    }
}
