//! Synthesizes the single self-contained Python program that wires candidate
//! code together with test assertions and the marker protocol.
//!
//! Instrumentation is always appended after the candidate text, and all
//! instrumentation identifiers carry the reserved `__vfy_` prefix so a
//! candidate shadowing unrelated names cannot suppress marker printing. This
//! naming convention is best-effort only; real isolation comes from the
//! sandbox executors.

use std::fmt::Write;

use serde_json::Value;

use crate::verifier::TestCase;

/// Builds the free-form-mode harness: candidate code, then the caller's test
/// snippet (expected to define `check(candidate)`), then instrumentation.
///
/// The assertion primitive `assert_` is defined at module level and is
/// additionally passed as a keyword argument when `check` declares an
/// `assert_` parameter, so snippets can take the override point explicitly
/// instead of relying on a patched builtin. Counts accumulated before an
/// uncaught raise are preserved in the aggregate markers.
pub fn build_snippet_harness(code: &str, function_name: &str, snippet: &str) -> String {
    format!(
        r#"{code}

{snippet}

import inspect as __vfy_inspect
import time as __vfy_time

class __VfyState:
    def __init__(self):
        self.case_id = 0
        self.passed = 0
        self.total = 0

__vfy_state = __VfyState()

def assert_(cond, msg=None):
    __vfy_state.case_id += 1
    __vfy_state.total += 1
    if cond:
        __vfy_state.passed += 1
        print("__CASE__", __vfy_state.case_id, "PASS")
    else:
        print("__CASE__", __vfy_state.case_id, "FAIL", msg or "")

try:
    __vfy_takes_assert = "assert_" in __vfy_inspect.signature(check).parameters
except Exception:
    __vfy_takes_assert = False

__vfy_t0 = __vfy_time.time()
try:
    if __vfy_takes_assert:
        check({function_name}, assert_=assert_)
    else:
        check({function_name})
except Exception as __vfy_e:
    print("__EXC__=", type(__vfy_e).__name__, str(__vfy_e))
__vfy_elapsed = __vfy_time.time() - __vfy_t0

print("__RESULT__=OK" if (__vfy_state.passed != 0 and __vfy_state.passed == __vfy_state.total) else "__RESULT__=FAIL")
print("__COUNTS__=", __vfy_state.passed, "/", __vfy_state.total)
print("__TIME__=", __vfy_elapsed)
"#
    )
}

/// Builds the structured-mode harness: candidate code, then one guarded
/// invocation per test case in input order, then the aggregate markers.
///
/// Each case calls `function_name` with its positional and named arguments
/// spliced as Python literals, compares the return value against `expected`
/// by equality, and prints one `__CASE__` line with the index, a 0/1 flag and
/// both reprs. A raise inside the call marks the case failed with an
/// exception tag instead of a result value.
pub fn build_structured_harness(code: &str, function_name: &str, cases: &[TestCase]) -> String {
    let mut block = String::new();
    for (i, case) in cases.iter().enumerate() {
        let args = py_args(&case.args);
        let kwargs = py_kwargs(&case.kwargs);
        let expected = py_literal(&case.expected);

        if !case.name.is_empty() {
            let _ = writeln!(block, "# {}", comment_text(&case.name));
        }
        let _ = write!(
            block,
            concat!(
                "try:\n",
                "    __vfy_res = {func}(*{args}, **{kwargs})\n",
                "    __vfy_ok = __vfy_res == {expected}\n",
                "except Exception as __vfy_e:\n",
                "    __vfy_res = \"__EXC__:{{}}:{{}}\".format(type(__vfy_e).__name__, __vfy_e)\n",
                "    __vfy_ok = False\n",
                "print(\"__CASE__\", {index}, int(__vfy_ok), repr(__vfy_res), repr({expected}))\n",
                "if __vfy_ok:\n",
                "    __vfy_passed += 1\n",
            ),
            func = function_name,
            args = args,
            kwargs = kwargs,
            expected = expected,
            index = i,
        );
    }

    format!(
        r#"{code}

import time as __vfy_time

__vfy_passed = 0
__vfy_total = {total}
__vfy_t0 = __vfy_time.time()
{block}__vfy_elapsed = __vfy_time.time() - __vfy_t0

print("__RESULT__=OK" if (__vfy_total > 0 and __vfy_passed == __vfy_total) else "__RESULT__=FAIL")
print("__COUNTS__=", __vfy_passed, "/", __vfy_total)
print("__TIME__=", __vfy_elapsed)
"#,
        total = cases.len(),
    )
}

/// Serializes a JSON value into Python literal syntax
///
/// Every embedded argument and expected value goes through this serializer,
/// never raw string splicing, so quotes, backslashes and control characters
/// in test data cannot break or alter the generated program.
pub fn py_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => py_string(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(py_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", py_string(k), py_literal(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn py_args(args: &[Value]) -> String {
    let inner: Vec<String> = args.iter().map(py_literal).collect();
    format!("[{}]", inner.join(", "))
}

fn py_kwargs(kwargs: &serde_json::Map<String, Value>) -> String {
    let inner: Vec<String> = kwargs
        .iter()
        .map(|(k, v)| format!("{}: {}", py_string(k), py_literal(v)))
        .collect();
    format!("{{{}}}", inner.join(", "))
}

/// Flattens a diagnostic label into a single comment-safe line
///
/// Case names come from external generators. A newline in a name would
/// terminate the comment and splice attacker-chosen code ahead of the guarded
/// calls, so every control character is replaced before splicing.
fn comment_text(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn py_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn case(args: Vec<Value>, expected: Value) -> TestCase {
        TestCase {
            name: String::new(),
            args,
            kwargs: serde_json::Map::new(),
            expected,
        }
    }

    #[test]
    fn literals_cover_all_json_types() {
        assert_eq!(py_literal(&json!(null)), "None");
        assert_eq!(py_literal(&json!(true)), "True");
        assert_eq!(py_literal(&json!(false)), "False");
        assert_eq!(py_literal(&json!(42)), "42");
        assert_eq!(py_literal(&json!(-1.5)), "-1.5");
        assert_eq!(py_literal(&json!("hi")), "\"hi\"");
        assert_eq!(py_literal(&json!([1, "a", null])), "[1, \"a\", None]");
        assert_eq!(py_literal(&json!({"k": [true]})), "{\"k\": [True]}");
    }

    #[test]
    fn string_literals_escape_quotes_and_control_characters() {
        assert_eq!(py_literal(&json!("a\"b")), "\"a\\\"b\"");
        assert_eq!(py_literal(&json!("a\\b")), "\"a\\\\b\"");
        assert_eq!(py_literal(&json!("a\nb\tc")), "\"a\\nb\\tc\"");
        assert_eq!(py_literal(&json!("bell\u{7}")), "\"bell\\u0007\"");
    }

    #[test]
    fn structured_harness_keeps_candidate_code_first() {
        let cases = vec![case(vec![json!(1), json!(2)], json!(3))];
        let program = build_structured_harness("def add(a, b):\n    return a + b", "add", &cases);

        let code_pos = program.find("def add").unwrap();
        let marker_pos = program.find("__vfy_total").unwrap();
        assert!(code_pos < marker_pos);
    }

    #[test]
    fn structured_harness_emits_one_guarded_call_per_case() {
        let cases = vec![
            case(vec![json!(1), json!(2)], json!(3)),
            case(vec![json!(2), json!(2)], json!(5)),
        ];
        let program = build_structured_harness("def add(a, b):\n    return a + b", "add", &cases);

        assert_eq!(program.matches("add(*[").count(), 2);
        assert!(program.contains("__vfy_total = 2"));
        assert!(program.contains("__vfy_res = add(*[1, 2], **{})"));
        assert!(program.contains("print(\"__CASE__\", 0, int(__vfy_ok)"));
        assert!(program.contains("print(\"__CASE__\", 1, int(__vfy_ok)"));
    }

    #[test]
    fn structured_harness_splices_kwargs_as_a_dict_literal() {
        let mut kwargs = serde_json::Map::new();
        kwargs.insert("base".to_string(), json!(16));
        let cases = vec![TestCase {
            name: "hex_parse".to_string(),
            args: vec![json!("ff")],
            kwargs,
            expected: json!(255),
        }];
        let program = build_structured_harness("def parse(s, base=10):\n    pass", "parse", &cases);

        assert!(program.contains("parse(*[\"ff\"], **{\"base\": 16})"));
        assert!(program.contains("# hex_parse"));
    }

    #[test]
    fn snippet_harness_orders_candidate_snippet_instrumentation() {
        let program = build_snippet_harness(
            "def f(x):\n    return x",
            "f",
            "def check(candidate):\n    assert_(candidate(1) == 1)",
        );

        let code_pos = program.find("def f(x)").unwrap();
        let snippet_pos = program.find("def check").unwrap();
        let assert_pos = program.find("def assert_").unwrap();
        assert!(code_pos < snippet_pos);
        assert!(snippet_pos < assert_pos);
        assert!(program.contains("check(f)"));
        assert!(program.contains("print(\"__COUNTS__=\","));
    }

    #[test]
    fn case_names_cannot_inject_code_into_the_harness() {
        let cases = vec![TestCase {
            name: "x\nprint(\"__RESULT__=OK\", flush=True)\nimport os\nos._exit(0)".to_string(),
            args: vec![json!(1), json!(2)],
            kwargs: serde_json::Map::new(),
            expected: json!(999),
        }];
        let program = build_structured_harness("def add(a, b):\n    return a + b", "add", &cases);

        // The whole name stays on one comment line; nothing from it reaches
        // column zero as executable code
        assert!(program.contains("# x print(\"__RESULT__=OK\", flush=True) import os os._exit(0)"));
        for line in program.lines() {
            assert!(
                !line.starts_with("print(\"__RESULT__=OK\""),
                "forged marker line leaked out of the comment: {line}"
            );
            assert!(!line.starts_with("import os"));
        }
    }

    #[test]
    fn snippet_harness_guards_the_signature_sniff_broadly() {
        // A snippet that never defines check must reach the guarded call and
        // die there with __EXC__ markers, not in the sniff
        let program = build_snippet_harness("def f(x):\n    return x", "f", "def chek(c):\n    pass");

        let sniff_pos = program.find("__vfy_inspect.signature(check)").unwrap();
        let guard_pos = program[sniff_pos..].find("except Exception:").unwrap() + sniff_pos;
        let call_pos = program.find("check(f)").unwrap();
        assert!(sniff_pos < guard_pos);
        assert!(guard_pos < call_pos);
        assert!(program.contains("print(\"__EXC__=\","));
    }
}
