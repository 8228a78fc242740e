use std::{fs, path::Path};

use lumen::{
    diagnostics::{DiagnosticKind, LumenError},
    runtime::{ExecutionContext, Interpreter},
    stdlib::BuiltinRegistry,
    value::{Value, ValueKind},
    BufferedHost,
};
use tempfile::tempdir;

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::new().with_host(BufferedHost::new());
    interpreter
        .eval_source(source)
        .expect("evaluation should succeed")
}

fn eval_error(source: &str) -> LumenError {
    let mut interpreter = Interpreter::new().with_host(BufferedHost::new());
    match interpreter.eval_source(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    }
}

/// Lines printed by a successful run.
fn output(source: &str) -> Vec<String> {
    let host = BufferedHost::new();
    let mut interpreter = Interpreter::new().with_host(host.clone());
    if let Err(err) = interpreter.eval_source(source) {
        panic!("evaluation failed: {err}");
    }
    host.lines()
}

fn expect_number(value: &Value) -> f64 {
    match value.kind() {
        ValueKind::Number(n) => *n,
        _ => panic!("expected number, found {}", value.type_name()),
    }
}

fn expect_string(value: &Value) -> &str {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected string, found {}", value.type_name()))
}

fn expect_diagnostic(err: &LumenError, kind: DiagnosticKind) -> String {
    match err.diagnostic() {
        Some(diag) if diag.kind == kind => diag.message.clone(),
        _ => panic!("expected {kind:?} diagnostic, found {err}"),
    }
}

fn path_literal(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

#[test]
fn adds_declared_variables() {
    assert_eq!(output("let x = 1\nlet y = 2\nprint x + y"), vec!["3"]);
}

#[test]
fn calls_declared_functions() {
    assert_eq!(
        output("fn add(a, b) { return a + b }\nprint add(2, 3)"),
        vec!["5"]
    );
}

#[test]
fn returns_last_expression_from_script() {
    let value = eval(
        r#"
        let x = 40
        x + 2
        "#,
    );
    assert_eq!(expect_number(&value), 42.0);
}

#[test]
fn top_level_return_stops_the_script() {
    let value = eval("return 7\nprint 1");
    assert_eq!(expect_number(&value), 7.0);
}

#[test]
fn loop_in_yields_array_values() {
    assert_eq!(
        output("let arr = [1,2,3]\nloop v in arr { print v }"),
        vec!["1", "2", "3"]
    );
}

#[test]
fn iteration_protocol_depends_on_runtime_type() {
    let lines = output(
        r#"
        for ch in "abc" { print ch }
        for key in { a: 1, b: 2 } { print key }
        for value of { a: 1, b: 2 } { print value }
        for item of [true, null] { print item }
        "#,
    );
    assert_eq!(lines, vec!["a", "b", "c", "a", "b", "1", "2", "true", "null"]);
}

#[test]
fn iterating_a_number_is_an_error() {
    let err = eval_error("for x in 5 { }");
    let message = expect_diagnostic(&err, DiagnosticKind::Runtime);
    assert!(message.contains("not iterable"));
}

#[test]
fn throw_skips_the_rest_of_the_try_block() {
    assert_eq!(
        output(r#"try { throw "boom"; print "unreachable" } catch(e) { print e }"#),
        vec!["boom"]
    );
}

#[test]
fn subclass_inherits_parent_method() {
    assert_eq!(
        output(r#"class A { speak(){ return "A" } } class B extends A {} print new B().speak()"#),
        vec!["A"]
    );
}

#[test]
fn nullish_coalescing_keeps_falsy_values() {
    assert_eq!(
        output("let a = 0 ?? 5\nlet b = null ?? 5\nlet c = undefined ?? \"\" ?? 1\nprint a, b, c"),
        vec!["0 5 "]
    );
}

#[test]
fn closures_outlive_their_frame() {
    let lines = output(
        r#"
        fn make_counter() {
            let count = 0
            return () => {
                count += 1
                return count
            }
        }
        let counter = make_counter()
        counter()
        counter()
        print counter()
        "#,
    );
    assert_eq!(lines, vec!["3"]);
}

#[test]
fn closures_share_captured_environment() {
    let lines = output(
        r#"
        fn pair() {
            let n = 0
            return { inc: () => { n += 1 }, get: () => n }
        }
        let p = pair()
        p.inc()
        p.inc()
        print p.get()
        "#,
    );
    assert_eq!(lines, vec!["2"]);
}

#[test]
fn functions_close_over_definition_scope_not_caller() {
    let lines = output(
        r#"
        let label = "outer"
        fn show() { return label }
        fn call_with_shadow() {
            let label = "inner"
            return show()
        }
        print call_with_shadow()
        "#,
    );
    assert_eq!(lines, vec!["outer"]);
}

#[test]
fn inner_block_shadowing_does_not_leak() {
    let lines = output(
        r#"
        let x = 1
        {
            let x = 2
            print x
        }
        if true { let x = 3 }
        loop i from 1 to 2 { let x = i * 10 }
        print x
        "#,
    );
    assert_eq!(lines, vec!["2", "1"]);
}

#[test]
fn const_reassignment_fails_at_any_depth() {
    let err = eval_error("const x = 1\nx = 2");
    let message = expect_diagnostic(&err, DiagnosticKind::Runtime);
    assert!(message.contains("cannot reassign constant `x`"));

    let err = eval_error(
        r#"
        const limit = 10
        fn bump() {
            if true {
                loop i from 1 to 1 { limit += i }
            }
        }
        bump()
        "#,
    );
    assert!(expect_diagnostic(&err, DiagnosticKind::Runtime).contains("constant `limit`"));
    assert_eq!(err.line(), Some(5));
}

#[test]
fn undefined_variable_reports_line() {
    let err = eval_error("let a = 1\n\nprint nope");
    let message = expect_diagnostic(&err, DiagnosticKind::Runtime);
    assert!(message.contains("undefined variable `nope`"));
    assert_eq!(err.line(), Some(3));
}

#[test]
fn calling_non_callable_fails() {
    let err = eval_error("let x = 5\nx()");
    assert!(expect_diagnostic(&err, DiagnosticKind::Runtime).contains("not callable"));

    let err = eval_error("class A {}\nA()");
    assert!(expect_diagnostic(&err, DiagnosticKind::Runtime).contains("with `new`"));
}

#[test]
fn inherited_methods_bind_this_to_subclass_instance() {
    let lines = output(
        r#"
        class Animal {
            constructor(name) { this.name = name }
            describe() { return this.name + " says " + this.sound() }
            sound() { return "..." }
        }
        class Dog extends Animal {
            sound() { return "woof" }
        }
        print new Dog("Rex").describe()
        "#,
    );
    assert_eq!(lines, vec!["Rex says woof"]);
}

#[test]
fn super_calls_reach_parent_constructor_and_methods() {
    let lines = output(
        r#"
        class A {
            constructor(x) { this.x = x }
            greet() { return "A" + this.x }
        }
        class B extends A {
            constructor(x) { super(x * 2) }
            greet() { return "B" + super.greet() }
        }
        print new B(2).greet()
        "#,
    );
    assert_eq!(lines, vec!["BA4"]);
}

#[test]
fn method_lookup_searches_one_parent_level() {
    let lines = output(
        r#"
        class A { hello() { return "hi" } }
        class B extends A {}
        class C extends B {}
        let c = new C()
        print typeof c.hello, c instanceof A, c instanceof B, new B().hello()
        "#,
    );
    assert_eq!(lines, vec!["undefined true true hi"]);
}

#[test]
fn default_properties_are_fresh_per_instance() {
    let lines = output(
        r#"
        class Base { tag = "base"; items = [] }
        class Child extends Base { tag = "child"; size = len(this.items) }
        let a = new Child()
        let b = new Child()
        push(a.items, 1)
        print a.tag, len(a.items), len(b.items), b.size
        "#,
    );
    assert_eq!(lines, vec!["child 1 0 0"]);
}

#[test]
fn static_members_live_on_the_class() {
    let lines = output(
        r#"
        class Counter {
            static count = 0
            static step = Counter.count + 2
            static inc() {
                Counter.count += this.step
                return Counter.count
            }
        }
        class Sub extends Counter {}
        Counter.inc()
        print Counter.inc(), Counter.count, Sub.step, Counter.name
        "#,
    );
    assert_eq!(lines, vec!["4 4 2 Counter"]);
}

#[test]
fn object_methods_bind_this_but_arrows_keep_lexical_this() {
    let lines = output(
        r#"
        let counter = { n: 2, get() { return this.n } }
        print counter.get()
        class Timer {
            constructor() { this.ticks = 7 }
            read() {
                let f = () => this.ticks
                return f()
            }
        }
        print new Timer().read()
        "#,
    );
    assert_eq!(lines, vec!["2", "7"]);
}

#[test]
fn type_checks_cover_builtin_kinds_and_classes() {
    let lines = output(
        r#"
        class Shape {}
        class Circle extends Shape {}
        let c = new Circle()
        print 1 is Number, "a" is String, [] is Array, {} is Object, null is Null
        print c is Circle, c is Shape, c is Array, len is Function
        print typeof 1, typeof "s", typeof c, typeof Circle, typeof undefined
        "#,
    );
    assert_eq!(
        lines,
        vec![
            "true true true true true",
            "true true false true",
            "number string instance class undefined",
        ]
    );
}

#[test]
fn instanceof_requires_a_class() {
    let err = eval_error("1 instanceof 2");
    assert!(expect_diagnostic(&err, DiagnosticKind::Runtime).contains("must be a class"));
}

#[test]
fn loop_ranges_are_inclusive_with_optional_step() {
    let lines = output(
        r#"
        loop i from 1 to 3 { print i }
        loop i from 10 to 0 step -5 { print i }
        loop i from 3 to 1 { print i }
        "#,
    );
    assert_eq!(lines, vec!["1", "2", "3", "10", "5", "0", "3", "2", "1"]);
}

#[test]
fn loop_range_rejects_zero_step() {
    let err = eval_error("loop i from 1 to 3 step 0 { }");
    assert!(expect_diagnostic(&err, DiagnosticKind::Runtime).contains("non-zero"));
}

#[test]
fn break_and_continue_are_consumed_by_loops() {
    let lines = output(
        r#"
        let i = 0
        while true {
            i += 1
            if i == 2 { continue }
            if i > 4 { break }
            print i
        }
        let n = 0
        do { n += 1 } while n < 3
        print n
        loop {
            break
        }
        print "done"
        "#,
    );
    assert_eq!(lines, vec!["1", "3", "4", "3", "done"]);
}

#[test]
fn unmatched_break_is_a_control_flow_error() {
    let err = eval_error("break");
    expect_diagnostic(&err, DiagnosticKind::ControlFlow);

    let err = eval_error("fn f() { continue }\nf()");
    expect_diagnostic(&err, DiagnosticKind::ControlFlow);

    let err = eval_error("try { break } catch (e) { print e }");
    expect_diagnostic(&err, DiagnosticKind::ControlFlow);
}

#[test]
fn switch_falls_through_until_break() {
    let lines = output(
        r#"
        fn pick(v) {
            let out = []
            switch v {
                case 1:
                    push(out, "one")
                case 2, 3:
                    push(out, "two-or-three")
                    break
                default:
                    push(out, "other")
            }
            return join(out, ",")
        }
        print pick(1), pick(3), pick(9)
        "#,
    );
    assert_eq!(lines, vec!["one,two-or-three two-or-three other"]);
}

#[test]
fn match_selects_first_matching_arm() {
    let lines = output(
        r#"
        fn describe(v) {
            return match v {
                0 => "zero",
                1..10 => "small",
                "a" | "b" => "letter",
                is String => "string",
                [first, ...rest] => `list ${first} +${len(rest)}`,
                { kind: "point", x } => "point " + x,
                n if n is Number && n > 100 => "big",
                _ => "other"
            }
        }
        print describe(0)
        print describe(5)
        print describe(10)
        print describe("b")
        print describe("hi")
        print describe([7, 8, 9])
        print describe({ kind: "point", x: 3 })
        print describe(500)
        print describe(true)
        "#,
    );
    assert_eq!(
        lines,
        vec![
            "zero", "small", "other", "letter", "string", "list 7 +2", "point 3", "big", "other"
        ]
    );
}

#[test]
fn match_arms_can_use_blocks() {
    let value = eval(
        r#"
        match [1, 2] {
            [a, b] => {
                let total = a + b
                return total * 10
            }
        }
        "#,
    );
    assert_eq!(expect_number(&value), 30.0);
}

#[test]
fn unmatched_match_raises_match_error() {
    let err = eval_error("match 5 { 1 => \"one\" }");
    let message = expect_diagnostic(&err, DiagnosticKind::Match);
    assert!(message.contains("no match arm"));

    let lines = output(
        r#"
        try {
            match 5 { 1 => "one" }
        } catch (e) {
            print e.name
        }
        "#,
    );
    assert_eq!(lines, vec!["MatchError"]);
}

#[test]
fn destructuring_supports_defaults_nesting_and_rest() {
    let lines = output(
        r#"
        let [a, b = 5, ...rest] = [1, undefined, 3, 4]
        print a, b, rest
        let { x, y: { z }, w = 9, ...others } = { x: 1, y: { z: 2 }, q: 3 }
        print x, z, w, others
        const [c] = [1]
        "#,
    );
    assert_eq!(lines, vec!["1 5 [3, 4]", "1 2 9 { q: 3 }"]);

    let err = eval_error("const [c] = [1]\nc = 2");
    expect_diagnostic(&err, DiagnosticKind::Runtime);
}

#[test]
fn compound_assignment_operators() {
    let lines = output(
        r#"
        let x = 2
        x **= 3
        x -= 1
        x %= 4
        let y = null
        y ??= 4
        y ??= 7
        let b = 6
        b &= 3
        b |= 8
        b <<= 1
        b ^= 1
        let s = "a"
        s += 1
        let arr = [1, 2]
        arr[0] += 10
        arr[2] = 3
        let obj = { n: 1 }
        obj.n *= 5
        obj.m = "new"
        print x, y, b, s, arr, obj
        "#,
    );
    assert_eq!(lines, vec![r#"3 4 21 a1 [11, 2, 3] { n: 5, m: "new" }"#]);
}

#[test]
fn increment_and_decrement_return_old_or_new_values() {
    let lines = output(
        r#"
        let i = 5
        let a = i++
        let b = ++i
        let c = i--
        print a, b, c, i
        "#,
    );
    assert_eq!(lines, vec!["5 7 7 6"]);
}

#[test]
fn plus_concatenates_when_either_side_is_a_string() {
    assert_eq!(
        output(r#"print "a" + 1 + 2, 1 + 2 + "a", "x" + [1, 2] + null"#),
        vec!["a12 3a x[1, 2]null"]
    );
    let err = eval_error("print 1 - \"a\"");
    assert!(expect_diagnostic(&err, DiagnosticKind::Runtime).contains("unsupported operands"));
}

#[test]
fn arithmetic_follows_floating_point_rules() {
    assert_eq!(
        output("print 1 / 0, -1 / 0, 7 % 3, 2 ** 10, 0.1 + 0.2 == 0.3, 5 & 3, 1 << 4, ~0"),
        vec!["Infinity -Infinity 1 1024 false 1 16 -1"]
    );
}

#[test]
fn heap_values_compare_by_identity() {
    assert_eq!(
        output("let a = [1]\nprint [1] == [1], a == a, a === a, {} != {}, \"s\" == \"s\""),
        vec!["false true true true true"]
    );
}

#[test]
fn optional_chaining_short_circuits_on_nullish() {
    assert_eq!(
        output("let o = { a: { b: 1 } }\nprint o?.a?.b, o.missing?.b, o.f?.(1), o.a?.[\"b\"]"),
        vec!["1 undefined undefined 1"]
    );
    let err = eval_error("let o = {}\nprint o.missing.b");
    assert!(expect_diagnostic(&err, DiagnosticKind::Runtime).contains("cannot read property"));
}

#[test]
fn pipe_passes_value_as_first_argument() {
    assert_eq!(
        output(
            r#"
            fn double(x) { return x * 2 }
            fn add(a, b) { return a + b }
            print 5 |> double |> add(1)
            "#
        ),
        vec!["11"]
    );
}

#[test]
fn ranges_materialize_arrays() {
    assert_eq!(
        output("print 1..4, 1..=3, 3..1, [...0..2, 9]"),
        vec!["[1, 2, 3] [1, 2, 3] [3, 2] [0, 1, 9]"]
    );
}

#[test]
fn templates_interpolate_expressions() {
    assert_eq!(
        output("let n = 3\nprint `n=${n}, twice=${n * 2}, obj=${ {a: 1}.a }\\t!`"),
        vec!["n=3, twice=6, obj=1\t!"]
    );
}

#[test]
fn spreads_in_calls_arrays_and_objects() {
    assert_eq!(
        output(
            r#"
            fn sum(a, b, c) { return a + b + c }
            let xs = [1, 2, 3]
            let base = { a: 1, b: 2 }
            print sum(...xs), [0, ...xs], { ...base, b: 3 }, [..."hi"]
            "#
        ),
        vec![r#"6 [0, 1, 2, 3] { a: 1, b: 3 } ["h", "i"]"#]
    );
}

#[test]
fn parameter_defaults_are_lazy_and_see_earlier_params() {
    let lines = output(
        r#"
        let calls = 0
        fn side() { calls += 1; return 0 }
        fn f(a, b = a * 2, c = side(), ...rest) { return [a, b, c, rest] }
        print f(1)
        print f(1, 5, 6, 7, 8)
        print calls
        fn g(x) { return x }
        print g(), g(1, 2)
        "#,
    );
    assert_eq!(
        lines,
        vec!["[1, 2, 0, []]", "[1, 5, 6, [7, 8]]", "1", "undefined 1"]
    );
}

#[test]
fn functions_without_return_yield_null() {
    assert_eq!(
        output("fn nothing() { let x = 1 }\nfn bare() { return }\nprint nothing(), bare()"),
        vec!["null null"]
    );
}

#[test]
fn user_throw_binds_value_unmodified() {
    assert_eq!(
        output("try { throw { code: 42 } } catch (e) { print e.code, typeof e }"),
        vec!["42 object"]
    );
}

#[test]
fn runtime_errors_are_catchable_as_error_objects() {
    let lines = output(
        r#"
        try {
            nope
        } catch (e) {
            print e.name, e.line
            print e.message
        }
        "#,
    );
    assert_eq!(lines, vec!["RuntimeError 3", "undefined variable `nope`"]);
}

#[test]
fn finally_always_runs_and_can_override() {
    let lines = output(
        r#"
        fn f() {
            try { return 1 } finally { print "cleanup" }
        }
        fn g() {
            try { return 1 } finally { return 2 }
        }
        print f(), g()
        try {
            try { throw "inner" } finally { print "inner finally" }
        } catch (e) {
            print "caught " + e
        }
        loop {
            try { break } finally { print "leaving loop" }
        }
        "#,
    );
    assert_eq!(
        lines,
        vec![
            "cleanup",
            "1 2",
            "inner finally",
            "caught inner",
            "leaving loop"
        ]
    );
}

#[test]
fn uncaught_throw_surfaces_value_and_line() {
    let err = eval_error("let a = 1\nthrow \"fatal\"");
    match &err {
        LumenError::Thrown { value, span } => {
            assert_eq!(expect_string(value), "fatal");
            assert_eq!(span.map(|span| span.line), Some(2));
        }
        other => panic!("expected thrown error, found {other}"),
    }
    assert_eq!(err.to_string(), "uncaught exception: fatal (line 2)");
}

#[test]
fn throw_inside_function_unwinds_to_caller() {
    let lines = output(
        r#"
        fn risky(n) {
            if n > 1 { throw "too big: " + n }
            return n
        }
        fn wrapper() { return risky(5) }
        try { wrapper() } catch (e) { print e }
        "#,
    );
    assert_eq!(lines, vec!["too big: 5"]);
}

#[test]
fn async_functions_resolve_through_await() {
    let lines = output(
        r#"
        async fn fetch(x) { return x * 2 }
        async fn main() {
            let a = await fetch(2)
            let b = await fetch(a)
            return a + b
        }
        let pending = fetch(1)
        print typeof pending
        print await main(), await 5
        "#,
    );
    assert_eq!(lines, vec!["pending", "12 5"]);
}

#[test]
fn rejected_async_rethrows_on_await() {
    let lines = output(
        r#"
        async fn fail() { throw "bad" }
        let p = fail()
        print "created"
        try { await p } catch (e) { print "caught " + e }
        let arrow = async (x) => x + 1
        print await arrow(1)
        "#,
    );
    assert_eq!(lines, vec!["created", "caught bad", "2"]);

    let err = eval_error("async fn fail() { throw \"bad\" }\nawait fail()");
    assert!(matches!(err, LumenError::Thrown { .. }));
}

#[test]
fn deferred_builtins_are_forced_at_the_call() {
    assert_eq!(
        output("print sleep(0), defer(5) + 1, await defer(\"x\")"),
        vec!["null 6 x"]
    );
}

#[test]
fn builtins_cover_collections_strings_and_math() {
    let lines = output(
        r#"
        let xs = [3, 1, 2]
        print len(xs), push(xs, 4), pop(xs), len("héllo")
        print keys({ a: 1, b: 2 }), values({ a: 1 }), range(3), range(1, 7, 2)
        print upper("ab"), lower("CD"), trim("  x  "), split("a,b", ","), join([1, 2], "-")
        print contains([1, 2], 2), contains("team", "ea"), contains({ k: 1 }, "z")
        print abs(-2), floor(1.7), ceil(1.2), round(2.5), sqrt(16), pow(2, 8)
        print min(3, 1, 2), max([4, 9]), str(1.5) + "x", num("42") + 1, num("abc"), type_of([])
        "#,
    );
    assert_eq!(
        lines,
        vec![
            "3 4 4 5",
            r#"["a", "b"] [1] [0, 1, 2] [1, 3, 5]"#,
            r#"AB cd x ["a", "b"] 1-2"#,
            "true true false",
            "2 1 2 3 4 256",
            "1 9 1.5x 43 NaN array",
        ]
    );
}

#[test]
fn builtin_arity_errors_carry_the_call_line() {
    let err = eval_error("let a = 1\nlen()");
    let message = expect_diagnostic(&err, DiagnosticKind::Runtime);
    assert!(message.contains("expected 1 arguments but received 0"));
    assert_eq!(err.line(), Some(2));
}

#[test]
fn custom_builtin_registry_replaces_defaults() {
    let mut registry = BuiltinRegistry::new();
    registry
        .register("answer", 0, |_| Ok(Value::number(42.0)))
        .insert("version", Value::string("1.0"));
    let mut interpreter = Interpreter::new()
        .with_host(BufferedHost::new())
        .with_builtins(registry);
    let value = interpreter
        .eval_source("answer() + 1")
        .expect("custom builtin");
    assert_eq!(expect_number(&value), 43.0);
    let value = interpreter.eval_source("version").expect("constant builtin");
    assert_eq!(expect_string(&value), "1.0");
    let err = interpreter
        .eval_source("len([1])")
        .expect_err("default builtins are gone");
    assert!(err.to_string().contains("undefined variable `len`"));
}

#[test]
fn builtins_cannot_be_reassigned() {
    let err = eval_error("len = 5");
    assert!(expect_diagnostic(&err, DiagnosticKind::Runtime).contains("constant `len`"));
}

#[test]
fn globals_persist_between_evaluations() {
    let host = BufferedHost::new();
    let mut interpreter = Interpreter::new().with_host(host.clone());
    interpreter.define_global("greeting", Value::string("hi"));
    interpreter
        .eval_source("let count = 1\nfn bump() { count += 1 }")
        .expect("define");
    interpreter.eval_source("bump()\nprint greeting, count").expect("use");
    assert_eq!(host.lines(), vec!["hi 2"]);
    assert!(interpreter.global("bump").is_some());
}

#[test]
fn input_reads_from_host_until_exhausted() {
    let host = BufferedHost::with_input(["Ada"]);
    let mut interpreter = Interpreter::new().with_host(host.clone());
    interpreter
        .eval_source("let name = input(\"name? \")\nprint \"hi \" + name\nprint input()")
        .expect("input");
    assert_eq!(host.output(), "hi Ada\nnull\n");
}

#[test]
fn imports_named_and_namespace_exports() {
    let dir = tempdir().expect("create temp dir");
    fs::write(
        dir.path().join("math.lm"),
        r#"
        export fn square(x) { return x * x }
        export const PI = 3
        let hidden = 1
        export { hidden as secret }
        print "math loaded"
        "#,
    )
    .expect("write module");

    let host = BufferedHost::new();
    let mut interpreter = Interpreter::new()
        .with_host(host.clone())
        .with_context(ExecutionContext::new(dir.path()));
    interpreter
        .eval_source(
            r#"
            import { square, PI as pi } from "./math"
            import * as m from "math.lm"
            print square(pi), m.secret, typeof m.hidden
            "#,
        )
        .expect("imports resolve");
    assert_eq!(host.lines(), vec!["math loaded", "9 1 undefined"]);
}

#[test]
fn modules_resolve_relative_to_their_own_directory() {
    let dir = tempdir().expect("create temp dir");
    let nested = dir.path().join("lib");
    fs::create_dir(&nested).expect("create lib dir");
    fs::write(nested.join("inner.lm"), "export const VALUE = 41").expect("write inner");
    fs::write(
        nested.join("outer.lm"),
        "import { VALUE } from \"./inner\"\nexport fn value() { return VALUE + 1 }",
    )
    .expect("write outer");

    let mut interpreter = Interpreter::new()
        .with_host(BufferedHost::new())
        .with_context(ExecutionContext::new(dir.path()));
    let value = interpreter
        .eval_source("import { value } from \"lib/outer\"\nvalue()")
        .expect("nested import");
    assert_eq!(expect_number(&value), 42.0);
}

#[test]
fn import_errors_are_reported() {
    let dir = tempdir().expect("create temp dir");
    fs::write(dir.path().join("a.lm"), "import \"./b\"\nexport const A = 1").expect("write a");
    fs::write(dir.path().join("b.lm"), "import { A } from \"./a\"").expect("write b");
    fs::write(dir.path().join("c.lm"), "export const C = 1").expect("write c");

    let source = format!(
        "import {{ nope }} from \"{}\"",
        path_literal(&dir.path().join("c.lm"))
    );
    let mut interpreter = Interpreter::new().with_host(BufferedHost::new());
    let err = interpreter.eval_source(&source).expect_err("missing export");
    assert!(err.to_string().contains("has no export `nope`"));

    let mut interpreter = Interpreter::new()
        .with_host(BufferedHost::new())
        .with_context(ExecutionContext::new(dir.path()));
    let err = interpreter
        .eval_source("import \"./a\"")
        .expect_err("circular import");
    assert!(err.to_string().contains("circular import"));

    let err = interpreter
        .eval_source("import \"./missing\"")
        .expect_err("missing module");
    assert!(err.to_string().contains("cannot load module"));
}

#[test]
fn recursion_works_within_the_depth_limit() {
    assert_eq!(
        output("fn fib(n) { if n < 2 { return n } return fib(n - 1) + fib(n - 2) }\nprint fib(15)"),
        vec!["610"]
    );
}

#[test]
fn runaway_recursion_hits_the_call_depth_limit() {
    let mut interpreter = Interpreter::new().with_host(BufferedHost::new());
    let err = interpreter
        .eval_source("fn down(n) { return down(n + 1) }\ndown(0)")
        .expect_err("depth limit");
    assert!(err
        .to_string()
        .contains("maximum call depth of 512 exceeded"));
    let caught = interpreter
        .eval_source("let r = \"\"\ntry { down(0) } catch (e) { r = e.message }\nr")
        .expect("catchable");
    assert!(expect_string(&caught).contains("maximum call depth"));
}

#[test]
fn call_depth_limit_is_configurable() {
    let context = ExecutionContext::default().with_max_call_depth(100);
    let mut interpreter = Interpreter::new()
        .with_host(BufferedHost::new())
        .with_context(context);
    let value = interpreter
        .eval_source("fn depth(n) { if n == 0 { return 0 } return 1 + depth(n - 1) }\ndepth(99)")
        .expect("within limit");
    assert_eq!(expect_number(&value), 99.0);
    let err = interpreter.eval_source("depth(100)").expect_err("over limit");
    assert!(err.to_string().contains("maximum call depth of 100 exceeded"));
}

#[test]
fn deeply_nested_source_evaluates_without_overflow() {
    let depth = 5_000;
    let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
    assert_eq!(expect_number(&eval(&source)), 1.0);

    let negations = format!("{}true", "!".repeat(depth + 1));
    assert_eq!(eval(&negations).to_string(), "false");
}

#[test]
fn writing_far_past_array_end_is_a_runtime_error() {
    let err = eval_error("let a = []\na[1e18] = 1");
    let message = expect_diagnostic(&err, DiagnosticKind::Runtime);
    assert!(message.contains("too far past the end"));
    assert_eq!(err.line(), Some(2));

    let lines = output(
        r#"
        let a = [1]
        try { a[1e18] = 1 } catch (e) { print e.name, len(a) }
        a[3] = 4
        print a
        "#,
    );
    assert_eq!(lines, vec!["RuntimeError 1", "[1, undefined, undefined, 4]"]);
}

#[test]
fn bitwise_operators_wrap_large_numbers_to_32_bits() {
    assert_eq!(
        output("print 1e20 | 0, -1e20 | 0, 4294967297 | 0, 2147483648 | 0, -1 >> 0"),
        vec!["1661992960 -1661992960 1 -2147483648 -1"]
    );
}

#[test]
fn bitwise_or_in_match_subject_and_guard_is_an_operator() {
    let lines = output(
        r#"
        let a = 4
        let b = 1
        print match a | b {
            5 => "five",
            _ => "other"
        }
        fn odd_three(n) {
            return match n {
                x if (x | 1) == 3 => "three-ish",
                2 | 4 => "even",
                _ => "no"
            }
        }
        print odd_three(2), odd_three(3), odd_three(4), odd_three(7)
        "#,
    );
    assert_eq!(lines, vec!["five", "three-ish three-ish even no"]);
}
