use lumen::{
    ast::{
        AssignOp, BinaryOp, BindingTarget, ClassMember, ExprKind, FunctionBody, ImportClause,
        Literal, LogicalOp, ParamKind, Pattern, Program, StmtKind, TemplatePart,
    },
    diagnostics::{Diagnostic, DiagnosticKind},
    lexer::tokenize,
    parser::{parse, parse_source},
};

fn parse_ok(source: &str) -> Program {
    parse_source(source).expect("parse should succeed")
}

fn parse_err(source: &str) -> Diagnostic {
    match parse_source(source) {
        Ok(program) => panic!("expected parse error, got {program:?}"),
        Err(diag) => diag,
    }
}

fn let_value(program: &Program) -> &ExprKind {
    match &program.items[0].kind {
        StmtKind::Let {
            value: Some(value), ..
        } => &value.kind,
        other => panic!("expected let statement, found {other:?}"),
    }
}

fn expr_stmt(program: &Program) -> &ExprKind {
    match &program.items[0].kind {
        StmtKind::Expr(expr) => &expr.kind,
        other => panic!("expected expression statement, found {other:?}"),
    }
}

#[test]
fn parses_parenthesized_arrow_functions() {
    let program = parse_ok("let f = (a, b = (1 + 2), ...rest) => a + b");
    let ExprKind::Function(decl) = let_value(&program) else {
        panic!("expected arrow function");
    };
    assert!(decl.is_arrow);
    assert_eq!(decl.params.len(), 3);
    assert!(matches!(decl.params[1].kind, ParamKind::Default(_)));
    assert!(matches!(decl.params[2].kind, ParamKind::Rest));
    assert!(matches!(decl.body, FunctionBody::Expr(_)));
}

#[test]
fn parses_parenthesized_grouping_after_failed_arrow_scan() {
    let program = parse_ok("let g = (a + b) * c");
    let ExprKind::Binary { op, left, .. } = let_value(&program) else {
        panic!("expected binary expression");
    };
    assert_eq!(*op, BinaryOp::Mul);
    assert!(matches!(
        left.kind,
        ExprKind::Binary {
            op: BinaryOp::Add,
            ..
        }
    ));

    let program = parse_ok("let h = (a)");
    assert!(matches!(let_value(&program), ExprKind::Variable(name) if name == "a"));
}

#[test]
fn parses_single_param_and_async_arrows() {
    let program = parse_ok("let f = x => { return x }");
    let ExprKind::Function(decl) = let_value(&program) else {
        panic!("expected arrow function");
    };
    assert!(decl.is_arrow && !decl.is_async);
    assert!(matches!(decl.body, FunctionBody::Block(_)));

    let program = parse_ok("let g = async (x) => await x");
    let ExprKind::Function(decl) = let_value(&program) else {
        panic!("expected arrow function");
    };
    assert!(decl.is_arrow && decl.is_async);
}

#[test]
fn power_is_right_associative_and_binds_tighter_than_product() {
    let program = parse_ok("1 + 2 * 3 ** 2 ** 2");
    let ExprKind::Binary {
        op: BinaryOp::Add,
        right,
        ..
    } = expr_stmt(&program)
    else {
        panic!("expected addition at the root");
    };
    let ExprKind::Binary {
        op: BinaryOp::Mul,
        right: power,
        ..
    } = &right.kind
    else {
        panic!("expected multiplication");
    };
    let ExprKind::Binary {
        op: BinaryOp::Pow,
        right: exponent,
        ..
    } = &power.kind
    else {
        panic!("expected power");
    };
    assert!(matches!(
        exponent.kind,
        ExprKind::Binary {
            op: BinaryOp::Pow,
            ..
        }
    ));
}

#[test]
fn nullish_sits_below_logical_or() {
    let program = parse_ok("a || b ?? c");
    let ExprKind::Logical {
        op: LogicalOp::Nullish,
        left,
        ..
    } = expr_stmt(&program)
    else {
        panic!("expected nullish at the root");
    };
    assert!(matches!(
        left.kind,
        ExprKind::Logical {
            op: LogicalOp::Or,
            ..
        }
    ));
}

#[test]
fn range_binds_looser_than_addition() {
    let program = parse_ok("let r = 1..n + 1");
    let ExprKind::Range { end, inclusive, .. } = let_value(&program) else {
        panic!("expected range");
    };
    assert!(!inclusive);
    assert!(matches!(
        end.kind,
        ExprKind::Binary {
            op: BinaryOp::Add,
            ..
        }
    ));
}

#[test]
fn parses_every_compound_assignment() {
    let cases = [
        ("x = 1", AssignOp::Assign),
        ("x += 1", AssignOp::Compound(BinaryOp::Add)),
        ("x -= 1", AssignOp::Compound(BinaryOp::Sub)),
        ("x *= 1", AssignOp::Compound(BinaryOp::Mul)),
        ("x /= 1", AssignOp::Compound(BinaryOp::Div)),
        ("x %= 1", AssignOp::Compound(BinaryOp::Mod)),
        ("x **= 1", AssignOp::Compound(BinaryOp::Pow)),
        ("x &= 1", AssignOp::Compound(BinaryOp::BitAnd)),
        ("x |= 1", AssignOp::Compound(BinaryOp::BitOr)),
        ("x ^= 1", AssignOp::Compound(BinaryOp::BitXor)),
        ("x <<= 1", AssignOp::Compound(BinaryOp::ShiftLeft)),
        ("x >>= 1", AssignOp::Compound(BinaryOp::ShiftRight)),
        ("x ??= 1", AssignOp::Nullish),
    ];
    for (source, expected) in cases {
        let program = parse_ok(source);
        match &program.items[0].kind {
            StmtKind::Assign { op, .. } => assert_eq!(*op, expected, "{source}"),
            other => panic!("expected assignment for {source}, found {other:?}"),
        }
    }
}

#[test]
fn rejects_invalid_assignment_targets() {
    let err = parse_err("1 = 2");
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert!(err.message.contains("invalid assignment target"));

    let err = parse_err("a?.b = 1");
    assert!(err.message.contains("invalid assignment target"));

    let err = parse_err("f()++");
    assert!(err.message.contains("invalid increment/decrement target"));
}

#[test]
fn parse_errors_name_the_offending_token() {
    let err = parse_err("let = 5");
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert_eq!(err.line(), Some(1));
    assert!(err.notes.iter().any(|note| note.contains("found Assign")));

    let err = parse_err("let x = (1 +\n");
    assert!(err.notes.iter().any(|note| note.contains("end of input")));
}

#[test]
fn parses_match_patterns() {
    let program = parse_ok(
        r#"match x {
            1 | 2 => "small",
            -5..=5 => "near",
            [head, ...tail] => head,
            { kind: "leaf", value, ...others } => value,
            is Number => "number",
            n if n > 3 => n,
            _ => null
        }"#,
    );
    let ExprKind::Match { arms, .. } = expr_stmt(&program) else {
        panic!("expected match expression");
    };
    assert_eq!(arms.len(), 7);
    assert!(matches!(&arms[0].pattern, Pattern::Or(alts) if alts.len() == 2));
    assert!(matches!(
        &arms[1].pattern,
        Pattern::Range {
            start: Literal::Number(lo),
            inclusive: true,
            ..
        } if *lo == -5.0
    ));
    assert!(matches!(
        &arms[2].pattern,
        Pattern::Array { elements, rest: Some(rest) } if elements.len() == 1 && rest == "tail"
    ));
    assert!(matches!(
        &arms[3].pattern,
        Pattern::Object { fields, rest: Some(_) } if fields.len() == 2
    ));
    assert!(matches!(&arms[4].pattern, Pattern::Type(name) if name == "Number"));
    assert!(matches!(&arms[5].pattern, Pattern::Binding(name) if name == "n"));
    assert!(arms[5].guard.is_some());
    assert!(matches!(arms[6].pattern, Pattern::Wildcard));
}

#[test]
fn pipe_outside_patterns_is_bitwise_or() {
    let program = parse_ok(
        r#"match a | b {
            n if (n | 1) == 3 => n,
            4 | 5 => "pair"
        }"#,
    );
    let ExprKind::Match { subject, arms } = expr_stmt(&program) else {
        panic!("expected match expression");
    };
    assert!(matches!(
        subject.kind,
        ExprKind::Binary {
            op: BinaryOp::BitOr,
            ..
        }
    ));
    assert!(matches!(&arms[0].pattern, Pattern::Binding(name) if name == "n"));
    let Some(guard) = &arms[0].guard else {
        panic!("expected guard");
    };
    let ExprKind::Binary {
        op: BinaryOp::Equal,
        left,
        ..
    } = &guard.kind
    else {
        panic!("expected equality guard, found {:?}", guard.kind);
    };
    assert!(matches!(
        left.kind,
        ExprKind::Binary {
            op: BinaryOp::BitOr,
            ..
        }
    ));
    assert!(matches!(&arms[1].pattern, Pattern::Or(alts) if alts.len() == 2));
}

#[test]
fn deeply_nested_input_parses_without_overflow() {
    let depth = 10_000;
    let source = format!("let x = {}1{}", "(".repeat(depth), ")".repeat(depth));
    let program = parse_ok(&source);
    assert!(matches!(let_value(&program), ExprKind::Literal(Literal::Number(n)) if *n == 1.0));

    let blocks = format!("{}print 1{}", "{ ".repeat(1_000), " }".repeat(1_000));
    assert_eq!(parse_ok(&blocks).items.len(), 1);
}

#[test]
fn splits_templates_into_parts() {
    let program = parse_ok("`a${b + 1}c${d}`");
    let ExprKind::Template(parts) = expr_stmt(&program) else {
        panic!("expected template");
    };
    assert_eq!(parts.len(), 4);
    assert!(matches!(&parts[0], TemplatePart::Text(text) if text == "a"));
    assert!(matches!(
        &parts[1],
        TemplatePart::Expr(expr) if matches!(expr.kind, ExprKind::Binary { .. })
    ));
    assert!(matches!(&parts[2], TemplatePart::Text(text) if text == "c"));
    assert!(matches!(&parts[3], TemplatePart::Expr(_)));
}

#[test]
fn template_interpolation_errors_point_at_the_template() {
    let err = parse_err("let s = 1\nlet t = `x ${1 +}`");
    assert_eq!(err.line(), Some(2));
    assert!(err
        .notes
        .iter()
        .any(|note| note.contains("template literal interpolation")));
}

#[test]
fn parses_destructuring_declarations() {
    let program = parse_ok("let [a, { b, c: [d] }, e = 1, ...rest] = value");
    let StmtKind::Let { target, .. } = &program.items[0].kind else {
        panic!("expected let");
    };
    let BindingTarget::Array { elements, rest } = target else {
        panic!("expected array target");
    };
    assert_eq!(elements.len(), 3);
    assert_eq!(rest.as_deref(), Some("rest"));
    assert!(matches!(elements[1].target, BindingTarget::Object { .. }));
    assert!(elements[2].default.is_some());

    let mut names = Vec::new();
    target.collect_names(&mut names);
    assert_eq!(names, vec!["a", "b", "d", "e", "rest"]);
}

#[test]
fn destructuring_requires_an_initializer() {
    let err = parse_err("let [a, b]");
    assert!(err.message.contains("requires an initializer"));
    let err = parse_err("const c");
    assert!(err.message.contains("missing initializer"));
}

#[test]
fn parses_class_members() {
    let program = parse_ok(
        r#"class Player extends Entity {
            static count = 0
            health = 100
            constructor(name) { super(name) }
            static create() { return new Player("p") }
            async load() { }
        }"#,
    );
    let StmtKind::Class(class) = &program.items[0].kind else {
        panic!("expected class");
    };
    assert_eq!(class.name, "Player");
    assert_eq!(class.parent.as_deref(), Some("Entity"));
    assert_eq!(class.members.len(), 5);
    assert!(matches!(
        &class.members[0],
        ClassMember::Property { name, is_static: true, .. } if name == "count"
    ));
    assert!(matches!(
        &class.members[1],
        ClassMember::Property { name, is_static: false, value: Some(_) } if name == "health"
    ));
    assert!(matches!(
        &class.members[3],
        ClassMember::Method { name, is_static: true, .. } if name == "create"
    ));
    assert!(matches!(
        &class.members[4],
        ClassMember::Method { function, .. } if function.is_async
    ));
}

#[test]
fn parses_control_flow_statements() {
    let program = parse_ok(
        r#"
        if a { } elif b { } else { }
        loop i from 1 to 10 step 2 { }
        loop item in items { }
        for (key of obj) { }
        while x { break }
        do { continue } while y
        switch v { case 1, 2: print v; default: print 0 }
        try { throw 1 } catch e { } finally { }
        "#,
    );
    let kinds: Vec<&str> = program
        .items
        .iter()
        .map(|stmt| match stmt.kind {
            StmtKind::If { .. } => "if",
            StmtKind::LoopRange { .. } => "loop-range",
            StmtKind::ForIn { .. } => "for-in",
            StmtKind::ForOf { .. } => "for-of",
            StmtKind::While { .. } => "while",
            StmtKind::DoWhile { .. } => "do-while",
            StmtKind::Switch { .. } => "switch",
            StmtKind::Try { .. } => "try",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["if", "loop-range", "for-in", "for-of", "while", "do-while", "switch", "try"]
    );
    let StmtKind::Switch { cases, .. } = &program.items[6].kind else {
        panic!("expected switch");
    };
    assert_eq!(cases[0].tests.as_ref().map(Vec::len), Some(2));
    assert!(cases[1].tests.is_none());
}

#[test]
fn try_requires_catch_or_finally() {
    let err = parse_err("try { }");
    assert!(err.message.contains("expected `catch` or `finally`"));
}

#[test]
fn parses_imports_and_exports() {
    let program = parse_ok(
        r#"
        import { a, b as c } from "./lib"
        import * as lib from "lib.lm"
        import "./setup"
        export fn helper() { }
        export { a as alias }
        "#,
    );
    assert!(matches!(
        &program.items[0].kind,
        StmtKind::Import { clause: ImportClause::Named(names), source }
            if names == &vec![("a".to_string(), "a".to_string()), ("b".to_string(), "c".to_string())]
                && source == "./lib"
    ));
    assert!(matches!(
        &program.items[1].kind,
        StmtKind::Import { clause: ImportClause::Namespace(name), .. } if name == "lib"
    ));
    assert!(matches!(
        &program.items[2].kind,
        StmtKind::Import {
            clause: ImportClause::SideEffect,
            ..
        }
    ));
    let StmtKind::Export(declaration) = &program.items[3].kind else {
        panic!("expected export");
    };
    assert_eq!(declaration.declared_names(), vec!["helper"]);
    assert!(matches!(&program.items[4].kind, StmtKind::ExportNames(names) if names.len() == 1));
}

#[test]
fn parses_optional_chains_and_pipes() {
    let program = parse_ok("a?.b?.[0]?.(1) |> f(2)");
    let ExprKind::Pipe { value, function } = expr_stmt(&program) else {
        panic!("expected pipe");
    };
    assert!(matches!(value.kind, ExprKind::Call { optional: true, .. }));
    assert!(matches!(function.kind, ExprKind::Call { optional: false, .. }));
}

#[test]
fn contextual_keywords_work_as_names() {
    let program = parse_ok("let from = obj.default + { to: 1 }.to");
    let StmtKind::Let {
        target: BindingTarget::Name(name),
        ..
    } = &program.items[0].kind
    else {
        panic!("expected let");
    };
    assert_eq!(name, "from");
}

#[test]
fn parse_drops_newline_tokens() {
    let tokens = tokenize("let a = 1\n\nlet b = a\n").expect("tokenize");
    let program = parse(tokens).expect("parse");
    assert_eq!(program.items.len(), 2);
    assert_eq!(program.items[1].span.line, 3);
}
