use pretty_assertions::assert_eq;

use super::*;
use crate::executor::types::ast::{Article, SourceKind};

fn parse_ok(source: &str) -> Program {
    let output = parse_program(source);
    assert!(
        output.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        output.diagnostics
    );
    output.program
}

fn first_body(source: &str) -> Vec<Stmt> {
    parse_ok(source).feature_sets.remove(0).body
}

fn action(stmt: &Stmt) -> &ActionStmt {
    match stmt {
        Stmt::Action(action) => action,
        other => panic!("expected action, got {:?}", other),
    }
}

/* ===================== Feature Sets ===================== */

#[test]
fn test_feature_set_header() {
    let program = parse_ok(
        r#"
        (Application-Start: Order Service) {
            <Log> the <message> to the <console> with "starting".
        }
        (Application-End: Success) {
            <Return> an <OK: status> for the <shutdown>.
        }
        "#,
    );
    assert_eq!(program.feature_sets.len(), 2);
    assert_eq!(program.feature_sets[0].name, "Application-Start");
    assert_eq!(program.feature_sets[0].activity, "Order Service");
    assert_eq!(program.feature_sets[1].name, "Application-End");
    assert_eq!(program.feature_sets[1].activity, "Success");
}

#[test]
fn test_state_observer_header_keeps_activity_text() {
    let program = parse_ok("(Audit: status StateObserver<draft_to_placed>) { }");
    assert_eq!(
        program.feature_sets[0].activity,
        "status StateObserver<draft_to_placed>"
    );
}

/* ===================== Actions ===================== */

#[test]
fn test_action_descriptors() {
    let body = first_body(
        "(Get User: User API) {
            <Extract> the <user> from the <event: user.profile>.
        }",
    );
    let stmt = action(&body[0]);
    assert_eq!(stmt.verb, "Extract");
    assert_eq!(stmt.result.base, "user");
    assert_eq!(stmt.result.article, Some(Article::The));
    assert_eq!(stmt.object.preposition, Preposition::From);
    assert_eq!(stmt.object.kind, SourceKind::Event);
    assert_eq!(stmt.object.base, "event");
    assert_eq!(stmt.object.qualifier.as_deref(), Some("user.profile"));
}

#[test]
fn test_action_clauses() {
    let body = first_body(
        r#"(Users: Repo) {
            <Retrieve> the <user> from the <user-repository> where id = <user-id>.
            <Reduce> the <total> from the <active> with sum(amount).
            <Log> the <warning> to the <console> with "low" when <stock> < 5.
        }"#,
    );
    let retrieve = action(&body[0]);
    assert_eq!(retrieve.object.kind, SourceKind::Repository);
    assert_eq!(retrieve.object.base, "user-repository");
    assert!(matches!(
        retrieve.object.condition,
        Some(Expr::Binary {
            op: BinaryOp::Eq,
            ..
        })
    ));

    let reduce = action(&body[1]);
    assert!(matches!(
        &reduce.object.argument,
        Some(Expr::Call { function, .. }) if function == "sum"
    ));

    let log = action(&body[2]);
    assert!(matches!(
        log.when,
        Some(Expr::Binary {
            op: BinaryOp::Lt,
            ..
        })
    ));
}

#[test]
fn test_expression_object() {
    let body = first_body("(Calc: Math) { <Compute> the <sum> from <a> + <b>. }");
    let stmt = action(&body[0]);
    assert_eq!(stmt.object.kind, SourceKind::Expression);
    assert_eq!(stmt.object.value.as_ref().map(|e| e.to_string()).as_deref(), Some("<a> + <b>"));
}

#[test]
fn test_literal_object_with_list() {
    let body = first_body("(Data: Setup) { <Create> the <numbers> with [1, 2, 3]. }");
    let stmt = action(&body[0]);
    assert_eq!(stmt.object.kind, SourceKind::Literal);
    assert!(matches!(stmt.object.value, Some(Expr::List { ref elements, .. }) if elements.len() == 3));
}

#[test]
fn test_publish_and_transition() {
    let body = first_body(
        "(Place Order: Orders) {
            <Publish> as <current-order> <order>.
            <Accept> the <transition: draft_to_placed> on <order: status>.
        }",
    );
    assert!(matches!(
        &body[0],
        Stmt::Publish { alias, variable, .. } if alias == "current-order" && variable == "order"
    ));
    assert!(matches!(
        &body[1],
        Stmt::Transition { target, field, from, to, .. }
            if target == "order" && field == "status" && from == "draft" && to == "placed"
    ));
}

/* ===================== Literals ===================== */

#[test]
fn test_raw_string_keeps_backslashes() {
    let body = first_body(
        r#"(Paths: Files) {
            <Create> the <path> with 'C:\a\b'.
            <Create> the <text> with "a\nb".
        }"#,
    );
    let raw = action(&body[0]).object.value.clone();
    let escaped = action(&body[1]).object.value.clone();
    assert!(matches!(raw, Some(Expr::Lit { v: Literal::Str(ref s), .. }) if s == "C:\\a\\b"));
    assert!(matches!(escaped, Some(Expr::Lit { v: Literal::Str(ref s), .. }) if s == "a\nb"));
}

/* ===================== Control Flow ===================== */

#[test]
fn test_if_else_if() {
    let body = first_body(
        r#"(Check: Flow) {
            if <amount> > 100 then {
                <Log> the <big> to the <console>.
            } else if <amount> > 10 {
                <Log> the <medium> to the <console>.
            } else {
                <Log> the <small> to the <console>.
            }
        }"#,
    );
    match &body[0] {
        Stmt::If { else_s: Some(else_s), .. } => {
            assert!(matches!(&else_s[0], Stmt::If { else_s: Some(_), .. }));
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn test_match_with_patterns() {
    let body = first_body(
        r#"(Route: Flow) {
            match <code> {
                case "A" { <Log> the <a> to the <console>. }
                case /^b+$/i where <strict> == false { <Log> the <b> to the <console>. }
                case 42 { <Log> the <n> to the <console>. }
                case _ { <Log> the <any> to the <console>. }
                otherwise { <Log> the <none> to the <console>. }
            }
        }"#,
    );
    match &body[0] {
        Stmt::Match {
            subject,
            cases,
            otherwise,
            ..
        } => {
            assert_eq!(subject.name, "code");
            assert_eq!(cases.len(), 4);
            assert!(matches!(cases[1].pattern, Pattern::Regex { ref flags, .. } if flags == "i"));
            assert!(cases[1].guard.is_some());
            assert_eq!(cases[3].pattern, Pattern::Wildcard);
            assert!(otherwise.is_some());
        }
        other => panic!("expected match, got {:?}", other),
    }
}

#[test]
fn test_loops() {
    let body = first_body(
        r#"(Loops: Flow) {
            parallel for each <order> at <i> in <orders> where status = "open" {
                <Log> the <order> to the <console>.
            }
            for <n> from 1 to 3 {
                <Log> the <n> to the <console>.
            }
        }"#,
    );
    assert!(matches!(
        &body[0],
        Stmt::ForEach { binding, index: Some(index), parallel: true, filter: Some(_), .. }
            if binding == "order" && index == "i"
    ));
    assert!(matches!(&body[1], Stmt::ForRange { binding, .. } if binding == "n"));
}

#[test]
fn test_when_guard_block() {
    let body = first_body(
        "(Guard: Flow) {
            when <user> is empty {
                <Throw> a <NotFound: error> for the <user>.
            }
            <Return> an <OK: status> with <user>.
        }",
    );
    assert!(matches!(
        &body[0],
        Stmt::When { test: Expr::Binary { op: BinaryOp::Eq, right, .. }, .. }
            if matches!(right.as_ref(), Expr::Empty { .. })
    ));
}

/* ===================== Error Recovery ===================== */

#[test]
fn test_missing_period_reports_once_and_keeps_parsing() {
    let output = parse_program(
        "(Broken: Flow) {
            <Create> the <a> with 1
            <Create> the <b> with 2.
            <Create> the <c> with 3.
        }",
    );
    assert_eq!(output.diagnostics.len(), 1, "{:?}", output.diagnostics);
    assert_eq!(output.program.feature_sets[0].body.len(), 3);
}

#[test]
fn test_bad_statement_is_skipped() {
    let output = parse_program(
        "(Broken: Flow) {
            <Create> the <a> from.
            <Create> the <b> with 2.
        }
        (Fine: Flow) {
            <Create> the <c> with 3.
        }",
    );
    assert_eq!(output.diagnostics.len(), 1, "{:?}", output.diagnostics);
    assert_eq!(output.program.feature_sets.len(), 2);
    assert_eq!(output.program.feature_sets[0].body.len(), 1);
    assert_eq!(output.program.feature_sets[1].body.len(), 1);
}

#[test]
fn test_multiple_errors_reported_in_one_pass() {
    let output = parse_program(
        "(Broken: Flow) {
            <Create> <a> <b>.
            <Create> the <c> with 3.
            <Create> the with 4.
        }",
    );
    assert_eq!(output.diagnostics.len(), 2, "{:?}", output.diagnostics);
    assert_eq!(output.program.feature_sets[0].body.len(), 1);
}

#[test]
fn test_unterminated_string_recovers() {
    let output = parse_program(
        "(Broken: Flow) {
            <Log> the <message> to the <console> with \"oops.
            <Create> the <b> with 2.
        }",
    );
    assert_eq!(output.diagnostics.len(), 1, "{:?}", output.diagnostics);
    assert!(matches!(output.diagnostics[0], ParseError::Lexical { .. }));
    assert_eq!(output.program.feature_sets[0].body.len(), 1);
}

#[test]
fn test_garbage_between_feature_sets() {
    let output = parse_program(
        "stray words here
        (Fine: Flow) {
            <Create> the <c> with 3.
        }",
    );
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.program.feature_sets.len(), 1);
}

#[test]
fn test_unclosed_feature_set() {
    let output = parse_program("(Open: Flow) { <Create> the <c> with 3.");
    assert_eq!(output.diagnostics.len(), 1);
    assert!(output.diagnostics[0].message().contains("Unclosed"));
    assert_eq!(output.program.feature_sets[0].body.len(), 1);
}

#[test]
fn test_error_positions() {
    let output = parse_program("(A: B) {\n  <Create> the <x> to.\n}");
    let span = output.diagnostics[0].span();
    assert_eq!(span.start_line, 1);
}

/* ===================== Printing ===================== */

#[test]
fn test_print_parse_is_idempotent() {
    let source = r#"
(Application-Start: Shop) {
    <Create> the <numbers> with [1, 2, 3, 4].
    <Compute> the <total: sum> from the <numbers>.
    <Create> the <path> with 'C:\temp'.
    <Filter> the <active> from the <orders> where status = "active" and amount >= 2.
    <Log> the <total> to the <console> when not (<total> < 10 or <debug> is empty).
    <Publish> as <shop-total> <total>.
    <Accept> the <transition: draft_to_placed> on <order: status>.
    if <total> > 5 then {
        <Log> the <big> to the <console>.
    } else if <total> > 2 {
        <Log> the <medium> to the <console>.
    }
    match <code> {
        case "a" where <flag> { <Log> the <a> to the <console>. }
        case /x\/y/i { <Log> the <b> to the <console>. }
        otherwise { <Log> the <c> to the <console>. }
    }
    parallel for each <n> at <i> in <numbers> where n % 2 == 0 {
        <Log> the <n> to the <console>.
    }
    for <k> from 1 to 3 - 1 {
        <Emit> a <Tick: event> with { count: <k>, "total value": -1 }.
    }
    <Return> an <OK: status> with <total>.
}
"#;
    let first = render_program(&parse_ok(source));
    let second = render_program(&parse_ok(&first));
    assert_eq!(first, second);
}

#[test]
fn test_expression_precedence_printing() {
    let expr = parse_expression("(<a> + <b>) * <c> - -2").unwrap();
    assert_eq!(expr.to_string(), "(<a> + <b>) * <c> - -2");
    let expr = parse_expression("<a> and (<b> or <c>)").unwrap();
    assert_eq!(expr.to_string(), "<a> and (<b> or <c>)");
}
