//! Tests for if, when and match statements

use super::helpers::{run, run_with, services};
use crate::executor::types::Value;
use crate::executor::ExecState;

/* ===================== If ===================== */

const TIERS: &str = r#"
(Tier: Pricing) {
    <Create> the <amount> with AMOUNT.
    if <amount> > 100 then {
        <Return> an <OK: status> with "large".
    } else if <amount> > 10 {
        <Return> an <OK: status> with "medium".
    } else {
        <Return> an <OK: status> with "small".
    }
}
"#;

async fn tier(amount: i64) -> Value {
    let outcome = run(&TIERS.replace("AMOUNT", &amount.to_string())).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    outcome.response.unwrap().value
}

#[tokio::test]
async fn test_if_else_chain() {
    assert_eq!(tier(500).await, Value::from("large"));
    assert_eq!(tier(50).await, Value::from("medium"));
    assert_eq!(tier(5).await, Value::from("small"));
}

#[tokio::test]
async fn test_branch_bindings_stay_in_branch() {
    let outcome = run(r#"
        (Scoped: Demo) {
            <Create> the <flag> with true.
            if <flag> then {
                <Create> the <inner> with 1.
            }
            <Create> the <outer> with 2.
        }
    "#)
    .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert!(outcome.binding("inner").is_none());
    assert_eq!(outcome.binding("outer"), Some(&Value::from(2i64)));
}

/* ===================== When ===================== */

#[tokio::test]
async fn test_when_block_leaves_after_body() {
    let services = services();
    let outcome = run_with(
        services.clone(),
        r#"
        (Validate: Demo) {
            <Create> the <name> with "".
            when <name> is empty {
                <Store> the <name> into the <rejected-repository>.
            }
            <Create> the <accepted> with true.
        }
    "#,
    )
    .await;

    assert_eq!(outcome.state, ExecState::Returned);
    assert!(outcome.response.is_none());
    assert!(outcome.binding("accepted").is_none());
    assert_eq!(services.repositories.len("rejected-repository"), 1);
}

#[tokio::test]
async fn test_unsatisfied_when_continues() {
    let outcome = run(r#"
        (Validate: Demo) {
            <Create> the <name> with "Ada".
            when <name> is empty {
                <Throw> a <BadRequest: error> with "name required".
            }
            <Create> the <accepted> with true.
        }
    "#)
    .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.binding("accepted"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn test_negated_guard_on_undefined_is_not_satisfied() {
    let outcome = run(r#"
        (Guard: Demo) {
            <Create> the <ran> with true when not <missing> == 1.
            when not (<missing> > 0) {
                <Throw> a <Unexpected: error> with "guard ran".
            }
            <Create> the <after> with true.
        }
    "#)
    .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert!(outcome.binding("ran").is_none());
    assert_eq!(outcome.binding("after"), Some(&Value::Bool(true)));
}

/* ===================== Match ===================== */

const ROUTER: &str = r#"
(Route Code: Demo) {
    <Create> the <code> with CODE.
    <Create> the <strict> with false.
    match <code> {
        case "A" { <Return> an <OK: status> with "first". }
        case "A" { <Return> an <OK: status> with "second". }
        case /^b+$/i where <strict> == false { <Return> an <OK: status> with "bees". }
        case 42 { <Return> an <OK: status> with "answer". }
        otherwise { <Return> an <OK: status> with "other". }
    }
}
"#;

async fn route(code: &str) -> Value {
    let outcome = run(&ROUTER.replace("CODE", code)).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    outcome.response.unwrap().value
}

#[tokio::test]
async fn test_first_matching_case_wins() {
    assert_eq!(route("\"A\"").await, Value::from("first"));
}

#[tokio::test]
async fn test_regex_and_literal_cases() {
    assert_eq!(route("\"BBB\"").await, Value::from("bees"));
    assert_eq!(route("42").await, Value::from("answer"));
}

#[tokio::test]
async fn test_otherwise_when_nothing_matches() {
    assert_eq!(route("\"zzz\"").await, Value::from("other"));
}

#[tokio::test]
async fn test_match_without_otherwise_falls_through() {
    let outcome = run(r#"
        (Route Code: Demo) {
            <Create> the <code> with "q".
            match <code> {
                case "A" { <Return> an <OK: status> with "first". }
            }
            <Create> the <after> with 1.
        }
    "#)
    .await;

    assert!(outcome.response.is_none());
    assert_eq!(outcome.binding("after"), Some(&Value::from(1i64)));
}
