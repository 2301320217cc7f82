// End-to-end runs of retrace programs

use pretty_assertions::assert_eq;
use retrace::compiler::compile_source;
use retrace::interpreter::constants::MAX_RESULT_DEPTH;
use retrace::interpreter::{
    AnalysisError, Analyzer, AnalyzerConfig, EngineFault, MatchResult, ResultValue, RunStatus,
    RuntimeError, StepOutcome,
};

fn analyzer(source: &str) -> Analyzer {
    let program = compile_source(source).expect("Compilation failed");
    Analyzer::new(program, AnalyzerConfig::default())
}

/// Run `source` against `input` and return the result of a successful match
fn run_match(source: &str, input: &str) -> MatchResult {
    let mut analyzer = analyzer(source);
    let matched = analyzer.start(input, None).expect("Analysis failed");
    assert!(matched, "Expected a match for {:?}", input);
    analyzer.get_result().cloned().expect("Matched run has a result")
}

fn run_no_match(source: &str, input: &str) {
    let mut analyzer = analyzer(source);
    let matched = analyzer.start(input, None).expect("Analysis failed");
    assert!(!matched, "Expected no match for {:?}", input);
    assert_eq!(analyzer.status(), RunStatus::NoMatch);
}

fn run_error(source: &str, input: &str) -> AnalysisError {
    let mut analyzer = analyzer(source);
    analyzer.start(input, None).expect_err("Expected the run to abort")
}

#[test]
fn test_alternation_then_sequence() {
    let source = r#"pattern main { ("a" | "b") "c" }"#;

    let result = run_match(source, "bc");
    assert_eq!(result.length, 2);
    assert_eq!(result.value, ResultValue::Object(Default::default()));

    run_no_match(source, "bb");
}

#[test]
fn test_counted_quantifier_is_greedy() {
    let source = r#"pattern main { "a"{2,4} }"#;

    assert_eq!(run_match(source, "aaa").length, 3);
    assert_eq!(run_match(source, "aaaaa").length, 4);
    run_no_match(source, "a");
}

#[test]
fn test_match_does_not_require_end_of_input() {
    assert_eq!(run_match(r#"pattern main { "ab" }"#, "abc").length, 2);
    run_no_match(r#"pattern main { "ab" $ }"#, "abc");
}

#[test]
fn test_greedy_quantifier_gives_back() {
    let result = run_match(r#"pattern main { "a"+ "a" }"#, "aaa");
    assert_eq!(result.length, 3);
}

#[test]
fn test_atomic_group_does_not_give_back() {
    run_no_match(r#"pattern main { atomic("a"+) "a" }"#, "aaa");
}

#[test]
fn test_lazy_quantifier_extends_on_demand() {
    let source = r#"pattern main { s: "a"*? "b" }"#;
    let result = run_match(source, "aab");
    assert_eq!(result.length, 3);
    assert_eq!(result.value.get("s"), Some(&ResultValue::Str("aa".to_string())));

    let result = run_match(r#"pattern main { s: "a"*? }"#, "aaa");
    assert_eq!(result.length, 0);
    assert_eq!(result.value.get("s"), Some(&ResultValue::Str(String::new())));
}

#[test]
fn test_lookaheads_consume_nothing() {
    let result = run_match(r#"pattern main { ahead("ab") "a" }"#, "ab");
    assert_eq!(result.length, 1);

    assert_eq!(run_match(r#"pattern main { not("x") . }"#, "a").length, 1);
    run_no_match(r#"pattern main { not("x") . }"#, "x");
}

#[test]
fn test_captures_and_nested_patterns() {
    let source = r#"
        pattern digit { d: "0".."9" }
        pattern main { n: ("0".."9")+ "-" last: digit }
    "#;
    let result = run_match(source, "123-4");
    assert_eq!(result.length, 5);
    assert_eq!(result.value.get("n"), Some(&ResultValue::Str("123".to_string())));
    assert_eq!(
        result.value.get("last").and_then(|v| v.get("d")),
        Some(&ResultValue::Str("4".to_string()))
    );
}

#[test]
fn test_backtracking_restores_variables() {
    // The third repetition bumps `n` before "ab" fails; the rollback
    // must undo it
    let source = r#"
        pattern main {
            { let n = 0; }
            ("a" { n = n + 1; })*
            "ab"
        }
    "#;
    let result = run_match(source, "aaab");
    assert_eq!(result.length, 4);
    assert_eq!(result.value.get("n"), Some(&ResultValue::Int(2)));
}

#[test]
fn test_backtracking_truncates_output() {
    let source = r#"
        pattern main {
            "a" { print("first"); } "z"
          | "a" { print("second"); } "b"
        }
    "#;
    let result = run_match(source, "ab");
    assert_eq!(result.output, "second\n");
}

#[test]
fn test_program_errors_are_retried_by_backtracking() {
    let source = r#"pattern main { { error("bad branch"); } | "a" }"#;
    assert_eq!(run_match(source, "a").length, 1);
}

#[test]
fn test_error_with_no_alternative_left_aborts() {
    let err = run_error(r#"pattern main { { error("bad input"); } }"#, "");
    match err {
        AnalysisError::Runtime(RuntimeError::UserError { message, .. }) => {
            assert_eq!(message, "bad input")
        }
        other => panic!("Expected a user error, got {:?}", other),
    }
}

#[test]
fn test_function_call_releases_its_context() {
    let source = r#"
        fun f(x) { return x + 1; }
        fun main() { return f(10); }
    "#;
    let mut analyzer = analyzer(source);
    assert!(analyzer.start("", None).unwrap());
    assert_eq!(analyzer.get_result().unwrap().value, ResultValue::Int(11));
    // Only the root and module contexts survive the call
    assert_eq!(analyzer.live_contexts(), 2);

    let mut without_call = self::analyzer("fun main() { return 10 + 1; }");
    assert!(without_call.start("", None).unwrap());
    assert_eq!(analyzer.contexts_created(), without_call.contexts_created() + 1);
}

#[test]
fn test_default_and_named_arguments() {
    let source = r#"
        fun scale(x, by = 2, offset = 0) { return x * by + offset; }
        fun main() { return [scale(3), scale(3, 10), scale(3, offset = 1)]; }
    "#;
    let result = run_match(source, "");
    assert_eq!(
        result.value,
        ResultValue::List(vec![
            ResultValue::Int(6),
            ResultValue::Int(30),
            ResultValue::Int(7)
        ])
    );
}

#[test]
fn test_too_many_arguments() {
    let source = r#"
        fun f(x) { return x; }
        fun main() { return f(1, 2); }
    "#;
    match run_error(source, "") {
        AnalysisError::Runtime(RuntimeError::BadArgument { .. }) => {}
        other => panic!("Expected a bad argument error, got {:?}", other),
    }
}

#[test]
fn test_tagged_exit_continues_after_block() {
    let source = r#"
        fun main() {
            'bar: {
                'foo: {
                    exit 'foo;
                    print("skipped");
                }
                print("after foo");
            }
            return 1;
        }
    "#;
    let result = run_match(source, "");
    assert_eq!(result.output, "after foo\n");
    assert_eq!(result.value, ResultValue::Int(1));
}

#[test]
fn test_unknown_tag_is_an_engine_fault() {
    let source = r#"
        fun main() {
            'bar: { exit 'baz; }
        }
    "#;
    let err = run_error(source, "");
    assert!(err.is_internal());
    match err {
        AnalysisError::Fault {
            fault: EngineFault::UnhandledControlStatementSignal { tag, .. },
            ..
        } => assert_eq!(tag.as_deref(), Some("baz")),
        other => panic!("Expected an unhandled control fault, got {:?}", other),
    }
}

#[test]
fn test_loops_and_builtins() {
    let source = r#"
        fun main() {
            let total = 0;
            for v in range(1, 5) {
                if v == 3 { next; }
                total += v;
            }
            let i = 0;
            while true {
                i += 1;
                if i >= 4 { exit; }
            }
            return { total: total, i: i, sum: sum([1, 2, 3]), len: len("abc") };
        }
    "#;
    let result = run_match(source, "");
    assert_eq!(result.value.get("total"), Some(&ResultValue::Int(7)));
    assert_eq!(result.value.get("i"), Some(&ResultValue::Int(4)));
    assert_eq!(result.value.get("sum"), Some(&ResultValue::Int(6)));
    assert_eq!(result.value.get("len"), Some(&ResultValue::Int(3)));
}

#[test]
fn test_missing_entry_point() {
    match run_error("fun other() { return 1; }", "") {
        AnalysisError::Runtime(RuntimeError::EntryPointNotFound { name, .. }) => {
            assert_eq!(name, "main")
        }
        other => panic!("Expected a missing entry point, got {:?}", other),
    }
}

#[test]
fn test_configured_entry_point() {
    let mut analyzer = analyzer(r#"pattern word { ("a".."z")+ }"#);
    analyzer.set_entry_point("word");
    assert!(analyzer.start("abc1", None).unwrap());
    assert_eq!(analyzer.get_result().unwrap().length, 3);
}

#[test]
fn test_step_limit_times_out() {
    let program = compile_source("fun main() { while true { } }").unwrap();
    let config = AnalyzerConfig {
        step_limit: Some(500),
        ..AnalyzerConfig::default()
    };
    let mut analyzer = Analyzer::new(program, config);
    assert_eq!(analyzer.start("", None), Ok(false));
    assert_eq!(analyzer.status(), RunStatus::TimedOut);
}

#[test]
fn test_alternative_limit_aborts() {
    let program = compile_source(r#"pattern main { "a"* }"#).unwrap();
    let config = AnalyzerConfig {
        max_alternatives: 3,
        ..AnalyzerConfig::default()
    };
    let mut analyzer = Analyzer::new(program, config);
    match analyzer.start("aaaaaaaa", None) {
        Err(AnalysisError::Runtime(RuntimeError::AlternativeLimitExceeded { limit, .. })) => {
            assert_eq!(limit, 3)
        }
        other => panic!("Expected the alternative limit to abort, got {:?}", other),
    }
}

#[test]
fn test_stepping_matches_running() {
    let source = r#"pattern main { ("a" | "b")+ "c" }"#;

    let mut stepped = analyzer(source);
    stepped.prepare("abac");
    let mut steps = 0;
    let matched = loop {
        steps += 1;
        match stepped.step_once().expect("Step failed") {
            StepOutcome::Continue => {}
            StepOutcome::Finished(matched) => break matched,
        }
        assert!(steps < 10_000, "Stepping did not terminate");
    };
    assert!(matched);

    let mut run = analyzer(source);
    assert!(run.start("abac", None).unwrap());
    assert_eq!(stepped.get_result(), run.get_result());
    assert_eq!(stepped.steps(), run.steps());
    assert!(stepped.backtracks() > 0);
}

#[test]
fn test_step_before_prepare_is_a_fault() {
    let mut analyzer = analyzer("fun main() {}");
    match analyzer.step_once() {
        Err(AnalysisError::Fault {
            fault: EngineFault::NotPrepared,
            ..
        }) => {}
        other => panic!("Expected a not-prepared fault, got {:?}", other),
    }
}

#[test]
fn test_result_serializes_to_json() {
    let result = run_match(r#"pattern main { w: ("a".."z")+ }"#, "hi");
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({
            "matched": true,
            "length": 2,
            "value": {"w": "hi"},
            "output": ""
        })
    );
}

#[test]
fn test_run_resumes_after_manual_steps() {
    let source = r#"pattern main { n: ("0".."9")+ }"#;
    let mut analyzer = analyzer(source);
    analyzer.prepare("42x");
    for _ in 0..3 {
        assert_eq!(analyzer.step_once().unwrap(), StepOutcome::Continue);
    }
    assert_eq!(analyzer.run(None), Ok(true));
    assert_eq!(
        analyzer.get_result().unwrap().value.get("n"),
        Some(&ResultValue::Str("42".to_string()))
    );
}

fn list_of(items: &[ResultValue]) -> ResultValue {
    ResultValue::List(items.to_vec())
}

fn ints(values: &[i64]) -> ResultValue {
    ResultValue::List(values.iter().copied().map(ResultValue::Int).collect())
}

#[test]
fn test_while_redo_skips_the_condition() {
    let source = r#"
        fun main() {
            let i = 0;
            let redone = false;
            while i < 3 {
                i += 1;
                if i == 3 && !redone { redone = true; redo; }
            }
            return i;
        }
    "#;
    assert_eq!(run_match(source, "").value, ResultValue::Int(4));
}

#[test]
fn test_for_restart_rewinds_the_iterator() {
    let source = r#"
        fun main() {
            let seen = [];
            let restarted = false;
            for v in [1, 2, 3] {
                if v == 3 && !restarted { restarted = true; restart; }
                push(seen, v);
            }
            return seen;
        }
    "#;
    assert_eq!(run_match(source, "").value, ints(&[1, 2, 1, 2, 3]));
}

#[test]
fn test_for_redo_repeats_the_element() {
    let source = r#"
        fun main() {
            let seen = [];
            let redone = false;
            for v in [1, 2] {
                push(seen, v);
                if v == 1 && !redone { redone = true; redo; }
            }
            return seen;
        }
    "#;
    assert_eq!(run_match(source, "").value, ints(&[1, 1, 2]));
}

#[test]
fn test_tagged_next_leaves_the_inner_loop() {
    let source = r#"
        fun main() {
            let pairs = [];
            'o: for i in [1, 2] {
                for j in [1, 2, 3] {
                    push(pairs, [i, j]);
                    next 'o;
                }
            }
            return pairs;
        }
    "#;
    assert_eq!(
        run_match(source, "").value,
        list_of(&[ints(&[1, 1]), ints(&[2, 1])])
    );
}

#[test]
fn test_tagged_blocks_redo_and_restart() {
    let source = r#"
        fun main() {
            let n = 0;
            'again: {
                n += 1;
                if n < 3 { redo 'again; }
            }
            let m = 0;
            'over: {
                m += 10;
                if m < 30 { restart 'over; }
            }
            return [n, m];
        }
    "#;
    assert_eq!(run_match(source, "").value, ints(&[3, 30]));
}

#[test]
fn test_for_loop_resumes_across_a_backtrack() {
    // The second `ab()` fails at "b", so the run returns into the first
    // call mid-loop and takes its longer branch
    let source = r#"
        pattern ab { "a" | "ab" }
        fun main() {
            let out = [];
            for s in ["1", "2"] {
                ab();
                push(out, s);
            }
            return out;
        }
    "#;
    let result = run_match(source, "abab");
    assert_eq!(result.length, 3);
    assert_eq!(
        result.value,
        list_of(&[ResultValue::Str("1".to_string()), ResultValue::Str("2".to_string())])
    );
}

#[test]
fn test_deeply_nested_result_is_an_error() {
    let source = r#"
        fun main() {
            let l = nil;
            let i = 0;
            while i < 2000 { l = [l]; i += 1; }
            return l;
        }
    "#;
    match run_error(source, "") {
        AnalysisError::Runtime(RuntimeError::NestingTooDeep { limit, .. }) => {
            assert_eq!(limit, MAX_RESULT_DEPTH)
        }
        other => panic!("Expected a nesting error, got {:?}", other),
    }

    let printed = source.replace("return l;", "print(l); return 1;");
    assert!(matches!(
        run_error(&printed, ""),
        AnalysisError::Runtime(RuntimeError::NestingTooDeep { .. })
    ));
}

#[test]
fn test_huge_range_is_a_bad_argument() {
    match run_error("fun main() { return range(0, 9223372036854775807); }", "") {
        AnalysisError::Runtime(RuntimeError::BadArgument { message, .. }) => {
            assert!(message.contains("range"), "Unexpected message {:?}", message)
        }
        other => panic!("Expected a bad argument, got {:?}", other),
    }
}

#[test]
fn test_collection_interval_grows_with_live_heap() {
    let source = r#"
        fun main() {
            let keep = [];
            let i = 0;
            while i < 1000 { push(keep, [i]); i += 1; }
            return len(keep);
        }
    "#;
    let config = AnalyzerConfig {
        gc_threshold: 64,
        ..AnalyzerConfig::default()
    };
    let mut analyzer = Analyzer::new(compile_source(source).unwrap(), config);
    assert_eq!(analyzer.next_collection(), 64);

    assert!(analyzer.start("", None).unwrap());
    assert_eq!(analyzer.get_result().unwrap().value, ResultValue::Int(1000));
    assert!(
        analyzer.next_collection() > 500,
        "Collection interval stayed at {}",
        analyzer.next_collection()
    );

    analyzer.prepare("");
    assert_eq!(analyzer.next_collection(), 64);
}
