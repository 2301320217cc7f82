// Operator semantics observed through whole programs

use retrace::compiler::compile_source;
use retrace::interpreter::{AnalysisError, Analyzer, AnalyzerConfig, ResultValue, RuntimeError};

fn eval(body: &str) -> Result<ResultValue, AnalysisError> {
    let source = format!("fun main() {{ {} }}", body);
    let program = compile_source(&source).expect("Compilation failed");
    let mut analyzer = Analyzer::new(program, AnalyzerConfig::default());
    analyzer.start("", None)?;
    Ok(analyzer
        .get_result()
        .map(|r| r.value.clone())
        .unwrap_or(ResultValue::Nil))
}

fn eval_ok(body: &str) -> ResultValue {
    eval(body).unwrap_or_else(|e| panic!("{} failed: {}", body, e))
}

#[test]
fn test_integer_arithmetic() {
    assert_eq!(eval_ok("let a = 7; let b = 2; return a / b;"), ResultValue::Int(3));
    assert_eq!(eval_ok("let a = 7; let b = 2; return a % b;"), ResultValue::Int(1));
    assert_eq!(eval_ok("let a = 2; return a * 3 - 10;"), ResultValue::Int(-4));
}

#[test]
fn test_int_float_promotion() {
    assert_eq!(eval_ok("let a = 1; return a + 2.5;"), ResultValue::Float(3.5));
    assert_eq!(eval_ok("let a = 2; return a == 2.0;"), ResultValue::Bool(true));
}

#[test]
fn test_division_by_zero_at_runtime() {
    match eval("let z = 0; return 1 / z;") {
        Err(AnalysisError::Runtime(RuntimeError::DivisionByZero { .. })) => {}
        other => panic!("Expected division by zero, got {:?}", other),
    }
}

#[test]
fn test_integer_overflow_is_reported() {
    match eval("let big = 9223372036854775807; return big + 1;") {
        Err(AnalysisError::Runtime(RuntimeError::IntegerOverflow { .. })) => {}
        other => panic!("Expected an overflow, got {:?}", other),
    }
}

#[test]
fn test_strings() {
    assert_eq!(
        eval_ok(r#"let n = 4; return "n=" + str(n);"#),
        ResultValue::Str("n=4".to_string())
    );
    assert_eq!(eval_ok(r#"let s = "abc"; return s[-1];"#), ResultValue::Str("c".to_string()));
    assert_eq!(eval_ok(r#"return "abc" < "abd";"#), ResultValue::Bool(true));
}

#[test]
fn test_type_mismatch() {
    match eval(r#"let s = "a"; return s - 1;"#) {
        Err(AnalysisError::Runtime(RuntimeError::TypeMismatch { .. })) => {}
        other => panic!("Expected a type mismatch, got {:?}", other),
    }
}

#[test]
fn test_logical_operators_return_deciding_operand() {
    assert_eq!(eval_ok("let a = nil; return a || 5;"), ResultValue::Int(5));
    assert_eq!(eval_ok("let a = 0; return a && missing;"), ResultValue::Int(0));
}

#[test]
fn test_containers() {
    assert_eq!(
        eval_ok("let xs = [1, 2]; push(xs, 3); return xs + [4];"),
        ResultValue::List((1..=4).map(ResultValue::Int).collect())
    );
    assert_eq!(eval_ok("let o = {a: 1}; return o.a + o[\"a\"];"), ResultValue::Int(2));
    assert_eq!(eval_ok("let o = {a: 1}; return o.b;"), ResultValue::Nil);
    assert_eq!(eval_ok("let s = set([1, 2]); return has(s, 2);"), ResultValue::Bool(true));

    match eval("let xs = [1]; return xs[3];") {
        Err(AnalysisError::Runtime(RuntimeError::IndexOutOfBounds { index: 3, len: 1, .. })) => {}
        other => panic!("Expected an out of bounds index, got {:?}", other),
    }
}
