//! The standard library bound in the root context.
//!
//! Builtins run inside a builtin context created for each call. Most finish
//! in one step; `sum` adds one element per step, keeping its progress in the
//! context's `builtin_step` counter and a `total` binding, so a long
//! summation can be paused and resumed like any other node.

use crate::interpreter::engine::Analyzer;
use crate::interpreter::constants::MAX_RANGE_LEN;
use crate::interpreter::errors::{Interrupt, RuntimeError};
use crate::interpreter::expressions::{binary_primitive, values_equal};
use crate::interpreter::result::ResultValue;
use crate::memory::context;
use crate::memory::stack::ArgumentBundle;
use crate::memory::value::{HeapValue, Key, Value};
use crate::parser::ast::{BinOp, Span};
use rustc_hash::FxHashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Int,
    Push,
    Keys,
    Set,
    Has,
    Range,
    Sum,
    Pos,
    Error,
}

impl Builtin {
    pub const ALL: [Builtin; 12] = [
        Builtin::Print,
        Builtin::Len,
        Builtin::Str,
        Builtin::Int,
        Builtin::Push,
        Builtin::Keys,
        Builtin::Set,
        Builtin::Has,
        Builtin::Range,
        Builtin::Sum,
        Builtin::Pos,
        Builtin::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Push => "push",
            Builtin::Keys => "keys",
            Builtin::Set => "set",
            Builtin::Has => "has",
            Builtin::Range => "range",
            Builtin::Sum => "sum",
            Builtin::Pos => "pos",
            Builtin::Error => "error",
        }
    }

    /// Accepted positional argument counts, inclusive
    fn arity(self) -> (usize, usize) {
        match self {
            Builtin::Print => (0, usize::MAX),
            Builtin::Len | Builtin::Str | Builtin::Int | Builtin::Keys | Builtin::Sum => (1, 1),
            Builtin::Push | Builtin::Has => (2, 2),
            Builtin::Set => (0, 1),
            Builtin::Range => (1, 2),
            Builtin::Pos => (0, 0),
            Builtin::Error => (0, 1),
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of one builtin step
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltinOutcome {
    /// Finished with an owned value
    Done(Value),
    /// Needs another step
    Pending,
}

impl Analyzer {
    /// Run one step of `builtin` with the arguments of the current call
    pub(crate) fn run_builtin(
        &mut self,
        builtin: Builtin,
        span: Span,
    ) -> Result<BuiltinOutcome, Interrupt> {
        let args = self.builtin_arguments()?;
        let bad_argument = |message: String| -> Interrupt {
            RuntimeError::BadArgument { message, span }.into()
        };

        if let Some((name, _)) = args.named.first() {
            return Err(bad_argument(format!(
                "{}() takes no named argument '{}'",
                builtin, name
            )));
        }
        let (min, max) = builtin.arity();
        let count = args.positional.len();
        if count < min || count > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            return Err(bad_argument(format!(
                "{}() takes {} argument(s) but {} were given",
                builtin, expected, count
            )));
        }

        let value = match builtin {
            Builtin::Print => {
                let line = args
                    .positional
                    .iter()
                    .map(|v| self.render(v, span))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(" ");
                self.output.print(&line);
                self.output.print("\n");
                Value::Nil
            }
            Builtin::Len => self.builtin_len(&args.positional[0], span)?,
            Builtin::Str => Value::Str(self.render(&args.positional[0], span)?),
            Builtin::Int => builtin_int(&args.positional[0], span)?,
            Builtin::Push => {
                let (list, item) = (&args.positional[0], &args.positional[1]);
                let address = self.expect_kind(list, "list", span, |v| {
                    matches!(v, HeapValue::List(_))
                })?;
                self.heap.retain(item)?;
                if let HeapValue::List(items) = self.heap.write_for_mutation(address)? {
                    items.push(item.clone());
                }
                Value::Nil
            }
            Builtin::Keys => self.builtin_keys(&args.positional[0], span)?,
            Builtin::Set => self.builtin_set(&args, span)?,
            Builtin::Has => self.builtin_has(&args.positional[0], &args.positional[1], span)?,
            Builtin::Range => builtin_range(&args, span).map(|items| {
                Value::Ref(self.heap.allocate(HeapValue::List(items)))
            })?,
            Builtin::Sum => return self.sum_step(&args.positional[0], span),
            Builtin::Pos => Value::Int(self.position()? as i64),
            Builtin::Error => {
                let message = match args.positional.first() {
                    Some(value) => self.render(value, span)?,
                    None => "error".to_string(),
                };
                return Err(RuntimeError::UserError { message, span }.into());
            }
        };
        Ok(BuiltinOutcome::Done(value))
    }

    /// Text form used by `print` and `str`: strings print bare
    fn render(&self, value: &Value, span: Span) -> Result<String, Interrupt> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Ok(ResultValue::from_value(&self.heap, other, span)?.to_string()),
        }
    }

    /// Address of `value` if it references a cell accepted by `accepts`
    fn expect_kind(
        &self,
        value: &Value,
        expected: &str,
        span: Span,
        accepts: impl Fn(&HeapValue) -> bool,
    ) -> Result<crate::memory::value::Address, Interrupt> {
        let found = match value {
            Value::Ref(address) => {
                let cell = self.heap.read(*address)?;
                if accepts(cell) {
                    return Ok(*address);
                }
                cell.type_name()
            }
            other => other.type_name(),
        };
        Err(RuntimeError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
            span,
        }
        .into())
    }

    fn builtin_len(&self, value: &Value, span: Span) -> Result<Value, Interrupt> {
        let len = match value {
            Value::Str(s) => s.chars().count(),
            Value::Ref(address) => match self.heap.read(*address)? {
                HeapValue::List(items) => items.len(),
                HeapValue::Object(fields) => fields.len(),
                HeapValue::Set(members) => members.len(),
                HeapValue::Context(ctx) => ctx.bindings.len(),
                other => {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "string or collection".to_string(),
                        found: other.type_name().to_string(),
                        span,
                    }
                    .into())
                }
            },
            other => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "string or collection".to_string(),
                    found: other.type_name().to_string(),
                    span,
                }
                .into())
            }
        };
        Ok(Value::Int(len as i64))
    }

    fn builtin_keys(&mut self, value: &Value, span: Span) -> Result<Value, Interrupt> {
        let address = self.expect_kind(value, "object", span, |v| {
            matches!(v, HeapValue::Object(_) | HeapValue::Context(_))
        })?;
        let mut keys: Vec<String> = match self.heap.read(address)? {
            HeapValue::Object(fields) => fields.keys().cloned().collect(),
            HeapValue::Context(ctx) => ctx.bindings.keys().cloned().collect(),
            _ => Vec::new(),
        };
        keys.sort();
        let items = keys.into_iter().map(Value::Str).collect();
        Ok(Value::Ref(self.heap.allocate(HeapValue::List(items))))
    }

    fn builtin_set(&mut self, args: &ArgumentBundle, span: Span) -> Result<Value, Interrupt> {
        let mut members = FxHashSet::default();
        if let Some(source) = args.positional.first() {
            let address = self.expect_kind(source, "list", span, |v| {
                matches!(v, HeapValue::List(_))
            })?;
            if let HeapValue::List(items) = self.heap.read(address)? {
                for item in items {
                    let key = Key::from_value(item).ok_or_else(|| RuntimeError::TypeMismatch {
                        expected: "hashable set member".to_string(),
                        found: item.type_name().to_string(),
                        span,
                    })?;
                    members.insert(key);
                }
            }
        }
        Ok(Value::Ref(self.heap.allocate(HeapValue::Set(members))))
    }

    fn builtin_has(&self, container: &Value, key: &Value, span: Span) -> Result<Value, Interrupt> {
        let found = match (container, key) {
            (Value::Str(s), Value::Str(part)) => s.contains(part.as_str()),
            (Value::Ref(address), _) => match (self.heap.read(*address)?, key) {
                (HeapValue::List(items), key) => items.iter().any(|item| values_equal(item, key)),
                (HeapValue::Object(fields), Value::Str(k)) => fields.contains_key(k),
                (HeapValue::Context(ctx), Value::Str(k)) => ctx.bindings.contains_key(k),
                (HeapValue::Set(members), key) => {
                    Key::from_value(key).is_some_and(|k| members.contains(&k))
                }
                (HeapValue::Object(_) | HeapValue::Context(_), _) => false,
                (other, _) => {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "collection".to_string(),
                        found: other.type_name().to_string(),
                        span,
                    }
                    .into())
                }
            },
            (other, _) => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "collection".to_string(),
                    found: other.type_name().to_string(),
                    span,
                }
                .into())
            }
        };
        Ok(Value::Bool(found))
    }

    /// Add the element at `builtin_step` to the running total, or finish
    fn sum_step(&mut self, list: &Value, span: Span) -> Result<BuiltinOutcome, Interrupt> {
        let address = self.expect_kind(list, "list", span, |v| matches!(v, HeapValue::List(_)))?;
        let ctx = self.current_context()?;
        let index = context::read_context(&self.heap, ctx)?.builtin_step as usize;

        let total = if index == 0 {
            Value::Int(0)
        } else {
            context::lookup(&self.heap, ctx, "total")?.unwrap_or(Value::Int(0))
        };
        let element = match self.heap.read(address)? {
            HeapValue::List(items) => items.get(index).cloned(),
            _ => None,
        };

        let Some(element) = element else {
            return Ok(BuiltinOutcome::Done(total));
        };
        let total = binary_primitive(BinOp::Add, &total, &element)
            .map_err(|e| e.at("sum", span))?;
        self.declare_in(ctx, "total", total, false)?;
        context::context_mut(&mut self.heap, ctx)?.builtin_step += 1;
        Ok(BuiltinOutcome::Pending)
    }
}

fn builtin_int(value: &Value, span: Span) -> Result<Value, Interrupt> {
    let n = match value {
        Value::Int(n) => *n,
        Value::Float(n) => {
            let whole = n.trunc();
            // i64::MAX as f64 rounds up to 2^63, which is already out of range
            if !whole.is_finite() || whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
                return Err(RuntimeError::BadArgument {
                    message: format!("cannot convert {} to int", n),
                    span,
                }
                .into());
            }
            whole as i64
        }
        Value::Bool(b) => *b as i64,
        Value::Str(s) => s.trim().parse::<i64>().map_err(|_| RuntimeError::BadArgument {
            message: format!("cannot convert \"{}\" to int", s),
            span,
        })?,
        other => {
            return Err(RuntimeError::TypeMismatch {
                expected: "number, bool or string".to_string(),
                found: other.type_name().to_string(),
                span,
            }
            .into())
        }
    };
    Ok(Value::Int(n))
}

fn builtin_range(args: &ArgumentBundle, span: Span) -> Result<Vec<Value>, Interrupt> {
    let bound = |value: &Value| -> Result<i64, Interrupt> {
        value.as_int().ok_or_else(|| {
            RuntimeError::TypeMismatch {
                expected: "int".to_string(),
                found: value.type_name().to_string(),
                span,
            }
            .into()
        })
    };
    let (from, to) = match args.positional.as_slice() {
        [to] => (0, bound(to)?),
        [from, to] => (bound(from)?, bound(to)?),
        _ => (0, 0),
    };
    let len = (i128::from(to) - i128::from(from)).max(0);
    if len > MAX_RANGE_LEN as i128 {
        return Err(RuntimeError::BadArgument {
            message: format!(
                "range({}, {}) would hold {} elements (limit {})",
                from, to, len, MAX_RANGE_LEN
            ),
            span,
        }
        .into());
    }
    Ok((from..to).map(Value::Int).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::errors::Failure;

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<&str> = Builtin::ALL.iter().map(|b| b.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Builtin::ALL.len());
    }

    #[test]
    fn test_int_conversion() {
        let span = Span::default();
        assert_eq!(builtin_int(&Value::Float(3.9), span).unwrap(), Value::Int(3));
        assert_eq!(builtin_int(&Value::Str(" 42 ".into()), span).unwrap(), Value::Int(42));
        assert!(builtin_int(&Value::Str("x".into()), span).is_err());
    }

    #[test]
    fn test_int_rejects_unrepresentable_floats() {
        let span = Span::default();
        for n in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e19, -1e19, 9_223_372_036_854_775_807.0] {
            assert!(
                matches!(
                    builtin_int(&Value::Float(n), span),
                    Err(Interrupt::Fail(Failure::Error(RuntimeError::BadArgument { .. })))
                ),
                "int({}) should be rejected",
                n
            );
        }
        assert_eq!(builtin_int(&Value::Float(-2.5), span).unwrap(), Value::Int(-2));
        assert_eq!(
            builtin_int(&Value::Float(-9_223_372_036_854_775_808.0), span).unwrap(),
            Value::Int(i64::MIN)
        );
    }

    #[test]
    fn test_range_bounds() {
        let args = ArgumentBundle {
            positional: vec![Value::Int(2), Value::Int(5)],
            named: Vec::new(),
        };
        assert_eq!(
            builtin_range(&args, Span::default()).unwrap(),
            vec![Value::Int(2), Value::Int(3), Value::Int(4)]
        );

        let reversed = ArgumentBundle {
            positional: vec![Value::Int(5), Value::Int(2)],
            named: Vec::new(),
        };
        assert_eq!(builtin_range(&reversed, Span::default()).unwrap(), Vec::new());
    }

    #[test]
    fn test_range_length_is_limited() {
        let huge = ArgumentBundle {
            positional: vec![Value::Int(i64::MIN), Value::Int(i64::MAX)],
            named: Vec::new(),
        };
        assert!(matches!(
            builtin_range(&huge, Span::default()),
            Err(Interrupt::Fail(Failure::Error(RuntimeError::BadArgument { .. })))
        ));

        let at_limit = ArgumentBundle {
            positional: vec![Value::Int(MAX_RANGE_LEN as i64)],
            named: Vec::new(),
        };
        assert_eq!(builtin_range(&at_limit, Span::default()).unwrap().len(), MAX_RANGE_LEN);
    }
}
