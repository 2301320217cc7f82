//! Expression evaluation.
//!
//! Every expression node leaves exactly one owned value on the execution
//! stack for its parent. Primitive operators live in [`binary_primitive`]
//! and [`unary_primitive`] so constant folding and the analyzer agree on
//! every result.

use crate::compiler::node::{Literal, NodeId, Signal};
use crate::interpreter::engine::{Analyzer, StepResult};
use crate::interpreter::errors::{Interrupt, RuntimeError};
use crate::interpreter::statements::list_slot;
use crate::memory::value::{HeapValue, Key, Value};
use crate::parser::ast::{BinOp, Span, UnOp};
use rustc_hash::FxHashMap;

/// Why a primitive operator could not produce a value
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorError {
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    DivisionByZero,
    Overflow,
}

impl OperatorError {
    pub fn at(self, op: &str, span: Span) -> RuntimeError {
        match self {
            OperatorError::TypeMismatch { expected, found } => RuntimeError::TypeMismatch {
                expected: expected.to_string(),
                found,
                span,
            },
            OperatorError::DivisionByZero => RuntimeError::DivisionByZero { span },
            OperatorError::Overflow => RuntimeError::IntegerOverflow {
                operation: op.to_string(),
                span,
            },
        }
    }
}

fn mismatch(expected: &'static str, left: &Value, right: &Value) -> OperatorError {
    OperatorError::TypeMismatch {
        expected,
        found: if left.type_name() == right.type_name() {
            left.type_name().to_string()
        } else {
            format!("{} and {}", left.type_name(), right.type_name())
        },
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    }
}

/// Equality: ints and floats compare numerically, references by identity
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => left == right,
    }
}

fn int_op(
    a: i64,
    b: i64,
    op: fn(i64, i64) -> Option<i64>,
) -> Result<Value, OperatorError> {
    op(a, b).map(Value::Int).ok_or(OperatorError::Overflow)
}

pub fn binary_primitive(op: BinOp, left: &Value, right: &Value) -> Result<Value, OperatorError> {
    use Value::*;

    match op {
        BinOp::Eq => return Ok(Bool(values_equal(left, right))),
        BinOp::Ne => return Ok(Bool(!values_equal(left, right))),
        BinOp::And => {
            return Ok(if left.is_truthy() {
                right.clone()
            } else {
                left.clone()
            })
        }
        BinOp::Or => {
            return Ok(if left.is_truthy() {
                left.clone()
            } else {
                right.clone()
            })
        }
        _ => {}
    }

    match (op, left, right) {
        (BinOp::Add, Str(a), Str(b)) => Ok(Str(format!("{}{}", a, b))),
        (BinOp::Add, Int(a), Int(b)) => int_op(*a, *b, i64::checked_add),
        (BinOp::Sub, Int(a), Int(b)) => int_op(*a, *b, i64::checked_sub),
        (BinOp::Mul, Int(a), Int(b)) => int_op(*a, *b, i64::checked_mul),
        (BinOp::Div | BinOp::Mod, Int(_), Int(0)) => Err(OperatorError::DivisionByZero),
        (BinOp::Div, Int(a), Int(b)) => int_op(*a, *b, i64::checked_div),
        (BinOp::Mod, Int(a), Int(b)) => int_op(*a, *b, i64::checked_rem),

        (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, Str(a), Str(b)) => Ok(Bool(match op {
            BinOp::Lt => a < b,
            BinOp::Le => a <= b,
            BinOp::Gt => a > b,
            _ => a >= b,
        })),

        _ => {
            let (Some(a), Some(b)) = (as_float(left), as_float(right)) else {
                let expected = match op {
                    BinOp::Add => "numbers or strings",
                    BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => "comparable values",
                    _ => "numbers",
                };
                return Err(mismatch(expected, left, right));
            };
            match op {
                BinOp::Add => Ok(Float(a + b)),
                BinOp::Sub => Ok(Float(a - b)),
                BinOp::Mul => Ok(Float(a * b)),
                BinOp::Div | BinOp::Mod if b == 0.0 => Err(OperatorError::DivisionByZero),
                BinOp::Div => Ok(Float(a / b)),
                BinOp::Mod => Ok(Float(a % b)),
                BinOp::Lt => Ok(Bool(a < b)),
                BinOp::Le => Ok(Bool(a <= b)),
                BinOp::Gt => Ok(Bool(a > b)),
                BinOp::Ge => Ok(Bool(a >= b)),
                BinOp::Eq | BinOp::Ne | BinOp::And | BinOp::Or => {
                    Err(mismatch("numbers", left, right))
                }
            }
        }
    }
}

pub fn unary_primitive(op: UnOp, operand: &Value) -> Result<Value, OperatorError> {
    match (op, operand) {
        (UnOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnOp::Neg, Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or(OperatorError::Overflow),
        (UnOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnOp::Neg, other) => Err(OperatorError::TypeMismatch {
            expected: "number",
            found: other.type_name().to_string(),
        }),
    }
}

impl Analyzer {
    pub(crate) fn step_literal(&mut self, id: NodeId, literal: &Literal) -> StepResult {
        let value = match literal {
            Literal::Nil => Value::Nil,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(n) => Value::Float(*n),
            Literal::Str(s) => Value::Str(s.clone()),
        };
        self.stack.push(value);
        self.finish(id)
    }

    pub(crate) fn step_identifier(&mut self, id: NodeId, name: &str, span: Span) -> StepResult {
        let value = self.lookup(name, span)?;
        self.heap.retain(&value)?;
        self.stack.push(value);
        self.finish(id)
    }

    pub(crate) fn step_list(&mut self, id: NodeId, elements: &[NodeId], signal: Signal) -> StepResult {
        let next = match signal {
            Signal::Start => 0,
            Signal::Child(i) => i as usize + 1,
            other => return Err(self.invalid_signal(id, other)),
        };
        if let Some(element) = elements.get(next) {
            self.goto(*element, Signal::Start);
            return Ok(());
        }

        let items = self.stack.pop_values(elements.len())?;
        let list = self.heap.allocate(HeapValue::List(items));
        self.stack.push(Value::Ref(list));
        self.finish(id)
    }

    pub(crate) fn step_object(
        &mut self,
        id: NodeId,
        keys: &[String],
        values: &[NodeId],
        signal: Signal,
    ) -> StepResult {
        let next = match signal {
            Signal::Start => 0,
            Signal::Child(i) => i as usize + 1,
            other => return Err(self.invalid_signal(id, other)),
        };
        if let Some(value) = values.get(next) {
            self.goto(*value, Signal::Start);
            return Ok(());
        }

        let items = self.stack.pop_values(values.len())?;
        let mut fields = FxHashMap::default();
        for (key, value) in keys.iter().zip(items) {
            if let Some(old) = fields.insert(key.clone(), value) {
                self.heap.release(&old)?;
            }
        }
        let object = self.heap.allocate(HeapValue::Object(fields));
        self.stack.push(Value::Ref(object));
        self.finish(id)
    }

    pub(crate) fn step_binary(
        &mut self,
        id: NodeId,
        op: BinOp,
        left: NodeId,
        right: NodeId,
        span: Span,
        signal: Signal,
    ) -> StepResult {
        let short_circuit = matches!(op, BinOp::And | BinOp::Or);
        match signal {
            Signal::Start => {
                self.goto(left, Signal::Start);
                Ok(())
            }
            Signal::Child(0) if short_circuit => {
                // The left value is the result when it decides the outcome
                let truthy = match self.stack.peek()? {
                    crate::memory::stack::Slot::Value(value) => value.is_truthy(),
                    _ => false,
                };
                if truthy == (op == BinOp::Or) {
                    return self.finish(id);
                }
                let value = self.stack.pop_value()?;
                self.heap.release(&value)?;
                self.goto(right, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                self.goto(right, Signal::Start);
                Ok(())
            }
            Signal::Child(1) if short_circuit => self.finish(id),
            Signal::Child(1) => {
                let operands = self.stack.pop_values(2)?;
                let result = self.binary_value(op, &operands[0], &operands[1], span)?;
                for operand in &operands {
                    self.heap.release(operand)?;
                }
                self.stack.push(result);
                self.finish(id)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Apply `op` to two borrowed values, returning an owned result
    pub(crate) fn binary_value(
        &mut self,
        op: BinOp,
        left: &Value,
        right: &Value,
        span: Span,
    ) -> Result<Value, Interrupt> {
        if let (BinOp::Add, Value::Ref(a), Value::Ref(b)) = (op, left, right) {
            if let (HeapValue::List(x), HeapValue::List(y)) = (self.heap.read(*a)?, self.heap.read(*b)?) {
                let items: Vec<Value> = x.iter().chain(y.iter()).cloned().collect();
                for item in &items {
                    self.heap.retain(item)?;
                }
                return Ok(Value::Ref(self.heap.allocate(HeapValue::List(items))));
            }
        }

        binary_primitive(op, left, right).map_err(|e| e.at(op.symbol(), span).into())
    }

    pub(crate) fn step_unary(
        &mut self,
        id: NodeId,
        op: UnOp,
        operand: NodeId,
        span: Span,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                self.goto(operand, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                let value = self.stack.pop_value()?;
                let symbol = match op {
                    UnOp::Neg => "-",
                    UnOp::Not => "!",
                };
                let result = unary_primitive(op, &value).map_err(|e| e.at(symbol, span))?;
                self.heap.release(&value)?;
                self.stack.push(result);
                self.finish(id)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    pub(crate) fn step_index(
        &mut self,
        id: NodeId,
        object: NodeId,
        index: NodeId,
        span: Span,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                self.goto(object, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                self.goto(index, Signal::Start);
                Ok(())
            }
            Signal::Child(1) => {
                let operands = self.stack.pop_values(2)?;
                let value = self.index_value(&operands[0], &operands[1], span)?;
                for operand in &operands {
                    self.heap.release(operand)?;
                }
                self.stack.push(value);
                self.finish(id)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    pub(crate) fn step_field(
        &mut self,
        id: NodeId,
        object: NodeId,
        name: &str,
        span: Span,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                self.goto(object, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                let object = self.stack.pop_value()?;
                let value = self.index_value(&object, &Value::Str(name.to_string()), span)?;
                self.heap.release(&object)?;
                self.stack.push(value);
                self.finish(id)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// `object[index]` as an owned value. Missing object fields and
    /// bindings read as `nil`; list and string indices are bounds checked.
    pub(crate) fn index_value(
        &mut self,
        object: &Value,
        index: &Value,
        span: Span,
    ) -> Result<Value, Interrupt> {
        let out_of_bounds = |index: i64, len: usize| -> Interrupt {
            RuntimeError::IndexOutOfBounds { index, len, span }.into()
        };
        let mismatch = |expected: &str, found: &Value| -> Interrupt {
            RuntimeError::TypeMismatch {
                expected: expected.to_string(),
                found: found.type_name().to_string(),
                span,
            }
            .into()
        };

        let value = match (object, index) {
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let slot = list_slot(*i, chars.len()).ok_or_else(|| out_of_bounds(*i, chars.len()))?;
                return Ok(Value::Str(chars[slot].to_string()));
            }
            (Value::Ref(address), _) => match (self.heap.read(*address)?, index) {
                (HeapValue::List(items), Value::Int(i)) => {
                    let slot = list_slot(*i, items.len()).ok_or_else(|| out_of_bounds(*i, items.len()))?;
                    items[slot].clone()
                }
                (HeapValue::List(_), other) => return Err(mismatch("int", other)),
                (HeapValue::Object(fields), Value::Str(key)) => {
                    fields.get(key).cloned().unwrap_or_default()
                }
                (HeapValue::Context(ctx), Value::Str(key)) => ctx
                    .bindings
                    .get(key)
                    .map(|b| b.value.clone())
                    .unwrap_or_default(),
                (HeapValue::Object(_) | HeapValue::Context(_), other) => {
                    return Err(mismatch("string key", other))
                }
                (HeapValue::Set(members), key) => {
                    let key = Key::from_value(key).ok_or_else(|| mismatch("hashable key", key))?;
                    return Ok(Value::Bool(members.contains(&key)));
                }
                (other, _) => {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "indexable value".to_string(),
                        found: other.type_name().to_string(),
                        span,
                    }
                    .into())
                }
            },
            (other, _) => return Err(mismatch("indexable value", other)),
        };

        self.heap.retain(&value)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(
            binary_primitive(BinOp::Add, &Value::Int(2), &Value::Int(3)),
            Ok(Value::Int(5))
        );
        assert_eq!(
            binary_primitive(BinOp::Div, &Value::Int(7), &Value::Int(2)),
            Ok(Value::Int(3))
        );
        assert_eq!(
            binary_primitive(BinOp::Mod, &Value::Int(7), &Value::Int(0)),
            Err(OperatorError::DivisionByZero)
        );
        assert_eq!(
            binary_primitive(BinOp::Add, &Value::Int(i64::MAX), &Value::Int(1)),
            Err(OperatorError::Overflow)
        );
    }

    #[test]
    fn test_mixed_numbers_promote() {
        assert_eq!(
            binary_primitive(BinOp::Mul, &Value::Int(2), &Value::Float(1.5)),
            Ok(Value::Float(3.0))
        );
        assert_eq!(
            binary_primitive(BinOp::Eq, &Value::Int(2), &Value::Float(2.0)),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn test_string_operations() {
        assert_eq!(
            binary_primitive(BinOp::Add, &Value::Str("a".into()), &Value::Str("b".into())),
            Ok(Value::Str("ab".into()))
        );
        assert_eq!(
            binary_primitive(BinOp::Lt, &Value::Str("a".into()), &Value::Str("b".into())),
            Ok(Value::Bool(true))
        );
        assert!(matches!(
            binary_primitive(BinOp::Sub, &Value::Str("a".into()), &Value::Int(1)),
            Err(OperatorError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary_primitive(UnOp::Neg, &Value::Int(3)), Ok(Value::Int(-3)));
        assert_eq!(unary_primitive(UnOp::Not, &Value::Nil), Ok(Value::Bool(true)));
        assert_eq!(
            unary_primitive(UnOp::Neg, &Value::Int(i64::MIN)),
            Err(OperatorError::Overflow)
        );
    }
}
