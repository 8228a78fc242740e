use crate::{
    ast::{BinaryOp, UnaryOp},
    diagnostics::{Diagnostic, LumenError, Result, SourceSpan},
    value::{Value, ValueKind},
};

/// Apply a binary operator to two evaluated operands.
pub fn binary(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan) -> Result<Value> {
    use BinaryOp::*;
    match op {
        Add => add(left, right, span),
        Sub => numeric(op, left, right, span, |a, b| a - b),
        Mul => numeric(op, left, right, span, |a, b| a * b),
        Div => numeric(op, left, right, span, |a, b| a / b),
        Mod => numeric(op, left, right, span, |a, b| a % b),
        Pow => numeric(op, left, right, span, f64::powf),
        Equal => Ok(Value::bool(left.strict_equals(right))),
        NotEqual => Ok(Value::bool(!left.strict_equals(right))),
        Less => compare(op, left, right, span, |ord| ord.is_lt()),
        LessEqual => compare(op, left, right, span, |ord| ord.is_le()),
        Greater => compare(op, left, right, span, |ord| ord.is_gt()),
        GreaterEqual => compare(op, left, right, span, |ord| ord.is_ge()),
        BitAnd => bitwise(op, left, right, span, |a, b| a & b),
        BitOr => bitwise(op, left, right, span, |a, b| a | b),
        BitXor => bitwise(op, left, right, span, |a, b| a ^ b),
        ShiftLeft => bitwise(op, left, right, span, |a, b| a.wrapping_shl(b as u32 & 31)),
        ShiftRight => bitwise(op, left, right, span, |a, b| a.wrapping_shr(b as u32 & 31)),
        InstanceOf => instance_of(left, right, span),
    }
}

pub fn unary(op: UnaryOp, value: &Value, span: SourceSpan) -> Result<Value> {
    match op {
        UnaryOp::Not => Ok(Value::bool(!value.is_truthy())),
        UnaryOp::Negate => Ok(Value::number(-value.expect_number("unary `-`", span)?)),
        UnaryOp::Plus => Ok(Value::number(value.expect_number("unary `+`", span)?)),
        UnaryOp::BitNot => Ok(Value::number(f64::from(!to_int32(
            value.expect_number("`~`", span)?,
        )))),
        UnaryOp::TypeOf => Ok(Value::string(value.type_name())),
    }
}

/// `+` concatenates when either side is a string.
fn add(left: &Value, right: &Value, span: SourceSpan) -> Result<Value> {
    match (left.kind(), right.kind()) {
        (ValueKind::Number(a), ValueKind::Number(b)) => Ok(Value::number(a + b)),
        (ValueKind::String(a), ValueKind::String(b)) => Ok(Value::string(format!("{a}{b}"))),
        (ValueKind::String(a), _) => Ok(Value::string(format!("{a}{right}"))),
        (_, ValueKind::String(b)) => Ok(Value::string(format!("{left}{b}"))),
        _ => Err(operand_error(BinaryOp::Add, left, right, span)),
    }
}

fn numeric<F>(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan, func: F) -> Result<Value>
where
    F: Fn(f64, f64) -> f64,
{
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => Ok(Value::number(func(a, b))),
        _ => Err(operand_error(op, left, right, span)),
    }
}

fn compare<F>(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan, test: F) -> Result<Value>
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    let ordering = match (left.kind(), right.kind()) {
        (ValueKind::Number(a), ValueKind::Number(b)) => a.partial_cmp(b),
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        _ => return Err(operand_error(op, left, right, span)),
    };
    // NaN compares false against everything.
    Ok(Value::bool(ordering.map(test).unwrap_or(false)))
}

fn bitwise<F>(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan, func: F) -> Result<Value>
where
    F: Fn(i32, i32) -> i32,
{
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => Ok(Value::number(f64::from(func(to_int32(a), to_int32(b))))),
        _ => Err(operand_error(op, left, right, span)),
    }
}

fn instance_of(left: &Value, right: &Value, span: SourceSpan) -> Result<Value> {
    let ValueKind::Class(class) = right.kind() else {
        return Err(LumenError::from(Diagnostic::runtime(
            format!(
                "right-hand side of `instanceof` must be a class, found {}",
                right.type_name()
            ),
            span,
        )));
    };
    Ok(Value::bool(match left.kind() {
        ValueKind::Instance(instance) => instance.class.is_subclass_of(class),
        _ => false,
    }))
}

/// Wrap to a signed 32-bit integer, as bitwise operators see numbers.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc().rem_euclid(4_294_967_296.0) as u32) as i32
}

fn operand_error(op: BinaryOp, left: &Value, right: &Value, span: SourceSpan) -> LumenError {
    LumenError::from(Diagnostic::runtime(
        format!(
            "unsupported operands for `{}`: {} and {}",
            symbol(op),
            left.type_name(),
            right.type_name()
        ),
        span,
    ))
}

pub fn symbol(op: BinaryOp) -> &'static str {
    use BinaryOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        Pow => "**",
        Equal => "==",
        NotEqual => "!=",
        Less => "<",
        LessEqual => "<=",
        Greater => ">",
        GreaterEqual => ">=",
        BitAnd => "&",
        BitOr => "|",
        BitXor => "^",
        ShiftLeft => "<<",
        ShiftRight => ">>",
        InstanceOf => "instanceof",
    }
}
