use std::{thread, time::Duration};

use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, DiagnosticKind, LumenError, Result},
    environment::EnvironmentRef,
    value::{Value, ValueKind, VARIADIC},
};

/// Flat name to native-callable table installed into the global scope.
#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    entries: IndexMap<String, Value>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native function. Use [`VARIADIC`] to skip the arity check.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        arity: usize,
        callback: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> &mut Self {
        let name = name.into();
        self.entries
            .insert(name.clone(), Value::native(name, arity, callback));
        self
    }

    /// Register any value, e.g. a constant or a namespace object.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.entries.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn merge(&mut self, other: BuiltinRegistry) -> &mut Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn install(&self, env: &EnvironmentRef) {
        let mut scope = env.borrow_mut();
        for (name, value) in &self.entries {
            scope.define(name.clone(), value.clone(), false);
        }
    }
}

/// The default builtins every interpreter starts with.
pub fn registry() -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();
    registry
        .register("len", 1, collections_len)
        .register("push", VARIADIC, collections_push)
        .register("pop", 1, collections_pop)
        .register("keys", 1, collections_keys)
        .register("values", 1, collections_values)
        .register("range", VARIADIC, collections_range)
        .register("str", 1, convert_str)
        .register("num", 1, convert_num)
        .register("type_of", 1, convert_type_of)
        .register("abs", 1, math_abs)
        .register("floor", 1, math_floor)
        .register("ceil", 1, math_ceil)
        .register("sqrt", 1, math_sqrt)
        .register("round", 1, math_round)
        .register("pow", 2, math_pow)
        .register("min", VARIADIC, math_min)
        .register("max", VARIADIC, math_max)
        .register("upper", 1, string_upper)
        .register("lower", 1, string_lower)
        .register("trim", 1, string_trim)
        .register("split", 2, string_split)
        .register("join", 2, string_join)
        .register("contains", 2, collections_contains)
        .register("now", 0, time_now)
        .register("sleep", 1, time_sleep)
        .register("defer", 1, async_defer);
    registry
}

fn error(message: impl Into<String>) -> LumenError {
    LumenError::from(Diagnostic::new(DiagnosticKind::Runtime, message))
}

fn ensure_min(args: &[Value], min: usize, name: &str) -> Result<()> {
    if args.len() < min {
        return Err(error(format!(
            "`{name}` expected at least {min} arguments but received {}",
            args.len()
        )));
    }
    Ok(())
}

fn expect_string<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| error(format!("`{name}` expected string but found {}", value.type_name())))
}

fn expect_number(value: &Value, name: &str) -> Result<f64> {
    value
        .as_number()
        .ok_or_else(|| error(format!("`{name}` expected number but found {}", value.type_name())))
}

fn collections_len(args: &[Value]) -> Result<Value> {
    let len = match args[0].kind() {
        ValueKind::String(s) => s.chars().count(),
        ValueKind::Array(values) => values.borrow().len(),
        ValueKind::Object(map) => map.borrow().len(),
        ValueKind::Instance(instance) => instance.props.borrow().len(),
        _ => return Err(error("len expects string, array, or object")),
    };
    Ok(Value::number(len as f64))
}

/// Appends in place and returns the new length.
fn collections_push(args: &[Value]) -> Result<Value> {
    ensure_min(args, 1, "push")?;
    match args[0].kind() {
        ValueKind::Array(values) => {
            let mut values = values.borrow_mut();
            values.extend(args[1..].iter().cloned());
            Ok(Value::number(values.len() as f64))
        }
        _ => Err(error("push expects array as first argument")),
    }
}

fn collections_pop(args: &[Value]) -> Result<Value> {
    match args[0].kind() {
        ValueKind::Array(values) => Ok(values.borrow_mut().pop().unwrap_or_else(Value::undefined)),
        _ => Err(error("pop expects array")),
    }
}

fn collections_keys(args: &[Value]) -> Result<Value> {
    let keys = match args[0].kind() {
        ValueKind::Object(map) => map.borrow().keys().cloned().map(Value::string).collect(),
        ValueKind::Instance(instance) => instance
            .props
            .borrow()
            .keys()
            .cloned()
            .map(Value::string)
            .collect(),
        ValueKind::Array(values) => (0..values.borrow().len())
            .map(|idx| Value::number(idx as f64))
            .collect(),
        _ => return Err(error("keys expects object or array")),
    };
    Ok(Value::array(keys))
}

fn collections_values(args: &[Value]) -> Result<Value> {
    match args[0].kind() {
        ValueKind::Object(map) => Ok(Value::array(map.borrow().values().cloned().collect())),
        ValueKind::Instance(instance) => Ok(Value::array(
            instance.props.borrow().values().cloned().collect(),
        )),
        ValueKind::Array(values) => Ok(Value::array(values.borrow().clone())),
        _ => Err(error("values expects object or array")),
    }
}

fn collections_contains(args: &[Value]) -> Result<Value> {
    let found = match args[0].kind() {
        ValueKind::String(text) => text.contains(expect_string(&args[1], "contains")?),
        ValueKind::Array(values) => values
            .borrow()
            .iter()
            .any(|value| value.strict_equals(&args[1])),
        ValueKind::Object(map) => map.borrow().contains_key(expect_string(&args[1], "contains")?),
        _ => return Err(error("contains expects string, array, or object")),
    };
    Ok(Value::bool(found))
}

/// `range(end)`, `range(start, end)` or `range(start, end, step)`; `end` is
/// exclusive.
fn collections_range(args: &[Value]) -> Result<Value> {
    let (start, end, step) = match args {
        [end] => (0.0, expect_number(end, "range")?, None),
        [start, end] => (
            expect_number(start, "range")?,
            expect_number(end, "range")?,
            None,
        ),
        [start, end, step] => (
            expect_number(start, "range")?,
            expect_number(end, "range")?,
            Some(expect_number(step, "range")?),
        ),
        _ => {
            return Err(error(format!(
                "`range` expected 1 to 3 arguments but received {}",
                args.len()
            )))
        }
    };
    let step = step.unwrap_or(if start <= end { 1.0 } else { -1.0 });
    if step == 0.0 || step.is_nan() {
        return Err(error("range step must be non-zero"));
    }
    let mut values = Vec::new();
    let mut current = start;
    while (step > 0.0 && current < end) || (step < 0.0 && current > end) {
        values.push(Value::number(current));
        current += step;
    }
    Ok(Value::array(values))
}

fn convert_str(args: &[Value]) -> Result<Value> {
    Ok(Value::string(args[0].to_string()))
}

fn convert_num(args: &[Value]) -> Result<Value> {
    Ok(Value::number(args[0].to_number()))
}

fn convert_type_of(args: &[Value]) -> Result<Value> {
    Ok(Value::string(args[0].type_name()))
}

fn math_abs(args: &[Value]) -> Result<Value> {
    Ok(Value::number(expect_number(&args[0], "abs")?.abs()))
}

fn math_floor(args: &[Value]) -> Result<Value> {
    Ok(Value::number(expect_number(&args[0], "floor")?.floor()))
}

fn math_ceil(args: &[Value]) -> Result<Value> {
    Ok(Value::number(expect_number(&args[0], "ceil")?.ceil()))
}

fn math_sqrt(args: &[Value]) -> Result<Value> {
    let number = expect_number(&args[0], "sqrt")?;
    if number < 0.0 {
        return Err(error("sqrt expects non-negative input"));
    }
    Ok(Value::number(number.sqrt()))
}

fn math_round(args: &[Value]) -> Result<Value> {
    Ok(Value::number(expect_number(&args[0], "round")?.round()))
}

fn math_pow(args: &[Value]) -> Result<Value> {
    let base = expect_number(&args[0], "pow")?;
    let exponent = expect_number(&args[1], "pow")?;
    Ok(Value::number(base.powf(exponent)))
}

/// Accepts either numbers as arguments or a single array of numbers.
fn numbers(args: &[Value], name: &str) -> Result<Vec<f64>> {
    if let [single] = args {
        if let ValueKind::Array(values) = single.kind() {
            return values
                .borrow()
                .iter()
                .map(|value| expect_number(value, name))
                .collect();
        }
    }
    args.iter().map(|value| expect_number(value, name)).collect()
}

fn math_min(args: &[Value]) -> Result<Value> {
    let values = numbers(args, "min")?;
    if values.is_empty() {
        return Err(error("`min` expects at least one number"));
    }
    Ok(Value::number(values.into_iter().fold(f64::INFINITY, f64::min)))
}

fn math_max(args: &[Value]) -> Result<Value> {
    let values = numbers(args, "max")?;
    if values.is_empty() {
        return Err(error("`max` expects at least one number"));
    }
    Ok(Value::number(
        values.into_iter().fold(f64::NEG_INFINITY, f64::max),
    ))
}

fn string_upper(args: &[Value]) -> Result<Value> {
    Ok(Value::string(expect_string(&args[0], "upper")?.to_uppercase()))
}

fn string_lower(args: &[Value]) -> Result<Value> {
    Ok(Value::string(expect_string(&args[0], "lower")?.to_lowercase()))
}

fn string_trim(args: &[Value]) -> Result<Value> {
    Ok(Value::string(expect_string(&args[0], "trim")?.trim()))
}

fn string_split(args: &[Value]) -> Result<Value> {
    let text = expect_string(&args[0], "split")?;
    let separator = expect_string(&args[1], "split")?;
    let parts = if separator.is_empty() {
        text.chars().map(|ch| Value::string(ch.to_string())).collect()
    } else {
        text.split(separator).map(Value::string).collect()
    };
    Ok(Value::array(parts))
}

fn string_join(args: &[Value]) -> Result<Value> {
    let ValueKind::Array(items) = args[0].kind() else {
        return Err(error("`join` expects an array as first argument"));
    };
    let separator = expect_string(&args[1], "join")?;
    let pieces: Vec<String> = items.borrow().iter().map(Value::to_string).collect();
    Ok(Value::string(pieces.join(separator)))
}

fn time_now(_: &[Value]) -> Result<Value> {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(duration) => Ok(Value::number(duration.as_secs_f64() * 1000.0)),
        Err(_) => Err(error("system clock went backwards")),
    }
}

/// Returns a deferred computation; the call dispatcher forces it, so the
/// sleep happens at the call site.
fn time_sleep(args: &[Value]) -> Result<Value> {
    let millis = expect_number(&args[0], "sleep")?;
    if millis < 0.0 || millis.is_nan() {
        return Err(error("sleep duration must be non-negative"));
    }
    Ok(Value::deferred(move || {
        thread::sleep(Duration::from_secs_f64(millis / 1000.0));
        Ok(Value::null())
    }))
}

fn async_defer(args: &[Value]) -> Result<Value> {
    let value = args[0].clone();
    Ok(Value::deferred(move || Ok(value.clone())))
}
