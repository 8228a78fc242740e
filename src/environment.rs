use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, LumenError, Result, SourceSpan},
    value::Value,
};

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// One lexical scope. Children hold a strong reference to their parent, so a
/// closure keeps its whole defining chain alive.
#[derive(Debug, Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Binding>,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
        }))
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value, mutable: bool) {
        self.bindings.insert(name.into(), Binding { value, mutable });
    }

    /// Rebind the nearest `name` in the chain; constants reject the write.
    pub fn assign(env: &EnvironmentRef, name: &str, value: Value, span: SourceSpan) -> Result<()> {
        let parent = {
            let mut scope = env.borrow_mut();
            if let Some(binding) = scope.bindings.get_mut(name) {
                if !binding.mutable {
                    return Err(LumenError::from(Diagnostic::runtime(
                        format!("cannot reassign constant `{name}`"),
                        span,
                    )));
                }
                binding.value = value;
                return Ok(());
            }
            scope.parent.clone()
        };
        match parent {
            Some(parent) => Environment::assign(&parent, name, value, span),
            None => Err(undefined_variable(name, span)),
        }
    }

    pub fn get(env: &EnvironmentRef, name: &str, span: SourceSpan) -> Result<Value> {
        Environment::lookup(env, name).ok_or_else(|| undefined_variable(name, span))
    }

    pub fn lookup(env: &EnvironmentRef, name: &str) -> Option<Value> {
        let mut current = Rc::clone(env);
        loop {
            let parent = {
                let scope = current.borrow();
                if let Some(binding) = scope.bindings.get(name) {
                    return Some(binding.value.clone());
                }
                scope.parent.clone()?
            };
            current = parent;
        }
    }
}

fn undefined_variable(name: &str, span: SourceSpan) -> LumenError {
    LumenError::from(Diagnostic::runtime(
        format!("undefined variable `{name}`"),
        span,
    ))
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}
