use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::ast::{FunctionDef, Stmt};
use crate::heap::{ClassIndex, GcRoot, Heap, Instance};
use crate::reachability::ReferenceChain;

/// Runtime failure inside the expression evaluator.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalError(pub String);

impl EvalError {
    pub fn new(message: impl Into<String>) -> EvalError {
        EvalError(message.into())
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<crate::Error> for EvalError {
    fn from(e: crate::Error) -> EvalError {
        EvalError(e.to_string())
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;

pub(crate) type ValueIter = Box<dyn Iterator<Item = EvalResult<Value>>>;

/// A value produced by a query expression.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<Vec<Value>>),
    /// Script object literal; keys keep insertion order.
    Map(Rc<Vec<(Rc<str>, Value)>>),
    /// Lazily produced sequence. Consumed by the first traversal.
    Iter(Rc<LazyIter>),
    Function(Rc<Function>),
    /// The global `heap` object.
    Heap,
    Object(Instance),
    Class(ClassIndex),
    Root(GcRoot),
    Chain(Rc<ReferenceChain>),
    /// Static fields of a class.
    Statics(ClassIndex),
}

pub struct LazyIter {
    inner: RefCell<Option<ValueIter>>,
}

impl LazyIter {
    pub(crate) fn new(iter: ValueIter) -> LazyIter {
        LazyIter {
            inner: RefCell::new(Some(iter)),
        }
    }

    /// Takes the underlying iterator, leaving this one exhausted.
    pub(crate) fn take(&self) -> ValueIter {
        self.inner
            .borrow_mut()
            .take()
            .unwrap_or_else(|| Box::new(std::iter::empty()))
    }
}

pub enum Function {
    Closure {
        def: Rc<FunctionDef>,
        env: Rc<Scope>,
    },
    /// Compiled expression string with implicit parameters.
    Expression {
        params: &'static [&'static str],
        body: Rc<Vec<Stmt>>,
        env: Rc<Scope>,
    },
    Builtin(&'static str),
}

/// Lexical scope of variables.
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub(crate) fn new(parent: Option<Rc<Scope>>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent,
        })
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    pub(crate) fn declare(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Removes every binding. Values are dropped after the borrow ends since
    /// they may own other scopes.
    pub(crate) fn clear(&self) {
        let vars = std::mem::take(&mut *self.vars.borrow_mut());
        drop(vars);
    }

    /// Updates the innermost binding of `name`, creating a global one if none exists.
    pub(crate) fn assign(&self, name: &str, value: Value) {
        if self.vars.borrow().contains_key(name) || self.parent.is_none() {
            self.declare(name, value);
            return;
        }
        if let Some(parent) = &self.parent {
            parent.assign(name, value);
        }
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(s.into())
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(items))
    }

    pub(crate) fn iter(iter: impl Iterator<Item = EvalResult<Value>> + 'static) -> Value {
        Value::Iter(Rc::new(LazyIter::new(Box::new(iter))))
    }

    pub(crate) fn objects(instances: Vec<Instance>) -> Value {
        Value::iter(instances.into_iter().map(|i| Ok(Value::Object(i))))
    }

    /// `null`, `undefined`, `false`, `0` and `NaN` are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Undefined, null, booleans and numbers.
    pub(crate) fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            _ => "object",
        }
    }

    /// Numeric conversion following script rules; non-numeric text is `NaN`.
    pub(crate) fn to_number(&self, heap: &Heap) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => *b as u8 as f64,
            Value::Number(n) => *n,
            Value::Str(s) => parse_number(s),
            Value::Array(items) if items.is_empty() => 0.0,
            Value::Array(items) if items.len() == 1 => items[0].to_number(heap),
            other => parse_number(&other.to_display_string(heap)),
        }
    }

    /// The text a script sees when converting the value to a string.
    pub fn to_display_string(&self, heap: &Heap) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display_string(heap)
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) | Value::Statics(_) => "[object Object]".to_string(),
            Value::Iter(_) => "[object Iterator]".to_string(),
            Value::Function(f) => match &**f {
                Function::Closure { def, .. } => {
                    format!("function {}()", def.name.as_deref().unwrap_or(""))
                }
                Function::Expression { .. } => "function ()".to_string(),
                Function::Builtin(name) => format!("function {}()", name),
            },
            Value::Heap => "[object Heap]".to_string(),
            Value::Object(instance) => match heap.string_value(instance) {
                Ok(Some(text)) => text,
                _ => object_name(heap, instance),
            },
            Value::Class(class) => format!("class {}", heap.class(*class).name()),
            Value::Root(root) => format!("{}", root),
            Value::Chain(chain) => super::snapshot::describe_chain(heap, chain, false),
        }
    }
}

/// `name#number`, the short label of an object.
pub(crate) fn object_name(heap: &Heap, instance: &Instance) -> String {
    format!("{}#{}", heap.class(instance.class()).name(), instance.number())
}

pub(crate) fn parse_number(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    match text {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => text.parse().unwrap_or(f64::NAN),
    }
}

/// Integral values print without a fraction, as scripts expect.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Map(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Value::Iter(_) => f.write_str("<iterator>"),
            Value::Function(_) => f.write_str("<function>"),
            Value::Heap => f.write_str("<heap>"),
            Value::Object(instance) => write!(f, "<object {}>", instance),
            Value::Class(class) => write!(f, "<class {}>", class.as_usize()),
            Value::Root(root) => write!(f, "<{}>", root),
            Value::Chain(chain) => write!(f, "<path {}>", chain),
            Value::Statics(class) => write!(f, "<statics {}>", class.as_usize()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::str("").is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(Value::array(vec![]).is_truthy());
    }

    #[test]
    fn test_number_format() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(parse_number(" 0x10 "), 16.0);
        assert_eq!(parse_number(""), 0.0);
        assert!(parse_number("abc").is_nan());
    }

    #[test]
    fn test_display_strings() {
        let heap = sample_heap();
        let s1 = heap.instance_by_id(S1).unwrap();
        let n1 = heap.instance_by_id(N1).unwrap();
        let node = heap.class_by_name("com.example.Node").unwrap().index();
        assert_eq!(Value::Object(s1).to_display_string(&heap), "hello");
        assert_eq!(Value::Object(n1).to_display_string(&heap), "com.example.Node#1");
        assert_eq!(Value::Class(node).to_display_string(&heap), "class com.example.Node");
        assert_eq!(
            Value::array(vec![Value::Number(1.0), Value::Null, Value::str("x")])
                .to_display_string(&heap),
            "1,,x"
        );
    }

    #[test]
    fn test_scope_assignment() {
        let global = Scope::new(None);
        let inner = Scope::new(Some(global.clone()));
        inner.declare("local", Value::Number(1.0));
        inner.assign("created", Value::Number(2.0));
        assert!(global.lookup("created").is_some());
        assert!(global.lookup("local").is_none());
        inner.assign("local", Value::Number(3.0));
        assert_eq!(inner.lookup("local").and_then(|v| v.as_number()), Some(3.0));
    }
}
