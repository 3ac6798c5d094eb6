//! Tree-walking evaluator for the script subset.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use super::ast::{BinaryOp, Expr, FunctionDef, Stmt, UnaryOp};
use super::builtins;
use super::parser::{parse_expression, parse_script};
use super::snapshot;
use super::value::{parse_number, EvalError, EvalResult, Function, Scope, Value, ValueIter};
use crate::heap::Heap;

pub(crate) type EntryIter = Box<dyn Iterator<Item = EvalResult<(Value, Value)>>>;

/// Deepest expression nesting, counting every pending function call.
const MAX_EVAL_DEPTH: usize = 200;

struct Context {
    heap: Arc<Heap>,
    globals: Rc<Scope>,
    compiled: RefCell<HashMap<String, Rc<Function>>>,
    /// Every scope created for this query, so `release` can break closure cycles.
    scopes: RefCell<Vec<Weak<Scope>>>,
    depth: Cell<usize>,
}

/// Evaluator state for one query. Cheap to clone; lazy iterators keep a
/// clone so they can call back into scripts. Closures and iterators stored
/// in scopes form `Rc` cycles, so the owner calls [`Interp::release`] once
/// the query is over.
#[derive(Clone)]
pub(crate) struct Interp {
    ctx: Rc<Context>,
}

enum Flow {
    Normal(Option<Value>),
    Return(Value),
}

impl Interp {
    pub(crate) fn new(heap: Arc<Heap>) -> Interp {
        let globals = Scope::new(None);
        globals.declare("heap", Value::Heap);
        for name in builtins::NAMES.iter().copied() {
            globals.declare(name, Value::Function(Rc::new(Function::Builtin(name))));
        }
        Interp {
            ctx: Rc::new(Context {
                heap,
                scopes: RefCell::new(vec![Rc::downgrade(&globals)]),
                globals,
                compiled: RefCell::new(HashMap::new()),
                depth: Cell::new(0),
            }),
        }
    }

    /// A child scope of `parent` tracked for [`Interp::release`].
    pub(crate) fn scope(&self, parent: &Rc<Scope>) -> Rc<Scope> {
        let scope = Scope::new(Some(parent.clone()));
        let mut scopes = self.ctx.scopes.borrow_mut();
        if scopes.len() == scopes.capacity() {
            scopes.retain(|s| s.strong_count() > 0);
        }
        scopes.push(Rc::downgrade(&scope));
        scope
    }

    /// Drops every variable and compiled function of the query. Values still
    /// held elsewhere keep working unless they call back into scripts.
    pub(crate) fn release(&self) {
        let scopes = std::mem::take(&mut *self.ctx.scopes.borrow_mut());
        for scope in scopes.iter().filter_map(Weak::upgrade) {
            scope.clear();
        }
        self.ctx.compiled.borrow_mut().clear();
    }

    pub(crate) fn heap(&self) -> &Heap {
        &self.ctx.heap
    }

    pub(crate) fn shared_heap(&self) -> Arc<Heap> {
        self.ctx.heap.clone()
    }

    pub(crate) fn globals(&self) -> &Rc<Scope> {
        &self.ctx.globals
    }

    pub(crate) fn eval_script(&self, source: &str) -> EvalResult<Value> {
        let script = parse_script(source)?;
        match self.run_block(&script, &self.ctx.globals)? {
            Flow::Normal(value) => Ok(value.unwrap_or(Value::Undefined)),
            Flow::Return(value) => Ok(value),
        }
    }

    /// Turns a function value or an expression string over `params` into
    /// something callable. `undefined` yields `None`.
    pub(crate) fn code_arg(
        &self,
        code: Option<&Value>,
        params: &'static [&'static str],
    ) -> EvalResult<Option<Value>> {
        match code {
            None | Some(Value::Undefined) | Some(Value::Null) => Ok(None),
            Some(Value::Function(f)) => Ok(Some(Value::Function(f.clone()))),
            Some(Value::Str(source)) => {
                let key = format!("{}|{}", params.join(","), source);
                if let Some(f) = self.ctx.compiled.borrow().get(&key) {
                    return Ok(Some(Value::Function(f.clone())));
                }
                let expr = parse_expression(source)?;
                let f = Rc::new(Function::Expression {
                    params,
                    body: Rc::new(vec![Stmt::Return(Some(expr))]),
                    env: self.ctx.globals.clone(),
                });
                self.ctx.compiled.borrow_mut().insert(key, f.clone());
                Ok(Some(Value::Function(f)))
            }
            Some(other) => Err(EvalError::new(format!(
                "expected function or expression string, found {}",
                other.type_of()
            ))),
        }
    }

    pub(crate) fn call(&self, callee: &Value, args: Vec<Value>) -> EvalResult<Value> {
        let Value::Function(f) = callee else {
            return Err(EvalError::new(format!(
                "{} is not a function",
                callee.to_display_string(self.heap())
            )));
        };
        match &**f {
            Function::Closure { def, env } => self.call_closure(def, env, args),
            Function::Expression { params, body, env } => {
                let scope = self.scope(env);
                let mut args = args.into_iter();
                for param in params.iter() {
                    scope.declare(param, args.next().unwrap_or(Value::Undefined));
                }
                match self.run_block(body, &scope)? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal(_) => Ok(Value::Undefined),
                }
            }
            Function::Builtin(name) => builtins::call(self, name, args),
        }
    }

    fn call_closure(&self, def: &FunctionDef, env: &Rc<Scope>, args: Vec<Value>) -> EvalResult<Value> {
        let scope = self.scope(env);
        let mut args = args.into_iter();
        for param in &def.params {
            scope.declare(param, args.next().unwrap_or(Value::Undefined));
        }
        match self.run_block(&def.body, &scope)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal(_) => Ok(Value::Undefined),
        }
    }

    fn run_block(&self, statements: &[Stmt], scope: &Rc<Scope>) -> EvalResult<Flow> {
        for statement in statements {
            if let Stmt::Function(def) = statement {
                self.declare_function(def, scope);
            }
        }
        let mut last = None;
        for statement in statements {
            match self.exec(statement, scope)? {
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal(Some(value)) => last = Some(value),
                Flow::Normal(None) => {}
            }
        }
        Ok(Flow::Normal(last))
    }

    fn declare_function(&self, def: &Rc<FunctionDef>, scope: &Rc<Scope>) {
        if let Some(name) = &def.name {
            let f = Function::Closure {
                def: def.clone(),
                env: scope.clone(),
            };
            scope.declare(name, Value::Function(Rc::new(f)));
        }
    }

    fn exec(&self, statement: &Stmt, scope: &Rc<Scope>) -> EvalResult<Flow> {
        match statement {
            Stmt::Empty | Stmt::Function(_) => Ok(Flow::Normal(None)),
            Stmt::Var(declarations) => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(expr) => self.eval(expr, scope)?,
                        None => Value::Undefined,
                    };
                    scope.declare(name, value);
                }
                Ok(Flow::Normal(None))
            }
            Stmt::Expr(expr) => Ok(Flow::Normal(Some(self.eval(expr, scope)?))),
            Stmt::Return(expr) => Ok(Flow::Return(match expr {
                Some(expr) => self.eval(expr, scope)?,
                None => Value::Undefined,
            })),
            Stmt::If(condition, then, otherwise) => {
                if self.eval(condition, scope)?.is_truthy() {
                    self.exec(then, scope)
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise, scope)
                } else {
                    Ok(Flow::Normal(None))
                }
            }
            Stmt::Block(statements) => self.run_block(statements, scope),
        }
    }

    pub(crate) fn eval(&self, expr: &Expr, scope: &Rc<Scope>) -> EvalResult<Value> {
        let depth = self.ctx.depth.get();
        if depth >= MAX_EVAL_DEPTH {
            return Err(EvalError::new("too much recursion"));
        }
        self.ctx.depth.set(depth + 1);
        let result = self.eval_expr(expr, scope);
        self.ctx.depth.set(depth);
        result
    }

    fn eval_expr(&self, expr: &Expr, scope: &Rc<Scope>) -> EvalResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => scope
                .lookup(name)
                .ok_or_else(|| EvalError::new(format!("{} is not defined", name))),
            Expr::Array(items) => Ok(Value::array(
                items
                    .iter()
                    .map(|e| self.eval(e, scope))
                    .collect::<EvalResult<_>>()?,
            )),
            Expr::Object(entries) => {
                let mut values: Vec<(Rc<str>, Value)> = Vec::with_capacity(entries.len());
                for (key, expr) in entries {
                    let value = self.eval(expr, scope)?;
                    match values.iter_mut().find(|entry| entry.0 == *key) {
                        Some(entry) => entry.1 = value,
                        None => values.push((key.clone(), value)),
                    }
                }
                Ok(Value::Map(Rc::new(values)))
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Function::Closure {
                def: def.clone(),
                env: scope.clone(),
            }))),
            Expr::Member(object, name) => {
                let object = self.eval(object, scope)?;
                snapshot::get_property(self, &object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                snapshot::get_index(self, &object, &index)
            }
            Expr::Call(callee, args) => {
                if let Expr::Member(object, name) = &**callee {
                    let object = self.eval(object, scope)?;
                    let args = self.eval_args(args, scope)?;
                    if let Some(result) = snapshot::call_method(self, &object, name, &args)? {
                        return Ok(result);
                    }
                    let method = snapshot::get_property(self, &object, name)?;
                    if !matches!(method, Value::Function(_)) {
                        return Err(EvalError::new(format!(
                            "{}.{} is not a function",
                            object.to_display_string(self.heap()),
                            name
                        )));
                    }
                    return self.call(&method, args);
                }
                let callee = self.eval(callee, scope)?;
                let args = self.eval_args(args, scope)?;
                self.call(&callee, args)
            }
            Expr::Unary(UnaryOp::TypeOf, operand) => {
                if let Expr::Ident(name) = &**operand {
                    if scope.lookup(name).is_none() {
                        return Ok(Value::str("undefined"));
                    }
                }
                Ok(Value::str(self.eval(operand, scope)?.type_of()))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, scope)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number(self.heap())),
                    UnaryOp::Plus => Value::Number(value.to_number(self.heap())),
                    UnaryOp::TypeOf => Value::str(value.type_of()),
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                let rhs = self.eval(rhs, scope)?;
                Ok(self.binary(*op, &lhs, &rhs))
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                if lhs.is_truthy() {
                    self.eval(rhs, scope)
                } else {
                    Ok(lhs)
                }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                if lhs.is_truthy() {
                    Ok(lhs)
                } else {
                    self.eval(rhs, scope)
                }
            }
            Expr::Conditional(condition, then, otherwise) => {
                if self.eval(condition, scope)?.is_truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Assign(name, value) => {
                let value = self.eval(value, scope)?;
                scope.assign(name, value.clone());
                Ok(value)
            }
        }
    }

    fn eval_args(&self, args: &[Expr], scope: &Rc<Scope>) -> EvalResult<Vec<Value>> {
        args.iter().map(|a| self.eval(a, scope)).collect()
    }

    pub(crate) fn binary(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
        let heap = self.heap();
        match op {
            BinaryOp::Add => {
                let (lhs, rhs) = (self.to_primitive(lhs), self.to_primitive(rhs));
                if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
                    let mut text = lhs.to_display_string(heap);
                    text.push_str(&rhs.to_display_string(heap));
                    Value::Str(text.into())
                } else {
                    Value::Number(lhs.to_number(heap) + rhs.to_number(heap))
                }
            }
            BinaryOp::Sub => Value::Number(lhs.to_number(heap) - rhs.to_number(heap)),
            BinaryOp::Mul => Value::Number(lhs.to_number(heap) * rhs.to_number(heap)),
            BinaryOp::Div => Value::Number(lhs.to_number(heap) / rhs.to_number(heap)),
            BinaryOp::Rem => Value::Number(lhs.to_number(heap) % rhs.to_number(heap)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let result = match self.compare(lhs, rhs) {
                    None => false,
                    Some(ordering) => match op {
                        BinaryOp::Lt => ordering.is_lt(),
                        BinaryOp::Le => ordering.is_le(),
                        BinaryOp::Gt => ordering.is_gt(),
                        _ => ordering.is_ge(),
                    },
                };
                Value::Bool(result)
            }
            BinaryOp::Eq => Value::Bool(self.loose_eq(lhs, rhs)),
            BinaryOp::Ne => Value::Bool(!self.loose_eq(lhs, rhs)),
            BinaryOp::StrictEq => Value::Bool(strict_eq(lhs, rhs)),
            BinaryOp::StrictNe => Value::Bool(!strict_eq(lhs, rhs)),
        }
    }

    /// Strings compare lexicographically, everything else numerically.
    /// `None` when either side is `NaN`.
    pub(crate) fn compare(&self, lhs: &Value, rhs: &Value) -> Option<Ordering> {
        let (lhs, rhs) = (self.to_primitive(lhs), self.to_primitive(rhs));
        match (&lhs, &rhs) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => lhs
                .to_number(self.heap())
                .partial_cmp(&rhs.to_number(self.heap())),
        }
    }

    fn to_primitive(&self, value: &Value) -> Value {
        if value.is_primitive() || matches!(value, Value::Str(_)) {
            value.clone()
        } else {
            Value::Str(value.to_display_string(self.heap()).into())
        }
    }

    pub(crate) fn loose_eq(&self, lhs: &Value, rhs: &Value) -> bool {
        use Value::*;
        match (lhs, rhs) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(a), Number(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Bool(b), other) | (other, Bool(b)) => {
                self.loose_eq(&Number(*b as u8 as f64), other)
            }
            (Number(n), Str(s)) | (Str(s), Number(n)) => *n == parse_number(s),
            (Str(s), other) | (other, Str(s)) => **s == *other.to_display_string(self.heap()),
            (Number(n), other) | (other, Number(n)) => *n == other.to_number(self.heap()),
            _ => same_reference(lhs, rhs),
        }
    }

    /// Values of a sequence: array items, iterator elements, map values,
    /// object fields or array elements.
    pub(crate) fn iterate(&self, value: &Value) -> EvalResult<ValueIter> {
        match value {
            Value::Array(items) => {
                let items = items.clone();
                Ok(Box::new((0..items.len()).map(move |i| Ok(items[i].clone()))))
            }
            Value::Iter(iter) => Ok(iter.take()),
            _ => Ok(Box::new(self.entries(value)?.map(|e| e.map(|(_, v)| v)))),
        }
    }

    /// Index/value pairs of a sequence. Arrays and iterators are indexed by
    /// position, maps and objects by key.
    pub(crate) fn entries(&self, value: &Value) -> EvalResult<EntryIter> {
        match value {
            Value::Undefined | Value::Null => Ok(Box::new(std::iter::empty())),
            Value::Array(_) | Value::Iter(_) => {
                let values = self.iterate(value)?;
                Ok(Box::new(
                    values
                        .enumerate()
                        .map(|(i, v)| v.map(|v| (Value::Number(i as f64), v))),
                ))
            }
            Value::Map(entries) => {
                let entries = entries.clone();
                Ok(Box::new((0..entries.len()).map(move |i| {
                    let (key, value) = &entries[i];
                    Ok((Value::Str(key.clone()), value.clone()))
                })))
            }
            Value::Object(_) | Value::Class(_) | Value::Statics(_) => {
                let entries = snapshot::entries(self, value)?;
                Ok(Box::new(entries.into_iter().map(Ok)))
            }
            other => Err(EvalError::new(format!(
                "{} is not iterable",
                other.to_display_string(self.heap())
            ))),
        }
    }
}

pub(crate) fn strict_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => same_reference(lhs, rhs),
    }
}

fn same_reference(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Object(a), Value::Object(b)) => a == b,
        (Value::Class(a), Value::Class(b)) | (Value::Statics(a), Value::Statics(b)) => a == b,
        (Value::Root(a), Value::Root(b)) => a == b,
        (Value::Heap, Value::Heap) => true,
        (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
        (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
        (Value::Iter(a), Value::Iter(b)) => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Chain(a), Value::Chain(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}
