//! Object query language over an indexed heap.
//!
//! ```text
//! select <expression> [from [instanceof] <class> [<identifier>] [where <expression>]]
//! ```
//!
//! Expressions use a small JavaScript-like language. Every result is handed
//! to an [`ObjectVisitor`]; arrays and iterators are unrolled first.

mod ast;
mod builtins;
mod interp;
mod lexer;
mod parser;
mod query;
mod snapshot;
mod value;

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

pub use snapshot::unwrap;
pub use value::{EvalError, EvalResult, Value};

use self::interp::Interp;
use self::query::{FromClause, Query};
use crate::heap::Heap;
use crate::{Error, Result};

/// Receives query results. Returning `Break` stops the query.
pub trait ObjectVisitor {
    fn visit(&mut self, value: &Value) -> ControlFlow<()>;
}

impl<F> ObjectVisitor for F
where
    F: FnMut(&Value) -> ControlFlow<()>,
{
    fn visit(&mut self, value: &Value) -> ControlFlow<()> {
        self(value)
    }
}

/// Runs queries against one heap. Queries on the same engine run one at a
/// time; separate engines over the same heap can run in parallel.
pub struct OqlEngine {
    heap: Arc<Heap>,
    lock: Mutex<()>,
}

impl OqlEngine {
    pub fn new(heap: Arc<Heap>) -> Result<OqlEngine> {
        if !Self::is_supported() {
            return Err(Error::UnsupportedQuery);
        }
        Ok(OqlEngine {
            heap,
            lock: Mutex::new(()),
        })
    }

    pub fn is_supported() -> bool {
        cfg!(feature = "oql")
    }

    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    /// Runs `text` and streams every result to `visitor`. Results already
    /// delivered stay delivered if the query later fails.
    pub fn execute_query<V: ObjectVisitor>(&self, text: &str, mut visitor: V) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let query = query::parse(text)?;
        let interp = Interp::new(self.heap.clone());
        let _release = Release(&interp);
        let start = Instant::now();
        match query {
            Query::Script(source) => {
                let value = interp
                    .eval_script(&source)
                    .map_err(|e| evaluation_error(&source, e))?;
                dispatch(&interp, &value, &mut visitor).map_err(|e| evaluation_error(&source, e))?;
            }
            Query::Select {
                selection,
                from: None,
            } => {
                let expr = parser::parse_expression(&selection)
                    .map_err(|e| evaluation_error(&selection, e))?;
                let value = interp
                    .eval(&expr, interp.globals())
                    .map_err(|e| evaluation_error(&selection, e))?;
                dispatch(&interp, &value, &mut visitor)
                    .map_err(|e| evaluation_error(&selection, e))?;
            }
            Query::Select {
                selection,
                from: Some(from),
            } => self.select_from(&interp, &selection, &from, &mut visitor)?,
        }
        debug!("Query '{}' finished in {} ms", text, start.elapsed().as_millis());
        Ok(())
    }

    fn select_from(
        &self,
        interp: &Interp,
        selection: &str,
        from: &FromClause,
        visitor: &mut dyn ObjectVisitor,
    ) -> Result<()> {
        let expr =
            parser::parse_expression(selection).map_err(|e| evaluation_error(selection, e))?;
        let predicate = match &from.predicate {
            Some(text) => Some((
                text.as_str(),
                parser::parse_expression(text).map_err(|e| evaluation_error(text, e))?,
            )),
            None => None,
        };
        let heap = &self.heap;
        let class = snapshot::resolve_class(heap, &from.class_name).ok_or_else(|| {
            evaluation_error(
                &from.class_name,
                EvalError::new(format!("unknown class '{}'", from.class_name)),
            )
        })?;
        let classes = if from.instanceof {
            heap.class_and_subclasses(class)
        } else {
            vec![class]
        };
        for class in classes {
            for instance in heap.instances(class) {
                let scope = interp.scope(interp.globals());
                if let Some(identifier) = &from.identifier {
                    scope.declare(identifier, Value::Object(instance));
                }
                if let Some((text, predicate)) = &predicate {
                    let matched = interp
                        .eval(predicate, &scope)
                        .map_err(|e| evaluation_error(text, e))?;
                    if !matched.is_truthy() {
                        continue;
                    }
                }
                let value = interp
                    .eval(&expr, &scope)
                    .map_err(|e| evaluation_error(selection, e))?;
                let flow =
                    dispatch(interp, &value, visitor).map_err(|e| evaluation_error(selection, e))?;
                if flow.is_break() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Evaluates a script and returns the value of its last expression
    /// statement or top-level `return`. Iterators in the result are drained
    /// into arrays, since script state is gone once this returns.
    pub fn eval_script(&self, text: &str) -> Result<Value> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let interp = Interp::new(self.heap.clone());
        let _release = Release(&interp);
        let value = interp
            .eval_script(text)
            .and_then(|value| detach(&interp, &value))
            .map_err(|e| evaluation_error(text, e))?;
        Ok(value)
    }
}

/// Releases script state when a query ends, however it ends.
struct Release<'a>(&'a Interp);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

fn detach(interp: &Interp, value: &Value) -> EvalResult<Value> {
    match value {
        Value::Array(items) => Ok(Value::array(
            items
                .iter()
                .map(|item| detach(interp, item))
                .collect::<EvalResult<_>>()?,
        )),
        Value::Iter(_) => Ok(Value::array(
            interp
                .iterate(value)?
                .map(|item| item.and_then(|item| detach(interp, &item)))
                .collect::<EvalResult<_>>()?,
        )),
        other => Ok(other.clone()),
    }
}

fn evaluation_error(expression: &str, e: EvalError) -> Error {
    Error::QueryEvaluation {
        expression: expression.to_string(),
        message: e.0,
    }
}

/// Hands `value` to the visitor, unrolling arrays and iterators at any depth.
fn dispatch(interp: &Interp, value: &Value, visitor: &mut dyn ObjectVisitor) -> EvalResult<ControlFlow<()>> {
    match value {
        Value::Array(_) | Value::Iter(_) => {
            for item in interp.iterate(value)? {
                if dispatch(interp, &item?, visitor)?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
            Ok(ControlFlow::Continue(()))
        }
        other => Ok(visitor.visit(other)),
    }
}

impl Value {
    /// Elements of an array or iterator, flattened at any depth; other
    /// values yield themselves. Iterators are consumed.
    pub fn flatten(&self) -> EvalResult<Vec<Value>> {
        let mut result = vec![];
        self.flatten_into(&mut result)?;
        Ok(result)
    }

    fn flatten_into(&self, result: &mut Vec<Value>) -> EvalResult<()> {
        match self {
            Value::Array(items) => {
                for item in items.iter() {
                    item.flatten_into(result)?;
                }
            }
            Value::Iter(iter) => {
                for item in iter.take() {
                    item?.flatten_into(result)?;
                }
            }
            other => result.push(other.clone()),
        }
        Ok(())
    }

    pub fn is_chain(&self) -> bool {
        matches!(self, Value::Chain(_))
    }

    /// Objects along a path value, target first.
    pub fn chain_objects(&self) -> Option<Vec<crate::heap::Instance>> {
        match self {
            Value::Chain(chain) => Some(chain.iter().collect()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn engine() -> OqlEngine {
        OqlEngine::new(Arc::new(sample_heap())).unwrap()
    }

    fn collect(engine: &OqlEngine, text: &str) -> Result<Vec<String>> {
        let heap = engine.heap().clone();
        let mut results = vec![];
        engine.execute_query(text, |v: &Value| {
            results.push(v.to_display_string(&heap));
            ControlFlow::Continue(())
        })?;
        Ok(results)
    }

    #[test]
    fn test_select_without_from() {
        let engine = engine();
        let mut values = vec![];
        engine
            .execute_query("select 1", |v: &Value| {
                values.push(v.as_number());
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(values, vec![Some(1.0)]);
        assert_eq!(collect(&engine, "select [[1, 2], [3]]").unwrap(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_syntax_error_visits_nothing() {
        let engine = engine();
        let mut visited = 0;
        let result = engine.execute_query("select x from", |_: &Value| {
            visited += 1;
            ControlFlow::Continue(())
        });
        assert!(matches!(result, Err(Error::QuerySyntax(_))));
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_class_filter() {
        let engine = engine();
        assert_eq!(collect(&engine, "select n from com.example.Node n").unwrap().len(), 3);
        assert_eq!(
            collect(&engine, "select n from instanceof com.example.Node n").unwrap().len(),
            4
        );
        assert_eq!(
            collect(&engine, "select n.weight from instanceof com.example.Node n where n.weight > 1 && n.weight < 5")
                .unwrap(),
            vec!["2", "3"]
        );
        assert!(collect(&engine, "select s from java.lang.String s where s.length > 100")
            .unwrap()
            .is_empty());
        assert!(collect(&engine, "select s from instanceof java.lang.String s where s.length > 100")
            .unwrap()
            .is_empty());
        assert_eq!(
            collect(&engine, "select s from instanceof java.lang.String s where s.length > 4").unwrap(),
            vec!["hello", "world"]
        );
        assert_eq!(
            collect(&engine, "select s.toString() from java.lang.String s").unwrap(),
            vec!["hello", "world"]
        );
    }

    #[test]
    fn test_alternate_class_names() {
        let engine = engine();
        assert_eq!(collect(&engine, "select a from [C a").unwrap().len(), 2);
        assert_eq!(collect(&engine, "select a.length from char[] a").unwrap(), vec!["5", "5"]);
        assert_eq!(
            collect(&engine, "select a from [Ljava.lang.Object; a").unwrap(),
            vec!["java.lang.Object[]#1"]
        );
    }

    #[test]
    fn test_break_stops_query() {
        let engine = engine();
        let mut visited = 0;
        engine
            .execute_query("select n from instanceof com.example.Node n", |_: &Value| {
                visited += 1;
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(visited, 1);

        let mut visited = 0;
        engine
            .execute_query("select heap.objects('java.lang.Object')", |_: &Value| {
                visited += 1;
                if visited == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(visited, 3);
    }

    #[test]
    fn test_heap_functions_in_selection() {
        let engine = engine();
        assert_eq!(
            collect(&engine, "select rsizeof(n) from com.example.Node n where n.weight == 1").unwrap(),
            vec!["144"]
        );
        assert_eq!(
            collect(&engine, "select toHtml({ w: n.weight }) from com.example.Node n where n.weight == 1")
                .unwrap(),
            vec!["{ w:1, }"]
        );
        assert_eq!(
            collect(&engine, "select map(heap.objects('com.example.Node', false), 'it.weight')").unwrap(),
            vec!["1", "2", "9"]
        );
        let mut chains = vec![];
        engine
            .execute_query("select heap.livepaths(n) from com.example.SpecialNode n", |v: &Value| {
                chains.push(v.chain_objects().unwrap().len());
                ControlFlow::Continue(())
            })
            .unwrap();
        chains.sort();
        assert_eq!(chains, vec![3, 4]);
    }

    #[test]
    fn test_runtime_error_keeps_earlier_results() {
        let engine = engine();
        let mut results = vec![];
        let error = engine
            .execute_query("select n.next.next.weight from com.example.Node n", |v: &Value| {
                results.push(v.as_number());
                ControlFlow::Continue(())
            })
            .unwrap_err();
        assert_eq!(results, vec![Some(3.0)]);
        match error {
            Error::QueryEvaluation { expression, .. } => {
                assert_eq!(expression, "n.next.next.weight")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_compile_errors_and_unknown_classes() {
        let engine = engine();
        let mut visited = 0;
        let result = engine.execute_query("select n. from com.example.Node n", |_: &Value| {
            visited += 1;
            ControlFlow::Continue(())
        });
        assert!(matches!(result, Err(Error::QueryEvaluation { .. })));
        assert_eq!(visited, 0);
        assert!(matches!(
            collect(&engine, "select x from no.such.Class x"),
            Err(Error::QueryEvaluation { .. })
        ));
        assert!(matches!(
            collect(&engine, "select n from com.example.Node n where n.("),
            Err(Error::QueryEvaluation { .. })
        ));
    }

    #[test]
    fn test_scripts() {
        let engine = engine();
        assert_eq!(collect(&engine, "1 + 2").unwrap(), vec!["3"]);
        assert_eq!(
            collect(&engine, "filter(heap.objects('com.example.Node'), 'it.weight > 2')").unwrap(),
            vec!["com.example.Node#3", "com.example.SpecialNode#1"]
        );
        let value = engine.eval_script("var x = 2; x * 21").unwrap();
        assert_eq!(value.as_number(), Some(42.0));
        let roots = engine.eval_script("heap.roots").unwrap().flatten().unwrap();
        assert_eq!(roots.len(), 3);
        assert!(matches!(
            engine.eval_script("var = 1"),
            Err(Error::QueryEvaluation { .. })
        ));
    }

    #[test]
    fn test_unwrap() {
        let engine = engine();
        let heap = engine.heap().clone();
        let value = engine.eval_script("heap.findObject(0x2010)").unwrap();
        assert_eq!(unwrap(&heap, &value).map(|i| i.id()), Some(N2));
        let class = engine.eval_script("heap.findClass('com.example.Holder')").unwrap();
        assert_eq!(unwrap(&heap, &class).map(|i| i.id()), Some(HOLDER_CLASS));
        assert_eq!(unwrap(&heap, &Value::Number(1.0)), None);
    }

    #[test]
    fn test_deep_recursion_is_an_error() {
        let engine = engine();
        assert!(matches!(
            engine.eval_script("function f(x) { return f(x + 1); } f(1)"),
            Err(Error::QueryEvaluation { .. })
        ));
        let deep = format!("select {}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let mut visited = 0;
        let result = engine.execute_query(&deep, |_: &Value| {
            visited += 1;
            ControlFlow::Continue(())
        });
        assert!(matches!(result, Err(Error::QueryEvaluation { .. })));
        assert_eq!(visited, 0);
        assert_eq!(collect(&engine, "select 1 + 1").unwrap(), vec!["2"]);
    }

    #[test]
    fn test_dropping_engine_releases_heap() {
        let heap = Arc::new(sample_heap());
        let engine = OqlEngine::new(heap.clone()).unwrap();
        engine
            .eval_script("var m = map(heap.objects('com.example.Node'), 'it'); 1")
            .unwrap();
        engine
            .eval_script("var xs = heap.objects('com.example.Node'); function f() { return 1; } f()")
            .unwrap();
        let mut seen = 0;
        engine
            .execute_query("var g = function () { return g; }; map(heap.objects('com.example.Node'), 'it')", |_: &Value| {
                seen += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(seen, 4);
        let chains = engine.eval_script("map(heap.objects('com.example.Node'), 'it.weight')").unwrap();
        assert_eq!(chains.flatten().unwrap().len(), 4);
        drop(chains);
        drop(engine);
        assert_eq!(Arc::strong_count(&heap), 1);
    }

    #[test]
    fn test_panicking_visitor_does_not_poison_engine() {
        let engine = engine();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = engine.execute_query("select 1", |_: &Value| -> ControlFlow<()> {
                panic!("visitor failed")
            });
        }));
        assert!(result.is_err());
        assert_eq!(collect(&engine, "select 2").unwrap(), vec!["2"]);
        assert_eq!(engine.eval_script("3").unwrap().as_number(), Some(3.0));
    }

    #[test]
    fn test_concurrent_engines() {
        let heap = Arc::new(sample_heap());
        let shared = Arc::new(OqlEngine::new(heap.clone()).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let heap = heap.clone();
                let shared = shared.clone();
                std::thread::spawn(move || {
                    let own = OqlEngine::new(heap).unwrap();
                    let engine = if i % 2 == 0 { &own } else { &*shared };
                    let mut count = 0;
                    engine
                        .execute_query("select rsizeof(n) from instanceof com.example.Node n", |_: &Value| {
                            count += 1;
                            ControlFlow::Continue(())
                        })
                        .unwrap();
                    count
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 4);
        }
    }
}
