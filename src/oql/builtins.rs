//! Global functions available to every query.
//!
//! Higher-order functions take either a function value or an expression
//! string. Expression strings see the current element as `it`, its position
//! or key as `index`, and the sequence itself as `array`; comparators see
//! `lhs` and `rhs`.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::interp::{EntryIter, Interp};
use super::snapshot::{describe_chain, expect_object, html_object, instance_value, unwrap};
use super::value::{EvalError, EvalResult, Value, ValueIter};
use crate::constants::DEFAULT_TOP_COUNT;
use crate::heap::Heap;
use crate::reachability::FieldList;

pub(crate) const NAMES: &[&str] = &[
    "classof",
    "forEachReferrer",
    "forEachReferee",
    "identical",
    "objectid",
    "referrers",
    "referees",
    "reachables",
    "refers",
    "root",
    "sizeof",
    "rsizeof",
    "toHtml",
    "toArray",
    "top",
    "contains",
    "concat",
    "count",
    "filter",
    "length",
    "map",
    "max",
    "min",
    "sort",
    "sum",
    "unique",
    "print",
    "println",
];

const ELEMENT: &[&str] = &["it", "index", "array", "result"];
const COMPARATOR: &[&str] = &["lhs", "rhs"];

pub(crate) fn call(interp: &Interp, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    let heap = interp.heap();
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
    match name {
        "classof" => Ok(match arg(0) {
            Value::Object(instance) => Value::Class(instance.class()),
            Value::Class(_) => heap
                .class_by_name("java.lang.Class")
                .map_or(Value::Null, |c| Value::Class(c.index())),
            _ => Value::Null,
        }),
        "forEachReferrer" | "forEachReferee" => {
            let callback = arg(0);
            let object = expect_object(heap, args.get(1), name)?;
            let related = if name == "forEachReferrer" {
                heap.referrers_filtered(&object, false)?
            } else {
                heap.referees(&object)?
            };
            for other in related {
                if interp.call(&callback, vec![instance_value(other)])?.is_truthy() {
                    break;
                }
            }
            Ok(Value::Undefined)
        }
        "identical" => Ok(Value::Bool(
            match (object_id(heap, &arg(0)), object_id(heap, &arg(1))) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        )),
        "objectid" => Ok(object_id(heap, &arg(0)).map_or(Value::Null, |id| Value::str(&id.to_string()))),
        "referrers" => {
            let object = expect_object(heap, args.get(0), name)?;
            let include_weak = arg(1).is_truthy();
            Ok(objects(heap.referrers_filtered(&object, include_weak)?))
        }
        "referees" => {
            let object = expect_object(heap, args.get(0), name)?;
            let include_weak = arg(1).is_truthy();
            let mut result = vec![];
            for referee in heap.referees(&object)? {
                if include_weak || !heap.refers_only_weakly(&object, &referee)? {
                    result.push(referee);
                }
            }
            Ok(objects(result))
        }
        "reachables" => {
            let object = expect_object(heap, args.get(0), name)?;
            let excludes = match arg(1) {
                Value::Str(list) => Some(FieldList::parse(&list)).filter(|l| !l.is_empty()),
                _ => None,
            };
            let reachable = heap.reachables(
                &object,
                excludes
                    .as_ref()
                    .map(|e| e as &dyn crate::reachability::ReachableExcludes),
            )?;
            Ok(objects(reachable))
        }
        "refers" => {
            let from = expect_object(heap, args.get(0), name)?;
            let Some(to) = unwrap(heap, &arg(1)) else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(
                heap.references(&from)?.iter().any(|(_, id)| *id == to.id()),
            ))
        }
        "root" => {
            let object = expect_object(heap, args.get(0), name)?;
            Ok(heap
                .gc_roots_for(&object)
                .first()
                .map_or(Value::Null, |r| Value::Root(*r)))
        }
        "sizeof" => {
            let object = expect_object(heap, args.get(0), name)?;
            Ok(Value::Number(object.shallow_size() as f64))
        }
        "rsizeof" => {
            let object = expect_object(heap, args.get(0), name)?;
            Ok(Value::Number(heap.retained_size(&object)? as f64))
        }
        "toHtml" => Ok(Value::str(&to_html(interp, &arg(0))?)),
        "toArray" => to_array(interp, &arg(0)),
        "top" => top(interp, &arg(0), args.get(1), args.get(2)),
        "contains" => {
            let f = required_code(interp, args.get(1), ELEMENT, name)?;
            let source = arg(0);
            for entry in interp.entries(&source)? {
                let (index, it) = entry?;
                if interp.call(&f, vec![it, index, source.clone()])?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "concat" => Ok(match (arg(0), arg(1)) {
            (Value::Array(a), Value::Array(b)) => {
                Value::array(a.iter().chain(b.iter()).cloned().collect())
            }
            (a @ (Value::Array(_) | Value::Iter(_)), b @ (Value::Array(_) | Value::Iter(_))) => {
                Value::iter(interp.iterate(&a)?.chain(interp.iterate(&b)?))
            }
            _ => Value::Undefined,
        }),
        "count" => {
            let source = arg(0);
            let f = interp.code_arg(args.get(1), ELEMENT)?;
            let mut count = 0usize;
            for entry in interp.entries(&source)? {
                let (index, it) = entry?;
                let matched = match &f {
                    Some(f) => interp.call(f, vec![it, index, source.clone()])?.is_truthy(),
                    None => true,
                };
                count += matched as usize;
            }
            Ok(Value::Number(count as f64))
        }
        "filter" => {
            let f = required_code(interp, args.get(1), ELEMENT, name)?;
            let source = arg(0);
            let entries = interp.entries(&source)?;
            if matches!(source, Value::Iter(_)) {
                return Ok(filter_entries(interp, entries, f, source));
            }
            let mut result = vec![];
            for entry in entries {
                let (index, it) = entry?;
                if interp
                    .call(&f, vec![it.clone(), index, source.clone()])?
                    .is_truthy()
                {
                    result.push(it);
                }
            }
            Ok(Value::array(result))
        }
        "length" => Ok(Value::Number(match arg(0) {
            Value::Array(items) => items.len() as f64,
            Value::Str(s) => s.encode_utf16().count() as f64,
            other => {
                let mut count = 0usize;
                for value in interp.iterate(&other)? {
                    value?;
                    count += 1;
                }
                count as f64
            }
        })),
        "map" => {
            let f = required_code(interp, args.get(1), ELEMENT, name)?;
            let source = arg(0);
            let entries = interp.entries(&source)?;
            if matches!(source, Value::Iter(_)) {
                let interp = interp.clone();
                return Ok(Value::iter(entries.map(move |entry| {
                    let (index, it) = entry?;
                    interp.call(&f, vec![it, index, source.clone()])
                })));
            }
            let mut result = vec![];
            for entry in entries {
                let (index, it) = entry?;
                result.push(interp.call(&f, vec![it, index, source.clone()])?);
            }
            Ok(Value::array(result))
        }
        "max" | "min" => {
            let default = if name == "max" { "lhs > rhs" } else { "lhs < rhs" };
            let f = match interp.code_arg(args.get(1), COMPARATOR)? {
                Some(f) => f,
                None => required_code(interp, Some(&Value::str(default)), COMPARATOR, name)?,
            };
            let mut values = interp.iterate(&arg(0))?;
            let Some(first) = values.next() else {
                return Ok(Value::Undefined);
            };
            let mut result = first?;
            for value in values {
                let value = value?;
                if interp.call(&f, vec![value.clone(), result.clone()])?.is_truthy() {
                    result = value;
                }
            }
            Ok(result)
        }
        "sort" => {
            let f = match interp.code_arg(args.get(1), COMPARATOR)? {
                Some(f) => f,
                None => required_code(interp, Some(&Value::str("lhs - rhs")), COMPARATOR, name)?,
            };
            let items = match to_array(interp, &arg(0))? {
                Value::Array(items) => items.as_ref().clone(),
                _ => vec![],
            };
            let mut order = |a: &Value, b: &Value| comparison(interp, &f, a, b);
            Ok(Value::array(merge_sort(items, &mut order)?))
        }
        "sum" => {
            let source = arg(0);
            let f = interp.code_arg(args.get(1), ELEMENT)?;
            let mut total = 0.0;
            for entry in interp.entries(&source)? {
                let (index, it) = entry?;
                let value = match &f {
                    Some(f) => interp.call(f, vec![it, index, source.clone()])?,
                    None => it,
                };
                total += value.to_number(heap);
            }
            Ok(Value::Number(total))
        }
        "unique" => {
            let f = interp.code_arg(args.get(1), &["it"])?;
            let mut positions: HashMap<String, usize> = HashMap::new();
            let mut result: Vec<Value> = vec![];
            for value in interp.iterate(&arg(0))? {
                let value = value?;
                let key = match &f {
                    Some(f) => interp.call(f, vec![value.clone()])?.to_display_string(heap),
                    None => object_id(heap, &value)
                        .map_or_else(|| value.to_display_string(heap), |id| id.to_string()),
                };
                match positions.get(&key) {
                    Some(position) => result[*position] = value,
                    None => {
                        positions.insert(key, result.len());
                        result.push(value);
                    }
                }
            }
            Ok(Value::array(result))
        }
        "print" | "println" => {
            let text = arg(0).to_display_string(heap);
            if name == "println" {
                println!("{}", text);
            } else {
                print!("{}", text);
            }
            Ok(Value::Undefined)
        }
        _ => Err(EvalError::new(format!("{} is not defined", name))),
    }
}

fn objects(instances: Vec<crate::heap::Instance>) -> Value {
    Value::iter(instances.into_iter().map(|i| Ok(instance_value(i))))
}

fn object_id(heap: &Heap, value: &Value) -> Option<u64> {
    match value {
        Value::Class(class) => Some(heap.class(*class).id()),
        Value::Root(root) => Some(root.id),
        other => unwrap(heap, other).map(|i| i.id()),
    }
}

fn required_code(
    interp: &Interp,
    code: Option<&Value>,
    params: &'static [&'static str],
    function: &str,
) -> EvalResult<Value> {
    interp
        .code_arg(code, params)?
        .ok_or_else(|| EvalError::new(format!("{}: function or expression expected", function)))
}

/// Ordering from a script comparator: negative, zero or positive.
fn comparison(interp: &Interp, f: &Value, lhs: &Value, rhs: &Value) -> EvalResult<Ordering> {
    let result = interp
        .call(f, vec![lhs.clone(), rhs.clone()])?
        .to_number(interp.heap());
    Ok(if result < 0.0 {
        Ordering::Less
    } else if result > 0.0 {
        Ordering::Greater
    } else {
        Ordering::Equal
    })
}

/// Stable merge sort. Script comparators may be inconsistent, so this never
/// relies on the comparator being a total order.
fn merge_sort(
    mut items: Vec<Value>,
    order: &mut dyn FnMut(&Value, &Value) -> EvalResult<Ordering>,
) -> EvalResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, order)?;
    let right = merge_sort(right, order)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => order(l, r)? == Ordering::Greater,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    Ok(merged)
}

fn to_array(interp: &Interp, value: &Value) -> EvalResult<Value> {
    Ok(match value {
        Value::Array(_) => value.clone(),
        Value::Undefined | Value::Null => Value::array(vec![]),
        Value::Iter(_) | Value::Map(_) | Value::Object(_) | Value::Statics(_) => Value::array(
            interp
                .iterate(value)?
                .collect::<EvalResult<Vec<_>>>()?,
        ),
        other => Value::array(vec![other.clone()]),
    })
}

/// The best `count` elements under the comparator, keeping arrival order
/// between equal elements. Without a comparator, the first `count` elements.
fn top(
    interp: &Interp,
    source: &Value,
    code: Option<&Value>,
    count: Option<&Value>,
) -> EvalResult<Value> {
    if source.is_nullish() {
        return Ok(source.clone());
    }
    let f = interp.code_arg(code, COMPARATOR)?;
    let count = match count {
        Some(Value::Number(n)) if *n >= 0.0 => *n as usize,
        _ => DEFAULT_TOP_COUNT,
    };
    let order = |a: &Value, b: &Value| match &f {
        Some(f) => comparison(interp, f, a, b),
        None => Ok(Ordering::Greater),
    };
    let mut sorted: Vec<Value> = vec![];
    for element in interp.iterate(source)? {
        let element = element?;
        if sorted.len() >= count {
            match sorted.last() {
                Some(last) if order(&element, last)? != Ordering::Less => continue,
                None => continue,
                _ => {}
            }
        }
        let (mut lo, mut hi) = (0, sorted.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if order(&element, &sorted[mid])? == Ordering::Less {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        sorted.insert(lo, element);
        sorted.truncate(count);
    }
    Ok(Value::array(sorted))
}

/// Lazily keeps the values for which `f(it, index)` is truthy.
pub(crate) fn lazy_filter(interp: &Interp, values: ValueIter, f: Value) -> Value {
    let entries: EntryIter = Box::new(
        values
            .enumerate()
            .map(|(i, v)| v.map(|v| (Value::Number(i as f64), v))),
    );
    filter_entries(interp, entries, f, Value::Undefined)
}

fn filter_entries(interp: &Interp, entries: EntryIter, f: Value, source: Value) -> Value {
    let interp = interp.clone();
    Value::iter(entries.filter_map(move |entry| {
        let (index, it) = match entry {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e)),
        };
        match interp.call(&f, vec![it.clone(), index, source.clone()]) {
            Ok(keep) if keep.is_truthy() => Some(Ok(it)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

fn escape_angle_brackets(text: &str) -> String {
    text.replacen('<', "&lt;", 1).replacen('>', "&gt;", 1)
}

pub(crate) fn to_html(interp: &Interp, value: &Value) -> EvalResult<String> {
    let heap = interp.heap();
    Ok(match value {
        Value::Null => "null".to_string(),
        Value::Undefined => "undefined".to_string(),
        Value::Object(instance) => html_object(heap, instance),
        Value::Class(class) => {
            let name = heap.class(*class).name();
            format!("<a href='file://class/{}'>class {}</a>", name, name)
        }
        Value::Chain(chain) => describe_chain(heap, chain, true),
        Value::Iter(_) => {
            let mut html = "[ ".to_string();
            for item in interp.iterate(value)? {
                html.push_str(&to_html(interp, &item?)?);
                html.push_str(", ");
            }
            html.push(']');
            html
        }
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| to_html(interp, item))
                .collect::<EvalResult<Vec<_>>>()?;
            format!("[ {} ]", parts.join(", "))
        }
        Value::Map(entries) => {
            let custom = entries
                .iter()
                .find(|(k, v)| &**k == "toHtml" && matches!(v, Value::Function(_)));
            if let Some((_, f)) = custom {
                return Ok(interp.call(f, vec![])?.to_display_string(heap));
            }
            let mut html = "{ ".to_string();
            for (key, item) in entries.iter() {
                html.push_str(&format!("{}:{}, ", key, to_html(interp, item)?));
            }
            html.push('}');
            html
        }
        Value::Statics(_) | Value::Root(_) => {
            let entries: Vec<(String, Value)> = match value {
                Value::Root(root) => vec![
                    ("id".to_string(), Value::Number(root.id as f64)),
                    (
                        "description".to_string(),
                        Value::str(&format!("Reference {}", root.description())),
                    ),
                    (
                        "referrer".to_string(),
                        heap.instance_by_id(root.id).map_or(Value::Null, instance_value),
                    ),
                    ("type".to_string(), Value::str(&root.kind.to_string())),
                ],
                _ => interp
                    .entries(value)?
                    .map(|e| e.map(|(k, v)| (k.to_display_string(heap), v)))
                    .collect::<EvalResult<_>>()?,
            };
            let mut html = "{ ".to_string();
            for (key, item) in &entries {
                html.push_str(&format!("{}:{}, ", key, to_html(interp, item)?));
            }
            html.push('}');
            html
        }
        other => escape_angle_brackets(&other.to_display_string(heap)),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::*;

    fn run(source: &str) -> (Interp, EvalResult<Value>) {
        let interp = Interp::new(Arc::new(sample_heap()));
        let value = interp.eval_script(source);
        (interp, value)
    }

    fn text(source: &str) -> String {
        let (interp, value) = run(source);
        value.unwrap().to_display_string(interp.heap())
    }

    fn number(source: &str) -> f64 {
        run(source).1.unwrap().as_number().unwrap()
    }

    #[test]
    fn test_object_functions() {
        assert_eq!(text("objectid(heap.findObject(0x2000))"), "8192");
        assert_eq!(text("classof(heap.findObject(0x2020))"), "class com.example.SpecialNode");
        assert!(run("identical(heap.findObject(0x2000), heap.findObject(8192))").1.unwrap().is_truthy());
        assert_eq!(number("sizeof(heap.findObject(0x2000))"), 40.0);
        assert_eq!(number("rsizeof(heap.findObject(0x2000))"), 144.0);
        assert!(run("refers(heap.findObject(0x3000), heap.findObject(0x2020))").1.unwrap().is_truthy());
        assert!(!run("refers(heap.findObject(0x2020), heap.findObject(0x3000))").1.unwrap().is_truthy());
        assert_eq!(text("root(heap.findObject(0x2000)).type"), "Java frame");
        assert_eq!(text("root(heap.findObject(0x2010))"), "null");
    }

    #[test]
    fn test_referrers_and_referees() {
        assert_eq!(text("toArray(map(referrers(heap.findObject(0x2010)), 'objectid(it)'))"), "8192");
        assert_eq!(
            text("toArray(map(referrers(heap.findObject(0x2010), true), 'objectid(it)'))"),
            "8192,16384"
        );
        assert_eq!(number("length(referees(heap.findObject(0x4000)))"), 0.0);
        assert_eq!(number("length(referees(heap.findObject(0x4000), true))"), 1.0);
        assert_eq!(number("length(reachables(heap.findObject(0x2000)))"), 6.0);
        assert_eq!(
            number("length(reachables(heap.findObject(0x2000), 'com.example.Node.next'))"),
            2.0
        );
        assert_eq!(
            number("var n = 0; forEachReferee(function (r) { n = n + 1; }, heap.findObject(0x2000)); n"),
            2.0
        );
    }

    #[test]
    fn test_sequence_functions() {
        assert_eq!(text("map([1, 2, 3], 'it * 2')"), "2,4,6");
        assert_eq!(text("map([1, 2, 3], 'index')"), "0,1,2");
        assert_eq!(text("filter([1, 2, 3, 4], 'it % 2 == 0')"), "2,4");
        assert_eq!(number("count([1, 2, 3])"), 3.0);
        assert_eq!(number("count([1, 2, 3], 'it > 1')"), 2.0);
        assert_eq!(number("sum([1, 2, 3])"), 6.0);
        assert_eq!(number("sum([1, 2, 3], 'it * it')"), 14.0);
        assert!(run("contains([1, 2, 3], 'it == 2')").1.unwrap().is_truthy());
        assert!(!run("contains([1, 2, 3], 'it == 5')").1.unwrap().is_truthy());
        assert_eq!(number("max([3, 9, 2])"), 9.0);
        assert_eq!(number("min([3, 9, 2])"), 2.0);
        assert_eq!(text("typeof max([])"), "undefined");
        assert_eq!(text("sort([3, 1, 2])"), "1,2,3");
        assert_eq!(text("sort([3, 1, 2], 'rhs - lhs')"), "3,2,1");
        assert_eq!(text("sort(['b', 'a'], function (l, r) { return l < r ? -1 : 1; })"), "a,b");
        assert_eq!(text("unique([1, 2, 1, 3, 2])"), "1,2,3");
        assert_eq!(text("concat([1], [2, 3])"), "1,2,3");
        assert_eq!(number("length(concat(heap.roots, heap.roots))"), 6.0);
        assert_eq!(text("typeof concat(1, 2)"), "undefined");
        assert_eq!(text("toArray(heap.findObject(0x3000))"), "com.example.Node#1,com.example.SpecialNode#1");
    }

    #[test]
    fn test_top() {
        assert_eq!(text("top([5, 1, 4, 2, 3])"), "5,1,4,2,3");
        assert_eq!(text("top([5, 1, 4, 2, 3], 'rhs - lhs', 3)"), "5,4,3");
        assert_eq!(text("top([5, 1, 4, 2, 3], 'lhs - rhs', 2)"), "1,2");
        assert_eq!(
            text("map(top(heap.objects('com.example.Node'), 'rhs.weight - lhs.weight', 2), 'it.weight')"),
            "9,3"
        );
    }

    #[test]
    fn test_lazy_map_and_filter() {
        let (interp, value) = run("filter(heap.objects('com.example.Node', false), 'it.weight > 1')");
        let value = value.unwrap();
        assert!(matches!(value, Value::Iter(_)));
        let weights: Vec<f64> = interp
            .iterate(&value)
            .unwrap()
            .map(|v| {
                let v = v.unwrap();
                let weight = super::super::snapshot::get_property(&interp, &v, "weight").unwrap();
                weight.as_number().unwrap()
            })
            .collect();
        assert_eq!(weights, vec![2.0, 9.0]);
        assert_eq!(text("map(heap.objects('com.example.Node', false), 'it.weight')"), "[object Iterator]");
        assert_eq!(
            text("toArray(map(heap.objects('com.example.Node', false), 'it.weight'))"),
            "1,2,9"
        );
    }

    #[test]
    fn test_to_html() {
        assert_eq!(
            text("toHtml(heap.findObject(0x2000))"),
            "<a href='file://instance/com.example.Node@8192'>com.example.Node#1</a>"
        );
        assert_eq!(
            text("toHtml(heap.findClass('com.example.Node'))"),
            "<a href='file://class/com.example.Node'>class com.example.Node</a>"
        );
        assert_eq!(text("toHtml([1, 'a'])"), "[ 1, a ]");
        assert_eq!(text("toHtml({ a: 1, b: null })"), "{ a:1, b:null, }");
        assert_eq!(text("toHtml('<b>')"), "&lt;b&gt;");
        assert_eq!(text("toHtml(undefined)"), "undefined");
        assert!(text("toHtml(heap.findClass('com.example.Holder').statics)").starts_with("{ INSTANCE:<a href="));
    }

    #[test]
    fn test_errors() {
        assert!(run("sizeof(1)").1.is_err());
        assert!(run("map([1], 'it +')").1.is_err());
        assert!(run("filter([1])").1.is_err());
    }
}
