//! Presents heap objects to scripts: property lookup, methods, and the
//! global `heap` object.

use std::rc::Rc;
use std::sync::Arc;

use super::builtins;
use super::interp::Interp;
use super::value::{object_name, EvalError, EvalResult, Value};
use crate::constants::JAVA_LANG_OBJECT;
use crate::heap::{
    java_class_name, ClassIndex, ClassMetadata, FieldValue, Heap, Instance, ObjectKind, Primitive,
};
use crate::reachability::ReferenceChain;

/// Wraps an object, turning class objects into class values.
pub(crate) fn instance_value(instance: Instance) -> Value {
    if instance.is_class() {
        Value::Class(instance.class())
    } else {
        Value::Object(instance)
    }
}

pub(crate) fn primitive_value(value: Primitive) -> Value {
    match value {
        Primitive::Boolean(b) => Value::Bool(b),
        Primitive::Char(_) => Value::Str(value.to_string().into()),
        other => Value::Number(other.as_f64()),
    }
}

pub(crate) fn field_to_value(heap: &Heap, field: &FieldValue) -> Value {
    match field {
        FieldValue::Primitive { value, .. } => primitive_value(*value),
        FieldValue::Object { .. } | FieldValue::Element { .. } => field
            .object_id()
            .and_then(|id| heap.instance_by_id(id))
            .map_or(Value::Null, instance_value),
    }
}

/// The heap object behind a script value, if any.
pub fn unwrap(heap: &Heap, value: &Value) -> Option<Instance> {
    match value {
        Value::Object(instance) => Some(*instance),
        Value::Class(class) => heap.class_object(heap.class(*class)),
        Value::Root(root) => heap.instance_by_id(root.id),
        Value::Chain(chain) => Some(chain.obj()),
        _ => None,
    }
}

pub(crate) fn expect_object(heap: &Heap, value: Option<&Value>, function: &str) -> EvalResult<Instance> {
    value
        .and_then(|v| unwrap(heap, v))
        .ok_or_else(|| EvalError::new(format!("{}: heap object expected", function)))
}

/// Looks a class up by dotted name or by its internal/descriptor form.
pub(crate) fn resolve_class<'h>(heap: &'h Heap, name: &str) -> Option<&'h ClassMetadata> {
    heap.class_by_name(name)
        .or_else(|| heap.class_by_name(&java_class_name(name)))
}

fn class_arg<'h>(heap: &'h Heap, value: Option<&Value>) -> EvalResult<Option<&'h ClassMetadata>> {
    match value {
        None | Some(Value::Undefined) => Ok(heap.class_by_name(JAVA_LANG_OBJECT)),
        Some(Value::Str(name)) => Ok(resolve_class(heap, name)),
        Some(Value::Class(class)) => Ok(Some(heap.class(*class))),
        Some(other) => Err(EvalError::new(format!(
            "class expected, found {}",
            other.to_display_string(heap)
        ))),
    }
}

/// Instances of `classes` produced on demand.
fn instances_of(heap: Arc<Heap>, classes: Vec<ClassIndex>) -> impl Iterator<Item = Instance> {
    classes.into_iter().flat_map(move |class| {
        let heap = heap.clone();
        let count = heap.class(class).instances.len();
        (0..count).map(move |i| heap.object_at(heap.class(class).instances[i] as usize))
    })
}

fn selected_classes(heap: &Heap, class: &ClassMetadata, include_subtypes: bool) -> Vec<ClassIndex> {
    if include_subtypes {
        heap.class_and_subclasses(class)
            .iter()
            .map(|c| c.index())
            .collect()
    } else {
        vec![class.index()]
    }
}

pub(crate) fn get_property(interp: &Interp, object: &Value, name: &str) -> EvalResult<Value> {
    let heap = interp.heap();
    match object {
        Value::Undefined | Value::Null => Err(EvalError::new(format!(
            "cannot read property '{}' of {}",
            name,
            object.to_display_string(heap)
        ))),
        Value::Str(s) if name == "length" => Ok(Value::Number(s.encode_utf16().count() as f64)),
        Value::Array(items) if name == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Map(entries) => Ok(entries
            .iter()
            .find(|(k, _)| &**k == name)
            .map_or(Value::Undefined, |(_, v)| v.clone())),
        Value::Object(instance) => object_property(heap, instance, name),
        Value::Class(class) => class_property(heap, *class, name),
        Value::Statics(class) => Ok(heap
            .class(*class)
            .static_value(name)
            .map_or(Value::Undefined, |f| field_to_value(heap, f))),
        Value::Root(root) => Ok(match name {
            "id" => Value::Number(root.id as f64),
            "description" => Value::str(&format!("Reference {}", root.description())),
            "type" => Value::str(&root.kind.to_string()),
            "referrer" => heap.instance_by_id(root.id).map_or(Value::Null, instance_value),
            _ => Value::Undefined,
        }),
        Value::Chain(chain) if name == "length" => Ok(Value::Number(chain.depth() as f64)),
        Value::Heap => match name {
            "classes" | "allClasses" | "roots" | "gcRoots" | "finalizables" => {
                Ok(call_method(interp, object, name, &[])?.unwrap_or(Value::Undefined))
            }
            _ => Ok(Value::Undefined),
        },
        _ => Ok(Value::Undefined),
    }
}

fn object_property(heap: &Heap, instance: &Instance, name: &str) -> EvalResult<Value> {
    match name {
        "clazz" => return Ok(Value::Class(instance.class())),
        "id" => return Ok(Value::Number(instance.id() as f64)),
        "statics" => return Ok(Value::Statics(instance.class())),
        "length" if instance.is_array() => {
            return Ok(Value::Number(instance.array_length().unwrap_or(0) as f64))
        }
        _ => {}
    }
    Ok(heap
        .field_value(instance, name)?
        .map_or(Value::Undefined, |f| field_to_value(heap, &f)))
}

fn class_property(heap: &Heap, class: ClassIndex, name: &str) -> EvalResult<Value> {
    let metadata = heap.class(class);
    Ok(match name {
        "name" => Value::str(metadata.name()),
        "superclass" => heap
            .superclass(metadata)
            .map_or(Value::Null, |c| Value::Class(c.index())),
        "fields" => Value::array(
            metadata
                .fields()
                .iter()
                .map(|f| {
                    Value::Map(Rc::new(vec![
                        ("name".into(), Value::str(&f.name)),
                        ("signature".into(), Value::str(f.ty.name())),
                    ]))
                })
                .collect(),
        ),
        "statics" => Value::Statics(class),
        "instanceSize" => Value::Number(metadata.instance_size() as f64),
        "id" => Value::Number(metadata.id() as f64),
        "loader" => heap
            .instance_by_id(metadata.loader_id())
            .map_or(Value::Null, instance_value),
        _ => metadata
            .static_value(name)
            .map_or(Value::Undefined, |f| field_to_value(heap, f)),
    })
}

pub(crate) fn get_index(interp: &Interp, object: &Value, index: &Value) -> EvalResult<Value> {
    let heap = interp.heap();
    let Value::Number(n) = index else {
        return get_property(interp, object, &index.to_display_string(heap));
    };
    let position = (*n >= 0.0 && n.fract() == 0.0).then_some(*n as usize);
    match (object, position) {
        (Value::Array(items), Some(i)) => Ok(items.get(i).cloned().unwrap_or(Value::Undefined)),
        (Value::Str(s), Some(i)) => Ok(s
            .chars()
            .nth(i)
            .map_or(Value::Undefined, |c| Value::Str(c.to_string().into()))),
        (Value::Chain(chain), Some(i)) => {
            Ok(chain.iter().nth(i).map_or(Value::Undefined, instance_value))
        }
        (Value::Object(instance), Some(i)) if instance.is_array() => {
            Ok(array_elements(heap, instance)?
                .into_iter()
                .nth(i)
                .map_or(Value::Undefined, |(_, v)| v))
        }
        _ => get_property(interp, object, &index.to_display_string(heap)),
    }
}

fn array_elements(heap: &Heap, instance: &Instance) -> EvalResult<Vec<(Value, Value)>> {
    let indexed = |i: usize| Value::Number(i as f64);
    match instance.kind() {
        ObjectKind::PrimitiveArray(_) => Ok(heap
            .primitive_array(instance)?
            .map(|a| a.values)
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, p)| (indexed(i), primitive_value(p)))
            .collect()),
        _ => Ok(heap
            .fields(instance)?
            .iter()
            .enumerate()
            .map(|(i, f)| (indexed(i), field_to_value(heap, f)))
            .collect()),
    }
}

/// Keys and values of an object's fields, an array's elements, or a
/// class's statics.
pub(crate) fn entries(interp: &Interp, value: &Value) -> EvalResult<Vec<(Value, Value)>> {
    let heap = interp.heap();
    let named = |fields: &[FieldValue]| -> Vec<(Value, Value)> {
        fields
            .iter()
            .map(|f| (Value::str(&f.name()), field_to_value(heap, f)))
            .collect()
    };
    match value {
        Value::Object(instance) if instance.is_array() => array_elements(heap, instance),
        Value::Object(instance) => Ok(named(&heap.fields(instance)?[..])),
        Value::Class(class) | Value::Statics(class) => Ok(named(heap.class(*class).statics())),
        _ => Ok(vec![]),
    }
}

/// Runs a method call. `Ok(None)` means the value has no such built-in
/// method and the caller should look for a function-valued property.
pub(crate) fn call_method(
    interp: &Interp,
    object: &Value,
    name: &str,
    args: &[Value],
) -> EvalResult<Option<Value>> {
    let heap = interp.heap();
    if name == "toString" && !object.is_nullish() && !matches!(object, Value::Map(_)) {
        return Ok(Some(Value::str(&object.to_display_string(heap))));
    }
    match object {
        Value::Heap => heap_method(interp, name, args),
        Value::Class(class) => class_method(interp, *class, name, args),
        Value::Chain(chain) if name == "toHtml" => {
            Ok(Some(Value::str(&describe_chain(heap, chain, true))))
        }
        Value::Str(s) => Ok(string_method(s, name, args)),
        Value::Array(items) => Ok(match name {
            "join" => {
                let separator = args
                    .first()
                    .map_or(",".to_string(), |s| s.to_display_string(heap));
                let parts: Vec<String> = items.iter().map(|v| v.to_display_string(heap)).collect();
                Some(Value::str(&parts.join(&separator)))
            }
            "indexOf" => {
                let needle = args.first().cloned().unwrap_or(Value::Undefined);
                let position = items
                    .iter()
                    .position(|v| super::interp::strict_eq(v, &needle))
                    .map_or(-1.0, |i| i as f64);
                Some(Value::Number(position))
            }
            _ => None,
        }),
        _ => Ok(None),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Option<Value> {
    let arg = |i: usize| args.get(i).and_then(Value::as_str).unwrap_or("");
    Some(match name {
        "indexOf" => Value::Number(s.find(arg(0)).map_or(-1.0, |b| s[..b].chars().count() as f64)),
        "startsWith" => Value::Bool(s.starts_with(arg(0))),
        "endsWith" => Value::Bool(s.ends_with(arg(0))),
        "contains" | "includes" => Value::Bool(s.contains(arg(0))),
        "toLowerCase" => Value::str(&s.to_lowercase()),
        "toUpperCase" => Value::str(&s.to_uppercase()),
        "trim" => Value::str(s.trim()),
        "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let bound = |v: Option<&Value>, default: usize| match v.and_then(Value::as_number) {
                Some(n) if n.is_nan() => 0,
                Some(n) => (n.max(0.0) as usize).min(chars.len()),
                None => default,
            };
            let start = bound(args.first(), 0);
            let end = bound(args.get(1), chars.len());
            let (start, end) = (start.min(end), start.max(end));
            Value::Str(chars[start..end].iter().collect::<String>().into())
        }
        _ => return None,
    })
}

fn class_method(
    interp: &Interp,
    class: ClassIndex,
    name: &str,
    args: &[Value],
) -> EvalResult<Option<Value>> {
    let heap = interp.heap();
    let metadata = heap.class(class);
    Ok(Some(match name {
        "subclasses" => {
            let indirect = args.first().map_or(true, Value::is_truthy);
            let classes: Vec<Value> = if indirect {
                heap.class_and_subclasses(metadata)
                    .iter()
                    .skip(1)
                    .map(|c| Value::Class(c.index()))
                    .collect()
            } else {
                metadata
                    .subclasses()
                    .iter()
                    .map(|c| Value::Class(*c))
                    .collect()
            };
            Value::array(classes)
        }
        "superclasses" => Value::array(
            heap.superclasses(metadata)
                .iter()
                .map(|c| Value::Class(c.index()))
                .collect(),
        ),
        "isSubclassOf" => {
            let other = other_class(heap, args.first(), name)?;
            Value::Bool(heap.is_subclass_of(metadata, other))
        }
        "isSuperclassOf" => {
            let other = other_class(heap, args.first(), name)?;
            Value::Bool(heap.is_subclass_of(other, metadata))
        }
        "instances" => {
            let include_subtypes = args.first().map_or(false, Value::is_truthy);
            let classes = selected_classes(heap, metadata, include_subtypes);
            Value::iter(instances_of(interp.shared_heap(), classes).map(|i| Ok(Value::Object(i))))
        }
        _ => return Ok(None),
    }))
}

fn other_class<'h>(heap: &'h Heap, value: Option<&Value>, method: &str) -> EvalResult<&'h ClassMetadata> {
    match value {
        Some(Value::Class(other)) => Ok(heap.class(*other)),
        Some(Value::Str(name)) => resolve_class(heap, name)
            .ok_or_else(|| EvalError::new(format!("unknown class '{}'", name))),
        _ => Err(EvalError::new(format!("{}: class expected", method))),
    }
}

fn heap_method(interp: &Interp, name: &str, args: &[Value]) -> EvalResult<Option<Value>> {
    let heap = interp.heap();
    Ok(Some(match name {
        "forEachClass" => {
            let callback = callback_arg(interp, args.first())?;
            for class in heap.all_classes() {
                if interp.call(&callback, vec![Value::Class(class.index())])?.is_truthy() {
                    break;
                }
            }
            Value::Undefined
        }
        "forEachObject" => {
            let callback = callback_arg(interp, args.first())?;
            let include_subtypes = args.get(2).map_or(true, |v| v.is_nullish() || v.is_truthy());
            if let Some(class) = class_arg(heap, args.get(1))? {
                let classes = selected_classes(heap, class, include_subtypes);
                for instance in instances_of(interp.shared_heap(), classes) {
                    if interp.call(&callback, vec![Value::Object(instance)])?.is_truthy() {
                        break;
                    }
                }
            }
            Value::Undefined
        }
        "findClass" | "classByName" => match args.first() {
            Some(Value::Str(name)) => {
                resolve_class(heap, name).map_or(Value::Null, |c| Value::Class(c.index()))
            }
            Some(Value::Class(class)) => Value::Class(*class),
            _ => Value::Null,
        },
        "findObject" | "findInstance" => {
            let id = match args.first() {
                Some(Value::Number(n)) if n.is_finite() && *n > 0.0 => Some(*n as u64),
                Some(Value::Str(s)) => parse_object_id(s),
                _ => None,
            };
            id.and_then(|id| heap.instance_by_id(id))
                .map_or(Value::Null, instance_value)
        }
        "classes" | "allClasses" => {
            let count = heap.all_classes().len();
            Value::iter((0..count).map(|i| Ok(Value::Class(ClassIndex(i as u32)))))
        }
        "roots" | "gcRoots" => {
            let roots = heap.gc_roots().to_vec();
            Value::iter(roots.into_iter().map(|r| Ok(Value::Root(r))))
        }
        "objects" => {
            let include_subtypes = args.get(1).map_or(true, |v| v.is_nullish() || v.is_truthy());
            let filter = interp.code_arg(args.get(2), &["it"])?;
            let Some(class) = class_arg(heap, args.first())? else {
                return Ok(Some(Value::array(vec![])));
            };
            let classes = selected_classes(heap, class, include_subtypes);
            let objects = instances_of(interp.shared_heap(), classes).map(|i| Ok(Value::Object(i)));
            match filter {
                Some(filter) => builtins::lazy_filter(interp, Box::new(objects), filter),
                None => Value::iter(objects),
            }
        }
        "finalizables" => Value::objects(heap.finalizables()?),
        "reachables" => {
            let start = expect_object(heap, args.first(), name)?;
            Value::objects(heap.reachables(&start, heap.options().excludes.as_deref())?)
        }
        "livepaths" => {
            let target = expect_object(heap, args.first(), name)?;
            let include_weak = args.get(1).map_or(false, Value::is_truthy);
            Value::array(
                heap.rootset_references_to(&target, include_weak)?
                    .into_iter()
                    .map(|chain| Value::Chain(Rc::new(chain)))
                    .collect(),
            )
        }
        "describeRef" => {
            let from = expect_object(heap, args.first(), name)?;
            let to = expect_object(heap, args.get(1), name)?;
            heap.describe_reference(&from, &to)?
                .map_or(Value::Null, |d| Value::str(&d))
        }
        _ => return Ok(None),
    }))
}

/// A callback argument; defaults to `print`.
fn callback_arg(interp: &Interp, value: Option<&Value>) -> EvalResult<Value> {
    match value {
        None | Some(Value::Undefined) => Ok(interp
            .globals()
            .lookup("print")
            .unwrap_or(Value::Undefined)),
        Some(f @ Value::Function(_)) => Ok(f.clone()),
        Some(other) => Err(EvalError::new(format!(
            "{} is not a function",
            other.to_display_string(interp.heap())
        ))),
    }
}

/// Link to an object as rendered by `toHtml`.
pub(crate) fn html_object(heap: &Heap, instance: &Instance) -> String {
    let class = heap.class(instance.class());
    if instance.is_class() {
        format!(
            "<a href='file://class/{}'>class {}</a>",
            class.name(),
            class.name()
        )
    } else {
        format!(
            "<a href='file://instance/{}@{}'>{}</a>",
            class.name(),
            instance.id(),
            object_name(heap, instance)
        )
    }
}

/// `root description->root (field x) ->...->target`, reading from the
/// root towards the target.
pub(crate) fn describe_chain(heap: &Heap, chain: &ReferenceChain, html: bool) -> String {
    let mut path: Vec<Instance> = chain.iter().collect();
    path.reverse();
    let mut description = heap
        .gc_roots_for(&chain.last())
        .first()
        .map_or_else(|| "Root".to_string(), |r| format!("Reference {}", r.description()));
    description.push_str("->");
    for (i, obj) in path.iter().enumerate() {
        if html {
            description.push_str(&html_object(heap, obj));
        } else if obj.is_class() {
            description.push_str(&format!("class {}", heap.class(obj.class()).name()));
        } else {
            description.push_str(&object_name(heap, obj));
        }
        if let Some(next) = path.get(i + 1) {
            let how = heap
                .describe_reference(obj, next)
                .ok()
                .flatten()
                .unwrap_or_else(|| "??".to_string());
            description.push_str(&format!(" ({}) ->", how));
        }
    }
    description
}

/// Object ids given as text, decimal or `0x` hex, without a detour through
/// `f64` so ids above 2^53 survive.
fn parse_object_id(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn run(source: &str) -> (Interp, Value) {
        let interp = Interp::new(Arc::new(sample_heap()));
        let value = interp.eval_script(source).unwrap();
        (interp, value)
    }

    fn text(source: &str) -> String {
        let (interp, value) = run(source);
        value.to_display_string(interp.heap())
    }

    fn number(source: &str) -> f64 {
        run(source).1.as_number().unwrap()
    }

    #[test]
    fn test_instance_properties() {
        assert_eq!(number("heap.findObject(0x2000).weight"), 1.0);
        assert_eq!(text("heap.findObject(0x2000).next"), "com.example.Node#2");
        assert_eq!(text("heap.findObject(0x2000).payload"), "hello");
        assert_eq!(text("heap.findObject(0x2000).payload.toString()"), "hello");
        assert_eq!(text("heap.findObject(0x2010).payload"), "null");
        assert_eq!(text("heap.findObject(0x2020).tag + heap.findObject(0x2020).weight"), "10");
        assert_eq!(text("heap.findObject(0x2000).clazz.name"), "com.example.Node");
        assert_eq!(number("heap.findObject(0x2000).id"), 0x2000 as f64);
        assert_eq!(text("typeof heap.findObject(0x2000).missing"), "undefined");
    }

    #[test]
    fn test_object_ids_from_text() {
        assert_eq!(parse_object_id(" 0x2000 "), Some(0x2000));
        assert_eq!(parse_object_id("8192"), Some(8192));
        assert_eq!(parse_object_id("9007199254740993"), Some((1u64 << 53) + 1));
        assert_eq!(parse_object_id("0xffffffffffffffff"), Some(u64::MAX));
        assert_eq!(parse_object_id("hello"), None);
        assert_eq!(text("heap.findObject('0x2000').weight"), "1");
        assert_eq!(text("heap.findObject('8192').weight"), "1");
        assert_eq!(text("heap.findObject('0x1fffffffffffff1')"), "null");
    }

    #[test]
    fn test_array_access() {
        assert_eq!(number("heap.findObject(0x3000).length"), 2.0);
        assert_eq!(number("heap.findObject(0x3000)[1].weight"), 3.0);
        assert_eq!(text("heap.findObject(0x1010)[1]"), "e");
        assert_eq!(text("typeof heap.findObject(0x3000)[5]"), "undefined");
    }

    #[test]
    fn test_class_properties() {
        assert_eq!(text("heap.findClass('com.example.SpecialNode').superclass"), "class com.example.Node");
        assert_eq!(text("heap.findClass('[C').name"), "char[]");
        assert_eq!(
            text("heap.findClass('com.example.Node').fields[2].name + ':' + heap.findClass('com.example.Node').fields[2].signature"),
            "weight:int"
        );
        assert!(run("heap.findClass('com.example.Holder').enabled").1.is_truthy());
        assert_eq!(text("heap.findClass('com.example.Holder').statics.INSTANCE"), "com.example.Holder#1");
        assert_eq!(number("heap.findClass('com.example.Node').subclasses().length"), 1.0);
        assert_eq!(number("heap.findClass('com.example.SpecialNode').superclasses().length"), 2.0);
        assert!(run("heap.findClass('com.example.SpecialNode').isSubclassOf('com.example.Node')").1.is_truthy());
        assert!(run("heap.findClass('java.lang.Object').isSuperclassOf(heap.findClass('java.lang.String'))").1.is_truthy());
        assert_eq!(text("heap.findClass('no.such.Class')"), "null");
    }

    #[test]
    fn test_heap_iterators() {
        assert_eq!(number("length(heap.classes())"), 9.0);
        assert_eq!(number("length(heap.roots)"), 3.0);
        assert_eq!(number("length(heap.objects('com.example.Node'))"), 4.0);
        assert_eq!(number("length(heap.objects('com.example.Node', false))"), 3.0);
        assert_eq!(number("length(heap.objects('com.example.Node', true, 'it.weight > 1'))"), 3.0);
        assert_eq!(number("count(heap.findClass('com.example.Node').instances())"), 3.0);
        assert_eq!(text("toArray(map(heap.roots, 'it.type'))"), "sticky class,Java frame,JNI global");
    }

    #[test]
    fn test_for_each_stops_on_true() {
        let (_, value) = run(
            "var seen = 0; heap.forEachObject(function (o) { seen = seen + 1; return seen == 2; }, 'com.example.Node'); seen",
        );
        assert_eq!(value.as_number(), Some(2.0));
        let (_, value) = run("var n = 0; heap.forEachClass(function (c) { n = n + 1; }); n");
        assert_eq!(value.as_number(), Some(9.0));
    }

    #[test]
    fn test_livepaths_and_references() {
        assert_eq!(number("heap.livepaths(heap.findObject(0x2020)).length"), 2.0);
        assert_eq!(number("heap.livepaths(heap.findObject(0x2010)).length"), 1.0);
        assert_eq!(number("heap.livepaths(heap.findObject(0x2010), true).length"), 2.0);
        assert_eq!(
            text("heap.livepaths(heap.findObject(0x2010))[0].toString()"),
            "Reference Java frame->com.example.Node#1 (field next) ->com.example.Node#2"
        );
        assert_eq!(
            text("heap.describeRef(heap.findObject(0x3000), heap.findObject(0x2020))"),
            "[1]"
        );
        assert_eq!(number("length(heap.reachables(heap.findObject(0x2010)))"), 3.0);
    }
}
