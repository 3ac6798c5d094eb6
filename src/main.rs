#[macro_use]
extern crate log;

mod cli;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::Parser;

use cli::*;
use heapwalk::*;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn get_git_info() -> String {
    match (built_info::GIT_COMMIT_HASH, built_info::GIT_DIRTY) {
        (Some(hash), Some(dirty)) => format!(
            "{}{}",
            hash.split_at(7).0,
            if dirty { "-dirty" } else { "" }
        ),
        (Some(hash), None) => format!("{}{}", hash.split_at(7).0, "-?"),
        _ => "unknown-git-version".to_string(),
    }
}

fn parse_id(text: &str) -> Result<u64> {
    let id = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => text.parse()?,
    };
    Ok(id)
}

fn object_label(heap: &Heap, instance: &Instance) -> String {
    format!(
        "{}#{} ({:#x})",
        heap.class(instance.class()).name(),
        instance.number(),
        instance.id()
    )
}

fn print_summary(heap: &Heap) {
    let summary = heap.summary();
    println!("format\tid_size\tclasses\tinstances\ttotal_size\tgc_roots");
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        summary.format,
        summary.id_size,
        summary.classes,
        summary.instances,
        summary.total_size,
        summary.gc_roots
    );
}

fn print_classes(heap: &Heap, args: &ClassesArgs) -> Result<()> {
    let classes: Vec<&ClassMetadata> = match &args.pattern {
        Some(pattern) => heap.classes_matching(pattern)?,
        None => heap.all_classes().iter().collect(),
    };
    println!("count\tsize\tclass");
    for class in classes {
        println!(
            "{}\t{}\t{}",
            class.instance_count(),
            class.instances_size(),
            class.name()
        );
    }
    Ok(())
}

fn run_query(heap: Arc<Heap>, args: &QueryArgs) -> Result<()> {
    let engine = OqlEngine::new(heap.clone())?;
    let start = Instant::now();
    let mut results = 0;
    engine.execute_query(&args.query, |value: &Value| {
        println!("{}", value.to_display_string(&heap));
        results += 1;
        if args.limit.map_or(false, |limit| results >= limit) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;
    info!(
        "{} results in {} ms",
        results,
        start.elapsed().as_micros() as f64 / 1000f64
    );
    Ok(())
}

fn print_biggest(heap: &Heap, args: &BiggestArgs) -> Result<()> {
    let start = Instant::now();
    let biggest = heap.biggest_objects_by_retained_size(args.n)?;
    info!(
        "Computed retained sizes in {} ms",
        start.elapsed().as_micros() as f64 / 1000f64
    );
    println!("retained\tshallow\tobject");
    for instance in biggest {
        println!(
            "{}\t{}\t{}",
            heap.retained_size(&instance)?,
            instance.shallow_size(),
            object_label(heap, &instance)
        );
    }
    Ok(())
}

fn print_paths(heap: &Heap, args: &PathsArgs) -> Result<()> {
    let id = parse_id(&args.id)?;
    let target = heap
        .instance_by_id(id)
        .ok_or_else(|| anyhow!("no object with id {:#x}", id))?;
    let chains = heap.rootset_references_to(&target, args.weak)?;
    if chains.is_empty() {
        println!("{} is not reachable from the root set", object_label(heap, &target));
    }
    for chain in chains {
        let objects: Vec<Instance> = chain.iter().collect();
        let root = chain.last();
        let kinds: Vec<String> = heap
            .gc_roots_for(&root)
            .iter()
            .map(|r| r.description().to_string())
            .collect();
        let mut line = format!("[{}] {}", kinds.join(", "), object_label(heap, &root));
        for pair in objects.windows(2).rev() {
            let (to, from) = (&pair[0], &pair[1]);
            match heap.describe_reference(from, to)? {
                Some(how) => line.push_str(&format!(" -({})-> ", how)),
                None => line.push_str(" -> "),
            }
            line.push_str(&object_label(heap, to));
        }
        println!("{}", line);
    }
    Ok(())
}

pub fn main() -> Result<()> {
    env_logger::init();
    println!("heapwalk {}", get_git_info());
    let args = Args::parse();
    let mut options = HeapOptions::default();
    options.field_cache_capacity = args.field_cache_capacity;
    if let Some(path) = &args.excludes {
        options = options.with_excludes(Arc::new(ExcludesFile::new(path)));
    }
    for path in &args.paths {
        let start = Instant::now();
        let heap = Arc::new(Heap::open(path, options.clone())?);
        info!(
            "Indexed {} in {} ms",
            path,
            start.elapsed().as_micros() as f64 / 1000f64
        );
        match &args.command {
            Commands::Summary => print_summary(&heap),
            Commands::Classes(classes) => print_classes(&heap, classes)?,
            Commands::Query(query) => run_query(heap.clone(), query)?,
            Commands::Biggest(biggest) => print_biggest(&heap, biggest)?,
            Commands::Paths(paths) => print_paths(&heap, paths)?,
        }
    }
    Ok(())
}
