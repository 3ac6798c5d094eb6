use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// File listing fields (`pkg.Class.field`, one per line) to ignore when
    /// searching for paths from the root set
    #[arg(short, long)]
    pub excludes: Option<String>,

    #[arg(long, default_value_t = heapwalk::heap::HeapOptions::default().field_cache_capacity)]
    pub field_cache_capacity: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Parser, Debug, Clone)]
pub struct ClassesArgs {
    /// Regular expression matched against dotted class names
    #[arg(short, long)]
    pub pattern: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct QueryArgs {
    pub query: String,
    /// Stop after this many results
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct BiggestArgs {
    #[arg(short, default_value_t = 10)]
    pub n: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct PathsArgs {
    /// Object id, decimal or `0x`-prefixed hex
    pub id: String,
    #[arg(short, long, default_value_t = false)]
    pub weak: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Summary,
    Classes(ClassesArgs),
    Query(QueryArgs),
    Biggest(BiggestArgs),
    Paths(PathsArgs),
}
