pub const LOG_BYTES_IN_MBYTE: u8 = 20;

pub const HPROF_MAGIC_PREFIX: &[u8] = b"JAVA PROFILE";

/// Object header size as a multiple of the identifier size.
pub const HEADER_WORDS: u64 = 2;
pub const ARRAY_LENGTH_BYTES: u64 = 4;
pub const OBJECT_ALIGNMENT: u64 = 8;

/// Number of decoded field tables kept in the per-heap cache.
pub const DEFAULT_FIELD_CACHE_CAPACITY: usize = 4096;

pub const JAVA_LANG_OBJECT: &str = "java.lang.Object";
pub const JAVA_LANG_STRING: &str = "java.lang.String";
pub const JAVA_LANG_REF_REFERENCE: &str = "java.lang.ref.Reference";
pub const JAVA_LANG_REF_FINALIZER: &str = "java.lang.ref.Finalizer";
pub const REFERENT_FIELD: &str = "referent";

pub const DEFAULT_TOP_COUNT: usize = 10;
