//! Import path rewriting
//!
//! Installed source still imports the library by its npm name. These
//! rewrites point those imports at wherever the project placed the code.

mod imports;
mod mappings;
mod scanner;

pub use imports::{
    has_greater_imports, transform_imports, transform_imports_with, FileKind, Rewrite, TransformOutput,
};
pub use mappings::{
    build_path_mappings, is_library_specifier, transform_path, PathMapping, CORE_PACKAGE, CORE_SUBPATHS, HEADLESS_PRIMITIVES,
    SHARED_MODULES,
};
pub use scanner::{sanitize, ScanMode};
