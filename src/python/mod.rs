//! Python source handling: parsing, candidate extraction, context assembly,
//! and the text transformations applied to candidates.

pub mod aligner;
pub mod context;
pub mod extractor;
pub mod filter;
pub mod format;
pub mod parser;
pub mod remover;
pub mod text;

pub use aligner::align;
pub use context::{build_context, read_source_lossy, simplify_imports, ContextFile};
pub use extractor::{lookup_function, CodeUnit, FunctionLookup, UnitExtractor, UnitIdentity};
pub use format::Formatter;
pub use parser::{parse_python, PythonModule, UnitKind};
pub use remover::remove_definition;
