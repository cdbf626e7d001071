//! 值、字节码与进程的二进制存取。

pub mod charset;
pub mod context;
pub mod object_file;
pub mod real;
pub mod save_visitor;
pub mod tag;
pub mod value_loader;

pub use charset::{Charset, CodepageCharset, Utf8Charset};
pub use context::{LoadContext, NullLoadContext, NullSaveContext, SaveContext};
pub use object_file::{LoadReport, LoadedObjects, ObjectFile, ObjectReader, ObjectWriter, RecordKind, SkippedRecord};
pub use real::{decode_real, encode_real};
pub use save_visitor::SaveVisitor;
pub use tag::TagNode;
pub use value_loader::ValueLoader;
