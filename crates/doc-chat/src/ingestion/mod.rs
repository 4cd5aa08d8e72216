//! Corpus ingestion: PDF parsing, directory loading and chunking

mod chunker;
mod loader;
mod parser;

pub use chunker::TextChunker;
pub use loader::{is_pdf, DocumentLoader, LoadedCorpus, SkippedFile};
pub use parser::{clean_page_text, PdfParser};
