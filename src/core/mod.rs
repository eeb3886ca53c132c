//! Core XML parsing primitives
//!
//! - Scanner: delimiter detection using memchr
//! - Parser: builds nodes into the arena, reports numbered errors
//! - Entities: entity decoding and output escaping with Cow (zero-copy when possible)
//! - Encoding: BOM detection, UTF-16 and ISO-8859-1 conversion

pub mod encoding;
pub mod entities;
pub mod parser;
pub mod scanner;
