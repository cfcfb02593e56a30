//! PPTX (Office Open XML) picture extractor for background image cataloguing.
//!
//! Reads .pptx files, which are ZIP archives of XML parts plus media, and
//! yields the embedded pictures that are large enough to be slide backgrounds.

pub mod parser;

pub use parser::PptxExtractor;
