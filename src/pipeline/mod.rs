pub mod import;
pub mod parsers;
pub mod ingest;
pub mod processor;
