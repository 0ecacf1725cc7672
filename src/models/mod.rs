pub mod enums;
pub mod patient;
pub mod implanted;
pub mod report;
pub mod arrhythmia;

pub use patient::*;
pub use implanted::*;
pub use report::*;
pub use arrhythmia::*;
