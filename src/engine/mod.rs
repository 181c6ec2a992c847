//! Core engine: findata assembly, expense tabulation and the run pipeline.

pub mod expenses;
pub mod findata;
pub mod runner;
