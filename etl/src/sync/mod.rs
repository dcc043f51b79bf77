//! Stages turning source changes into merged documents.
//!
//! A page flows through [`detector::ChangeDetector`], [`resolver::RootResolver`] and
//! [`assembler::DocumentAssembler`] in that order. None of the stages touch the cursor;
//! committing progress is left to the pipeline once the destination confirmed the write.

pub mod assembler;
pub mod detector;
pub mod resolver;
