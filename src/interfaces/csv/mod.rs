//! CSV adapters: directory imports in, payment and parent reports out.

pub mod directory_reader;
pub mod report_writer;
