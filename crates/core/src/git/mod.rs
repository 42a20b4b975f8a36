//! Git oracle access and output parsing.

pub mod oracle;
pub mod parser;

#[cfg(test)]
pub(crate) mod testing;

pub use oracle::{GitCli, GitOracle, GitOutput, MergeFileOutput};
pub use parser::ReportShape;
