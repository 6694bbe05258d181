//! Error type for the structural analyzer.

use thiserror::Error;

/// Fatal errors produced while collapsing a CFG into a region tree. Both
/// variants originate from conditions the core crate already names --
/// a node with more than two successors, or a cyclic block that does not
/// end in a branch -- so they are carried through rather than duplicated.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Core(#[from] tsdc_core::CoreError),
}
