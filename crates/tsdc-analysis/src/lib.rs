//! Region-graph construction and structural analysis: turns a `Cfg` from
//! `tsdc-core` into a tree of `VirtualRegion`s ready for AST lifting.

pub mod error;
pub mod region;
pub mod structural;

pub use error::AnalysisError;
pub use region::{
    existing_body_elements, push_flattened, FunctionHeader, RegionGraph, RegionNode, VirtualRegion,
};
pub use structural::analyze;
