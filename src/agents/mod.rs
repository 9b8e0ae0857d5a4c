//! Model-facing agents: prompt structuring, stack detection, and recursive
//! task decomposition.

pub mod decomposer;
pub mod structurer;
