//! Results-tree data model for the NAP release verification harness.
//!
//! The result of a verification run is not a free-form map: it is a nested
//! record with fixed keys per subject type. Modelling the tree as tagged
//! records eliminates the "did I spell `runFromBuildOutput` correctly
//! everywhere" class of bug and lets the overall-success predicate be a
//! pure function over the tree.

pub mod phase;
pub mod report;
pub mod subjects;

pub use phase::{Phase, PhaseResult};
pub use report::{Report, RunHeader, REPORT_FILENAME};
pub use subjects::{
    DemoResults, EditorResults, MiscResults, OtherBuildTypeResults, PackagedWithoutEditorResults,
    TemplateAppResults,
};
