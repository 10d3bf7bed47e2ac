pub mod artifact;
pub mod dot;
pub mod invocation;
pub mod palette;
pub mod pipeline;
pub mod render;
pub mod viewer;

pub use artifact::{file_url, write_artifact, ArtifactTarget};
pub use dot::{AttrValue, Attributes, DotEdge, DotGraph, DotNode, Subgraph};
pub use invocation::{DanglingGrant, InvocationEdge, InvocationGraph};
pub use palette::{color_for, COLORS};
pub use pipeline::{Pipeline, PipelineOptions, RunSummary};
pub use render::{GraphvizRenderer, OutputFormat, Renderer};
pub use viewer::{launch_command, SystemViewer, Viewer};
