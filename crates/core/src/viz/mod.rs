//! Visualization session bridge.
//!
//! - [`templates`]: the embedded Tcl templates
//! - [`session`]: renders a [`SessionScript`](mdk_protocol::SessionScript)
//! - [`launcher`]: the viewer launcher trait and its VMD implementation

pub mod launcher;
pub mod session;
pub mod templates;

pub use launcher::{VisualizationLauncher, VmdLauncher};
pub use session::build_session;
pub use templates::{get_template, list_templates};
