#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::manual_range_contains,
         clippy::collapsible_else_if, clippy::float_cmp, clippy::new_without_default)]
// Fixed-function BSP world renderer: visibility, lightmaps, batching and the surface passes

pub mod qgl;
pub mod gl1_model_types;
pub mod gl1_local;
pub mod gl1_buffer;
pub mod gl1_light;
pub mod gl1_lightmap;
pub mod gl1_warp;
pub mod gl1_rsurf;
pub mod gl1_rmain;

pub use gl1_local::{Gl1Config, Gl1Renderer, GlCaps, RefDef, RefEntity, RefError};
pub use gl1_model_types::Model;
pub use qgl::QGl;
