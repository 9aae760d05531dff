//! Renderer-agnostic runtime for Spine-style skeletal 2D animation data.
//!
//! Parses texture atlas descriptors and skeleton JSON documents, composes
//! bone world transforms, applies skins, and produces a [`DrawList`] an
//! external renderer can consume. Rendering itself is out of scope.

#![forbid(unsafe_code)]

mod atlas;
mod error;
mod model;
mod render;
mod runtime;

#[cfg(feature = "json")]
pub mod json;

pub use atlas::*;
pub use error::*;
pub use model::*;
pub use render::*;
pub use runtime::*;


#[cfg(test)]
mod render_tests;
