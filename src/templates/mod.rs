//! Template rendering: turn a host's facts into device configuration text.
//!
//! A [`Template`] is an ordered list of [`Section`]s. Each section declares
//! the facts it needs up front; the pipeline binds them, runs the section
//! body against a fresh [`ConfigWriter`] and joins the non-empty outputs in
//! declared order. Templates are looked up by OS name in a
//! [`TemplateRegistry`] whose loaders receive the rendering host's facts,
//! which lets a template include sections conditionally.

mod registry;
mod render;
mod section;

pub use registry::{Template, TemplateLoader, TemplateRegistry};
pub use render::{RenderReport, render_host, render_hosts};
pub use section::{ConfigWriter, Section, SectionArgs, SectionError};
