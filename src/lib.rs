pub mod config;
pub mod depth;
pub mod error;
pub mod geometry;
pub mod io;
pub mod refine;
pub mod sensors;
pub mod system;
pub mod tracking;
pub mod transform;
