pub mod generated_image;
pub mod job;

pub use generated_image::*;
pub use job::*;
