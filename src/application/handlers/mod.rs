pub mod generate_image;

pub use generate_image::{GenerateImageHandler, GenerateImagePayload, MarkImageFailedListener};
