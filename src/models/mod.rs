pub mod condition;
pub mod duration;
pub mod image;
pub mod policy;
pub mod repository;

pub use condition::{Condition, READY, find_condition, reasons, set_condition};
pub use duration::parse_duration;
pub use image::ImageLocation;
pub use policy::*;
pub use repository::*;
