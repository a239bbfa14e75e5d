pub mod image_tag;
pub mod message;
pub mod send;

pub use image_tag::ImageSize;
pub use image_tag::ImageTagRecord;
pub use message::Message;
