pub mod format;
pub mod html;
pub mod media;
pub mod response;

pub use html::{BasicHtmlRenderer, HtmlRenderer};
pub use media::{negotiate, parse_accept_header, MediaType, Resource, Version};
pub use response::Representation;
