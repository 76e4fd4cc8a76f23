mod embed;
mod scrape;
mod summarize;
mod translate;

pub use embed::embed;
pub use scrape::scrape;
pub use summarize::summarize;
pub use translate::{force_translate, translate};
