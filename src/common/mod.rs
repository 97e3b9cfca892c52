pub mod banner;
pub mod logger;
pub mod target;
pub mod utils;
