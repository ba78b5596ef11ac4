pub mod pages;
pub mod utils;

pub use pages::PageService;
