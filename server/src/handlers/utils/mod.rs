pub mod deliver_page;
pub mod headers;
pub mod json_response;

pub use deliver_page::{
    CacheStrategy, deliver_html_page, deliver_page_with_status, deliver_redirect_with_cookie,
    empty, expand_tilde, full, get_mime_type,
};

pub use headers::{add_cache_headers_with_max_age, add_no_cache_headers, get_cookie};

pub use json_response::{
    ErrorResponse, deliver_error_json, deliver_serialized_json, internal_error,
};
