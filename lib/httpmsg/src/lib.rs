//! HTTP/1.0 message model shared by the caching proxy and any future
//! client: header list, status codes, date parsing, and the `Message`
//! parser/serializer.

pub mod dates;
pub mod headers;
pub mod message;
pub mod status;

pub use dates::{format_rfc1123, parse_http_date};
pub use headers::{HeaderList, RawHeader};
pub use message::{FirstLine, HttpError, Message, Method, RequestLine, StatusLine, Version};
pub use status::StatusCode;
