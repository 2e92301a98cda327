mod middleware;
mod public;

pub use middleware::RequestContext;
pub use public::{HEADER_ERROR, HEADER_STATUS, HttpState, asset_response, build_router};
