mod crm;
mod result;
mod routing;

pub use crm::*;
pub use result::*;
pub use routing::*;
