pub mod normalize;
pub mod sreality;
pub mod traits;
pub mod types;

pub use normalize::normalize;
pub use sreality::SrealityClient;
pub use traits::CatalogSource;
pub use types::{PageResult, PaginationPolicy, RawListing, RawRecord};
