mod ids;
mod requests;
mod time_entry;

pub use ids::*;
pub use requests::*;
pub use time_entry::*;
