pub mod coalesce;
pub mod dispatch;
pub mod source;

pub use self::coalesce::*;
pub use self::dispatch::*;
pub use self::source::*;
