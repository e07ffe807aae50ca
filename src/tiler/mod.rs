pub mod clip;
pub mod convert;
pub mod index;
pub mod simplify;
pub mod tile;
pub mod types;

pub use self::clip::*;
pub use self::convert::*;
pub use self::index::*;
pub use self::simplify::*;
pub use self::tile::*;
pub use self::types::*;
