pub mod kdbush;
pub mod supercluster;

pub use self::kdbush::*;
pub use self::supercluster::*;
