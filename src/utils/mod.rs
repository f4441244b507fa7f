//! Utility helpers: handles and arenas, dense linear algebra, spatial vectors,
//! math extensions and logging helpers.

pub mod allocator;
pub mod linalg;
pub mod logging;
pub mod math;
pub mod spatial;

pub use allocator::{Arena, GenerationalId, Handle};
pub use linalg::{MatrixN, VectorN};
pub use logging::{ScopedTimer, WarnOnce};
pub use math::*;
pub use spatial::SpatialVec;
