//! Fixed-point rope dynamics, a dynamic bounding tree,
//! and attractor proximity queries for context-sensitive interactions.

/// Open a profiling span that lasts until the returned value is dropped.
/// Does nothing unless the `tracy` feature is enabled and a client is running.
macro_rules! tracy_span {
    ($name:expr, $fn_name:expr) => {
        tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), $fn_name, file!(), line!(), 0))
    };
}

pub mod math;
pub use math::{fixed, uv, Angle, Unit, Vec3};
pub use math::fixed::{Fixed, FixedVec3};

pub mod collision;
pub use collision::{
    bvh::{BoundingTree, BoundingTreeError, ObjectId},
    Obb, Overlap, Ray, Sphere, AABB,
};

pub mod rope;
pub use rope::{
    control::{RopeAlignment, RopeControlData},
    pendulum::Pendulum,
    world::{AlwaysActive, RopeError, RopeKey, RopeTriggers, RopeWorld},
    Rope, RopeParams, RopeSegment, ROPE_SEGMENTS,
};

pub mod attractor;
pub use attractor::{
    collision::{AttractorCollision, Proximity},
    generate::{BridgeInfo, BridgeKind, SectorSurface},
    set::{AnyRoom, AttractorKey, AttractorQueryParams, AttractorSet, RoomGraph},
    Attractor, AttractorError, AttractorType, RoomNumber,
};
