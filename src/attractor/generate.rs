//! Building attractors out of level geometry.

use super::{Attractor, AttractorError, AttractorType, RoomNumber};
use crate::{collision::Obb, math::Vec3};
use itertools::izip;

/// Height of one step of tilt on a tilted bridge.
pub const CLICK: f64 = 256.0;

/// Floor surface of one square sector of a room.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize)
)]
pub struct SectorSurface {
    pub room: RoomNumber,
    /// Corner with the smallest x and z.
    pub x: f64,
    pub z: f64,
    /// Side length of the sector.
    pub size: f64,
    /// Floor height at each corner, in the order
    /// `(x, z)`, `(x + size, z)`, `(x + size, z + size)`, `(x, z + size)`.
    pub floor_heights: [f64; 4],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize)
)]
pub enum BridgeKind {
    #[default]
    Flat,
    Tilt1,
    Tilt2,
    Tilt3,
    Tilt4,
}

impl BridgeKind {
    /// How many clicks the far end of the bridge rises above the near end.
    pub fn tilt_steps(&self) -> u32 {
        match self {
            BridgeKind::Flat => 0,
            BridgeKind::Tilt1 => 1,
            BridgeKind::Tilt2 => 2,
            BridgeKind::Tilt3 => 3,
            BridgeKind::Tilt4 => 4,
        }
    }
}

/// A bridge item: a walkable box placed in a room.
#[derive(Clone, Copy, Debug)]
pub struct BridgeInfo {
    pub obb: Obb,
    pub kind: BridgeKind,
    pub room: RoomNumber,
}

/// Loop around the edge of a floor sector.
pub fn generate_sector_attractor(surface: &SectorSurface) -> Result<Attractor, AttractorError> {
    let SectorSurface { x, z, size, .. } = *surface;
    let corners = [(x, z), (x + size, z), (x + size, z + size), (x, z + size)];
    let points = izip!(corners, surface.floor_heights)
        .map(|((x, z), y)| Vec3::new(x, y, z))
        .collect();
    Attractor::new(AttractorType::Edge, closed(points), surface.room)
}

/// Loop around the top face of a bridge.
///
/// The top is the local -y face of the box. Tilted bridges rise towards
/// their local +z end by [`CLICK`] per tilt step.
pub fn generate_bridge_attractor(bridge: &BridgeInfo) -> Result<Attractor, AttractorError> {
    let h = bridge.obb.half_extents;
    let rise = bridge.kind.tilt_steps() as f64 * CLICK;
    let corners = [
        Vec3::new(-h.x, -h.y, -h.z),
        Vec3::new(h.x, -h.y, -h.z),
        Vec3::new(h.x, -h.y - rise, h.z),
        Vec3::new(-h.x, -h.y - rise, h.z),
    ];
    let points = corners.iter().map(|&c| bridge.obb.to_world(c)).collect();
    Attractor::new(AttractorType::Edge, closed(points), bridge.room)
}

fn closed(mut points: Vec<Vec3>) -> Vec<Vec3> {
    if let Some(&first) = points.first() {
        points.push(first);
    }
    points
}
