//! Storage for the attractors of a level, with a bounding tree over them
//! for finding the ones near a point.

use super::{
    collision::AttractorCollision,
    generate::{self, BridgeInfo, SectorSurface},
    Attractor, AttractorError, RoomNumber,
};
use crate::{
    collision::{
        bvh::{BoundingTree, ObjectId},
        Sphere,
    },
    math::{Angle, Unit, Vec3},
};

use std::collections::HashMap;
use thunderdome as td;

/// Key type to look up an attractor stored in an [`AttractorSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttractorKey(pub(crate) td::Index);

impl AttractorKey {
    /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

/// Which rooms can see into which.
/// Attractor queries only consider attractors in rooms near the query's room.
pub trait RoomGraph {
    fn is_nearby(&self, room: RoomNumber, other: RoomNumber) -> bool;
}

/// Maps each room to its direct neighbors. A room is always near itself.
impl RoomGraph for HashMap<RoomNumber, Vec<RoomNumber>> {
    fn is_nearby(&self, room: RoomNumber, other: RoomNumber) -> bool {
        room == other
            || self
                .get(&room)
                .map_or(false, |neighbors| neighbors.contains(&other))
    }
}

/// Every room is near every other.
pub struct AnyRoom;
impl RoomGraph for AnyRoom {
    fn is_nearby(&self, _: RoomNumber, _: RoomNumber) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize),
    serde(default)
)]
pub struct AttractorQueryParams {
    /// Padding added around attractors in the bounding tree.
    pub tree_boundary: f64,
    /// Most collisions returned from one query.
    pub max_collisions: usize,
}

impl Default for AttractorQueryParams {
    fn default() -> Self {
        Self {
            tree_boundary: 64.0,
            max_collisions: 64,
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    attractor: Attractor,
    object_id: ObjectId,
}

#[derive(Clone, Debug, Default)]
pub struct AttractorSet {
    attractors: td::Arena<Entry>,
    tree: BoundingTree,
    keys: HashMap<ObjectId, AttractorKey>,
    next_object_id: ObjectId,
    params: AttractorQueryParams,
}

impl AttractorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: AttractorQueryParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    #[inline]
    pub fn params(&self) -> &AttractorQueryParams {
        &self.params
    }

    pub fn insert(&mut self, attractor: Attractor) -> Result<AttractorKey, AttractorError> {
        let object_id = self.next_object_id;
        self.tree
            .insert(object_id, attractor.aabb(), self.params.tree_boundary)?;
        self.next_object_id = self.next_object_id.wrapping_add(1);

        let key = AttractorKey(self.attractors.insert(Entry {
            attractor,
            object_id,
        }));
        self.keys.insert(object_id, key);
        Ok(key)
    }

    /// Generate and insert the outline of a floor sector.
    pub fn add_sector(&mut self, surface: &SectorSurface) -> Result<AttractorKey, AttractorError> {
        self.insert(generate::generate_sector_attractor(surface)?)
    }

    /// Generate and insert the outline of a bridge's top face.
    pub fn add_bridge(&mut self, bridge: &BridgeInfo) -> Result<AttractorKey, AttractorError> {
        self.insert(generate::generate_bridge_attractor(bridge)?)
    }

    pub fn remove(&mut self, key: AttractorKey) -> Option<Attractor> {
        let entry = self.attractors.remove(key.0)?;
        self.keys.remove(&entry.object_id);
        if let Err(err) = self.tree.remove(entry.object_id) {
            log::warn!("Removed attractor {:?} was missing from the tree: {}", key, err);
        }
        Some(entry.attractor)
    }

    /// Regenerate an attractor from new points and move it in the tree.
    /// On error the attractor is left as it was.
    pub fn update(
        &mut self,
        key: AttractorKey,
        points: Vec<Vec3>,
        room: RoomNumber,
    ) -> Result<(), AttractorError> {
        let entry = self
            .attractors
            .get_mut(key.0)
            .ok_or(AttractorError::UnknownAttractor(key))?;
        entry.attractor.update(points, room)?;
        self.tree.move_object(
            entry.object_id,
            entry.attractor.aabb(),
            self.params.tree_boundary,
        )?;
        Ok(())
    }

    #[inline]
    pub fn get(&self, key: AttractorKey) -> Option<&Attractor> {
        self.attractors.get(key.0).map(|entry| &entry.attractor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttractorKey, &Attractor)> {
        self.attractors
            .iter()
            .map(|(idx, entry)| (AttractorKey(idx), &entry.attractor))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.attractors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attractors.is_empty()
    }

    pub fn clear(&mut self) {
        self.attractors.clear();
        self.tree.clear();
        self.keys.clear();
    }

    /// The bounding tree over all stored attractors, for broad-phase queries.
    #[inline]
    pub fn tree(&self) -> &BoundingTree {
        &self.tree
    }

    /// Find every attractor segment within `detect_radius` of `pos`
    /// in `room` or a room near it.
    ///
    /// Collisions are sorted by distance perpendicular to `axis` first
    /// and 3D distance second, and there are at most
    /// [`max_collisions`][AttractorQueryParams::max_collisions] of them.
    pub fn get_attractor_collisions(
        &self,
        rooms: &impl RoomGraph,
        pos: Vec3,
        room: RoomNumber,
        heading: Angle,
        detect_radius: f64,
        axis: Unit<Vec3>,
    ) -> Vec<AttractorCollision> {
        let _span = tracy_span!("attractor collisions", "get_attractor_collisions");

        let sphere = Sphere::new(pos, detect_radius);
        let mut collisions: Vec<AttractorCollision> = self
            .tree
            .query(&sphere)
            .filter_map(|object_id| self.keys.get(&object_id).copied())
            .filter_map(|key| Some((key, &self.attractors.get(key.0)?.attractor)))
            .filter(|(_, attractor)| rooms.is_nearby(room, attractor.room()))
            .flat_map(|(key, attractor)| {
                (0..attractor.segment_count()).map(move |segment_id| AttractorCollision {
                    attractor: Some(key),
                    ..attractor.collision(segment_id, pos, heading, axis)
                })
            })
            .filter(|coll| coll.proximity.distance_3d <= detect_radius)
            .collect();

        collisions.sort_by(|a, b| {
            let (a, b) = (&a.proximity, &b.proximity);
            a.distance_2d
                .total_cmp(&b.distance_2d)
                .then(a.distance_3d.total_cmp(&b.distance_3d))
        });
        collisions.truncate(self.params.max_collisions);
        collisions
    }
}
