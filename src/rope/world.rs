use super::{
    control::{self, RopeAlignment, RopeControlData},
    pendulum::Pendulum,
    Drive, Rope, RopeParams, ROPE_SEGMENTS,
};
use crate::math::fixed::FixedVec3;

use thunderdome as td;

/// Key type to look up a rope stored in a [`RopeWorld`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RopeKey(pub(crate) td::Index);

impl RopeKey {
    /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RopeError {
    #[error("No rope with key {0:?}")]
    UnknownRope(RopeKey),
    #[error("Rope {0:?} is not active")]
    InactiveRope(RopeKey),
}

/// Decides which ropes get simulated each tick,
/// typically by checking whether the level trigger a rope belongs to is active.
pub trait RopeTriggers {
    fn is_active(&self, rope: RopeKey) -> bool;
}

impl<F> RopeTriggers for F
where
    F: Fn(RopeKey) -> bool,
{
    fn is_active(&self, rope: RopeKey) -> bool {
        self(rope)
    }
}

/// Every rope is simulated all the time.
pub struct AlwaysActive;
impl RopeTriggers for AlwaysActive {
    fn is_active(&self, _: RopeKey) -> bool {
        true
    }
}

/// All the ropes of a level and the state of the player swinging on them.
///
/// There is a single controlled rope at most. Its dynamics are driven by the
/// current pendulum; every other rope sees the alternate one, which stays detached.
#[derive(Clone, Debug, Default)]
pub struct RopeWorld {
    ropes: td::Arena<Rope>,
    current: Pendulum,
    alternate: Pendulum,
    control: Option<RopeControlData>,
}

impl RopeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn insert(&mut self, rope: Rope) -> RopeKey {
        RopeKey(self.ropes.insert(rope))
    }

    /// Create a rope from parameters and add it to the world.
    #[inline]
    pub fn spawn(&mut self, params: RopeParams) -> RopeKey {
        self.insert(Rope::new(params))
    }

    /// Access a rope, if it still exists.
    #[inline]
    pub fn get(&self, key: RopeKey) -> Option<&Rope> {
        self.ropes.get(key.0)
    }

    /// Mutably access a rope, if it still exists.
    #[inline]
    pub fn get_mut(&mut self, key: RopeKey) -> Option<&mut Rope> {
        self.ropes.get_mut(key.0)
    }

    /// Remove a rope, letting go of it first if the player is holding it.
    pub fn remove(&mut self, key: RopeKey) -> Option<Rope> {
        if self.control.map_or(false, |c| c.rope == key) {
            self.control = None;
        }
        if self.current.rope == Some(key) {
            self.current = Pendulum::default();
        }
        self.ropes.remove(key.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RopeKey, &Rope)> {
        self.ropes.iter().map(|(idx, rope)| (RopeKey(idx), rope))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ropes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ropes.is_empty()
    }

    /// The pendulum standing in for the player on the controlled rope.
    #[inline]
    pub fn current_pendulum(&self) -> &Pendulum {
        &self.current
    }

    #[inline]
    pub fn alternate_pendulum(&self) -> &Pendulum {
        &self.alternate
    }

    #[inline]
    pub fn control(&self) -> Option<&RopeControlData> {
        self.control.as_ref()
    }

    #[inline]
    pub fn control_mut(&mut self) -> Option<&mut RopeControlData> {
        self.control.as_mut()
    }

    /// Step every active rope forward by one tick.
    ///
    /// If the player let go of a rope since the last tick,
    /// the rope is released before anything is simulated.
    pub fn tick(&mut self, triggers: &impl RopeTriggers) {
        let _span = tracy_span!("rope tick", "tick");

        for (idx, rope) in self.ropes.iter_mut() {
            rope.active = triggers.is_active(RopeKey(idx));
        }

        if self.current.rope.is_some() && self.current.rope != self.control.map(|c| c.rope) {
            self.detach_current();
        }

        let held = self
            .control
            .filter(|c| self.ropes.get(c.rope.0).map_or(false, |rope| rope.active));
        if let Some(control) = held {
            if let Some(rope) = self.ropes.get_mut(control.rope.0) {
                rope.dynamics(Drive::Held {
                    pendulum: &mut self.current,
                    key: control.rope,
                    node: control.anchor_node(),
                });
            }
        }

        let held_key = held.map(|c| c.rope);
        let alternate = &self.alternate;
        let mut free: Vec<&mut Rope> = self
            .ropes
            .iter_mut()
            .filter(|(idx, rope)| rope.active && held_key != Some(RopeKey(*idx)))
            .map(|(_, rope)| rope)
            .collect();

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            free.par_iter_mut()
                .for_each(|rope| rope.dynamics(Drive::Free { pendulum: alternate }));
        }
        #[cfg(not(feature = "parallel"))]
        for rope in free.iter_mut() {
            rope.dynamics(Drive::Free { pendulum: alternate });
        }
    }

    /// Try to grab a rope with a hand at world position `hand`.
    ///
    /// On a hit the player takes control of the rope at the touched segment
    /// and gets pushed along `heading` with `speed`.
    pub fn try_grab(
        &mut self,
        key: RopeKey,
        hand: FixedVec3,
        radius: i64,
        heading: i16,
        speed: i16,
    ) -> Result<Option<usize>, RopeError> {
        let rope = self.ropes.get(key.0).ok_or(RopeError::UnknownRope(key))?;
        if !rope.active {
            return Err(RopeError::InactiveRope(key));
        }
        let segment = match rope.rope_node_collision(hand, radius) {
            Some(segment) => segment,
            None => return Ok(None),
        };

        if self.current.rope.map_or(false, |attached| attached != key) {
            self.detach_current();
        }
        self.control = Some(RopeControlData {
            rope: key,
            segment,
            heading,
        });
        self.current.velocity = FixedVec3::ZERO;
        control::apply_velocity_to_rope(&mut self.current, heading, speed);
        log::debug!("Grabbed rope {:?} at segment {}", key, segment);
        Ok(Some(segment))
    }

    /// Push the held rope along `heading`.
    pub fn swing(&mut self, heading: i16, speed: i16) {
        if self.control.is_some() {
            control::apply_velocity_to_rope(&mut self.current, heading, speed);
        }
    }

    /// Let go of the controlled rope. It is released on the next tick.
    pub fn release(&mut self) {
        if let Some(control) = self.control.take() {
            log::debug!("Released rope {:?}", control.rope);
        }
    }

    /// Move the hands along the held rope. Returns the new segment.
    pub fn climb(&mut self, delta: i32) -> Option<usize> {
        let control = self.control.as_mut()?;
        let segment = control.segment as i64 + delta as i64;
        control.segment = segment.clamp(0, ROPE_SEGMENTS as i64 - 2) as usize;
        Some(control.segment)
    }

    /// Pose for a body held `offset` units below the hands on the controlled rope.
    pub fn alignment(&self, offset: i64) -> Option<RopeAlignment> {
        let control = self.control?;
        let rope = self.ropes.get(control.rope.0)?;
        Some(control::rope_alignment(rope, &control, offset))
    }

    fn detach_current(&mut self) {
        let Some(attached) = self.current.rope else { return };
        match self.ropes.get_mut(attached.0) {
            Some(rope) => self.current.detach(rope),
            None => self.current = Pendulum::default(),
        }
        log::debug!("Detached from rope {:?}", attached);
    }
}
