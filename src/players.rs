use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use ultraviolet::{Vec2, Vec3};

use crate::{scene::Mesh, scene::Scene, transform::Transform};

/// Players move on a 2D playfield in screen units, this is its center.
const PLAYFIELD_CENTER: [f32; 2] = [400.0, 300.0];
const PLAYFIELD_TO_WORLD: f32 = 0.01;
const CUBE_SIZE: f32 = 1.0;

pub const LOCAL_PLAYER_MATERIAL: u32 = 0;
pub const REMOTE_PLAYER_MATERIAL: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Default)]
struct RegistryState {
    players: HashMap<u32, PlayerData>,
    changed: bool,
}

/// Player table shared between the network thread and the frame loop.
/// The lock is only held while copying in or out.
#[derive(Clone, Default)]
pub struct PlayerRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A panicked writer leaves a complete map behind, the data stays usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the table with the latest server state.
    pub fn apply_update(&self, players: HashMap<u32, PlayerData>) {
        let mut state = self.lock();
        state.players = players;
        state.changed = true;
    }

    pub fn snapshot(&self) -> HashMap<u32, PlayerData> {
        self.lock().players.clone()
    }

    /// Copies the table and clears the change flag in one step.
    fn poll(&self) -> (HashMap<u32, PlayerData>, bool) {
        let mut state = self.lock();
        let changed = std::mem::take(&mut state.changed);
        (state.players.clone(), changed)
    }
}

/// Where a player cube sits in the world, resting on the ground plane.
pub fn player_world_position(position: Vec2) -> Vec3 {
    let offset = (position - Vec2::from(PLAYFIELD_CENTER)) * PLAYFIELD_TO_WORLD;
    Vec3::new(offset.x, CUBE_SIZE * 0.5, offset.y)
}

fn player_cube(position: Vec2, material_index: u32) -> Mesh {
    let transform = Transform::from_position(player_world_position(position));
    Mesh::cube(CUBE_SIZE, material_index, transform.local_matrix())
}

/// The local player plus the view of everyone else, turned into dynamic meshes.
pub struct World {
    pub local_id: Option<u32>,
    pub local_position: Vec2,
    pub local_velocity: Vec2,
    speed: f32,
    last_position: Option<Vec2>,
    last_player_count: usize,
}

impl World {
    pub fn new(speed: f32) -> Self {
        Self {
            local_id: None,
            local_position: Vec2::from(PLAYFIELD_CENTER),
            local_velocity: Vec2::zero(),
            speed,
            last_position: None,
            last_player_count: 0,
        }
    }

    /// Moves the local player along `direction`, a zero direction stops it.
    pub fn move_local(&mut self, direction: Vec2, delta_seconds: f32) {
        self.local_velocity = if direction.mag_sq() > 0.0 {
            direction.normalized() * self.speed
        } else {
            Vec2::zero()
        };
        self.local_position += self.local_velocity * delta_seconds;
    }

    /// Rebuilds the player cubes when the local player moved, someone joined or left,
    /// or the server sent new positions. Returns whether the scene changed.
    pub fn update(&mut self, scene: &mut Scene, registry: &PlayerRegistry) -> bool {
        let (players, network_changed) = registry.poll();
        let player_count = players.len() + 1;

        let moved = self.last_position != Some(self.local_position);
        if !moved && player_count == self.last_player_count && !network_changed {
            return false;
        }

        scene.dynamic_meshes.clear();
        scene
            .dynamic_meshes
            .push(player_cube(self.local_position, LOCAL_PLAYER_MATERIAL));
        scene.dynamic_meshes.extend(
            players
                .iter()
                .filter(|(id, _)| Some(**id) != self.local_id)
                .map(|(_, player)| player_cube(player.position, REMOTE_PLAYER_MATERIAL)),
        );

        self.last_position = Some(self.local_position);
        self.last_player_count = player_count;
        true
    }
}
