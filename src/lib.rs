pub mod camera;
pub mod config_loader;
pub mod players;
pub mod render;
pub mod scene;
pub mod scene_uploader;
pub mod shader_loader;
pub mod texture_cache;
pub mod time;
pub mod transform;
pub mod utility;
pub mod vulkan;
