use std::time::Duration;
use glam::{Mat4, Quat, Vec3};
use crate::renderer::camera::Camera;
use crate::renderer::core::Extent;
use crate::renderer::shader_data::PerObjectData;

/// Counters exposed for diagnostics
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_rendered: u64,
    /// Fence value the last frame signaled and waited for
    pub last_fence_value: u64,
}

/// Placement and spin of one drawn object
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ObjectTransform {
    pub translation: Vec3,
    pub spin_axis: Vec3,
    /// Radians per second
    pub spin_speed: f32,
}

impl ObjectTransform {
    pub fn model_at(&self, elapsed: Duration) -> Mat4 {
        let angle = self.spin_speed * elapsed.as_secs_f32();
        Mat4::from_rotation_translation(Quat::from_axis_angle(self.spin_axis, angle), self.translation)
    }
}

/// Responsibilities:
/// - Own the per-object transforms and the camera
/// - Produce each object's constants for a point in time
/// - Count rendered frames
pub struct RenderFrameContext {
    transforms: Vec<ObjectTransform>,
    camera: Camera,
    pub stats: FrameStats,
}

impl RenderFrameContext {
    const OBJECT_SPACING: f32 = 1.5;

    pub fn new(object_count: u32) -> Self {
        let transforms = (0..object_count)
            .map(|index| {
                let offset = index as f32 - (object_count as f32 - 1.0) / 2.0;
                let direction = if index % 2 == 0 { 1.0 } else { -1.0 };
                ObjectTransform {
                    translation: Vec3::new(offset * Self::OBJECT_SPACING, 0.0, 0.0),
                    spin_axis: Vec3::new(0.5 * direction, 1.0, 0.25).normalize(),
                    spin_speed: 1.0 + 0.25 * index as f32,
                }
            })
            .collect::<Vec<_>>();

        // Pull the camera back far enough to frame the whole row
        let row_width = object_count.saturating_sub(1) as f32 * Self::OBJECT_SPACING;
        let mut camera = Camera::new();
        camera.set_position(Vec3::new(0.0, 1.5, 3.0 + row_width));
        camera.look_at(Vec3::ZERO);

        Self {
            transforms,
            camera,
            stats: FrameStats::default(),
        }
    }

    pub fn transforms(&self) -> &[ObjectTransform] {
        &self.transforms
    }

    pub fn object_count(&self) -> u32 {
        self.transforms.len() as u32
    }

    /// Model, view and projection of every object at `elapsed`
    pub fn object_constants(&self, elapsed: Duration, extent: Extent) -> Vec<PerObjectData> {
        let view = self.camera.get_view_mat();
        let projection = self.camera.get_proj_mat(extent.aspect_ratio());
        self.transforms
            .iter()
            .map(|transform| PerObjectData {
                model: transform.model_at(elapsed),
                view,
                projection,
            })
            .collect()
    }
}
