//! The rendered scene
//!
//! A handful of named objects sharing one shaded program. The first object
//! is the sculpting plane; its vertex buffer is rewritten in place whenever
//! a brush stroke moves the geometry.

use cgmath::{vec3, vec4, Matrix4, SquareMatrix, Vector3, Vector4};

use crate::config::AppConfig;
use crate::error::{GfxError, GfxResult};
use crate::gfx::device::{BufferUsage, SharedDevice};
use crate::gfx::geometry::{interleave, make_cube, make_mesh_from_geometry, make_plane, Geometry};
use crate::gfx::mesh::Mesh;
use crate::gfx::rendering::shaders::{SCENE_FRAGMENT, SCENE_VERTEX};
use crate::gfx::shader::ShaderProgram;
use crate::gfx::texture::{Texture2D, TextureSetup};

/// Edge length in pixels of the default checker texture
const CHECKER_SIZE: u32 = 64;
const CHECKER_CELLS: u32 = 8;

pub struct SceneObject {
    pub name: String,
    pub geometry: Geometry,
    pub mesh: Mesh,
    pub model: Matrix4<f32>,
    pub color: Vector4<f32>,
    /// Drawn with the scene texture when unset
    pub texture: Option<Texture2D>,
    pub visible: bool,
}

impl SceneObject {
    pub fn new(
        device: &SharedDevice,
        name: &str,
        geometry: Geometry,
        usage: BufferUsage,
    ) -> GfxResult<Self> {
        let mesh = make_mesh_from_geometry(device, &geometry, usage)?;
        Ok(Self {
            name: name.to_owned(),
            geometry,
            mesh,
            model: Matrix4::identity(),
            color: vec4(1.0, 1.0, 1.0, 1.0),
            texture: None,
            visible: true,
        })
    }

    /// Uploads `geometry` again after its vertices were moved. The channel
    /// layout must not have changed since the mesh was built.
    pub fn refresh(&mut self) -> GfxResult<()> {
        let data = interleave(&self.geometry);
        self.mesh.update_vertex_data(0, bytemuck::cast_slice(&data))
    }
}

/// RGBA8 checkerboard with `cells` squares per side
pub fn checker_pixels(size: u32, cells: u32) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let shade = if (x / cell + y / cell) % 2 == 0 { 235 } else { 190 };
            pixels.extend_from_slice(&[shade, shade, shade, 255]);
        }
    }
    pixels
}

fn sculpt_plane(config: &AppConfig) -> Geometry {
    make_plane(
        config.plane_size,
        config.plane_size,
        config.plane_divisions,
        config.plane_divisions,
    )
}

pub struct Scene {
    program: ShaderProgram,
    texture: Texture2D,
    pub objects: Vec<SceneObject>,
    pub light_dir: Vector3<f32>,
}

impl Scene {
    pub fn new(device: &SharedDevice, config: &AppConfig) -> GfxResult<Self> {
        let program = ShaderProgram::new(device, SCENE_VERTEX, SCENE_FRAGMENT)?;

        let mut texture = Texture2D::new(device);
        let pixels = checker_pixels(CHECKER_SIZE, CHECKER_CELLS);
        texture.setup(&TextureSetup::rgba8(CHECKER_SIZE, CHECKER_SIZE, Some(&pixels)).with_mipmaps(true))?;

        let mut sculpt =
            SceneObject::new(device, "Sculpt Plane", sculpt_plane(config), BufferUsage::Dynamic)?;
        sculpt.color = vec4(0.85, 0.9, 1.0, 1.0);

        let mut cube = SceneObject::new(device, "Reference Cube", make_cube(), BufferUsage::Static)?;
        cube.model = Matrix4::from_translation(vec3(config.plane_size * 0.5 + 1.0, 0.5, -1.0))
            * Matrix4::from_scale(0.5);
        cube.color = vec4(1.0, 0.55, 0.45, 1.0);

        log::info!(
            "scene ready: {} sculpt vertices",
            sculpt.geometry.vertex_count()
        );

        Ok(Self {
            program,
            texture,
            objects: vec![sculpt, cube],
            light_dir: vec3(0.3, 1.0, 0.6),
        })
    }

    /// Replaces the texture every object is drawn with
    pub fn set_texture(&mut self, texture: Texture2D) {
        self.texture = texture;
    }

    pub fn texture(&self) -> &Texture2D {
        &self.texture
    }

    pub fn sculpt_target(&self) -> Option<&SceneObject> {
        self.objects.first()
    }

    pub fn sculpt_target_mut(&mut self) -> Option<&mut SceneObject> {
        self.objects.first_mut()
    }

    /// Puts the sculpted plane back to its flat starting shape
    pub fn reset_sculpt_target(&mut self, config: &AppConfig) -> GfxResult<()> {
        let Some(target) = self.objects.first_mut() else {
            return Ok(());
        };
        let flat = sculpt_plane(config);
        if flat.vertex_count() != target.geometry.vertex_count() {
            return Err(GfxError::InvalidGeometry(format!(
                "sculpt plane has {} vertices, config describes {}",
                target.geometry.vertex_count(),
                flat.vertex_count()
            )));
        }
        target.geometry = flat;
        target.refresh()
    }

    pub fn add_object(&mut self, object: SceneObject) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn get_object_names(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.name.clone()).collect()
    }

    /// Issues one draw per visible object into the bound framebuffer
    pub fn draw(&self, view_proj: Matrix4<f32>) -> GfxResult<()> {
        self.program.bind();
        self.program.uniform("u_view_proj", view_proj);
        self.program.uniform("u_light_dir", self.light_dir);

        for object in self.objects.iter().filter(|o| o.visible) {
            let texture = object.texture.as_ref().unwrap_or(&self.texture);
            self.program.texture("u_texture", texture)?;
            self.program.uniform("u_model", object.model);
            self.program.uniform("u_color", object.color);
            object.mesh.draw_elements(0)?;
        }

        self.program.unbind();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::recording::{DeviceCall, RecordingDevice};
    use crate::gfx::device::DrawKind;

    fn small_config() -> AppConfig {
        AppConfig::default().with_plane(2.0, 2)
    }

    #[test]
    fn test_checker_alternates() {
        let pixels = checker_pixels(4, 2);
        assert_eq!(pixels.len(), 64);
        assert_eq!(pixels[0], 235);
        // Third pixel of the first row is in the second cell
        assert_eq!(pixels[8], 190);
        assert_eq!(pixels[3], 255);
    }

    #[test]
    fn test_draw_issues_one_call_per_visible_object() {
        let (recorder, device) = RecordingDevice::shared();
        let mut scene = Scene::new(&device, &small_config()).unwrap();
        scene.draw(Matrix4::identity()).unwrap();

        let draws = recorder.draws();
        assert_eq!(draws.len(), 2);
        assert!(matches!(draws[0].kind, DrawKind::Indexed { count: 24, .. }));
        assert!(matches!(draws[1].kind, DrawKind::Indexed { count: 36, .. }));

        scene.objects[1].visible = false;
        scene.draw(Matrix4::identity()).unwrap();
        assert_eq!(recorder.draws().len(), 3);
    }

    #[test]
    fn test_model_uniform_is_set_before_each_draw() {
        let (recorder, device) = RecordingDevice::shared();
        let scene = Scene::new(&device, &small_config()).unwrap();
        scene.draw(Matrix4::identity()).unwrap();

        let calls = recorder.calls();
        let first_draw = calls
            .iter()
            .position(|c| matches!(c, DeviceCall::Draw(_)))
            .unwrap();
        let uniforms_before = calls[..first_draw]
            .iter()
            .filter(|c| matches!(c, DeviceCall::Uniform { len: 64, .. }))
            .count();
        // view-projection and model
        assert_eq!(uniforms_before, 2);
    }

    #[test]
    fn test_refresh_rewrites_the_whole_vertex_buffer() {
        let (recorder, device) = RecordingDevice::shared();
        let mut scene = Scene::new(&device, &small_config()).unwrap();
        let target = scene.sculpt_target_mut().unwrap();
        target.geometry.vertices[0].z = 0.5;
        target.refresh().unwrap();

        // 16 vertices of position + uv
        assert_eq!(
            recorder.count(|c| matches!(c, DeviceCall::BufferSubData { offset: 0, len: 320, .. })),
            1
        );
    }

    #[test]
    fn test_reset_restores_flat_plane() {
        let (_recorder, device) = RecordingDevice::shared();
        let config = small_config();
        let mut scene = Scene::new(&device, &config).unwrap();
        scene.sculpt_target_mut().unwrap().geometry.vertices[3].z = 1.0;

        scene.reset_sculpt_target(&config).unwrap();
        let target = scene.sculpt_target().unwrap();
        assert!(target.geometry.vertices.iter().all(|v| v.z == 0.0));

        let other = AppConfig::default().with_plane(2.0, 3);
        assert!(scene.reset_sculpt_target(&other).is_err());
    }

    #[test]
    fn test_object_texture_overrides_scene_texture() {
        let (recorder, device) = RecordingDevice::shared();
        let mut scene = Scene::new(&device, &small_config()).unwrap();
        let mut own = Texture2D::new(&device);
        own.setup(&TextureSetup::rgba8(2, 2, Some(&[255; 16]))).unwrap();
        let own_handle = own.handle().unwrap();
        scene.objects[1].texture = Some(own);

        scene.draw(Matrix4::identity()).unwrap();
        let bound: Vec<_> = recorder
            .calls()
            .iter()
            .filter_map(|c| match c {
                DeviceCall::BindTexture { texture, .. } => Some(*texture),
                _ => None,
            })
            .collect();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0], scene.texture().handle().unwrap());
        assert_eq!(bound[1], own_handle);
    }
}
