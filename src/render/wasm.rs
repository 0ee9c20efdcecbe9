use std::collections::HashMap;

use anyhow::{anyhow, Result};
use glam::{Vec3, Vec4Swizzles};
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crate::primitives::TriangleMesh;

use super::common::{primitive_key, CameraParams, DrawItem, LightParams, BACKGROUND};

const AMBIENT: f32 = 0.25;

/// Renderer backed by a 2D canvas for WebAssembly builds.
///
/// Triangles are projected on the CPU and painted back to front.
pub struct Renderer {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    size: (u32, u32),
    camera: Option<CameraParams>,
    light: Option<LightParams>,
    meshes: HashMap<[u32; 4], TriangleMesh>,
}

struct Triangle {
    depth: f32,
    points: [(f64, f64); 3],
    fill: String,
}

impl Renderer {
    /// Creates a renderer that draws into the provided HTML canvas element.
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        let context = canvas
            .get_context("2d")
            .map_err(|err| anyhow!("failed to query canvas context: {err:?}"))?
            .ok_or_else(|| anyhow!("canvas does not support 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| anyhow!("failed to cast canvas context"))?;

        let size = (canvas.width(), canvas.height());
        Ok(Self {
            canvas,
            context,
            size,
            camera: None,
            light: None,
            meshes: HashMap::new(),
        })
    }

    /// Updates the canvas dimensions to match the browser layout.
    pub fn resize(&mut self, new_size: (u32, u32)) {
        if new_size.0 == 0 || new_size.1 == 0 {
            return;
        }
        self.size = new_size;
        self.canvas.set_width(new_size.0);
        self.canvas.set_height(new_size.1);
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn aspect(&self) -> f32 {
        self.size.0 as f32 / self.size.1.max(1) as f32
    }

    pub fn update_globals(&mut self, camera: &CameraParams, light: &LightParams) {
        self.camera = Some(camera.clone());
        self.light = Some(light.clone());
    }

    pub fn render(&mut self, items: &[DrawItem]) -> Result<(), wasm_bindgen::JsValue> {
        self.clear_background();
        let (Some(camera), Some(light)) = (self.camera.clone(), self.light.clone()) else {
            return Ok(());
        };

        let mut triangles = Vec::new();
        for item in items {
            let mesh = self
                .meshes
                .entry(primitive_key(item.primitive))
                .or_insert_with(|| TriangleMesh::for_primitive(item.primitive));
            project_item(mesh, item, &camera, &light, self.size, &mut triangles);
        }
        triangles.sort_by(|a, b| b.depth.total_cmp(&a.depth));

        for triangle in &triangles {
            let [a, b, c] = triangle.points;
            self.context.set_fill_style(&triangle.fill.as_str().into());
            self.context.begin_path();
            self.context.move_to(a.0, a.1);
            self.context.line_to(b.0, b.1);
            self.context.line_to(c.0, c.1);
            self.context.close_path();
            self.context.fill();
        }
        Ok(())
    }

    fn clear_background(&self) {
        self.context.set_fill_style(&rgba(BACKGROUND, 1.0).as_str().into());
        self.context
            .fill_rect(0.0, 0.0, self.size.0 as f64, self.size.1 as f64);
    }
}

fn project_item(
    mesh: &TriangleMesh,
    item: &DrawItem,
    camera: &CameraParams,
    light: &LightParams,
    size: (u32, u32),
    out: &mut Vec<Triangle>,
) {
    let clip = camera.view_proj * item.model;
    let (width, height) = (size.0 as f64, size.1 as f64);
    for corners in mesh.indices.chunks_exact(3) {
        let mut points = [(0.0, 0.0); 3];
        let mut depth = 0.0;
        let mut visible = true;
        for (slot, &index) in points.iter_mut().zip(corners) {
            let projected = clip * mesh.position(index as usize).extend(1.0);
            if projected.w <= 1e-4 {
                visible = false;
                break;
            }
            let ndc = projected.xyz() / projected.w;
            *slot = (
                (ndc.x as f64 + 1.0) * 0.5 * width,
                (1.0 - ndc.y as f64) * 0.5 * height,
            );
            depth += ndc.z;
        }
        if !visible {
            continue;
        }

        let world = |i: u32| item.model.transform_point3(mesh.position(i as usize));
        let (a, b, c) = (world(corners[0]), world(corners[1]), world(corners[2]));
        let normal = (b - a).cross(c - a).normalize_or_zero();
        let to_light = (light.position - (a + b + c) / 3.0).normalize_or_zero();
        let shade = AMBIENT + normal.dot(to_light).abs() * light.intensity;
        let color = (item.color.xyz() * light.color * shade).min(Vec3::ONE);
        out.push(Triangle {
            depth: depth / 3.0,
            points,
            fill: rgba(color, item.color.w),
        });
    }
}

fn rgba(color: Vec3, alpha: f32) -> String {
    let [r, g, b] = (color * 255.0).to_array().map(|c| c.round() as u8);
    format!("rgba({r}, {g}, {b}, {alpha:.3})")
}
