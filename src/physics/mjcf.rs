//! Compiles MJCF text into [`Model`] tables.
//!
//! Covers the subset of the format the built-in engine can drive: default
//! classes, materials, the body tree with joints, geoms, sites and lights,
//! spatial tendons routed through sites, joint actuators and keyframes.
//! Unknown elements and attributes are skipped.

use std::collections::HashMap;
use std::f64::consts::PI;

use glam::{DMat3, DQuat, DVec3};
use log::debug;
use roxmltree::{Document, Node};

use super::{GeomType, JointType, Model};
use crate::error::ModelError;

const DEFAULT_TIMESTEP: f64 = 0.002;
const DEFAULT_DENSITY: f64 = 1000.0;
const DEFAULT_TENDON_WIDTH: f64 = 0.003;
const DEFAULT_GEOM_RGBA: [f32; 4] = [0.5, 0.5, 0.5, 1.0];
const ROOT_CLASS: &str = "main";

/// Parses an MJCF document and compiles it into model tables.
pub fn compile(xml: &str) -> Result<Model, ModelError> {
    let document = Document::parse(xml)?;
    let root = document.root_element();
    if !root.has_tag_name("mujoco") {
        return Err(ModelError::MissingElement("mujoco"));
    }

    let mut compiler = ModelCompiler::new(root.attribute("model").unwrap_or_default());
    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "compiler" => compiler.settings.read(&Element::plain(child))?,
            "option" => {
                compiler.model.timestep =
                    Element::plain(child).float("timestep", DEFAULT_TIMESTEP)?;
            }
            "default" => compiler.read_default(child, None),
            _ => {}
        }
    }
    for child in root.children().filter(Node::is_element) {
        if child.has_tag_name("asset") {
            compiler.read_assets(child)?;
        }
    }

    compiler.add_world_body();
    let worldbody = root
        .children()
        .find(|child| child.has_tag_name("worldbody"))
        .ok_or(ModelError::MissingElement("worldbody"))?;
    compiler.read_body_contents(worldbody, 0, ROOT_CLASS)?;

    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "tendon" => compiler.read_tendons(child)?,
            "actuator" => compiler.read_actuators(child)?,
            _ => {}
        }
    }
    for child in root.children().filter(|child| child.has_tag_name("keyframe")) {
        compiler.read_keyframes(child)?;
    }

    let model = compiler.finish();
    model.validate()?;
    debug!(
        "compiled MJCF: {} bodies, {} geoms, {} joints, {} lights, {} tendons",
        model.nbody, model.ngeom, model.njnt, model.nlight, model.ntendon
    );
    Ok(model)
}

#[derive(Debug, Clone)]
struct Settings {
    degrees: bool,
    eulerseq: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            degrees: true,
            eulerseq: "xyz".to_string(),
        }
    }
}

impl Settings {
    fn read(&mut self, element: &Element) -> Result<(), ModelError> {
        match element.get("angle") {
            None => {}
            Some("degree") => self.degrees = true,
            Some("radian") => self.degrees = false,
            Some(other) => return Err(element.invalid("angle", other)),
        }
        if let Some(seq) = element.get("eulerseq") {
            if seq.len() != 3 || !seq.chars().all(|ch| "xyzXYZ".contains(ch)) {
                return Err(element.invalid("eulerseq", seq));
            }
            self.eulerseq = seq.to_string();
        }
        Ok(())
    }

    fn angle(&self, value: f64) -> f64 {
        if self.degrees {
            value * PI / 180.0
        } else {
            value
        }
    }
}

#[derive(Debug, Default)]
struct DefaultClass {
    parent: Option<String>,
    elements: HashMap<String, HashMap<String, String>>,
}

/// An element's attributes after default classes have been applied.
#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attrs: HashMap<String, String>,
}

impl Element {
    fn plain(node: Node<'_, '_>) -> Self {
        Self {
            tag: node.tag_name().name().to_string(),
            attrs: node
                .attributes()
                .map(|attr| (attr.name().to_string(), attr.value().to_string()))
                .collect(),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn invalid(&self, attribute: &str, value: &str) -> ModelError {
        ModelError::InvalidAttribute {
            element: self.tag.clone(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    fn floats(&self, name: &str) -> Result<Option<Vec<f64>>, ModelError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        value
            .split_whitespace()
            .map(|part| part.parse::<f64>().map_err(|_| self.invalid(name, value)))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn floats_exact(&self, name: &str, count: usize) -> Result<Option<Vec<f64>>, ModelError> {
        match self.floats(name)? {
            Some(values) if values.len() < count => {
                Err(self.invalid(name, self.get(name).unwrap_or_default()))
            }
            other => Ok(other),
        }
    }

    fn float(&self, name: &str, default: f64) -> Result<f64, ModelError> {
        match self.get(name) {
            Some(value) => value.trim().parse().map_err(|_| self.invalid(name, value)),
            None => Ok(default),
        }
    }

    fn vec3(&self, name: &str) -> Result<Option<DVec3>, ModelError> {
        Ok(self
            .floats_exact(name, 3)?
            .map(|v| DVec3::new(v[0], v[1], v[2])))
    }

    fn flag(&self, name: &str, default: bool) -> Result<bool, ModelError> {
        match self.get(name) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(self.invalid(name, other)),
        }
    }
}

struct ModelCompiler {
    model: Model,
    settings: Settings,
    defaults: HashMap<String, DefaultClass>,
    materials: HashMap<String, usize>,
    sites: HashMap<String, usize>,
    joints: HashMap<String, usize>,
    explicit_mass: Vec<Option<f64>>,
    geom_mass: Vec<f64>,
}

impl ModelCompiler {
    fn new(name: &str) -> Self {
        let mut model = Model {
            timestep: DEFAULT_TIMESTEP,
            ..Model::default()
        };
        model.names.extend_from_slice(name.as_bytes());
        model.names.push(0);
        let mut defaults = HashMap::new();
        defaults.insert(ROOT_CLASS.to_string(), DefaultClass::default());
        Self {
            model,
            settings: Settings::default(),
            defaults,
            materials: HashMap::new(),
            sites: HashMap::new(),
            joints: HashMap::new(),
            explicit_mass: Vec::new(),
            geom_mass: Vec::new(),
        }
    }

    fn read_default(&mut self, node: Node<'_, '_>, parent: Option<&str>) {
        let class = node
            .attribute("class")
            .unwrap_or(if parent.is_none() { ROOT_CLASS } else { "" })
            .to_string();
        let entry = self.defaults.entry(class.clone()).or_default();
        if class != ROOT_CLASS {
            entry.parent = Some(parent.unwrap_or(ROOT_CLASS).to_string());
        }
        for child in node.children().filter(Node::is_element) {
            if child.has_tag_name("default") {
                self.read_default(child, Some(&class));
                continue;
            }
            let attrs = self
                .defaults
                .get_mut(&class)
                .map(|entry| {
                    entry
                        .elements
                        .entry(child.tag_name().name().to_string())
                        .or_default()
                });
            if let Some(attrs) = attrs {
                for attr in child.attributes() {
                    attrs.insert(attr.name().to_string(), attr.value().to_string());
                }
            }
        }
    }

    /// Resolves an element against its default class chain.
    fn element(&self, node: Node<'_, '_>, childclass: &str) -> Element {
        let tag = node.tag_name().name();
        let mut chain = Vec::new();
        let mut class = Some(node.attribute("class").unwrap_or(childclass).to_string());
        while let Some(name) = class {
            let Some(entry) = self.defaults.get(&name) else {
                break;
            };
            chain.push(entry);
            class = entry.parent.clone();
        }

        let mut attrs = HashMap::new();
        for entry in chain.iter().rev() {
            if let Some(values) = entry.elements.get(tag) {
                attrs.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        let mut element = Element::plain(node);
        attrs.extend(element.attrs.drain());
        element.attrs = attrs;
        element
    }

    fn read_assets(&mut self, asset: Node<'_, '_>) -> Result<(), ModelError> {
        for node in asset.children().filter(|n| n.has_tag_name("material")) {
            let element = self.element(node, ROOT_CLASS);
            let rgba = element
                .floats_exact("rgba", 4)?
                .map_or([1.0, 1.0, 1.0, 1.0], |v| rgba(&v));
            if let Some(name) = element.get("name") {
                self.materials.insert(name.to_string(), self.model.nmat);
            }
            self.model.mat_rgba.extend_from_slice(&rgba);
            self.model.nmat += 1;
        }
        Ok(())
    }

    fn push_name(&mut self, name: &str) -> usize {
        let adr = self.model.names.len();
        self.model.names.extend_from_slice(name.as_bytes());
        self.model.names.push(0);
        adr
    }

    fn add_world_body(&mut self) {
        let adr = self.push_name("world");
        let model = &mut self.model;
        model.name_bodyadr.push(adr);
        model.body_parentid.push(0);
        model.body_jntadr.push(-1);
        model.body_jntnum.push(0);
        model.body_mocapid.push(-1);
        model.body_pos.extend_from_slice(&[0.0; 3]);
        model.body_quat.extend_from_slice(&[1.0, 0.0, 0.0, 0.0]);
        model.nbody = 1;
        self.explicit_mass.push(Some(0.0));
        self.geom_mass.push(0.0);
    }

    fn add_body(&mut self, node: Node<'_, '_>, parent: usize) -> Result<usize, ModelError> {
        let element = Element::plain(node);
        let pos = element.vec3("pos")?.unwrap_or(DVec3::ZERO);
        let quat = self.orientation(&element)?;
        let mocap = element.flag("mocap", false)?;

        let adr = self.push_name(element.get("name").unwrap_or_default());
        let body = self.model.nbody;
        let model = &mut self.model;
        model.nbody += 1;
        model.name_bodyadr.push(adr);
        model.body_parentid.push(parent);
        model.body_jntadr.push(-1);
        model.body_jntnum.push(0);
        if mocap {
            model.body_mocapid.push(model.nmocap as i32);
            model.nmocap += 1;
        } else {
            model.body_mocapid.push(-1);
        }
        model.body_pos.extend_from_slice(&pos.to_array());
        model.body_quat.extend_from_slice(&wxyz(quat));
        self.explicit_mass.push(None);
        self.geom_mass.push(0.0);
        Ok(body)
    }

    fn read_body_contents(
        &mut self,
        node: Node<'_, '_>,
        body: usize,
        childclass: &str,
    ) -> Result<(), ModelError> {
        for child in node.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "inertial" => {
                    let element = Element::plain(child);
                    self.explicit_mass[body] = Some(element.float("mass", 0.0)?);
                }
                "joint" => {
                    let element = self.element(child, childclass);
                    self.add_joint(&element, body, None)?;
                }
                "freejoint" => {
                    let element = Element::plain(child);
                    self.add_joint(&element, body, Some(JointType::Free))?;
                }
                "geom" => {
                    let element = self.element(child, childclass);
                    self.add_geom(&element, body)?;
                }
                "site" => {
                    let element = self.element(child, childclass);
                    self.add_site(&element, body)?;
                }
                "light" => {
                    let element = self.element(child, childclass);
                    self.add_light(&element, body)?;
                }
                _ => {}
            }
        }

        for child in node.children().filter(|n| n.has_tag_name("body")) {
            let class = child.attribute("childclass").unwrap_or(childclass);
            let id = self.add_body(child, body)?;
            self.read_body_contents(child, id, class)?;
        }
        Ok(())
    }

    fn add_joint(
        &mut self,
        element: &Element,
        body: usize,
        forced: Option<JointType>,
    ) -> Result<(), ModelError> {
        let kind = match forced {
            Some(kind) => kind,
            None => {
                let name = element.get("type").unwrap_or("hinge");
                JointType::from_name(name).ok_or_else(|| element.invalid("type", name))?
            }
        };
        let axis = element
            .vec3("axis")?
            .unwrap_or(DVec3::Z)
            .try_normalize()
            .unwrap_or(DVec3::Z);
        let pos = element.vec3("pos")?.unwrap_or(DVec3::ZERO);
        let reference = element.float("ref", 0.0)?;
        let damping = element.float("damping", 0.0)?;

        let joint = self.model.njnt;
        if let Some(name) = element.get("name") {
            self.joints.insert(name.to_string(), joint);
        }

        let qpos0 = match kind {
            JointType::Free => {
                let pos = &self.model.body_pos[body * 3..body * 3 + 3];
                let quat = &self.model.body_quat[body * 4..body * 4 + 4];
                [pos, quat].concat()
            }
            JointType::Ball => vec![1.0, 0.0, 0.0, 0.0],
            JointType::Hinge => vec![self.settings.angle(reference)],
            JointType::Slide => vec![reference],
        };

        let model = &mut self.model;
        if model.body_jntadr[body] < 0 {
            model.body_jntadr[body] = joint as i32;
        }
        model.body_jntnum[body] += 1;
        model.njnt += 1;
        model.jnt_type.push(kind);
        model.jnt_bodyid.push(body);
        model.jnt_qposadr.push(model.nq);
        model.jnt_dofadr.push(model.nv);
        model.jnt_pos.extend_from_slice(&pos.to_array());
        model.jnt_axis.extend_from_slice(&axis.to_array());
        model.jnt_damping.push(damping);
        model.nq += kind.nq();
        model.nv += kind.nv();
        model.qpos0.extend_from_slice(&qpos0);
        Ok(())
    }

    fn add_geom(&mut self, element: &Element, body: usize) -> Result<(), ModelError> {
        let type_name = element.get("type").unwrap_or("sphere");
        let kind =
            GeomType::from_name(type_name).ok_or_else(|| element.invalid("type", type_name))?;

        let mut size = [0.0; 3];
        for (slot, value) in size
            .iter_mut()
            .zip(element.floats("size")?.unwrap_or_default())
        {
            *slot = value;
        }

        let (pos, quat) = match element.floats_exact("fromto", 6)? {
            Some(ends) if is_elongated(kind) => {
                let start = DVec3::new(ends[0], ends[1], ends[2]);
                let end = DVec3::new(ends[3], ends[4], ends[5]);
                let axis = end - start;
                let half_length = axis.length() * 0.5;
                match kind {
                    GeomType::Capsule | GeomType::Cylinder => size[1] = half_length,
                    _ => size[2] = half_length,
                }
                let quat = axis
                    .try_normalize()
                    .map_or(DQuat::IDENTITY, |dir| DQuat::from_rotation_arc(DVec3::Z, dir));
                ((start + end) * 0.5, quat)
            }
            _ => (
                element.vec3("pos")?.unwrap_or(DVec3::ZERO),
                self.orientation(element)?,
            ),
        };

        let matid = match element.get("material") {
            Some(name) => *self.materials.get(name).ok_or_else(|| {
                ModelError::UnknownReference {
                    element: element.tag.clone(),
                    kind: "material",
                    name: name.to_string(),
                }
            })? as i32,
            None => -1,
        };
        let color = element
            .floats_exact("rgba", 4)?
            .map_or(DEFAULT_GEOM_RGBA, |v| rgba(&v));
        let group = element.float("group", 0.0)? as i32;
        let mass = match element.get("mass") {
            Some(_) => element.float("mass", 0.0)?,
            None => element.float("density", DEFAULT_DENSITY)? * geom_volume(kind, size),
        };
        self.geom_mass[body] += mass;

        let model = &mut self.model;
        model.ngeom += 1;
        model.geom_type.push(kind);
        model.geom_group.push(group);
        model.geom_bodyid.push(body);
        model.geom_matid.push(matid);
        model.geom_size.extend_from_slice(&size);
        model.geom_pos.extend_from_slice(&pos.to_array());
        model.geom_quat.extend_from_slice(&wxyz(quat));
        model.geom_rgba.extend_from_slice(&color);
        Ok(())
    }

    fn add_site(&mut self, element: &Element, body: usize) -> Result<(), ModelError> {
        let pos = element.vec3("pos")?.unwrap_or(DVec3::ZERO);
        if let Some(name) = element.get("name") {
            self.sites.insert(name.to_string(), self.model.nsite);
        }
        self.model.nsite += 1;
        self.model.site_bodyid.push(body);
        self.model.site_pos.extend_from_slice(&pos.to_array());
        Ok(())
    }

    fn add_light(&mut self, element: &Element, body: usize) -> Result<(), ModelError> {
        let pos = element.vec3("pos")?.unwrap_or(DVec3::ZERO);
        let dir = element
            .vec3("dir")?
            .unwrap_or(DVec3::NEG_Z)
            .try_normalize()
            .unwrap_or(DVec3::NEG_Z);
        let attenuation = element
            .vec3("attenuation")?
            .unwrap_or(DVec3::new(1.0, 0.0, 0.0));
        let directional = element.flag("directional", false)?;

        let model = &mut self.model;
        model.nlight += 1;
        model.light_bodyid.push(body);
        model.light_directional.push(directional);
        model.light_attenuation.extend_from_slice(&attenuation.to_array());
        model.light_pos.extend_from_slice(&pos.to_array());
        model.light_dir.extend_from_slice(&dir.to_array());
        Ok(())
    }

    fn read_tendons(&mut self, tendon: Node<'_, '_>) -> Result<(), ModelError> {
        for node in tendon.children().filter(Node::is_element) {
            let kind = node.tag_name().name();
            if kind != "spatial" && kind != "fixed" {
                continue;
            }
            let element = self.element(node, ROOT_CLASS);
            let width = element.float("width", DEFAULT_TENDON_WIDTH)?;
            let adr = self.model.wrap_site.len();
            if kind == "spatial" {
                for point in node.children().filter(|n| n.has_tag_name("site")) {
                    let name = point.attribute("site").unwrap_or_default();
                    let site =
                        *self
                            .sites
                            .get(name)
                            .ok_or_else(|| ModelError::UnknownReference {
                                element: "site".to_string(),
                                kind: "site",
                                name: name.to_string(),
                            })?;
                    self.model.wrap_site.push(site);
                }
            }
            let model = &mut self.model;
            model.ntendon += 1;
            model.tendon_width.push(width);
            model.tendon_adr.push(adr);
            model.tendon_num.push(model.wrap_site.len() - adr);
        }
        Ok(())
    }

    fn read_actuators(&mut self, actuator: Node<'_, '_>) -> Result<(), ModelError> {
        for node in actuator.children().filter(Node::is_element) {
            if !is_actuator(node.tag_name().name()) {
                continue;
            }
            let element = self.element(node, ROOT_CLASS);
            let joint = match element.get("joint") {
                Some(name) => *self.joints.get(name).ok_or_else(|| {
                    ModelError::UnknownReference {
                        element: element.tag.clone(),
                        kind: "joint",
                        name: name.to_string(),
                    }
                })? as i32,
                None => -1,
            };
            let gear = element
                .floats("gear")?
                .and_then(|values| values.first().copied())
                .unwrap_or(1.0);
            self.model.nu += 1;
            self.model.actuator_trnid.push(joint);
            self.model.actuator_gear.push(gear);
        }
        Ok(())
    }

    fn read_keyframes(&mut self, keyframe: Node<'_, '_>) -> Result<(), ModelError> {
        for node in keyframe.children().filter(|n| n.has_tag_name("key")) {
            let element = Element::plain(node);
            let mut qpos = self.model.qpos0.clone();
            if let Some(values) = element.floats("qpos")? {
                if values.len() > qpos.len() {
                    return Err(element.invalid("qpos", element.get("qpos").unwrap_or_default()));
                }
                qpos[..values.len()].copy_from_slice(&values);
            }
            self.model.key_qpos.extend_from_slice(&qpos);
            self.model.nkey += 1;
        }
        Ok(())
    }

    fn orientation(&self, element: &Element) -> Result<DQuat, ModelError> {
        if let Some(q) = element.floats_exact("quat", 4)? {
            let quat = DQuat::from_xyzw(q[1], q[2], q[3], q[0]);
            return Ok(if quat.length_squared() > 0.0 {
                quat.normalize()
            } else {
                DQuat::IDENTITY
            });
        }
        if let Some(aa) = element.floats_exact("axisangle", 4)? {
            let axis = DVec3::new(aa[0], aa[1], aa[2])
                .try_normalize()
                .ok_or_else(|| element.invalid("axisangle", element.get("axisangle").unwrap_or_default()))?;
            return Ok(DQuat::from_axis_angle(axis, self.settings.angle(aa[3])));
        }
        if let Some(euler) = element.floats_exact("euler", 3)? {
            let mut quat = DQuat::IDENTITY;
            for (ch, angle) in self.settings.eulerseq.chars().zip(euler) {
                let axis = match ch.to_ascii_lowercase() {
                    'x' => DVec3::X,
                    'y' => DVec3::Y,
                    _ => DVec3::Z,
                };
                let rotation = DQuat::from_axis_angle(axis, self.settings.angle(angle));
                quat = if ch.is_ascii_lowercase() {
                    quat * rotation
                } else {
                    rotation * quat
                };
            }
            return Ok(quat.normalize());
        }
        if let Some(axes) = element.floats_exact("xyaxes", 6)? {
            let x = DVec3::new(axes[0], axes[1], axes[2]).normalize_or_zero();
            let y = DVec3::new(axes[3], axes[4], axes[5]);
            let y = (y - x * x.dot(y)).normalize_or_zero();
            let z = x.cross(y);
            if z.length_squared() < 1e-12 {
                return Err(element.invalid("xyaxes", element.get("xyaxes").unwrap_or_default()));
            }
            return Ok(DQuat::from_mat3(&DMat3::from_cols(x, y, z)).normalize());
        }
        if let Some(zaxis) = element.vec3("zaxis")? {
            let dir = zaxis
                .try_normalize()
                .ok_or_else(|| element.invalid("zaxis", element.get("zaxis").unwrap_or_default()))?;
            return Ok(DQuat::from_rotation_arc(DVec3::Z, dir));
        }
        Ok(DQuat::IDENTITY)
    }

    fn finish(mut self) -> Model {
        let model = &mut self.model;
        model.body_rootid = Vec::with_capacity(model.nbody);
        for body in 0..model.nbody {
            let parent = model.body_parentid[body];
            let root = match (body, parent) {
                (0, _) => 0,
                (_, 0) => body,
                _ => model.body_rootid[parent],
            };
            model.body_rootid.push(root);
        }
        model.body_mass = self
            .explicit_mass
            .iter()
            .zip(&self.geom_mass)
            .map(|(explicit, geoms)| explicit.unwrap_or(*geoms))
            .collect();
        self.model
    }
}

fn is_actuator(tag: &str) -> bool {
    matches!(
        tag,
        "general" | "motor" | "position" | "velocity" | "intvelocity" | "damper" | "cylinder"
    )
}

fn is_elongated(kind: GeomType) -> bool {
    matches!(
        kind,
        GeomType::Capsule | GeomType::Cylinder | GeomType::Box | GeomType::Ellipsoid
    )
}

fn geom_volume(kind: GeomType, size: [f64; 3]) -> f64 {
    let [a, b, c] = size;
    match kind {
        GeomType::Sphere => 4.0 / 3.0 * PI * a.powi(3),
        GeomType::Capsule => PI * a * a * 2.0 * b + 4.0 / 3.0 * PI * a.powi(3),
        GeomType::Cylinder => PI * a * a * 2.0 * b,
        GeomType::Ellipsoid => 4.0 / 3.0 * PI * a * b * c,
        GeomType::Box => 8.0 * a * b * c,
        _ => 0.0,
    }
}

fn rgba(values: &[f64]) -> [f32; 4] {
    [
        values[0] as f32,
        values[1] as f32,
        values[2] as f32,
        values[3] as f32,
    ]
}

fn wxyz(quat: DQuat) -> [f64; 4] {
    [quat.w, quat.x, quat.y, quat.z]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARM: &str = r#"
    <mujoco model="arm">
      <compiler angle="radian"/>
      <option timestep="0.005"/>
      <default>
        <geom rgba="0 1 0 1"/>
        <default class="red">
          <geom rgba="1 0 0 1"/>
        </default>
      </default>
      <asset>
        <material name="blue" rgba="0 0 1 0.5"/>
      </asset>
      <worldbody>
        <light pos="0 0 3" dir="0 0 -1" directional="true"/>
        <geom name="floor" type="plane" size="5 5 0.1" material="blue"/>
        <body name="upper" pos="0 0 1">
          <joint name="shoulder" type="hinge" axis="0 1 0"/>
          <geom type="capsule" fromto="0 0 0 0 0 -0.5" size="0.05"/>
          <site name="s1" pos="0 0 -0.1"/>
          <body name="lower" pos="0 0 -0.5" childclass="red">
            <joint name="elbow" axis="0 1 0" ref="0.25"/>
            <geom type="box" size="0.1 0.2 0.3"/>
            <site name="s2" pos="0 0 -0.2"/>
          </body>
        </body>
        <body name="ball" pos="1 0 1">
          <freejoint/>
          <inertial pos="0 0 0" mass="2.5"/>
          <geom type="sphere" size="0.1"/>
        </body>
      </worldbody>
      <tendon>
        <spatial width="0.01">
          <site site="s1"/>
          <site site="s2"/>
        </spatial>
      </tendon>
      <actuator>
        <motor joint="shoulder" gear="3"/>
        <motor joint="elbow"/>
      </actuator>
      <keyframe>
        <key qpos="0.5"/>
      </keyframe>
    </mujoco>
    "#;

    #[test]
    fn compiles_body_tree_and_names() {
        let model = compile(ARM).unwrap();
        assert_eq!(model.nbody, 4);
        assert_eq!(model.body_name(0), "world");
        assert_eq!(model.body_name(1), "upper");
        assert_eq!(model.body_name(2), "lower");
        assert_eq!(model.body_name(3), "ball");
        assert_eq!(model.name_at(0), "arm");
        assert_eq!(model.body_parentid, vec![0, 0, 1, 0]);
        assert_eq!(model.body_rootid, vec![0, 1, 1, 3]);
        assert_eq!(model.timestep, 0.005);
    }

    #[test]
    fn joints_allocate_qpos() {
        let model = compile(ARM).unwrap();
        assert_eq!(model.njnt, 3);
        assert_eq!(model.nq, 1 + 1 + 7);
        assert_eq!(model.nv, 1 + 1 + 6);
        assert_eq!(model.jnt_qposadr, vec![0, 1, 2]);
        assert_eq!(model.body_jntadr, vec![-1, 0, 1, 2]);
        assert_eq!(model.root_qposadr(3), Some(2));
        assert_eq!(&model.qpos0[..2], &[0.0, 0.25]);
        assert_eq!(&model.qpos0[2..5], &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn fromto_sets_capsule_pose_and_length() {
        let model = compile(ARM).unwrap();
        assert_eq!(model.geom_type[1], GeomType::Capsule);
        let size = model.geom_size_at(1);
        assert!((size[1] - 0.25).abs() < 1e-12);
        assert!((model.geom_pos[5] + 0.25).abs() < 1e-12);
    }

    #[test]
    fn default_classes_and_materials_apply() {
        let model = compile(ARM).unwrap();
        assert_eq!(model.geom_matid[0], 0);
        assert_eq!(model.geom_color(0), [0.0, 0.0, 1.0, 0.5]);
        assert_eq!(model.geom_color(1), [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(model.geom_color(2), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn mass_prefers_inertial_then_geoms() {
        let model = compile(ARM).unwrap();
        assert_eq!(model.body_mass[3], 2.5);
        let expected_box = 1000.0 * 8.0 * 0.1 * 0.2 * 0.3;
        assert!((model.body_mass[2] - expected_box).abs() < 1e-9);
    }

    #[test]
    fn tendons_actuators_keys_and_lights() {
        let model = compile(ARM).unwrap();
        assert_eq!(model.ntendon, 1);
        assert_eq!(model.tendon_num, vec![2]);
        assert_eq!(model.tendon_width, vec![0.01]);
        assert_eq!(model.nu, 2);
        assert_eq!(model.actuator_trnid, vec![0, 1]);
        assert_eq!(model.actuator_gear, vec![3.0, 1.0]);
        assert_eq!(model.nkey, 1);
        assert_eq!(model.key_qpos[0], 0.5);
        assert_eq!(model.key_qpos[1], 0.25);
        assert_eq!(model.nlight, 1);
        assert!(model.light_directional[0]);
    }

    #[test]
    fn euler_defaults_to_degrees() {
        let xml = r#"<mujoco><worldbody>
            <body euler="0 0 90"><geom size="0.1"/></body>
        </worldbody></mujoco>"#;
        let model = compile(xml).unwrap();
        let q = &model.body_quat[4..8];
        let half = std::f64::consts::FRAC_PI_4;
        assert!((q[0] - half.cos()).abs() < 1e-9);
        assert!((q[3] - half.sin()).abs() < 1e-9);
    }

    #[test]
    fn unknown_material_is_reported() {
        let xml = r#"<mujoco><worldbody><geom size="1" material="nope"/></worldbody></mujoco>"#;
        let err = compile(xml).unwrap_err();
        assert!(matches!(err, ModelError::UnknownReference { kind: "material", .. }));
    }

    #[test]
    fn rejects_non_mjcf_documents() {
        assert!(matches!(
            compile("<scene/>"),
            Err(ModelError::MissingElement("mujoco"))
        ));
        assert!(compile("<mujoco>").is_err());
    }
}
