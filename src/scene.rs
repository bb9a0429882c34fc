use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

/// Everything the showcase needs to know before the first asset arrives.
///
/// `Default` is the stock showcase layout; [`SceneDescription::from_xml`]
/// overrides any subset of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub camera: CameraSettings,
    pub ambient: AmbientLight,
    pub point_light: PointLight,
    pub character: ModelPlacement,
    pub draggable: ModelPlacement,
    pub ball: ModelPlacement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    pub motion: MotionSettings,
    pub clips: ClipNames,
}

impl Default for SceneDescription {
    fn default() -> Self {
        Self {
            camera: CameraSettings::default(),
            ambient: AmbientLight::default(),
            point_light: PointLight::default(),
            character: ModelPlacement {
                path: "assets/Girl_threejs.glb".to_string(),
                position: Vec3::new(-34.0, -20.3, -9.0),
                rotation: Vec3::ZERO,
                scale: Vec3::splat(8.6),
            },
            draggable: ModelPlacement {
                path: "assets/teddy_bear.glb".to_string(),
                position: Vec3::new(10.0, -11.0, -7.0),
                rotation: Vec3::new(0.8, -0.9, 0.2),
                scale: Vec3::ONE,
            },
            ball: ModelPlacement {
                path: "assets/ball.glb".to_string(),
                position: Vec3::new(-3.0, 1.9, -7.0),
                rotation: Vec3::ZERO,
                scale: Vec3::splat(36.0),
            },
            background: Some("glass.png".to_string()),
            motion: MotionSettings::default(),
            clips: ClipNames::default(),
        }
    }
}

/// Perspective camera placement. The camera looks down -Z from `position`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub position: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            position: Vec3::new(-3.0, 0.0, 30.0),
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Omnidirectional light. A `distance` of zero means unlimited range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub distance: f32,
    pub decay: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::new(19.8, 44.8, 7.5),
            color: Vec3::ONE,
            intensity: 80.0,
            distance: 0.0,
            decay: 1.0,
        }
    }
}

/// Where a model bundle comes from and where its root node is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPlacement {
    pub path: String,
    pub position: Vec3,
    /// Euler angles in radians, applied in XYZ order.
    #[serde(default)]
    pub rotation: Vec3,
    pub scale: Vec3,
}

/// Speeds and thresholds driving the per-frame behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSettings {
    /// Radians per second the idle character turns about Y.
    pub idle_spin: f32,
    /// Units per second while the character runs.
    pub run_velocity: Vec3,
    /// Depth at which a running character snaps back to its anchor.
    pub reset_z: f32,
    /// Radians per second the ball turns about X and Y.
    pub ball_spin: f32,
    /// Units per frame the rolling ball moves towards the camera and down.
    pub ball_step: f32,
    /// Depth at which the rolling ball stops.
    pub ball_stop_z: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            idle_spin: 1.0,
            run_velocity: Vec3::new(3.6, 0.0, 3.7),
            reset_z: 20.0,
            ball_spin: 2.0,
            ball_step: 0.1,
            ball_stop_z: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipNames {
    pub idle: String,
    pub run: String,
}

impl Default for ClipNames {
    fn default() -> Self {
        Self {
            idle: "tpose".to_string(),
            run: "Run Look Back".to_string(),
        }
    }
}

impl SceneDescription {
    /// Parses a scene description, starting from the defaults and replacing
    /// every value the document mentions.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("expected <scene> root element, found <{}>", root.tag_name().name());
        }

        let mut scene = Self::default();
        for node in root.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "camera" => parse_camera(&node, &mut scene.camera)?,
                "ambient" => {
                    scene.ambient.color =
                        parse_color(optional_text(&node, "color"), scene.ambient.color)?;
                    scene.ambient.intensity =
                        parse_f32(optional_text(&node, "intensity"), scene.ambient.intensity)?;
                }
                "light" => parse_point_light(&node, &mut scene.point_light)?,
                "model" => {
                    let role = node
                        .attribute("role")
                        .ok_or_else(|| anyhow!("<model> is missing its role attribute"))?;
                    let placement = match role {
                        "character" => &mut scene.character,
                        "draggable" => &mut scene.draggable,
                        "ball" => &mut scene.ball,
                        other => bail!("unknown model role '{other}'"),
                    };
                    parse_placement(&node, placement)
                        .with_context(|| format!("invalid <model role=\"{role}\">"))?;
                }
                "background" => {
                    scene.background = node
                        .text()
                        .map(str::trim)
                        .filter(|text| !text.is_empty() && *text != "none")
                        .map(str::to_string);
                }
                "motion" => parse_motion(&node, &mut scene.motion)?,
                "clips" => {
                    if let Some(idle) = optional_text(&node, "idle") {
                        scene.clips.idle = idle;
                    }
                    if let Some(run) = optional_text(&node, "run") {
                        scene.clips.run = run;
                    }
                }
                other => bail!("unexpected <{other}> element in scene description"),
            }
        }

        Ok(scene)
    }
}

fn parse_camera(node: &Node<'_, '_>, camera: &mut CameraSettings) -> Result<()> {
    camera.position = parse_vec3(optional_text(node, "position"), camera.position)?;
    camera.fov = parse_f32(optional_text(node, "fov"), camera.fov)?;
    camera.near = parse_f32(optional_text(node, "near"), camera.near)?;
    camera.far = parse_f32(optional_text(node, "far"), camera.far)?;
    if camera.near <= 0.0 || camera.far <= camera.near {
        bail!("camera clip planes must satisfy 0 < near < far");
    }
    Ok(())
}

fn parse_point_light(node: &Node<'_, '_>, light: &mut PointLight) -> Result<()> {
    light.position = parse_vec3(optional_text(node, "position"), light.position)?;
    light.color = parse_color(optional_text(node, "color"), light.color)?;
    light.intensity = parse_f32(optional_text(node, "intensity"), light.intensity)?;
    light.distance = parse_f32(optional_text(node, "distance"), light.distance)?;
    light.decay = parse_f32(optional_text(node, "decay"), light.decay)?;
    Ok(())
}

fn parse_placement(node: &Node<'_, '_>, placement: &mut ModelPlacement) -> Result<()> {
    if let Some(path) = optional_text(node, "path") {
        placement.path = path;
    }
    placement.position = parse_vec3(optional_text(node, "position"), placement.position)?;
    placement.rotation = parse_vec3(optional_text(node, "rotation"), placement.rotation)?;
    placement.scale = parse_scale(optional_text(node, "scale"), placement.scale)?;
    Ok(())
}

fn parse_motion(node: &Node<'_, '_>, motion: &mut MotionSettings) -> Result<()> {
    motion.idle_spin = parse_f32(optional_text(node, "idle-spin"), motion.idle_spin)?;
    motion.run_velocity = parse_vec3(optional_text(node, "run-velocity"), motion.run_velocity)?;
    motion.reset_z = parse_f32(optional_text(node, "reset-z"), motion.reset_z)?;
    motion.ball_spin = parse_f32(optional_text(node, "ball-spin"), motion.ball_spin)?;
    motion.ball_step = parse_f32(optional_text(node, "ball-step"), motion.ball_step)?;
    motion.ball_stop_z = parse_f32(optional_text(node, "ball-stop-z"), motion.ball_stop_z)?;
    Ok(())
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_components(value: &str, what: &str) -> Result<Vec<f32>> {
    value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid {what} component '{component}': {err}"))
        })
        .collect()
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    match parse_components(&value, "vector")?.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        other => Err(anyhow!("vector needs 3 components, got {}", other.len())),
    }
}

/// A single number means uniform scale.
fn parse_scale(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    match parse_components(&value, "scale")?.as_slice() {
        [uniform] => Ok(Vec3::splat(*uniform)),
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        other => Err(anyhow!("scale needs 1 or 3 components, got {}", other.len())),
    }
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    match parse_components(&value, "color")?.as_slice() {
        [r, g, b] => Ok(Vec3::new(r / 255.0, g / 255.0, b / 255.0)),
        other => Err(anyhow!("color needs 3 components, got {}", other.len())),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <scene>
        <camera>
            <position>0 2 40</position>
            <fov>60</fov>
        </camera>
        <light>
            <intensity>12.5</intensity>
            <color>255 128 0</color>
        </light>
        <model role="ball">
            <path>props/beach_ball.glb</path>
            <scale>12</scale>
        </model>
        <background>none</background>
        <motion>
            <reset-z>5</reset-z>
        </motion>
        <clips>
            <run>Sprint</run>
        </clips>
    </scene>
    "#;

    #[test]
    fn defaults_match_stock_layout() {
        let scene = SceneDescription::default();
        assert_eq!(scene.camera.position, Vec3::new(-3.0, 0.0, 30.0));
        assert_eq!(scene.character.position, Vec3::new(-34.0, -20.3, -9.0));
        assert_eq!(scene.draggable.rotation, Vec3::new(0.8, -0.9, 0.2));
        assert_eq!(scene.ball.scale, Vec3::splat(36.0));
        assert_eq!(scene.motion.run_velocity, Vec3::new(3.6, 0.0, 3.7));
        assert_eq!(scene.clips.run, "Run Look Back");
    }

    #[test]
    fn xml_overrides_only_mentioned_values() {
        let scene = SceneDescription::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.camera.position, Vec3::new(0.0, 2.0, 40.0));
        assert_eq!(scene.camera.fov, 60.0);
        assert_eq!(scene.camera.near, 0.1);
        assert!((scene.point_light.intensity - 12.5).abs() < f32::EPSILON);
        assert_eq!(scene.point_light.color, Vec3::new(1.0, 128.0 / 255.0, 0.0));
        assert_eq!(scene.point_light.position, Vec3::new(19.8, 44.8, 7.5));
        assert_eq!(scene.ball.path, "props/beach_ball.glb");
        assert_eq!(scene.ball.scale, Vec3::splat(12.0));
        assert_eq!(scene.ball.position, Vec3::new(-3.0, 1.9, -7.0));
        assert_eq!(scene.background, None);
        assert_eq!(scene.motion.reset_z, 5.0);
        assert_eq!(scene.motion.ball_stop_z, 20.0);
        assert_eq!(scene.clips.run, "Sprint");
        assert_eq!(scene.clips.idle, "tpose");
    }

    #[test]
    fn unknown_model_role_is_an_error() {
        let bad = r#"<scene><model role="dragon"><scale>1</scale></model></scene>"#;
        assert!(SceneDescription::from_xml(bad).is_err());
    }

    #[test]
    fn short_vectors_are_rejected() {
        let bad = "<scene><camera><position>1 2</position></camera></scene>";
        assert!(SceneDescription::from_xml(bad).is_err());
    }

    #[test]
    fn inverted_clip_planes_are_rejected() {
        let bad = "<scene><camera><near>10</near><far>1</far></camera></scene>";
        assert!(SceneDescription::from_xml(bad).is_err());
    }
}
