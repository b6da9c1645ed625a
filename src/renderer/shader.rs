//! Shader program setup.
//!
//! Each stage is compiled with naga's WGSL front end and validated. The link
//! step then checks what the GPU pipeline relies on across stages: the
//! vertex attribute locations, the vertex/fragment interface and the three
//! plane samplers in bind group 0.

use super::RendererError;
use super::context::{GraphicsContext, ProgramHandle};
use super::geometry::{POSITION_LOCATION, TEX_COORD_LOCATION};
use super::planes::Plane;
use naga::{Binding, Module, ScalarKind, TypeInner, VectorSize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

const BUNDLED_VERTEX_SHADER: &str = include_str!("shaders/i420.vert.wgsl");
const BUNDLED_FRAGMENT_SHADER: &str = include_str!("shaders/i420.frag.wgsl");

/// Bind group holding the plane textures and samplers
pub const PLANE_BIND_GROUP: u32 = 0;
/// Sampler binding of plane `i` is `SAMPLER_BINDING_OFFSET + i`
pub const SAMPLER_BINDING_OFFSET: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Vertex and fragment WGSL text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    /// The shaders shipped with the crate
    pub fn bundled() -> Self {
        Self {
            vertex: BUNDLED_VERTEX_SHADER.to_string(),
            fragment: BUNDLED_FRAGMENT_SHADER.to_string(),
        }
    }

    /// Read both stages from disk
    pub fn load(vertex_path: &Path, fragment_path: &Path) -> Result<Self, RendererError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                RendererError::ShaderSource(format!("{}: {}", path.display(), e))
            })
        };
        Ok(Self {
            vertex: read(vertex_path)?,
            fragment: read(fragment_path)?,
        })
    }
}

/// Texture and sampler bindings of one plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneSampler {
    pub plane: Plane,
    pub texture_binding: u32,
    pub sampler_binding: u32,
}

/// Locations resolved at link time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramBindings {
    pub position_location: u32,
    pub tex_coord_location: u32,
    pub samplers: [PlaneSampler; 3],
}

/// A program that passed compile and link checks
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex_source: String,
    pub fragment_source: String,
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub bindings: ProgramBindings,
}

/// Compile and link the two stages
pub fn compile(sources: &ShaderSources) -> Result<LinkedProgram, RendererError> {
    let vertex = compile_stage(ShaderStage::Vertex, &sources.vertex)?;
    let fragment = compile_stage(ShaderStage::Fragment, &sources.fragment)?;
    let (vertex_entry, fragment_entry, bindings) = link(&vertex, &fragment)?;

    log::debug!(
        "Shader program linked: {} -> {}, {:?}",
        vertex_entry,
        fragment_entry,
        bindings
    );

    Ok(LinkedProgram {
        vertex_source: sources.vertex.clone(),
        fragment_source: sources.fragment.clone(),
        vertex_entry,
        fragment_entry,
        bindings,
    })
}

fn compile_stage(stage: ShaderStage, source: &str) -> Result<Module, RendererError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| RendererError::ShaderCompile {
        stage,
        log: e.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator
        .validate(&module)
        .map_err(|e| RendererError::ShaderCompile {
            stage,
            log: e.emit_to_string(source),
        })?;

    Ok(module)
}

fn link_error(log: impl Into<String>) -> RendererError {
    RendererError::ShaderLink { log: log.into() }
}

fn link(
    vertex: &Module,
    fragment: &Module,
) -> Result<(String, String, ProgramBindings), RendererError> {
    let vs = vertex
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga::ShaderStage::Vertex)
        .ok_or_else(|| link_error("vertex module has no @vertex entry point"))?;
    let fs = fragment
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga::ShaderStage::Fragment)
        .ok_or_else(|| link_error("fragment module has no @fragment entry point"))?;

    // Vertex attributes
    let mut attributes = Vec::new();
    for arg in &vs.function.arguments {
        collect_locations(vertex, arg.binding.as_ref(), arg.ty, &mut attributes);
    }
    for &(location, ty) in &attributes {
        let expected = match location {
            POSITION_LOCATION => VectorSize::Tri,
            TEX_COORD_LOCATION => VectorSize::Bi,
            other => {
                return Err(link_error(format!(
                    "vertex attribute at location {} has no vertex buffer data",
                    other
                )));
            }
        };
        if !is_float_vector(vertex, ty, expected) {
            return Err(link_error(format!(
                "vertex attribute at location {} must be vec{}<f32>",
                location, expected as u8
            )));
        }
    }
    let required = [
        (POSITION_LOCATION, "position"),
        (TEX_COORD_LOCATION, "texture coordinate"),
    ];
    for (location, name) in required {
        if !attributes.iter().any(|&(l, _)| l == location) {
            return Err(link_error(format!(
                "vertex stage does not read the {} attribute at location {}",
                name, location
            )));
        }
    }

    // Stage interface
    let mut outputs = Vec::new();
    if let Some(result) = &vs.function.result {
        collect_locations(vertex, result.binding.as_ref(), result.ty, &mut outputs);
    }
    let produced: BTreeSet<u32> = outputs.iter().map(|&(l, _)| l).collect();
    let mut inputs = Vec::new();
    for arg in &fs.function.arguments {
        collect_locations(fragment, arg.binding.as_ref(), arg.ty, &mut inputs);
    }
    for &(location, _) in &inputs {
        if !produced.contains(&location) {
            return Err(link_error(format!(
                "fragment input at location {} is not written by the vertex stage",
                location
            )));
        }
    }

    // Color output
    let mut targets = Vec::new();
    if let Some(result) = &fs.function.result {
        collect_locations(fragment, result.binding.as_ref(), result.ty, &mut targets);
    }
    if !targets.iter().any(|&(l, _)| l == 0) {
        return Err(link_error("fragment stage writes no color at location 0"));
    }

    // Only the plane bind group is bound at draw time
    if let Some(rb) = resource_bindings(vertex).next() {
        return Err(link_error(format!(
            "vertex stage declares a resource at @group({}) @binding({}), only fragment resources are bound",
            rb.group, rb.binding
        )));
    }
    for rb in resource_bindings(fragment) {
        if rb.group != PLANE_BIND_GROUP || rb.binding >= SAMPLER_BINDING_OFFSET + Plane::ALL.len() as u32 {
            return Err(link_error(format!(
                "resource at @group({}) @binding({}) is outside the plane bind group layout",
                rb.group, rb.binding
            )));
        }
    }

    // Plane samplers
    let mut samplers = [PlaneSampler {
        plane: Plane::Y,
        texture_binding: 0,
        sampler_binding: SAMPLER_BINDING_OFFSET,
    }; 3];
    for plane in Plane::ALL {
        let texture_binding = plane.unit();
        let sampler_binding = SAMPLER_BINDING_OFFSET + plane.unit();

        let texture = find_resource(fragment, texture_binding).ok_or_else(|| {
            link_error(format!(
                "no texture for plane {:?} at @group({}) @binding({})",
                plane, PLANE_BIND_GROUP, texture_binding
            ))
        })?;
        let is_float_texture = matches!(
            texture,
            TypeInner::Image {
                dim: naga::ImageDimension::D2,
                arrayed: false,
                class: naga::ImageClass::Sampled {
                    kind: ScalarKind::Float,
                    multi: false,
                },
            }
        );
        if !is_float_texture {
            return Err(link_error(format!(
                "binding {} must be texture_2d<f32> for plane {:?}",
                texture_binding, plane
            )));
        }

        let sampler = find_resource(fragment, sampler_binding).ok_or_else(|| {
            link_error(format!(
                "no sampler for plane {:?} at @group({}) @binding({})",
                plane, PLANE_BIND_GROUP, sampler_binding
            ))
        })?;
        if !matches!(sampler, TypeInner::Sampler { comparison: false }) {
            return Err(link_error(format!(
                "binding {} must be a filtering sampler for plane {:?}",
                sampler_binding, plane
            )));
        }

        samplers[plane.unit() as usize] = PlaneSampler {
            plane,
            texture_binding,
            sampler_binding,
        };
    }

    Ok((
        vs.name.clone(),
        fs.name.clone(),
        ProgramBindings {
            position_location: POSITION_LOCATION,
            tex_coord_location: TEX_COORD_LOCATION,
            samplers,
        },
    ))
}

/// Location-bound values of an argument or result, looking through structs
fn collect_locations(
    module: &Module,
    binding: Option<&Binding>,
    ty: naga::Handle<naga::Type>,
    out: &mut Vec<(u32, naga::Handle<naga::Type>)>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push((*location, ty)),
        Some(_) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.binding.as_ref(), member.ty, out);
                }
            }
        }
    }
}

fn is_float_vector(module: &Module, ty: naga::Handle<naga::Type>, size: VectorSize) -> bool {
    match &module.types[ty].inner {
        TypeInner::Vector { size: s, scalar } => {
            *s == size && scalar.kind == ScalarKind::Float && scalar.width == 4
        }
        _ => false,
    }
}

fn resource_bindings(module: &Module) -> impl Iterator<Item = &naga::ResourceBinding> {
    module
        .global_variables
        .iter()
        .filter_map(|(_, var)| var.binding.as_ref())
}

fn find_resource(module: &Module, binding: u32) -> Option<&TypeInner> {
    module
        .global_variables
        .iter()
        .find(|(_, var)| {
            var.binding
                .as_ref()
                .is_some_and(|rb| rb.group == PLANE_BIND_GROUP && rb.binding == binding)
        })
        .map(|(_, var)| &module.types[var.ty].inner)
}

/// The linked program living in a graphics context
#[derive(Debug)]
pub struct ShaderPipeline {
    program: ProgramHandle,
    bindings: ProgramBindings,
}

impl ShaderPipeline {
    pub fn create<C: GraphicsContext>(
        ctx: &mut C,
        sources: &ShaderSources,
    ) -> Result<Self, RendererError> {
        let linked = compile(sources)?;
        let program = ctx.create_program(&linked)?;
        Ok(Self {
            program,
            bindings: linked.bindings,
        })
    }

    pub fn program(&self) -> &ProgramHandle {
        &self.program
    }

    pub fn bindings(&self) -> &ProgramBindings {
        &self.bindings
    }

    pub fn release<C: GraphicsContext>(self, ctx: &mut C) {
        ctx.delete_program(self.program);
    }
}
