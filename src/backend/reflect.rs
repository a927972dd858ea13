//! WGSL reflection through naga: validation diagnostics, resource bindings
//! by name and stage interface locations.

use std::collections::BTreeSet;
use std::error::Error;

use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};

/// Resource kind of a module-scope variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalKind {
    Uniform,
    Storage { read_only: bool },
    Texture,
    Sampler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalBinding {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: GlobalKind,
}

/// Parsed and validated WGSL module
#[derive(Debug)]
pub struct ShaderReflection {
    module: naga::Module,
    info: ModuleInfo,
}

impl ShaderReflection {
    /// Parse and validate; the error is the compiler diagnostic text
    pub fn parse(source: &str) -> Result<Self, String> {
        let module =
            naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| describe(e.as_inner()))?;
        Ok(Self { module, info })
    }

    pub fn entry_point_stage(&self, name: &str) -> Option<naga::ShaderStage> {
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.name == name)
            .map(|ep| ep.stage)
    }

    /// Every resource variable of the module, in declaration order
    pub fn globals(&self) -> Vec<GlobalBinding> {
        self.module
            .global_variables
            .iter()
            .filter_map(|(_, var)| self.binding_of(var))
            .collect()
    }

    pub fn global(&self, name: &str) -> Option<GlobalBinding> {
        self.globals().into_iter().find(|global| global.name == name)
    }

    /// Resources statically used by an entry point, ordered by (group, binding)
    pub fn used_globals(&self, entry_point: &str) -> Vec<GlobalBinding> {
        let Some(index) = self
            .module
            .entry_points
            .iter()
            .position(|ep| ep.name == entry_point)
        else {
            return Vec::new();
        };
        let usage = self.info.get_entry_point(index);

        let mut used: Vec<GlobalBinding> = self
            .module
            .global_variables
            .iter()
            .filter(|(handle, _)| !usage[*handle].is_empty())
            .filter_map(|(_, var)| self.binding_of(var))
            .collect();
        used.sort_by_key(|global| (global.group, global.binding));
        used
    }

    /// Storage buffer bindings used by an entry point, ascending
    pub fn storage_bindings(&self, entry_point: &str) -> Vec<u32> {
        self.used_globals(entry_point)
            .into_iter()
            .filter(|global| matches!(global.kind, GlobalKind::Storage { .. }))
            .map(|global| global.binding)
            .collect()
    }

    /// `@location` inputs of an entry point
    pub fn input_locations(&self, entry_point: &str) -> BTreeSet<u32> {
        let mut locations = BTreeSet::new();
        if let Some(ep) = self.find(entry_point) {
            for argument in &ep.function.arguments {
                self.collect_locations(argument.binding.as_ref(), argument.ty, &mut locations);
            }
        }
        locations
    }

    /// `@location` outputs of an entry point
    pub fn output_locations(&self, entry_point: &str) -> BTreeSet<u32> {
        let mut locations = BTreeSet::new();
        if let Some(result) = self
            .find(entry_point)
            .and_then(|ep| ep.function.result.as_ref())
        {
            self.collect_locations(result.binding.as_ref(), result.ty, &mut locations);
        }
        locations
    }

    fn find(&self, entry_point: &str) -> Option<&naga::EntryPoint> {
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.name == entry_point)
    }

    fn collect_locations(
        &self,
        binding: Option<&naga::Binding>,
        ty: naga::Handle<naga::Type>,
        locations: &mut BTreeSet<u32>,
    ) {
        match binding {
            Some(naga::Binding::Location { location, .. }) => {
                locations.insert(*location);
            }
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                if let naga::TypeInner::Struct { members, .. } = &self.module.types[ty].inner {
                    for member in members {
                        self.collect_locations(member.binding.as_ref(), member.ty, locations);
                    }
                }
            }
        }
    }

    fn binding_of(&self, var: &naga::GlobalVariable) -> Option<GlobalBinding> {
        let binding = var.binding.as_ref()?;
        let kind = match var.space {
            naga::AddressSpace::Uniform => GlobalKind::Uniform,
            naga::AddressSpace::Storage { access } => GlobalKind::Storage {
                read_only: !access.contains(naga::StorageAccess::STORE),
            },
            naga::AddressSpace::Handle => match self.module.types[var.ty].inner {
                naga::TypeInner::Image { .. } => GlobalKind::Texture,
                naga::TypeInner::Sampler { .. } => GlobalKind::Sampler,
                _ => return None,
            },
            _ => return None,
        };
        Some(GlobalBinding {
            name: var.name.clone().unwrap_or_default(),
            group: binding.group,
            binding: binding.binding,
            kind,
        })
    }
}

/// Check that the vertex stage reads exactly `attributes` consecutive input
/// locations and that every fragment input is written by the vertex stage
pub fn check_link(
    vertex: &ShaderReflection,
    vertex_entry: &str,
    fragment: &ShaderReflection,
    fragment_entry: &str,
    attributes: usize,
) -> Result<(), String> {
    let inputs: Vec<u32> = vertex.input_locations(vertex_entry).into_iter().collect();
    let expected: Vec<u32> = (0..attributes as u32).collect();
    if inputs != expected {
        return Err(format!(
            "vertex inputs {:?} do not match {} attributes",
            inputs, attributes
        ));
    }

    let outputs = vertex.output_locations(vertex_entry);
    for location in fragment.input_locations(fragment_entry) {
        if !outputs.contains(&location) {
            return Err(format!(
                "fragment input location {} is not written by the vertex stage",
                location
            ));
        }
    }
    Ok(())
}

/// Error message followed by its chain of causes
fn describe(error: &dyn Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHADER: &str = r#"
        struct Out {
            @builtin(position) clip: vec4<f32>,
            @location(0) shade: f32,
            @location(2) uv: vec2<f32>,
        }

        @group(0) @binding(0) var<uniform> transformation: mat4x4<f32>;
        @group(0) @binding(1) var<storage, read> unused: array<f32>;
        @group(1) @binding(0) var layers: texture_2d_array<f32>;
        @group(1) @binding(1) var layers_sampler: sampler;

        @vertex
        fn vs_main(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> Out {
            var out: Out;
            out.clip = transformation * vec4<f32>(position, 1.0);
            out.shade = normal.y;
            out.uv = position.xz;
            return out;
        }

        @fragment
        fn fs_main(@location(2) uv: vec2<f32>) -> @location(0) vec4<f32> {
            return textureSample(layers, layers_sampler, uv, 0);
        }
    "#;

    #[test]
    fn test_interface_locations() {
        let reflection = ShaderReflection::parse(SHADER).unwrap();
        assert_eq!(
            reflection.input_locations("vs_main").into_iter().collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(
            reflection.output_locations("vs_main").into_iter().collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(
            reflection.input_locations("fs_main").into_iter().collect::<Vec<_>>(),
            vec![2]
        );
    }

    #[test]
    fn test_globals_by_name() {
        let reflection = ShaderReflection::parse(SHADER).unwrap();
        let texture = reflection.global("layers").unwrap();
        assert_eq!((texture.group, texture.binding), (1, 0));
        assert_eq!(texture.kind, GlobalKind::Texture);
        assert_eq!(
            reflection.global("layers_sampler").unwrap().kind,
            GlobalKind::Sampler
        );
        assert_eq!(
            reflection.global("unused").unwrap().kind,
            GlobalKind::Storage { read_only: true }
        );
    }

    #[test]
    fn test_used_globals_skip_unreferenced() {
        let reflection = ShaderReflection::parse(SHADER).unwrap();
        let used: Vec<String> = reflection
            .used_globals("vs_main")
            .into_iter()
            .map(|global| global.name)
            .collect();
        assert_eq!(used, vec!["transformation".to_string()]);
        assert!(reflection.storage_bindings("vs_main").is_empty());
    }

    #[test]
    fn test_stage_lookup() {
        let reflection = ShaderReflection::parse(SHADER).unwrap();
        assert_eq!(
            reflection.entry_point_stage("fs_main"),
            Some(naga::ShaderStage::Fragment)
        );
        assert_eq!(reflection.entry_point_stage("main"), None);
    }

    #[test]
    fn test_link_requires_matching_interface() {
        let reflection = ShaderReflection::parse(SHADER).unwrap();
        assert!(check_link(&reflection, "vs_main", &reflection, "fs_main", 2).is_ok());
        assert!(check_link(&reflection, "vs_main", &reflection, "fs_main", 3)
            .unwrap_err()
            .contains("3 attributes"));
    }

    #[test]
    fn test_syntax_error_reports_diagnostic() {
        let error = ShaderReflection::parse("fn broken( {").unwrap_err();
        assert!(!error.is_empty());
    }

    #[test]
    fn test_type_error_reports_diagnostic() {
        let error = ShaderReflection::parse(
            "@compute @workgroup_size(1) fn main() { let x: u32 = 1.5; }",
        )
        .unwrap_err();
        assert!(!error.is_empty());
    }
}
